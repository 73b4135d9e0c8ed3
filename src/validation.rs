use bs58;
use rust_decimal::Decimal;
use solana_sdk::pubkey::Pubkey;
use std::str::FromStr;
use thiserror::Error;

use crate::models::order::Side;

#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("Missing required parameter: {0}")]
    MissingParameter(String),

    #[error("Invalid side: {0}. Must be 'buy' or 'sell'")]
    InvalidSide(String),

    #[error("Invalid Solana address format: {0}")]
    InvalidSolanaAddress(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
}

pub fn validate_solana_address(address: &str) -> Result<(), ValidationError> {
    // Check if address is empty
    if address.trim().is_empty() {
        return Err(ValidationError::MissingParameter("address".to_string()));
    }

    // Decode base58 string
    let decoded = match bs58::decode(address).into_vec() {
        Ok(bytes) => bytes,
        Err(_) => return Err(ValidationError::InvalidSolanaAddress(address.to_string())),
    };

    // Validate length (Solana addresses are 32 bytes)
    if decoded.len() != 32 {
        return Err(ValidationError::InvalidSolanaAddress(address.to_string()));
    }

    Ok(())
}

/// Total conversion from a base58 string to a public key.
pub fn parse_pubkey(address: &str) -> Result<Pubkey, ValidationError> {
    validate_solana_address(address)?;
    Pubkey::from_str(address).map_err(|_| ValidationError::InvalidSolanaAddress(address.to_string()))
}

pub fn validate_side(side: &str) -> Result<Side, ValidationError> {
    match side.trim().to_lowercase().as_str() {
        "buy" => Ok(Side::Buy),
        "sell" => Ok(Side::Sell),
        "" => Err(ValidationError::MissingParameter("side".to_string())),
        other => Err(ValidationError::InvalidSide(other.to_string())),
    }
}

pub fn validate_price(price: &str) -> Result<Decimal, ValidationError> {
    if price.trim().is_empty() {
        return Err(ValidationError::MissingParameter("price".to_string()));
    }

    let value = Decimal::from_str(price.trim())
        .map_err(|_| ValidationError::InvalidParameter(format!("price '{}' is not a decimal", price)))?;

    if value <= Decimal::ZERO {
        return Err(ValidationError::InvalidParameter("price must be positive".to_string()));
    }

    Ok(value)
}
