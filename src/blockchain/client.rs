use crate::blockchain::models::{extract_block, RawBlock};
use crate::config::Config;
use async_trait::async_trait;
use backon::{BackoffBuilder, Retryable};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use solana_client::client_error::{ClientError as RpcClientError, ClientErrorKind};
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_client::rpc_config::RpcBlockConfig;
use solana_sdk::commitment_config::CommitmentConfig;
use solana_sdk::pubkey::Pubkey;
use solana_transaction_status::{TransactionDetails, UiConfirmedBlock, UiTransactionEncoding};
use spl_token::solana_program::program_pack::Pack;
use spl_token::state::Mint;
use std::future::Future;
use std::num::NonZeroU32;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("RPC error: {0}")]
    Fatal(#[from] RpcClientError),

    #[error("Transient RPC error: {0}")]
    Transient(String),

    #[error("Slot {0} was skipped")]
    Skipped(u64),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("RPC call timed out after {0:?}")]
    Timeout(Duration),

    #[error("Invalid public key: {0}")]
    InvalidPubkey(String),

    #[error("Invalid account data: {0}")]
    InvalidData(String),
}

impl ClientError {
    /// Errors worth another attempt: rate limits, blocks not yet available,
    /// transport failures and timeouts.
    pub fn is_transient(&self) -> bool {
        matches!(self, ClientError::Transient(_) | ClientError::Timeout(_))
    }

    /// Map a raw RPC error onto the retry taxonomy.
    pub fn classify(err: RpcClientError, slot: Option<u64>) -> Self {
        let message = err.to_string();

        if message.contains("was skipped") {
            return ClientError::Skipped(slot.unwrap_or_default());
        }
        if message.contains("Block not available for slot")
            || message.contains("429")
            || message.to_lowercase().contains("limit")
        {
            return ClientError::Transient(message);
        }
        match err.kind() {
            ClientErrorKind::Io(_) | ClientErrorKind::Reqwest(_) => ClientError::Transient(message),
            _ => ClientError::Fatal(err),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MintInfo {
    pub decimals: u8,
    pub supply: u64,
}

/// Linear backoff: `step`, `2 * step`, ... for a fixed number of retries.
#[derive(Debug, Clone, Copy)]
pub struct LinearBackoff {
    step: Duration,
    max_times: usize,
}

impl LinearBackoff {
    pub fn new(step: Duration, max_times: usize) -> Self {
        Self { step, max_times }
    }
}

impl BackoffBuilder for LinearBackoff {
    type Backoff = std::vec::IntoIter<Duration>;

    fn build(self) -> Self::Backoff {
        (1..=self.max_times as u32)
            .map(|n| self.step * n)
            .collect::<Vec<_>>()
            .into_iter()
    }
}

/// Chain reads used by the block pipeline: blocks, mint decimals, fee
/// configs and supply.
#[async_trait]
pub trait ChainSource: Send + Sync {
    async fn get_account_data(&self, address: &Pubkey) -> Result<Vec<u8>, ClientError>;
    async fn get_mint_info(&self, mint: &Pubkey) -> Result<MintInfo, ClientError>;
    async fn get_total_supply(&self, mint: &Pubkey) -> Result<u64, ClientError>;

    async fn fetch_block(&self, slot: u64) -> Result<RawBlock, ClientError> {
        Err(ClientError::NotFound(format!("block {}", slot)))
    }
}

pub struct ChainClient {
    endpoints: Vec<RpcClient>,
    next: AtomicUsize,
    commitment: CommitmentConfig,
    timeout: Duration,
    max_retries: usize,
    limiter: Option<DefaultDirectRateLimiter>,
}

impl ChainClient {
    pub fn new(config: &Config) -> Self {
        let timeout = Duration::from_secs(config.rpc_timeout_secs);
        let commitment = CommitmentConfig::confirmed();

        info!(
            "Initializing Solana client with {} RPC endpoint(s), commitment: {:?}",
            config.solana_rpc_urls.len(),
            commitment
        );

        let endpoints = config
            .solana_rpc_urls
            .iter()
            .map(|url| RpcClient::new_with_timeout_and_commitment(url.clone(), timeout, commitment))
            .collect();

        let limiter = config
            .rpc_rate_limit
            .and_then(NonZeroU32::new)
            .map(|rps| RateLimiter::direct(Quota::per_second(rps)));

        Self {
            endpoints,
            next: AtomicUsize::new(0),
            commitment,
            timeout,
            max_retries: config.rpc_max_retries,
            limiter,
        }
    }

    /// Round-robin across the endpoint ring; shared by every task.
    fn endpoint(&self) -> &RpcClient {
        let index = self.next.fetch_add(1, Ordering::Relaxed) % self.endpoints.len().max(1);
        &self.endpoints[index]
    }

    async fn call<T, F, Fut>(&self, op: &str, f: F) -> Result<T, ClientError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, ClientError>>,
    {
        let attempt = || async {
            if let Some(limiter) = &self.limiter {
                limiter.until_ready().await;
            }
            match tokio::time::timeout(self.timeout, f()).await {
                Ok(result) => result,
                Err(_) => Err(ClientError::Timeout(self.timeout)),
            }
        };

        attempt
            .retry(LinearBackoff::new(Duration::from_millis(200), self.max_retries))
            .when(ClientError::is_transient)
            .notify(|err: &ClientError, dur: Duration| {
                debug!("{} failed, retrying in {:?}: {}", op, dur, err);
            })
            .await
    }

    pub async fn get_slot(&self) -> Result<u64, ClientError> {
        self.call("getSlot", || async {
            self.endpoint()
                .get_slot_with_commitment(self.commitment)
                .await
                .map_err(|e| ClientError::classify(e, None))
        })
        .await
    }

    /// Full block with base64 transactions. Skipped slots surface as
    /// `ClientError::Skipped` without retrying.
    pub async fn get_block(&self, slot: u64) -> Result<UiConfirmedBlock, ClientError> {
        let config = RpcBlockConfig {
            encoding: Some(UiTransactionEncoding::Base64),
            transaction_details: Some(TransactionDetails::Full),
            rewards: Some(false),
            commitment: Some(self.commitment),
            max_supported_transaction_version: Some(0),
        };

        self.call("getBlock", || async {
            self.endpoint()
                .get_block_with_config(slot, config)
                .await
                .map_err(|e| ClientError::classify(e, Some(slot)))
        })
        .await
    }

    pub async fn get_account(&self, address: &Pubkey, commitment: CommitmentConfig) -> Result<Vec<u8>, ClientError> {
        let response = self
            .call("getAccountInfo", || async {
                self.endpoint()
                    .get_account_with_commitment(address, commitment)
                    .await
                    .map_err(|e| ClientError::classify(e, None))
            })
            .await?;

        response
            .value
            .map(|account| account.data)
            .ok_or_else(|| ClientError::NotFound(address.to_string()))
    }
}

/// Parse an SPL mint account (legacy or 2022, whose base layout is shared).
pub fn parse_mint(address: &Pubkey, data: &[u8]) -> Result<MintInfo, ClientError> {
    if data.len() < Mint::LEN {
        return Err(ClientError::InvalidData(format!(
            "mint {} has {} bytes",
            address,
            data.len()
        )));
    }
    let mint = Mint::unpack_from_slice(&data[..Mint::LEN])
        .map_err(|e| ClientError::InvalidData(format!("mint {}: {}", address, e)))?;

    Ok(MintInfo {
        decimals: mint.decimals,
        supply: mint.supply,
    })
}

#[async_trait]
impl ChainSource for ChainClient {
    async fn fetch_block(&self, slot: u64) -> Result<RawBlock, ClientError> {
        let block = self.get_block(slot).await?;
        Ok(extract_block(slot, &block))
    }

    async fn get_account_data(&self, address: &Pubkey) -> Result<Vec<u8>, ClientError> {
        self.get_account(address, self.commitment).await
    }

    async fn get_mint_info(&self, mint: &Pubkey) -> Result<MintInfo, ClientError> {
        let data = self.get_account(mint, self.commitment).await?;
        parse_mint(mint, &data)
    }

    async fn get_total_supply(&self, mint: &Pubkey) -> Result<u64, ClientError> {
        let amount = self
            .call("getTokenSupply", || async {
                self.endpoint()
                    .get_token_supply(mint)
                    .await
                    .map_err(|e| ClientError::classify(e, None))
            })
            .await?;

        amount.amount.parse::<u64>().map_err(|_| {
            warn!("Token supply for {} is not an integer: {}", mint, amount.amount);
            ClientError::InvalidData(format!("supply of {}", mint))
        })
    }
}
