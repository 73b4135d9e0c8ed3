use crate::api::ApiError;
use crate::blockchain::client::ClientError;
use crate::db::DbError;
use crate::decoder::error::DecodeError;
use crate::emitter::EmitError;
use crate::matcher::MatcherError;
use crate::validation::ValidationError;
use thiserror::Error;

/// Crate-level error; each layer keeps its own enum.
#[derive(Error, Debug)]
pub enum IndexerError {
    #[error(transparent)]
    Client(#[from] ClientError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Database(#[from] DbError),

    #[error(transparent)]
    Matcher(#[from] MatcherError),

    #[error(transparent)]
    Emit(#[from] EmitError),

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Startup failed: {0}")]
    Startup(String),
}

impl IndexerError {
    pub fn startup(message: impl Into<String>) -> Self {
        IndexerError::Startup(message.into())
    }
}
