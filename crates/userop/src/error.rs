use alloy::transports::{RpcError, TransportError};
use alloy_primitives::Address;
use daimo_primitives::SlotError;
use daimo_signer::SignError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum UserOpError {
    #[error(transparent)]
    Sign(#[from] SignError),

    /// Bundler or RPC node unreachable. Safe to retry.
    #[error("network failure: {0}")]
    NetworkFailure(String),

    /// The bundler refused the operation. Message is passed through verbatim.
    #[error("bundler rejected operation ({code}): {message}")]
    BundlerRejected { code: i64, message: String },

    #[error(transparent)]
    Slot(#[from] SlotError),

    #[error("account {0} is not deployed and no init data was provided")]
    NotDeployed(Address),

    #[error("config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl UserOpError {
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::NetworkFailure(_))
    }

    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Sign(err) if err.is_cancelled())
    }

    /// Maps a failed bundler request: JSON-RPC error responses are
    /// rejections, anything else is a network failure.
    pub fn from_bundler(err: TransportError) -> Self {
        match err {
            RpcError::ErrorResp(payload) => Self::BundlerRejected {
                code: payload.code,
                message: payload.message.into_owned(),
            },
            other => Self::NetworkFailure(other.to_string()),
        }
    }

    pub fn from_rpc(err: TransportError) -> Self {
        Self::NetworkFailure(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, UserOpError>;
