//! Submission of signed operations to an ERC-4337 bundler.

use alloy::providers::{DynProvider, Provider};
use alloy_primitives::{Address, B256};
use async_trait::async_trait;
use daimo_primitives::UserOperation;
use tracing::info;

use crate::{
    chain::http_provider,
    error::{Result, UserOpError},
};

#[async_trait]
pub trait Bundler: Send + Sync {
    /// Hands `op` to the bundler. Returns the operation hash once the bundler
    /// accepts it, before it is mined. No retries happen here.
    async fn send_user_operation(&self, op: &UserOperation, entry_point: Address) -> Result<B256>;
}

/// [`Bundler`] speaking `eth_sendUserOperation` over HTTP.
#[derive(Clone)]
pub struct RpcBundler {
    provider: DynProvider,
}

impl RpcBundler {
    pub fn new(bundler_url: &str) -> Result<Self> {
        Ok(Self::with_provider(http_provider(bundler_url)?))
    }

    pub fn with_provider(provider: DynProvider) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl Bundler for RpcBundler {
    async fn send_user_operation(&self, op: &UserOperation, entry_point: Address) -> Result<B256> {
        let op_hash: B256 = self
            .provider
            .raw_request(
                "eth_sendUserOperation".into(),
                (op.clone(), entry_point),
            )
            .await
            .map_err(UserOpError::from_bundler)?;

        info!(%op_hash, sender = %op.sender, "bundler accepted operation");
        Ok(op_hash)
    }
}
