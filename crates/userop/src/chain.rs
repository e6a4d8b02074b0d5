//! Read-only view of an account's on-chain state.

use alloy::{
    providers::{DynProvider, Provider, ProviderBuilder},
    rpc::types::TransactionRequest,
    transports::http::reqwest::Url,
};
use alloy_primitives::{Address, U256, aliases::U192};
use alloy_sol_types::SolCall;
use async_trait::async_trait;
use daimo_primitives::{
    ActiveKey,
    contracts::{IDaimoAccount, IEntryPoint},
};
use tracing::debug;

use crate::error::{Result, UserOpError};

#[async_trait]
pub trait AccountChain: Send + Sync {
    /// `EntryPoint.getNonce(sender, key)`: `key << 64 | sequence`.
    async fn get_nonce(&self, sender: Address, key: U192) -> Result<U256>;

    /// Whether `account` has code.
    async fn is_deployed(&self, account: Address) -> Result<bool>;

    /// Keys currently registered on `account`.
    async fn active_keys(&self, account: Address) -> Result<Vec<ActiveKey>>;
}

/// [`AccountChain`] over JSON-RPC.
#[derive(Clone)]
pub struct RpcAccountChain {
    provider: DynProvider,
    entry_point: Address,
}

impl RpcAccountChain {
    pub fn new(rpc_url: &str, entry_point: Address) -> Result<Self> {
        Ok(Self::with_provider(http_provider(rpc_url)?, entry_point))
    }

    pub fn with_provider(provider: DynProvider, entry_point: Address) -> Self {
        Self {
            provider,
            entry_point,
        }
    }

    async fn call<C: SolCall>(&self, to: Address, call: C) -> Result<C::Return> {
        let tx = TransactionRequest::default()
            .to(to)
            .input(call.abi_encode().into());

        let output = self
            .provider
            .call(tx)
            .await
            .map_err(UserOpError::from_rpc)?;

        C::abi_decode_returns(&output).map_err(|e| {
            UserOpError::NetworkFailure(format!("undecodable {} result: {e}", C::SIGNATURE))
        })
    }
}

/// Type-erased HTTP provider for `url`.
pub(crate) fn http_provider(url: &str) -> Result<DynProvider> {
    let parsed: Url = url
        .parse()
        .map_err(|e| UserOpError::Config(format!("invalid url {url}: {e}")))?;
    Ok(ProviderBuilder::new().connect_http(parsed).erased())
}

#[async_trait]
impl AccountChain for RpcAccountChain {
    async fn get_nonce(&self, sender: Address, key: U192) -> Result<U256> {
        self.call(self.entry_point, IEntryPoint::getNonceCall { sender, key })
            .await
    }

    async fn is_deployed(&self, account: Address) -> Result<bool> {
        let code = self
            .provider
            .get_code_at(account)
            .await
            .map_err(UserOpError::from_rpc)?;
        debug!(%account, code_len = code.len(), "fetched account code");
        Ok(!code.is_empty())
    }

    async fn active_keys(&self, account: Address) -> Result<Vec<ActiveKey>> {
        let keys = self
            .call(account, IDaimoAccount::getActiveSigningKeysCall {})
            .await?;

        Ok(keys
            .activeSigningKeySlots
            .into_iter()
            .zip(keys.activeSigningKeys)
            .map(|(slot, public_key)| ActiveKey { slot, public_key })
            .collect())
    }
}
