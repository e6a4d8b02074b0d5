//! Hardware enclave signer (raw ERC-191 path).

use std::{fmt::Debug, sync::Arc};

use alloy_primitives::{B256, Bytes};
use async_trait::async_trait;
use daimo_primitives::{
    KeySlot, P256Signature,
    signature::{encode_compact, public_key_coordinates},
    webauthn::erc191_digest,
};
use p256::ecdsa::{Signature, SigningKey, signature::hazmat::PrehashSigner};
use tracing::debug;

use crate::{
    error::{Result, SignError},
    signer::SignatureResponse,
};

/// Device hardware holding a non-exportable P256 key.
#[async_trait]
pub trait EnclaveBackend: Send + Sync + Debug {
    /// Signs a 32-byte digest and returns a DER encoded signature.
    ///
    /// Fails with [`SignError::AuthFailed`] when the device has no secure lock
    /// screen, [`SignError::Cancelled`] when the user dismisses the prompt.
    async fn sign_prehash(&self, digest: B256) -> Result<Bytes>;
}

#[derive(Clone, Debug)]
pub struct EnclaveSigner {
    key_slot: KeySlot,
    backend: Arc<dyn EnclaveBackend>,
}

impl EnclaveSigner {
    pub fn new(key_slot: KeySlot, backend: Arc<dyn EnclaveBackend>) -> Self {
        Self { key_slot, backend }
    }

    pub const fn key_slot(&self) -> KeySlot {
        self.key_slot
    }

    /// Signs `erc191(keccak256(challenge))`, returning compact low-S `r || s`.
    pub async fn sign(&self, challenge: &[u8]) -> Result<SignatureResponse> {
        let digest = erc191_digest(challenge);
        debug!(key_slot = self.key_slot, %digest, "requesting enclave signature");

        let der = self.backend.sign_prehash(digest).await?;
        let signature = P256Signature::from_der(&der)?;

        Ok(SignatureResponse {
            key_slot: self.key_slot,
            signature: encode_compact(signature),
        })
    }
}

/// An in-memory P256 key standing in for enclave hardware.
pub struct SoftwareEnclave {
    key: SigningKey,
}

impl SoftwareEnclave {
    pub fn from_bytes(secret: &B256) -> Result<Self> {
        let key = SigningKey::from_slice(secret.as_slice())
            .map_err(|err| SignError::Unavailable(err.to_string()))?;
        Ok(Self { key })
    }

    pub fn public_key(&self) -> [B256; 2] {
        public_key_coordinates(self.key.verifying_key())
    }
}

impl Debug for SoftwareEnclave {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SoftwareEnclave")
            .field("public_key", &self.public_key())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl EnclaveBackend for SoftwareEnclave {
    async fn sign_prehash(&self, digest: B256) -> Result<Bytes> {
        let signature: Signature = self
            .key
            .sign_prehash(digest.as_slice())
            .map_err(|err| SignError::Unavailable(err.to_string()))?;
        Ok(Bytes::copy_from_slice(signature.to_der().as_bytes()))
    }
}
