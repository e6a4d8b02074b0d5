//! Passkey and security key signers (WebAuthn path).

use std::{fmt::Debug, sync::Arc};

use alloy_primitives::Bytes;
use async_trait::async_trait;
use daimo_primitives::{
    KeySlot, P256Signature, SignatureError, WebAuthnChallenge, signature::encode_webauthn,
};
use tracing::debug;

use crate::{error::Result, signer::SignatureResponse};

/// The result of a WebAuthn `get` ceremony.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Assertion {
    /// Slot of the credential the user picked, recovered from its user handle.
    pub key_slot: KeySlot,
    pub authenticator_data: Bytes,
    pub client_data_json: String,
    /// DER encoded P256 signature.
    pub signature: Bytes,
}

/// Platform WebAuthn API.
#[async_trait]
pub trait Authenticator: Send + Sync + Debug {
    /// Runs an assertion ceremony over `challenge`.
    ///
    /// Platform errors map onto [`crate::SignError`]: a dismissed prompt is
    /// `Cancelled`, the associated-domains race is `AssociatedDomainRace`.
    async fn get_assertion(&self, challenge: &[u8]) -> Result<Assertion>;
}

/// Signs with whichever WebAuthn credential the user selects. The key slot is
/// only known once the ceremony completes.
#[derive(Clone, Debug)]
pub struct WebAuthnSigner {
    authenticator: Arc<dyn Authenticator>,
}

impl WebAuthnSigner {
    pub fn new(authenticator: Arc<dyn Authenticator>) -> Self {
        Self { authenticator }
    }

    pub async fn sign(&self, challenge: &[u8]) -> Result<SignatureResponse> {
        let assertion = self.authenticator.get_assertion(challenge).await?;
        debug!(key_slot = assertion.key_slot, "received webauthn assertion");

        let webauthn = WebAuthnChallenge::from_assertion(
            assertion.authenticator_data,
            assertion.client_data_json,
        )?;
        if !webauthn.commits_to(challenge) {
            return Err(SignatureError::ChallengeMismatch.into());
        }
        let signature = P256Signature::from_der(&assertion.signature)?;

        Ok(SignatureResponse {
            key_slot: assertion.key_slot,
            signature: encode_webauthn(&webauthn, signature),
        })
    }
}
