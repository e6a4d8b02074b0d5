//! Seed phrase signer.
//!
//! The phrase is run through the standard BIP-39/BIP-44 derivation
//! (`m/44'/60'/0'/0/0`) and the resulting 32-byte secret is used as a P256
//! key. Signatures go through the WebAuthn path with locally synthesized
//! `authenticatorData` and `clientDataJSON`, so the account verifies them like
//! any passkey.

use std::fmt;

use alloy_primitives::{Address, B256};
use alloy_signer_local::{MnemonicBuilder, coins_bip39::English};
use daimo_primitives::{
    ActiveKey, KeySlot, P256Signature, WebAuthnChallenge,
    signature::{encode_webauthn, public_key_coordinates},
};
use p256::ecdsa::{Signature, SigningKey, signature::hazmat::PrehashSigner};
use tracing::debug;

use crate::{
    error::{Result, SignError},
    signer::SignatureResponse,
};

/// Derives the P256 key for a seed phrase.
pub fn derive_key(phrase: &str) -> Result<SigningKey> {
    let wallet = MnemonicBuilder::<English>::default()
        .phrase(phrase)
        .index(0)
        .map_err(|err| SignError::Mnemonic(err.to_string()))?
        .build()
        .map_err(|err| SignError::Mnemonic(err.to_string()))?;

    SigningKey::from_slice(wallet.to_bytes().as_slice())
        .map_err(|err| SignError::Mnemonic(err.to_string()))
}

/// Public key `[x, y]` a seed phrase registers on an account.
pub fn derive_public_key(phrase: &str) -> Result<[B256; 2]> {
    Ok(public_key_coordinates(derive_key(phrase)?.verifying_key()))
}

#[derive(Clone)]
pub struct MnemonicSigner {
    key_slot: KeySlot,
    key: SigningKey,
    origin: String,
}

impl MnemonicSigner {
    /// Derives the key and finds the slot it occupies among `active_keys`.
    ///
    /// Fails with [`SignError::KeyNotOnAccount`] when the key was removed.
    pub fn locate(
        phrase: &str,
        account: Address,
        active_keys: &[ActiveKey],
        origin: impl Into<String>,
    ) -> Result<Self> {
        let key = derive_key(phrase)?;
        let public_key = public_key_coordinates(key.verifying_key());

        let key_slot = active_keys
            .iter()
            .find(|active| active.public_key == public_key)
            .map(|active| active.slot)
            .ok_or(SignError::KeyNotOnAccount(account))?;
        debug!(%account, key_slot, "located seed phrase key");

        Ok(Self {
            key_slot,
            key,
            origin: origin.into(),
        })
    }

    pub const fn key_slot(&self) -> KeySlot {
        self.key_slot
    }

    pub fn public_key(&self) -> [B256; 2] {
        public_key_coordinates(self.key.verifying_key())
    }

    pub fn sign(&self, challenge: &[u8]) -> Result<SignatureResponse> {
        let webauthn = WebAuthnChallenge::new(challenge, &self.origin);
        let signature: Signature = self
            .key
            .sign_prehash(webauthn.message_hash().as_slice())
            .map_err(|err| SignError::Assertion(err.to_string()))?;

        Ok(SignatureResponse {
            key_slot: self.key_slot,
            signature: encode_webauthn(&webauthn, P256Signature::from(&signature)),
        })
    }
}

impl fmt::Debug for MnemonicSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MnemonicSigner")
            .field("key_slot", &self.key_slot)
            .field("origin", &self.origin)
            .finish_non_exhaustive()
    }
}
