use alloy_primitives::Bytes;
use daimo_primitives::KeySlot;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, instrument};

use crate::{
    enclave::EnclaveSigner, error::Result, mnemonic::MnemonicSigner, retry::RetryPolicy,
    webauthn::WebAuthnSigner,
};

/// What every signer hands back: the acting slot and the encoded signature.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureResponse {
    pub key_slot: KeySlot,
    pub signature: Bytes,
}

/// The physical key authorizing an operation.
#[derive(Clone, Debug)]
pub enum Signer {
    /// Phone or computer hardware key, signs ERC-191 digests.
    Enclave(EnclaveSigner),
    /// Platform passkey, usually a synced backup.
    Passkey(WebAuthnSigner),
    /// Roaming FIDO security key.
    SecurityKey(WebAuthnSigner),
    /// Key derived from a seed phrase.
    Mnemonic(MnemonicSigner),
}

impl Signer {
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Enclave(_) => "enclave",
            Self::Passkey(_) => "passkey",
            Self::SecurityKey(_) => "security_key",
            Self::Mnemonic(_) => "mnemonic",
        }
    }

    /// Slot this signer acts for, if known before signing.
    ///
    /// WebAuthn signers learn it from the credential the user picks.
    pub const fn key_slot(&self) -> Option<KeySlot> {
        match self {
            Self::Enclave(signer) => Some(signer.key_slot()),
            Self::Passkey(_) | Self::SecurityKey(_) => None,
            Self::Mnemonic(signer) => Some(signer.key_slot()),
        }
    }

    /// Signs `challenge`, retrying according to `retry`.
    ///
    /// A dismissed prompt is logged at debug level, other failures as errors.
    #[instrument(skip_all, fields(kind = self.kind()))]
    pub async fn sign(&self, challenge: &[u8], retry: &RetryPolicy) -> Result<SignatureResponse> {
        let response = retry
            .run(|| self.sign_once(challenge))
            .await
            .inspect_err(|err| {
                if err.is_cancelled() {
                    debug!("signing cancelled by user");
                } else {
                    error!(error = %err, "signing failed");
                }
            })?;
        info!(key_slot = response.key_slot, "challenge signed");
        Ok(response)
    }

    async fn sign_once(&self, challenge: &[u8]) -> Result<SignatureResponse> {
        match self {
            Self::Enclave(signer) => signer.sign(challenge).await,
            Self::Passkey(signer) | Self::SecurityKey(signer) => signer.sign(challenge).await,
            Self::Mnemonic(signer) => signer.sign(challenge),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        enclave::SoftwareEnclave,
        error::SignError,
        mnemonic::derive_public_key,
        webauthn::{Assertion, Authenticator},
    };
    use alloy_primitives::{B256, address};
    use async_trait::async_trait;
    use daimo_primitives::{ActiveKey, webauthn::DEFAULT_ORIGIN};
    use std::{
        io,
        sync::{
            Arc, Mutex,
            atomic::{AtomicU32, Ordering},
        },
    };

    /// Fails the first `races` ceremonies with the associated-domains race,
    /// then fails the assertion.
    #[derive(Debug)]
    struct FlakyAuthenticator {
        races: u32,
        calls: AtomicU32,
        cancel: bool,
    }

    #[async_trait]
    impl Authenticator for FlakyAuthenticator {
        async fn get_assertion(&self, _challenge: &[u8]) -> Result<Assertion> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if self.cancel {
                return Err(SignError::Cancelled);
            }
            if call < self.races {
                return Err(SignError::AssociatedDomainRace(
                    "application not associated with domain".into(),
                ));
            }
            Err(SignError::Assertion("no credentials".into()))
        }
    }

    fn flaky(races: u32, cancel: bool) -> Arc<FlakyAuthenticator> {
        Arc::new(FlakyAuthenticator {
            races,
            calls: AtomicU32::new(0),
            cancel,
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_passkey_race_is_retried() {
        let authenticator = flaky(2, false);
        let signer = Signer::Passkey(WebAuthnSigner::new(authenticator.clone()));

        let err = signer
            .sign(&[0u8; 39], &RetryPolicy::default())
            .await
            .unwrap_err();

        // two races absorbed, the third attempt fails for real
        assert!(matches!(err, SignError::Assertion(_)));
        assert_eq!(authenticator.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_persistent_race_surfaces_after_three_attempts() {
        let authenticator = flaky(u32::MAX, false);
        let signer = Signer::SecurityKey(WebAuthnSigner::new(authenticator.clone()));

        let err = signer
            .sign(&[0u8; 39], &RetryPolicy::default())
            .await
            .unwrap_err();

        assert!(err.is_associated_domain_race());
        assert_eq!(authenticator.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_is_distinct_and_not_retried() {
        let authenticator = flaky(0, true);
        let signer = Signer::Passkey(WebAuthnSigner::new(authenticator.clone()));

        let err = signer
            .sign(&[0u8; 39], &RetryPolicy::default())
            .await
            .unwrap_err();

        assert!(err.is_cancelled());
        assert_eq!(authenticator.calls.load(Ordering::SeqCst), 1);
    }

    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

    impl io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl CapturedLogs {
        fn install(&self) -> tracing::subscriber::DefaultGuard {
            let writer = self.clone();
            let subscriber = tracing_subscriber::fmt()
                .with_max_level(tracing::Level::DEBUG)
                .with_ansi(false)
                .with_writer(move || writer.clone())
                .finish();
            tracing::subscriber::set_default(subscriber)
        }

        fn text(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_logged_below_error() {
        let logs = CapturedLogs::default();
        let _guard = logs.install();

        let signer = Signer::Passkey(WebAuthnSigner::new(flaky(0, true)));
        let err = signer
            .sign(&[0u8; 39], &RetryPolicy::default())
            .await
            .unwrap_err();
        assert!(err.is_cancelled());

        let text = logs.text();
        assert!(text.contains("signing cancelled by user"), "{text}");
        assert!(!text.contains("ERROR"), "{text}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_real_failure_logged_as_error() {
        let logs = CapturedLogs::default();
        let _guard = logs.install();

        let signer = Signer::Passkey(WebAuthnSigner::new(flaky(0, false)));
        signer
            .sign(&[0u8; 39], &RetryPolicy::no_retry())
            .await
            .unwrap_err();

        let text = logs.text();
        assert!(text.contains("ERROR"), "{text}");
        assert!(text.contains("signing failed"), "{text}");
    }

    #[tokio::test]
    async fn test_all_variants_report_key_slot() {
        let enclave = SoftwareEnclave::from_bytes(&B256::repeat_byte(0x44)).unwrap();
        let enclave = Signer::Enclave(EnclaveSigner::new(65, Arc::new(enclave)));

        let phrase = "test test test test test test test test test test test junk";
        let keys = [ActiveKey {
            slot: 2,
            public_key: derive_public_key(phrase).unwrap(),
        }];
        let account = address!("0x4a6c2f1dd1d4b06c7a0d7fd8a63ae1fb8e27aa45");
        let mnemonic = Signer::Mnemonic(
            MnemonicSigner::locate(phrase, account, &keys, DEFAULT_ORIGIN).unwrap(),
        );

        for (signer, slot) in [(enclave, 65), (mnemonic, 2)] {
            assert_eq!(signer.key_slot(), Some(slot));
            let response = signer
                .sign(&[0x01; 39], &RetryPolicy::no_retry())
                .await
                .unwrap();
            assert_eq!(response.key_slot, slot);
            assert!(!response.signature.is_empty());
        }
    }
}
