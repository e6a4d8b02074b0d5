use alloy_primitives::Address;
use daimo_primitives::SignatureError;
use thiserror::Error;

/// Why a signer could not produce a signature.
///
/// UI code branches on the kind: `AuthFailed` asks the user to set up a lock
/// screen, `Cancelled` silently returns to the previous screen and
/// `KeyNotOnAccount` reports that the key was removed.
#[derive(Debug, Error)]
pub enum SignError {
    #[error("device authentication failed, a secure lock screen is required")]
    AuthFailed,

    #[error("signer unavailable: {0}")]
    Unavailable(String),

    #[error("signing was cancelled")]
    Cancelled,

    /// The platform has not fetched the app's associated-domains file yet.
    /// Resolves itself after a short delay.
    #[error("passkey domain association not ready: {0}")]
    AssociatedDomainRace(String),

    #[error("key is not registered on account {0}, it may have been removed")]
    KeyNotOnAccount(Address),

    #[error("webauthn assertion failed: {0}")]
    Assertion(String),

    #[error("invalid seed phrase: {0}")]
    Mnemonic(String),

    #[error(transparent)]
    Signature(#[from] SignatureError),
}

impl SignError {
    /// The user dismissed the prompt. Recoverable, never retried.
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// The known platform race that clears up on its own.
    pub const fn is_associated_domain_race(&self) -> bool {
        matches!(self, Self::AssociatedDomainRace(_))
    }
}

pub type Result<T> = std::result::Result<T, SignError>;
