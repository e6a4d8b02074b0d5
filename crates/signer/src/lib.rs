//! Signers for Daimo accounts.
//!
//! An account is controlled by several device keys. [`Signer`] is the closed
//! set of ways one of them can sign a challenge:
//!
//! - **enclave**: phone or computer hardware, signs ERC-191 digests
//! - **passkey** / **security key**: WebAuthn ceremonies run by the platform
//! - **mnemonic**: a P256 key derived from a seed phrase, signed locally
//!
//! Every variant returns a [`SignatureResponse`] carrying the acting key slot
//! and a low-S signature already encoded for the account contract.

pub mod enclave;
pub mod error;
pub mod mnemonic;
pub mod retry;
pub mod signer;
pub mod webauthn;

pub use enclave::{EnclaveBackend, EnclaveSigner, SoftwareEnclave};
pub use error::{Result, SignError};
pub use mnemonic::MnemonicSigner;
pub use retry::RetryPolicy;
pub use signer::{SignatureResponse, Signer};
pub use webauthn::{Assertion, Authenticator, WebAuthnSigner};
