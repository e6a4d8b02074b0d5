//! Daimo account primitives.
//!
//! Everything needed to turn a desired on-chain action into the exact bytes a
//! Daimo account and the ERC-4337 EntryPoint expect, without touching the
//! network:
//!
//! - **nonce**: 32-byte user operation nonces carrying Daimo metadata
//! - **key_slot**: the numbered slots identifying which device key acts
//! - **webauthn**: challenge construction for WebAuthn and ERC-191 signers
//! - **signature**: DER/compact parsing, low-S normalization and ABI encoding
//! - **user_operation**: the ERC-4337 v0.6 wire type and its hash
//! - **contracts**: ABI bindings for the account, factory, EntryPoint and ERC-20

pub mod contracts;
pub mod key_slot;
pub mod nonce;
pub mod signature;
pub mod user_operation;
pub mod webauthn;

pub use key_slot::{ActiveKey, KeySlot, SlotError, SlotType};
pub use nonce::{Nonce, NonceError, NonceMetadata, NonceType};
pub use signature::{P256Signature, SignatureError};
pub use user_operation::UserOperation;
pub use webauthn::WebAuthnChallenge;
