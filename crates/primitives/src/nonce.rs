//! User operation nonces tagged with Daimo metadata.
//!
//! Layout (32 bytes, big-endian):
//! [0]        : nonce type tag (1 byte)
//! [1..=7]    : application identifier (7 bytes)
//! [8..=23]   : random key (16 bytes)
//! [24..=31]  : sequence (8 bytes) - always zero
//!
//! The first 24 bytes form the EntryPoint nonce key. Every operation draws a
//! fresh random key, so the account never relies on per-key sequencing.

use alloy_primitives::{U256, aliases::U192, hex};
use rand::{RngCore, rngs::OsRng};

/// Serialized length of [`NonceMetadata`].
pub const NONCE_METADATA_LEN: usize = 8;

/// Length of the random per-operation key.
pub const NONCE_KEY_LEN: usize = 16;

/// Length of the trailing sequence field.
pub const NONCE_SEQUENCE_LEN: usize = 8;

/// Total nonce length in bytes.
pub const NONCE_LEN: usize = NONCE_METADATA_LEN + NONCE_KEY_LEN + NONCE_SEQUENCE_LEN;

/// Length of a `0x`-prefixed hex nonce.
pub const NONCE_HEX_LEN: usize = 2 + 2 * NONCE_LEN;

/// Largest identifier that fits next to the tag byte.
pub const MAX_NONCE_IDENTIFIER: u64 = (1 << 56) - 1;

/// Stable, never-reordered identifiers for the kind of operation a nonce belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum NonceType {
    Send = 0,
    CreateNote = 1,
    ClaimNote = 2,
    AddKey = 3,
    RemoveKey = 4,
    Swap = 5,
    RequestResponse = 6,
}

impl NonceType {
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Maps a tag byte back to its type. Unknown tags yield `None`.
    pub const fn from_u8(tag: u8) -> Option<Self> {
        Some(match tag {
            0 => Self::Send,
            1 => Self::CreateNote,
            2 => Self::ClaimNote,
            3 => Self::AddKey,
            4 => Self::RemoveKey,
            5 => Self::Swap,
            6 => Self::RequestResponse,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NonceError {
    #[error("nonce identifier {0:#x} does not fit in 56 bits")]
    IdentifierTooLarge(u64),
}

/// Type tag plus application identifier, packed into the top 8 nonce bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct NonceMetadata {
    nonce_type: NonceType,
    identifier: u64,
}

impl NonceMetadata {
    /// Creates metadata, rejecting identifiers wider than 56 bits.
    pub const fn new(nonce_type: NonceType, identifier: u64) -> Result<Self, NonceError> {
        if identifier > MAX_NONCE_IDENTIFIER {
            return Err(NonceError::IdentifierTooLarge(identifier));
        }
        Ok(Self {
            nonce_type,
            identifier,
        })
    }

    pub const fn nonce_type(&self) -> NonceType {
        self.nonce_type
    }

    pub const fn identifier(&self) -> u64 {
        self.identifier
    }

    pub const fn to_bytes(&self) -> [u8; NONCE_METADATA_LEN] {
        // identifier <= 2^56 - 1, so the top byte is free for the tag
        let mut out = self.identifier.to_be_bytes();
        out[0] = self.nonce_type.as_u8();
        out
    }

    /// Returns `None` when the tag byte is not a known [`NonceType`].
    pub const fn from_bytes(bytes: [u8; NONCE_METADATA_LEN]) -> Option<Self> {
        let Some(nonce_type) = NonceType::from_u8(bytes[0]) else {
            return None;
        };
        let mut id = bytes;
        id[0] = 0;
        Some(Self {
            nonce_type,
            identifier: u64::from_be_bytes(id),
        })
    }
}

/// A Daimo user operation nonce: metadata, random key and a zero sequence.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Nonce {
    metadata: NonceMetadata,
    key: [u8; NONCE_KEY_LEN],
}

impl Nonce {
    pub const fn new(metadata: NonceMetadata, key: [u8; NONCE_KEY_LEN]) -> Self {
        Self { metadata, key }
    }

    /// Creates a nonce with a key drawn from the operating system CSPRNG.
    pub fn random(metadata: NonceMetadata) -> Self {
        let mut key = [0u8; NONCE_KEY_LEN];
        OsRng.fill_bytes(&mut key);
        Self::new(metadata, key)
    }

    pub const fn metadata(&self) -> NonceMetadata {
        self.metadata
    }

    pub const fn key(&self) -> [u8; NONCE_KEY_LEN] {
        self.key
    }

    pub fn to_bytes(&self) -> [u8; NONCE_LEN] {
        let mut out = [0u8; NONCE_LEN];
        out[..NONCE_METADATA_LEN].copy_from_slice(&self.metadata.to_bytes());
        out[NONCE_METADATA_LEN..NONCE_METADATA_LEN + NONCE_KEY_LEN].copy_from_slice(&self.key);
        out
    }

    /// The nonce as the integer the EntryPoint sees.
    pub fn to_u256(&self) -> U256 {
        U256::from_be_bytes(self.to_bytes())
    }

    /// The 192-bit EntryPoint nonce key (`metadata || random key`).
    pub fn entry_point_key(&self) -> U192 {
        U192::from_be_slice(&self.to_bytes()[..NONCE_METADATA_LEN + NONCE_KEY_LEN])
    }

    /// `0x`-prefixed, zero-padded hex of length [`NONCE_HEX_LEN`].
    pub fn to_hex(&self) -> String {
        hex::encode_prefixed(self.to_bytes())
    }

    /// Parses a `0x`-prefixed 64 hex digit nonce.
    ///
    /// Returns `None` for anything that is not a Daimo nonce: wrong length,
    /// invalid hex, or an unknown metadata tag. Third-party and legacy nonces
    /// must never make this fail loudly.
    pub fn decode(nonce: &str) -> Option<Self> {
        if nonce.len() != NONCE_HEX_LEN || !nonce.starts_with("0x") {
            return None;
        }
        let bytes: [u8; NONCE_LEN] = hex::decode_to_array(&nonce[2..]).ok()?;
        Self::from_bytes(bytes)
    }

    /// Same as [`Self::decode`], starting from the integer form.
    pub fn from_u256(nonce: U256) -> Option<Self> {
        Self::from_bytes(nonce.to_be_bytes())
    }

    fn from_bytes(bytes: [u8; NONCE_LEN]) -> Option<Self> {
        let mut metadata = [0u8; NONCE_METADATA_LEN];
        metadata.copy_from_slice(&bytes[..NONCE_METADATA_LEN]);
        let mut key = [0u8; NONCE_KEY_LEN];
        key.copy_from_slice(&bytes[NONCE_METADATA_LEN..NONCE_METADATA_LEN + NONCE_KEY_LEN]);
        Some(Self::new(NonceMetadata::from_bytes(metadata)?, key))
    }
}
