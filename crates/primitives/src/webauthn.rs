//! Challenge encoding for the two signing paths.
//!
//! **WebAuthn path** (passkeys, security keys and locally derived keys): the
//! signer signs `sha256(authenticatorData || sha256(clientDataJSON))` where
//! `clientDataJSON` embeds the base64url challenge. The account contract does
//! not parse JSON; it is handed the byte offsets of `"challenge":` and
//! `"type":` and checks the substrings in place.
//!
//! **Raw path** (hardware enclave): the signer signs the ERC-191 digest of
//! `keccak256(challenge)`.

use alloy_primitives::{B256, Bytes, eip191_hash_message, keccak256};
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use sha2::{Digest, Sha256};

use crate::signature::SignatureError;

/// Origin embedded in locally built `clientDataJSON`.
pub const DEFAULT_ORIGIN: &str = "https://daimo.com";

// 32 rpIdHash + 1 flags + 4 signCount
pub const AUTHENTICATOR_DATA_LEN: usize = 37;
const FLAGS_OFFSET: usize = 32;

pub const FLAG_USER_PRESENT: u8 = 0x01;
pub const FLAG_USER_VERIFIED: u8 = 0x04;

const CHALLENGE_PROPERTY: &str = "\"challenge\":";
const TYPE_PROPERTY: &str = "\"type\":";

// Offsets of the properties inside the template built by `client_data_json`.
const TEMPLATE_TYPE_LOCATION: usize = 1;
const TEMPLATE_CHALLENGE_LOCATION: usize = r#"{"type":"webauthn.get","#.len();

/// Builds `clientDataJSON` for an assertion over `challenge`.
///
/// The field order and the absence of whitespace are part of the format: the
/// contract is given byte offsets into this exact string.
pub fn client_data_json(challenge: &[u8], origin: &str) -> String {
    let challenge = URL_SAFE_NO_PAD.encode(challenge);
    format!(r#"{{"type":"webauthn.get","challenge":"{challenge}","origin":"{origin}"}}"#)
}

/// Minimal authenticator data: zero rpIdHash and signCount, UP and UV flags set.
///
/// Real authenticators add more, but the account only checks the flags byte.
pub const fn authenticator_data() -> [u8; AUTHENTICATOR_DATA_LEN] {
    let mut data = [0u8; AUTHENTICATOR_DATA_LEN];
    data[FLAGS_OFFSET] = FLAG_USER_PRESENT | FLAG_USER_VERIFIED;
    data
}

/// ERC-191 digest signed on the raw enclave path.
///
/// The challenge is hashed first so the signed message is always 32 bytes.
pub fn erc191_digest(challenge: &[u8]) -> B256 {
    eip191_hash_message(keccak256(challenge))
}

/// A WebAuthn assertion payload together with the offsets the contract needs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WebAuthnChallenge {
    authenticator_data: Bytes,
    client_data_json: String,
    challenge_location: usize,
    response_type_location: usize,
}

impl WebAuthnChallenge {
    /// Builds the payload locally, for signers that have no platform authenticator.
    pub fn new(challenge: &[u8], origin: &str) -> Self {
        Self {
            authenticator_data: Bytes::copy_from_slice(&authenticator_data()),
            client_data_json: client_data_json(challenge, origin),
            challenge_location: TEMPLATE_CHALLENGE_LOCATION,
            response_type_location: TEMPLATE_TYPE_LOCATION,
        }
    }

    /// Wraps the payload returned by a platform authenticator, locating the
    /// `"challenge":` and `"type":` properties in its `clientDataJSON`.
    pub fn from_assertion(
        authenticator_data: Bytes,
        client_data_json: String,
    ) -> Result<Self, SignatureError> {
        let challenge_location = client_data_json
            .find(CHALLENGE_PROPERTY)
            .ok_or(SignatureError::MissingProperty(CHALLENGE_PROPERTY))?;
        let response_type_location = client_data_json
            .find(TYPE_PROPERTY)
            .ok_or(SignatureError::MissingProperty(TYPE_PROPERTY))?;

        Ok(Self {
            authenticator_data,
            client_data_json,
            challenge_location,
            response_type_location,
        })
    }

    pub fn authenticator_data(&self) -> &Bytes {
        &self.authenticator_data
    }

    pub fn client_data_json(&self) -> &str {
        &self.client_data_json
    }

    /// Byte offset of `"challenge":` in `clientDataJSON`.
    pub const fn challenge_location(&self) -> usize {
        self.challenge_location
    }

    /// Byte offset of `"type":` in `clientDataJSON`.
    pub const fn response_type_location(&self) -> usize {
        self.response_type_location
    }

    /// Whether `clientDataJSON` commits to `challenge`.
    pub fn commits_to(&self, challenge: &[u8]) -> bool {
        let property = format!(
            "{CHALLENGE_PROPERTY}\"{}\"",
            URL_SAFE_NO_PAD.encode(challenge)
        );
        self.client_data_json[self.challenge_location..].starts_with(&property)
    }

    /// `sha256(authenticatorData || sha256(clientDataJSON))`
    pub fn message_hash(&self) -> B256 {
        let client_data_hash = Sha256::digest(self.client_data_json.as_bytes());

        let mut hasher = Sha256::new();
        hasher.update(&self.authenticator_data);
        hasher.update(client_data_hash);
        B256::from_slice(&hasher.finalize())
    }
}
