//! P256 signature normalization and encoding.
//!
//! Every signer ends in an ECDSA P256 `(r, s)` pair, either DER encoded
//! (enclaves, WebAuthn assertions) or as 64 raw bytes. The account accepts
//! exactly one form per signature: `s` must be in the lower half of the group
//! order, so both parsers feed [`P256Signature::normalize`] before encoding.

use alloy_primitives::{B256, Bytes, U256, uint};
use alloy_sol_types::SolValue;
use p256::{
    EncodedPoint,
    ecdsa::{Signature as EcdsaSignature, VerifyingKey, signature::hazmat::PrehashVerifier},
};

use crate::{contracts, webauthn::WebAuthnChallenge};

/// Order of the P256 group.
pub const P256_N: U256 =
    uint!(0xffffffff00000000ffffffffffffffffbce6faada7179e84f3b9cac2fc632551_U256);

/// `P256_N / 2`, the largest canonical `s`.
pub const P256_N_HALF: U256 =
    uint!(0x7fffffff800000007fffffffffffffffde737d56d38bcf4279dce5617e3192a8_U256);

/// Length of a compact `r || s` signature.
pub const COMPACT_SIGNATURE_LEN: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SignatureError {
    #[error("invalid DER encoded P256 signature")]
    InvalidDer,

    #[error("invalid compact signature length: expected {COMPACT_SIGNATURE_LEN}, got {0}")]
    InvalidCompactLength(usize),

    #[error("signature scalar is zero or not below the group order")]
    InvalidScalar,

    #[error("clientDataJSON is missing the {0} property")]
    MissingProperty(&'static str),

    #[error("clientDataJSON does not commit to the requested challenge")]
    ChallengeMismatch,
}

/// An ECDSA P256 signature as two big-endian integers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct P256Signature {
    pub r: U256,
    pub s: U256,
}

impl P256Signature {
    /// Parses `SEQUENCE { INTEGER r, INTEGER s }`.
    pub fn from_der(der: &[u8]) -> Result<Self, SignatureError> {
        let signature = EcdsaSignature::from_der(der).map_err(|_| SignatureError::InvalidDer)?;
        Ok(Self::from(&signature))
    }

    /// Parses 64 raw bytes `r || s`.
    pub fn from_compact(bytes: &[u8]) -> Result<Self, SignatureError> {
        if bytes.len() != COMPACT_SIGNATURE_LEN {
            return Err(SignatureError::InvalidCompactLength(bytes.len()));
        }
        let r = U256::from_be_slice(&bytes[..32]);
        let s = U256::from_be_slice(&bytes[32..]);
        if r.is_zero() || s.is_zero() || r >= P256_N || s >= P256_N {
            return Err(SignatureError::InvalidScalar);
        }
        Ok(Self { r, s })
    }

    pub fn is_low_s(&self) -> bool {
        self.s <= P256_N_HALF
    }

    /// Replaces `s` with `N - s` when `s > N / 2`. Idempotent.
    pub fn normalize(self) -> Self {
        if self.is_low_s() {
            return self;
        }
        Self {
            r: self.r,
            s: P256_N - self.s,
        }
    }

    pub fn to_compact(&self) -> [u8; COMPACT_SIGNATURE_LEN] {
        let mut out = [0u8; COMPACT_SIGNATURE_LEN];
        out[..32].copy_from_slice(&self.r.to_be_bytes::<32>());
        out[32..].copy_from_slice(&self.s.to_be_bytes::<32>());
        out
    }
}

impl From<&EcdsaSignature> for P256Signature {
    fn from(signature: &EcdsaSignature) -> Self {
        let (r, s) = signature.split_bytes();
        Self {
            r: U256::from_be_slice(&r),
            s: U256::from_be_slice(&s),
        }
    }
}

/// Compact `r || s` encoding used by the raw enclave path.
pub fn encode_compact(signature: P256Signature) -> Bytes {
    Bytes::copy_from_slice(&signature.normalize().to_compact())
}

/// ABI encodes the WebAuthn tuple
/// `(authenticatorData, clientDataJSON, challengeLocation, responseTypeLocation, r, s)`.
pub fn encode_webauthn(challenge: &WebAuthnChallenge, signature: P256Signature) -> Bytes {
    let signature = signature.normalize();
    contracts::WebAuthnSignature {
        authenticatorData: challenge.authenticator_data().clone(),
        clientDataJSON: challenge.client_data_json().to_owned(),
        challengeLocation: U256::from(challenge.challenge_location()),
        responseTypeLocation: U256::from(challenge.response_type_location()),
        r: signature.r,
        s: signature.s,
    }
    .abi_encode()
    .into()
}

/// Verifies `signature` over a prehashed `digest` for the public key `[x, y]`.
pub fn verify_p256(public_key: &[B256; 2], digest: B256, signature: &P256Signature) -> bool {
    let [x, y] = public_key;
    let encoded_point =
        EncodedPoint::from_affine_coordinates(x.as_slice().into(), y.as_slice().into(), false);

    let Ok(verifying_key) = VerifyingKey::from_encoded_point(&encoded_point) else {
        return false;
    };
    let Ok(signature) = EcdsaSignature::from_slice(&signature.to_compact()) else {
        return false;
    };

    verifying_key
        .verify_prehash(digest.as_slice(), &signature)
        .is_ok()
}

/// Public key coordinates `[x, y]` of a P256 verifying key.
pub fn public_key_coordinates(key: &VerifyingKey) -> [B256; 2] {
    let point = key.to_encoded_point(false);
    let bytes = point.as_bytes();
    // uncompressed SEC1: 0x04 || x || y
    [
        B256::from_slice(&bytes[1..33]),
        B256::from_slice(&bytes[33..65]),
    ]
}
