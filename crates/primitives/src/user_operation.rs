//! ERC-4337 (EntryPoint v0.6) user operation and the Daimo signature envelope.

use alloy_primitives::{Address, B256, Bytes, U256, aliases::U48, keccak256};
use alloy_sol_types::SolValue;
use serde::{Deserialize, Serialize};

use crate::key_slot::KeySlot;

/// Length of the challenge a signer signs: `version || validUntil || opHash`.
pub const CHALLENGE_LEN: usize = 1 + 6 + 32;

/// Bytes preceding the encoded signature: `version || validUntil || keySlot`.
pub const SIGNATURE_PREFIX_LEN: usize = 1 + 6 + 1;

/// User operation in the shape `eth_sendUserOperation` expects.
///
/// The nonce is serialized as a zero-padded 32 byte hex string, all other
/// integers as hex quantities.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserOperation {
    pub sender: Address,
    #[serde(with = "nonce_hex")]
    pub nonce: U256,
    pub init_code: Bytes,
    pub call_data: Bytes,
    pub call_gas_limit: U256,
    pub verification_gas_limit: U256,
    pub pre_verification_gas: U256,
    pub max_fee_per_gas: U256,
    pub max_priority_fee_per_gas: U256,
    pub paymaster_and_data: Bytes,
    pub signature: Bytes,
}

/// Solidity types for hash encoding (v0.6)
mod hash_types {
    use alloy_sol_types::sol;

    sol! {
        struct UserOperationPackedForHash {
            address sender;
            uint256 nonce;
            bytes32 hashInitCode;
            bytes32 hashCallData;
            uint256 callGasLimit;
            uint256 verificationGasLimit;
            uint256 preVerificationGas;
            uint256 maxFeePerGas;
            uint256 maxPriorityFeePerGas;
            bytes32 hashPaymasterAndData;
        }

        struct UserOperationHashEncoded {
            bytes32 encodedHash;
            address entryPoint;
            uint256 chainId;
        }
    }
}

impl UserOperation {
    /// `EntryPoint.getUserOpHash`: covers every field except the signature,
    /// bound to the EntryPoint address and chain.
    pub fn hash(&self, entry_point: Address, chain_id: u64) -> B256 {
        use hash_types::*;

        let packed = UserOperationPackedForHash {
            sender: self.sender,
            nonce: self.nonce,
            hashInitCode: keccak256(&self.init_code),
            hashCallData: keccak256(&self.call_data),
            callGasLimit: self.call_gas_limit,
            verificationGasLimit: self.verification_gas_limit,
            preVerificationGas: self.pre_verification_gas,
            maxFeePerGas: self.max_fee_per_gas,
            maxPriorityFeePerGas: self.max_priority_fee_per_gas,
            hashPaymasterAndData: keccak256(&self.paymaster_and_data),
        };

        let encoded = UserOperationHashEncoded {
            encodedHash: keccak256(packed.abi_encode()),
            entryPoint: entry_point,
            chainId: U256::from(chain_id),
        };

        keccak256(encoded.abi_encode())
    }
}

/// The bytes a signer is asked to sign: `version || validUntil || opHash`.
pub fn challenge(version: u8, valid_until: U48, op_hash: B256) -> [u8; CHALLENGE_LEN] {
    let mut out = [0u8; CHALLENGE_LEN];
    out[0] = version;
    out[1..7].copy_from_slice(&valid_until.to_be_bytes::<6>());
    out[7..].copy_from_slice(op_hash.as_slice());
    out
}

/// The `signature` field of a Daimo user operation.
///
/// Format: version (1 byte) || validUntil (6 bytes) || keySlot (1 byte) || encoded signature
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OperationSignature {
    pub version: u8,
    pub valid_until: U48,
    pub key_slot: KeySlot,
    pub signature: Bytes,
}

impl OperationSignature {
    pub fn to_bytes(&self) -> Bytes {
        let mut bytes = Vec::with_capacity(SIGNATURE_PREFIX_LEN + self.signature.len());
        bytes.push(self.version);
        bytes.extend_from_slice(&self.valid_until.to_be_bytes::<6>());
        bytes.push(self.key_slot);
        bytes.extend_from_slice(&self.signature);
        Bytes::from(bytes)
    }

    pub fn from_bytes(data: &[u8]) -> Option<Self> {
        if data.len() <= SIGNATURE_PREFIX_LEN {
            return None;
        }
        Some(Self {
            version: data[0],
            valid_until: U48::from_be_slice(&data[1..7]),
            key_slot: data[7],
            signature: Bytes::copy_from_slice(&data[SIGNATURE_PREFIX_LEN..]),
        })
    }
}

/// Serde helper for the nonce as `0x` + 64 hex digits.
mod nonce_hex {
    use alloy_primitives::{U256, hex};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub(super) fn serialize<S>(nonce: &U256, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        hex::encode_prefixed(nonce.to_be_bytes::<32>()).serialize(serializer)
    }

    pub(super) fn deserialize<'de, D>(deserializer: D) -> Result<U256, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
