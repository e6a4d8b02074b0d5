use std::{path::Path, time::Duration};

use alloy_primitives::{Address, Bytes, address};
use daimo_primitives::webauthn::DEFAULT_ORIGIN;
use daimo_signer::RetryPolicy;
use serde::{Deserialize, Serialize};

use crate::error::{Result, UserOpError};

/// ERC-4337 EntryPoint v0.6.
pub const ENTRY_POINT_V06: Address = address!("0x5FF137D4b0FDCD49DcA30c7CF57E578a026d2789");

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub chain: ChainConfig,
    #[serde(default)]
    pub operation: OperationConfig,
    #[serde(default)]
    pub webauthn: WebAuthnConfig,
    #[serde(default)]
    pub retry: RetryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainConfig {
    pub chain_id: u64,
    /// HTTP URL for account and EntryPoint reads.
    pub rpc_url: String,
    /// HTTP URL of the ERC-4337 bundler.
    pub bundler_url: String,
    #[serde(default = "default_entry_point")]
    pub entry_point: Address,
    pub account_factory: Address,
}

fn default_entry_point() -> Address {
    ENTRY_POINT_V06
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationConfig {
    /// Seconds an operation stays valid after signing.
    #[serde(default = "default_deadline_secs")]
    pub deadline_secs: u64,
    /// Signature format version prefixed to every challenge.
    #[serde(default = "default_op_version")]
    pub op_version: u8,
    #[serde(default = "default_call_gas_limit")]
    pub call_gas_limit: u64,
    #[serde(default = "default_verification_gas_limit")]
    pub verification_gas_limit: u64,
    #[serde(default = "default_pre_verification_gas")]
    pub pre_verification_gas: u64,
    /// Wei. TOML integers are signed 64 bit, so fees are capped at `i64::MAX`.
    #[serde(default = "default_max_fee_per_gas")]
    pub max_fee_per_gas: u64,
    #[serde(default = "default_max_priority_fee_per_gas")]
    pub max_priority_fee_per_gas: u64,
    #[serde(default)]
    pub paymaster: Option<Address>,
    #[serde(default)]
    pub paymaster_data: Bytes,
}

fn default_deadline_secs() -> u64 {
    120
}

fn default_op_version() -> u8 {
    1
}

fn default_call_gas_limit() -> u64 {
    300_000
}

fn default_verification_gas_limit() -> u64 {
    700_000
}

fn default_pre_verification_gas() -> u64 {
    100_000
}

fn default_max_fee_per_gas() -> u64 {
    1_000_000
}

fn default_max_priority_fee_per_gas() -> u64 {
    1_000_000
}

impl Default for OperationConfig {
    fn default() -> Self {
        Self {
            deadline_secs: default_deadline_secs(),
            op_version: default_op_version(),
            call_gas_limit: default_call_gas_limit(),
            verification_gas_limit: default_verification_gas_limit(),
            pre_verification_gas: default_pre_verification_gas(),
            max_fee_per_gas: default_max_fee_per_gas(),
            max_priority_fee_per_gas: default_max_priority_fee_per_gas(),
            paymaster: None,
            paymaster_data: Bytes::new(),
        }
    }
}

impl OperationConfig {
    /// `paymaster || paymaster_data`, empty without a paymaster.
    pub fn paymaster_and_data(&self) -> Bytes {
        let Some(paymaster) = self.paymaster else {
            return Bytes::new();
        };
        let mut out = paymaster.to_vec();
        out.extend_from_slice(&self.paymaster_data);
        out.into()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebAuthnConfig {
    /// Origin written into locally built `clientDataJSON`.
    #[serde(default = "default_origin")]
    pub origin: String,
}

fn default_origin() -> String {
    DEFAULT_ORIGIN.to_string()
}

impl Default for WebAuthnConfig {
    fn default() -> Self {
        Self {
            origin: default_origin(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: u32,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_backoff_ms() -> u64 {
    500
}

fn default_backoff_multiplier() -> u32 {
    2
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            backoff_multiplier: default_backoff_multiplier(),
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_attempts,
            Duration::from_millis(self.initial_backoff_ms),
            self.backoff_multiplier,
        )
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| UserOpError::Config(e.to_string()))
    }
}
