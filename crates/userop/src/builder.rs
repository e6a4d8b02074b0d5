//! Turns a batch of calls into a signed user operation and submits it.
//!
//! Each call to [`UserOperationBuilder::build`] draws a fresh random nonce
//! key, so concurrent operations from one account never collide. Two
//! concurrent first operations from an undeployed account both carry
//! `initCode`; the EntryPoint deploys once and the other operation fails
//! validation.

use std::time::{SystemTime, UNIX_EPOCH};

use alloy_primitives::{Address, B256, Bytes, U256, aliases::U48, hex};
use daimo_primitives::{
    KeySlot, Nonce, NonceMetadata, UserOperation,
    contracts::Call,
    user_operation::{OperationSignature, challenge},
};
use daimo_signer::{RetryPolicy, Signer};
use tracing::{debug, info, instrument};

use crate::{
    bundler::Bundler,
    calls::{AccountInit, execute_batch, init_code},
    chain::AccountChain,
    config::{ChainConfig, Config, OperationConfig},
    error::{Result, UserOpError},
};

/// The account operations are built for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Account {
    pub address: Address,
    /// How to deploy the account if it has no code yet.
    pub init: Option<AccountInit>,
}

/// A user operation with its final signature.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignedOperation {
    pub op: UserOperation,
    pub op_hash: B256,
    pub key_slot: KeySlot,
    pub valid_until: U48,
}

pub struct UserOperationBuilder<C, B> {
    account: Account,
    signer: Signer,
    chain: C,
    bundler: B,
    chain_config: ChainConfig,
    operation: OperationConfig,
    retry: RetryPolicy,
}

impl<C, B> UserOperationBuilder<C, B>
where
    C: AccountChain,
    B: Bundler,
{
    pub fn new(config: &Config, account: Account, signer: Signer, chain: C, bundler: B) -> Self {
        Self {
            account,
            signer,
            chain,
            bundler,
            chain_config: config.chain.clone(),
            operation: config.operation.clone(),
            retry: config.retry.policy(),
        }
    }

    pub const fn account(&self) -> &Account {
        &self.account
    }

    pub const fn signer(&self) -> &Signer {
        &self.signer
    }

    /// Builds the unsigned operation executing `calls` as one batch.
    #[instrument(skip_all, fields(sender = %self.account.address, nonce_type = ?metadata.nonce_type()))]
    pub async fn build(&self, metadata: NonceMetadata, calls: Vec<Call>) -> Result<UserOperation> {
        let nonce = Nonce::random(metadata);
        let init_code = self.init_code(&nonce).await?;
        debug!(
            nonce = %nonce.to_hex(),
            calls = calls.len(),
            deploy = !init_code.is_empty(),
            "built operation"
        );

        Ok(UserOperation {
            sender: self.account.address,
            nonce: nonce.to_u256(),
            init_code,
            call_data: execute_batch(calls),
            call_gas_limit: U256::from(self.operation.call_gas_limit),
            verification_gas_limit: U256::from(self.operation.verification_gas_limit),
            pre_verification_gas: U256::from(self.operation.pre_verification_gas),
            max_fee_per_gas: U256::from(self.operation.max_fee_per_gas),
            max_priority_fee_per_gas: U256::from(self.operation.max_priority_fee_per_gas),
            paymaster_and_data: self.operation.paymaster_and_data(),
            signature: Bytes::new(),
        })
    }

    /// Signs `op`, valid for the configured deadline from now.
    pub async fn sign(&self, op: UserOperation) -> Result<SignedOperation> {
        self.sign_at(op, unix_now()).await
    }

    /// Signs `op` as if the current unix time were `now`.
    pub async fn sign_at(&self, mut op: UserOperation, now: u64) -> Result<SignedOperation> {
        let op_hash = op.hash(self.chain_config.entry_point, self.chain_config.chain_id);
        let valid_until = U48::saturating_from(now.saturating_add(self.operation.deadline_secs));
        let version = self.operation.op_version;

        let challenge = challenge(version, valid_until, op_hash);
        debug!(%op_hash, challenge = %hex::encode(challenge), "requesting signature");

        let response = self.signer.sign(&challenge, &self.retry).await?;
        op.signature = OperationSignature {
            version,
            valid_until,
            key_slot: response.key_slot,
            signature: response.signature,
        }
        .to_bytes();

        info!(
            %op_hash,
            key_slot = response.key_slot,
            %valid_until,
            signer = self.signer.kind(),
            "signed operation"
        );

        Ok(SignedOperation {
            op,
            op_hash,
            key_slot: response.key_slot,
            valid_until,
        })
    }

    /// Returns once the bundler accepts the operation.
    pub async fn submit(&self, signed: &SignedOperation) -> Result<B256> {
        self.bundler
            .send_user_operation(&signed.op, self.chain_config.entry_point)
            .await
    }

    /// Builds, signs and submits in one go.
    pub async fn send(&self, metadata: NonceMetadata, calls: Vec<Call>) -> Result<B256> {
        let op = self.build(metadata, calls).await?;
        let signed = self.sign(op).await?;
        self.submit(&signed).await
    }

    /// Deployment code, only for the account's first operation while it has
    /// no code on chain.
    async fn init_code(&self, nonce: &Nonce) -> Result<Bytes> {
        let address = self.account.address;
        if self.chain.is_deployed(address).await? {
            return Ok(Bytes::new());
        }

        let onchain = self.chain.get_nonce(address, nonce.entry_point_key()).await?;
        let sequence = onchain.as_limbs()[0];
        if sequence != 0 {
            return Ok(Bytes::new());
        }

        let init = self
            .account
            .init
            .as_ref()
            .ok_or(UserOpError::NotDeployed(address))?;
        Ok(init_code(self.chain_config.account_factory, init))
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        calls::add_signing_key,
        config::{ENTRY_POINT_V06, RetryConfig, WebAuthnConfig},
    };
    use alloy_primitives::{address, aliases::U192};
    use alloy_sol_types::SolCall;
    use async_trait::async_trait;
    use daimo_primitives::{
        ActiveKey, NonceType, P256Signature,
        contracts::IDaimoAccount,
        signature::{P256_N_HALF, verify_p256},
        user_operation::SIGNATURE_PREFIX_LEN,
        webauthn::erc191_digest,
    };
    use daimo_signer::{EnclaveBackend, EnclaveSigner, SignError, SoftwareEnclave};
    use std::sync::{Arc, Mutex};

    const CHAIN_ID: u64 = 8453;
    const NOW: u64 = 1_700_000_000;
    const ACCOUNT: Address = address!("0x4a6c2f1dd1d4b06c7a0d7fd8a63ae1fb8e27aa45");
    const FACTORY: Address = address!("0x00000000000000000000000000000000000f0000");
    const NEW_KEY: [B256; 2] = [B256::repeat_byte(0xaa), B256::repeat_byte(0xbb)];

    /// `SEQUENCE { INTEGER 0x11..11, INTEGER N - 1 }`
    const HIGH_S_DER: [u8; 71] = hex!(
        "304502201111111111111111111111111111111111111111111111111111111111111111022100ffffffff00000000ffffffffffffffffbce6faada7179e84f3b9cac2fc632550"
    );

    #[derive(Debug)]
    struct FixedEnclave;

    #[async_trait]
    impl EnclaveBackend for FixedEnclave {
        async fn sign_prehash(&self, _digest: B256) -> daimo_signer::Result<Bytes> {
            Ok(Bytes::from_static(&HIGH_S_DER))
        }
    }

    #[derive(Debug)]
    struct CancelledEnclave;

    #[async_trait]
    impl EnclaveBackend for CancelledEnclave {
        async fn sign_prehash(&self, _digest: B256) -> daimo_signer::Result<Bytes> {
            Err(SignError::Cancelled)
        }
    }

    struct MockChain {
        deployed: bool,
        sequence: u64,
    }

    #[async_trait]
    impl AccountChain for MockChain {
        async fn get_nonce(&self, _sender: Address, key: U192) -> Result<U256> {
            Ok((U256::from_be_slice(&key.to_be_bytes::<24>()) << 64) | U256::from(self.sequence))
        }

        async fn is_deployed(&self, _account: Address) -> Result<bool> {
            Ok(self.deployed)
        }

        async fn active_keys(&self, _account: Address) -> Result<Vec<ActiveKey>> {
            Ok(Vec::new())
        }
    }

    #[derive(Default)]
    struct MockBundler {
        sent: Mutex<Vec<(UserOperation, Address)>>,
    }

    #[async_trait]
    impl Bundler for Arc<MockBundler> {
        async fn send_user_operation(
            &self,
            op: &UserOperation,
            entry_point: Address,
        ) -> Result<B256> {
            self.sent.lock().unwrap().push((op.clone(), entry_point));
            Ok(B256::repeat_byte(0xab))
        }
    }

    fn config() -> Config {
        Config {
            chain: ChainConfig {
                chain_id: CHAIN_ID,
                rpc_url: "http://localhost:8545".into(),
                bundler_url: "http://localhost:4337".into(),
                entry_point: ENTRY_POINT_V06,
                account_factory: FACTORY,
            },
            operation: OperationConfig::default(),
            webauthn: WebAuthnConfig::default(),
            retry: RetryConfig::default(),
        }
    }

    fn builder(
        signer: Signer,
        chain: MockChain,
        init: Option<AccountInit>,
    ) -> (UserOperationBuilder<MockChain, Arc<MockBundler>>, Arc<MockBundler>) {
        let bundler = Arc::new(MockBundler::default());
        let account = Account {
            address: ACCOUNT,
            init,
        };
        (
            UserOperationBuilder::new(&config(), account, signer, chain, bundler.clone()),
            bundler,
        )
    }

    fn deployed() -> MockChain {
        MockChain {
            deployed: true,
            sequence: 0,
        }
    }

    fn add_key_metadata() -> NonceMetadata {
        NonceMetadata::new(NonceType::AddKey, 0).unwrap()
    }

    #[tokio::test]
    async fn test_add_key_with_high_s_enclave() {
        let signer = Signer::Enclave(EnclaveSigner::new(0, Arc::new(FixedEnclave)));
        let (builder, _) = builder(signer, deployed(), None);

        let calls = vec![add_signing_key(ACCOUNT, 2, NEW_KEY)];
        let op = builder.build(add_key_metadata(), calls).await.unwrap();
        let signed = builder.sign_at(op, NOW).await.unwrap();

        let envelope = OperationSignature::from_bytes(&signed.op.signature).unwrap();
        assert_eq!(envelope.version, 1);
        assert_eq!(envelope.valid_until, U48::from(NOW + 120));
        assert_eq!(envelope.key_slot, 0);
        assert_eq!(
            signed.op.signature.len(),
            1 + 6 + 1 + envelope.signature.len()
        );

        let signature = P256Signature::from_compact(&envelope.signature).unwrap();
        assert!(signature.s <= P256_N_HALF);
        assert_eq!(signature.s, U256::from(1));
        assert_eq!(signature.r, U256::from_be_bytes([0x11; 32]));

        let nonce = Nonce::from_u256(signed.op.nonce).unwrap();
        assert_eq!(nonce.metadata(), add_key_metadata());

        let batch = IDaimoAccount::executeBatchCall::abi_decode(&signed.op.call_data).unwrap();
        assert_eq!(batch.calls.len(), 1);
        let add = IDaimoAccount::addSigningKeyCall::abi_decode(&batch.calls[0].data).unwrap();
        assert_eq!(add.slot, 2);
        assert_eq!(add.key, NEW_KEY);

        assert!(signed.op.init_code.is_empty());
        assert_eq!(signed.op_hash, signed.op.hash(ENTRY_POINT_V06, CHAIN_ID));
    }

    #[tokio::test]
    async fn test_enclave_signature_verifies_over_challenge() {
        let enclave = SoftwareEnclave::from_bytes(&B256::repeat_byte(0x55)).unwrap();
        let public_key = enclave.public_key();
        let signer = Signer::Enclave(EnclaveSigner::new(64, Arc::new(enclave)));
        let (builder, _) = builder(signer, deployed(), None);

        let metadata = NonceMetadata::new(NonceType::Send, 42).unwrap();
        let op = builder.build(metadata, Vec::new()).await.unwrap();
        let signed = builder.sign_at(op, NOW).await.unwrap();

        let envelope = OperationSignature::from_bytes(&signed.op.signature).unwrap();
        assert_eq!(envelope.key_slot, 64);
        assert_eq!(
            signed.op.signature.len(),
            SIGNATURE_PREFIX_LEN + envelope.signature.len()
        );

        let challenge = challenge(1, signed.valid_until, signed.op_hash);
        let signature = P256Signature::from_compact(&envelope.signature).unwrap();
        assert!(verify_p256(&public_key, erc191_digest(&challenge), &signature));
    }

    #[tokio::test]
    async fn test_init_code_only_for_undeployed_account() {
        let init = AccountInit {
            key_slot: 0,
            public_key: NEW_KEY,
            salt: U256::ZERO,
        };
        let signer = || Signer::Enclave(EnclaveSigner::new(0, Arc::new(FixedEnclave)));
        let undeployed = || MockChain {
            deployed: false,
            sequence: 0,
        };

        let (first, _) = builder(signer(), undeployed(), Some(init));
        let op = first.build(add_key_metadata(), Vec::new()).await.unwrap();
        assert_eq!(&op.init_code[..20], FACTORY.as_slice());

        let (already, _) = builder(signer(), deployed(), Some(init));
        let op = already.build(add_key_metadata(), Vec::new()).await.unwrap();
        assert!(op.init_code.is_empty());

        let used_key = MockChain {
            deployed: false,
            sequence: 1,
        };
        let (used, _) = builder(signer(), used_key, Some(init));
        let op = used.build(add_key_metadata(), Vec::new()).await.unwrap();
        assert!(op.init_code.is_empty());

        let (missing, _) = builder(signer(), undeployed(), None);
        let err = missing
            .build(add_key_metadata(), Vec::new())
            .await
            .unwrap_err();
        assert!(matches!(err, UserOpError::NotDeployed(address) if address == ACCOUNT));
    }

    #[tokio::test]
    async fn test_send_submits_to_entry_point() {
        let signer = Signer::Enclave(EnclaveSigner::new(0, Arc::new(FixedEnclave)));
        let (builder, bundler) = builder(signer, deployed(), None);

        let op_hash = builder
            .send(add_key_metadata(), vec![add_signing_key(ACCOUNT, 2, NEW_KEY)])
            .await
            .unwrap();
        assert_eq!(op_hash, B256::repeat_byte(0xab));

        let sent = bundler.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].1, ENTRY_POINT_V06);
        assert!(sent[0].0.signature.len() > SIGNATURE_PREFIX_LEN);
    }

    #[tokio::test]
    async fn test_cancelled_signing_is_not_submitted() {
        let signer = Signer::Enclave(EnclaveSigner::new(0, Arc::new(CancelledEnclave)));
        let (builder, bundler) = builder(signer, deployed(), None);

        let err = builder
            .send(add_key_metadata(), Vec::new())
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
        assert!(bundler.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_nonces_are_fresh_per_operation() {
        let signer = Signer::Enclave(EnclaveSigner::new(0, Arc::new(FixedEnclave)));
        let (builder, _) = builder(signer, deployed(), None);

        let a = builder.build(add_key_metadata(), Vec::new()).await.unwrap();
        let b = builder.build(add_key_metadata(), Vec::new()).await.unwrap();
        assert_ne!(a.nonce, b.nonce);
        assert_eq!(a.nonce.as_limbs()[0], 0);
    }
}
