//! Contract calls an operation can batch, and the account deployment code.

use alloy_primitives::{Address, B256, Bytes, U256};
use alloy_sol_types::SolCall;
use daimo_primitives::{
    KeySlot, SlotError, SlotType,
    contracts::{Call, IDaimoAccount, IDaimoAccountFactory, IERC20},
    key_slot::{check_add, check_remove, find_unused_slot},
};

/// Key and salt the factory deploys a counterfactual account with.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AccountInit {
    pub key_slot: KeySlot,
    pub public_key: [B256; 2],
    pub salt: U256,
}

/// ABI encodes `executeBatch(calls)`.
pub fn execute_batch(calls: Vec<Call>) -> Bytes {
    IDaimoAccount::executeBatchCall { calls }.abi_encode().into()
}

/// `factory || createAccount(keySlot, key, [], salt)`.
pub fn init_code(factory: Address, init: &AccountInit) -> Bytes {
    let create = IDaimoAccountFactory::createAccountCall {
        keySlot: init.key_slot,
        key: init.public_key,
        initCalls: Vec::new(),
        salt: init.salt,
    };

    let mut out = factory.to_vec();
    out.extend_from_slice(&create.abi_encode());
    out.into()
}

pub fn erc20_transfer(token: Address, to: Address, amount: U256) -> Call {
    Call {
        dest: token,
        value: U256::ZERO,
        data: IERC20::transferCall { to, amount }.abi_encode().into(),
    }
}

/// Self-call registering `public_key` in `slot`.
pub fn add_signing_key(account: Address, slot: KeySlot, public_key: [B256; 2]) -> Call {
    Call {
        dest: account,
        value: U256::ZERO,
        data: IDaimoAccount::addSigningKeyCall {
            slot,
            key: public_key,
        }
        .abi_encode()
        .into(),
    }
}

pub fn remove_signing_key(account: Address, slot: KeySlot) -> Call {
    Call {
        dest: account,
        value: U256::ZERO,
        data: IDaimoAccount::removeSigningKeyCall { slot }
            .abi_encode()
            .into(),
    }
}

/// Picks a slot of `slot_type` with [`find_unused_slot`] (the one after the
/// highest in use, else the lowest free one) and builds the call adding
/// `public_key` there, refusing when the account is at its key limit.
pub fn plan_add_key(
    account: Address,
    active: &[KeySlot],
    slot_type: SlotType,
    public_key: [B256; 2],
) -> Result<(KeySlot, Call), SlotError> {
    let slot = find_unused_slot(active, slot_type)?;
    check_add(active, slot)?;
    Ok((slot, add_signing_key(account, slot, public_key)))
}

/// Builds the call removing `slot`, refusing inactive slots and the last key.
pub fn plan_remove_key(
    account: Address,
    active: &[KeySlot],
    slot: KeySlot,
) -> Result<Call, SlotError> {
    check_remove(active, slot)?;
    Ok(remove_signing_key(account, slot))
}
