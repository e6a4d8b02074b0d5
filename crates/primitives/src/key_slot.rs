//! Key slots: which of an account's device keys is acting.
//!
//! A slot is a `u8` whose top two bits select the kind of device:
//!
//! | range      | type             |
//! |------------|------------------|
//! | `0..=63`   | phone            |
//! | `64..=127` | computer         |
//! | `128..=255`| passkey backup   |
//!
//! The account contract caps the number of simultaneously active keys at
//! [`MAX_ACTIVE_KEYS`], independent of how large each range is.

use alloy_primitives::B256;
use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;

/// Numeric slot a signing key occupies on an account.
pub type KeySlot = u8;

/// Maximum number of keys the account contract keeps active at once.
pub const MAX_ACTIVE_KEYS: usize = 20;

const COMPUTER_BIT: u8 = 0x40;
const PASSKEY_BACKUP_BIT: u8 = 0x80;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SlotError {
    #[error("all {0} slots are in use")]
    SlotExhausted(SlotType),

    #[error("{0} is not a valid key slot")]
    UnknownSlot(u64),

    #[error("slot {0} is already active")]
    SlotTaken(KeySlot),

    #[error("slot {0} is not active")]
    SlotNotActive(KeySlot),

    #[error("account already has the maximum of {MAX_ACTIVE_KEYS} active keys")]
    TooManyKeys,

    #[error("cannot remove the last active key")]
    LastKey,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SlotType {
    Phone,
    Computer,
    PasskeyBackup,
}

impl SlotType {
    pub const ALL: [Self; 3] = [Self::Phone, Self::Computer, Self::PasskeyBackup];

    /// Classifies a slot by its top two bits.
    pub const fn of(slot: KeySlot) -> Self {
        if slot & PASSKEY_BACKUP_BIT != 0 {
            Self::PasskeyBackup
        } else if slot & COMPUTER_BIT != 0 {
            Self::Computer
        } else {
            Self::Phone
        }
    }

    /// First slot of this type.
    pub const fn base(self) -> KeySlot {
        match self {
            Self::Phone => 0,
            Self::Computer => COMPUTER_BIT,
            Self::PasskeyBackup => PASSKEY_BACKUP_BIT,
        }
    }

    /// Last slot of this type.
    pub const fn last(self) -> KeySlot {
        match self {
            Self::Phone => COMPUTER_BIT - 1,
            Self::Computer => PASSKEY_BACKUP_BIT - 1,
            Self::PasskeyBackup => u8::MAX,
        }
    }

    pub const fn range(self) -> RangeInclusive<KeySlot> {
        self.base()..=self.last()
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::Phone => "Phone",
            Self::Computer => "Computer",
            Self::PasskeyBackup => "Passkey Backup",
        }
    }
}

impl core::fmt::Display for SlotType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.name())
    }
}

/// A key registered on-chain, as returned by `getActiveSigningKeys`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveKey {
    pub slot: KeySlot,
    /// Uncompressed P256 public key as `[x, y]`.
    pub public_key: [B256; 2],
}

/// Slot type of an untyped slot number, `None` if it does not fit in a `u8`.
pub fn slot_type(slot: u64) -> Option<SlotType> {
    KeySlot::try_from(slot).ok().map(SlotType::of)
}

/// Human readable slot name, e.g. `Phone A`, `Computer B`, `Passkey Backup AA`.
///
/// The suffix is the 1-indexed offset within the slot's range written as a
/// spreadsheet column (`A`..`Z`, `AA`..).
pub fn label(slot: u64) -> Result<String, SlotError> {
    let slot_type = slot_type(slot).ok_or(SlotError::UnknownSlot(slot))?;
    let offset = slot as u32 - u32::from(slot_type.base());
    Ok(format!("{} {}", slot_type.name(), column_letters(offset)))
}

fn column_letters(offset: u32) -> String {
    let mut n = offset + 1;
    let mut letters = Vec::new();
    while n > 0 {
        n -= 1;
        letters.push(b'A' + (n % 26) as u8);
        n /= 26;
    }
    letters.iter().rev().map(|&b| b as char).collect()
}

/// Picks the slot a new key of `slot_type` should occupy.
///
/// Prefers the slot right after the highest one in use, so keys added in
/// order stay contiguous. Falls back to the lowest free slot in range.
pub fn find_unused_slot(active: &[KeySlot], slot_type: SlotType) -> Result<KeySlot, SlotError> {
    let Some(max) = active
        .iter()
        .copied()
        .filter(|&slot| SlotType::of(slot) == slot_type)
        .max()
    else {
        return Ok(slot_type.base());
    };

    if max < slot_type.last() {
        return Ok(max + 1);
    }

    slot_type
        .range()
        .find(|slot| !active.contains(slot))
        .ok_or(SlotError::SlotExhausted(slot_type))
}

/// Checks that `slot` can be claimed by a new key.
pub fn check_add(active: &[KeySlot], slot: KeySlot) -> Result<(), SlotError> {
    if active.contains(&slot) {
        return Err(SlotError::SlotTaken(slot));
    }
    if active.len() >= MAX_ACTIVE_KEYS {
        return Err(SlotError::TooManyKeys);
    }
    Ok(())
}

/// Checks that `slot` can be freed without locking the account out.
pub fn check_remove(active: &[KeySlot], slot: KeySlot) -> Result<(), SlotError> {
    if !active.contains(&slot) {
        return Err(SlotError::SlotNotActive(slot));
    }
    if active.len() == 1 {
        return Err(SlotError::LastKey);
    }
    Ok(())
}
