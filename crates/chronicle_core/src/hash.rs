//! State commitments for world states.
//!
//! Uses BLAKE3 over a canonical, address-ordered encoding. Zero-valued
//! storage slots are treated as absent so that clearing a slot and never
//! writing it commit to the same root.

use crate::account::{Account, WorldState};
use alloy_primitives::{Address, B256};

/// Root of a world state without accounts
pub const EMPTY_ROOT: B256 = B256::ZERO;

/// Compute the root commitment of a world state
#[must_use]
pub fn state_root(world_state: &WorldState) -> B256 {
    if world_state.is_empty() {
        return EMPTY_ROOT;
    }

    let mut hasher = blake3::Hasher::new();
    for (address, account) in world_state.iter() {
        hasher.update(account_commitment(address, account).as_slice());
    }
    B256::from(*hasher.finalize().as_bytes())
}

/// Commitment of a single account including its storage
#[must_use]
pub fn account_commitment(address: &Address, account: &Account) -> B256 {
    let mut hasher = blake3::Hasher::new();
    hasher.update(address.as_slice());
    hasher.update(&account.balance.to_be_bytes::<32>());
    hasher.update(&account.nonce.to_be_bytes());
    hasher.update(blake3::hash(&account.code).as_bytes());

    let mut storage = blake3::Hasher::new();
    for (key, value) in account.storage.iter().filter(|(_, v)| !v.is_zero()) {
        storage.update(key.as_slice());
        storage.update(value.as_slice());
    }
    hasher.update(storage.finalize().as_bytes());

    B256::from(*hasher.finalize().as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::{Bytes, U256};

    fn sample() -> WorldState {
        let mut ws = WorldState::new();
        ws.insert(
            Address::repeat_byte(1),
            Account::new(U256::from(100), 1, Bytes::from_static(&[0x60, 0x00]))
                .with_slot(B256::repeat_byte(9), B256::repeat_byte(8)),
        );
        ws.insert(Address::repeat_byte(2), Account::new(U256::from(5), 0, Bytes::new()));
        ws
    }

    #[test]
    fn test_empty_root() {
        assert_eq!(state_root(&WorldState::new()), EMPTY_ROOT);
    }

    #[test]
    fn test_root_is_deterministic() {
        assert_eq!(state_root(&sample()), state_root(&sample()));
        assert_ne!(state_root(&sample()), EMPTY_ROOT);
    }

    #[test]
    fn test_root_changes_with_balance() {
        let mut ws = sample();
        let before = state_root(&ws);
        ws.get_mut(&Address::repeat_byte(2)).unwrap().balance = U256::from(6);
        assert_ne!(before, state_root(&ws));
    }

    #[test]
    fn test_zero_slot_is_absent() {
        let mut with_zero = sample();
        with_zero
            .get_mut(&Address::repeat_byte(2))
            .unwrap()
            .storage
            .insert(B256::repeat_byte(3), B256::ZERO);
        assert_eq!(state_root(&with_zero), state_root(&sample()));
    }
}
