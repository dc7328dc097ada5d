//! Transaction records and the payload they carry.

use crate::account::WorldState;
use crate::error::ExecutionError;
use alloy_primitives::{Address, B256, Bytes, U256};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Reserved transaction index for non-EVM state transitions.
///
/// Greater than any real transaction index, so pseudo transactions always
/// sort after the real transactions of their block.
pub const PSEUDO_TX: u32 = 99_999;

/// One replayable (block, transaction) pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxRecord<T> {
    /// Block number
    pub block: u64,
    /// Transaction index within the block, or [`PSEUDO_TX`]
    pub transaction: u32,
    /// Record payload
    pub data: T,
}

impl<T> TxRecord<T> {
    /// Create a record
    #[must_use]
    pub fn new(block: u64, transaction: u32, data: T) -> Self {
        Self {
            block,
            transaction,
            data,
        }
    }

    /// Whether this record is a pseudo transaction
    #[must_use]
    pub fn is_pseudo(&self) -> bool {
        self.transaction >= PSEUDO_TX
    }

    /// Hook view of this record
    #[must_use]
    pub fn state(&self) -> State<'_, T> {
        State {
            block: self.block,
            transaction: self.transaction,
            data: Some(&self.data),
        }
    }
}

/// Position and payload handed to extension hooks.
///
/// Run and block hooks see `data == None`.
pub struct State<'a, T> {
    /// Current block
    pub block: u64,
    /// Current transaction
    pub transaction: u32,
    /// Payload of the current transaction
    pub data: Option<&'a T>,
}

impl<T> State<'_, T> {
    /// A view positioned at a block, without payload
    #[must_use]
    pub fn at_block(block: u64) -> Self {
        Self {
            block,
            transaction: 0,
            data: None,
        }
    }
}

impl<T> Clone for State<'_, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for State<'_, T> {}

impl<T> fmt::Debug for State<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("State")
            .field("block", &self.block)
            .field("transaction", &self.transaction)
            .field("has_data", &self.data.is_some())
            .finish()
    }
}

/// Block-level execution environment
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockEnvironment {
    /// Block beneficiary
    pub coinbase: Address,
    /// Block number
    pub number: u64,
    /// Block timestamp
    pub timestamp: u64,
    /// Block difficulty
    pub difficulty: U256,
    /// Block gas limit
    pub gas_limit: u64,
    /// Base fee, when the chain charges one
    pub base_fee: Option<U256>,
    /// Hashes of earlier blocks reachable through BLOCKHASH
    #[serde(default)]
    pub block_hashes: BTreeMap<u64, B256>,
}

impl BlockEnvironment {
    /// Hash of an earlier block
    ///
    /// # Errors
    ///
    /// Returns error if the record does not carry that hash
    pub fn block_hash(&self, number: u64) -> Result<B256, ExecutionError> {
        self.block_hashes
            .get(&number)
            .copied()
            .ok_or(ExecutionError::MissingBlockHash { block: number })
    }
}

/// Transaction message
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Sender
    pub from: Address,
    /// Recipient; `None` for contract creation
    pub to: Option<Address>,
    /// Sender nonce
    pub nonce: u64,
    /// Transferred value
    pub value: U256,
    /// Gas limit
    pub gas: u64,
    /// Gas price
    pub gas_price: U256,
    /// Call data
    pub data: Bytes,
}

/// Event log emitted by a transaction
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Log {
    /// Emitting contract
    pub address: Address,
    /// Indexed topics
    pub topics: Vec<B256>,
    /// Unindexed data
    pub data: Bytes,
}

/// Receipt status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TxStatus {
    /// Executed successfully
    #[default]
    Success,
    /// Executed and reverted
    Failed,
}

/// Packaged outcome of a transaction
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxResult {
    /// Receipt status
    pub status: TxStatus,
    /// Gas consumed
    pub gas_used: u64,
    /// Emitted logs
    pub logs: Vec<Log>,
    /// Address of a created contract
    pub contract_address: Option<Address>,
    /// Transaction origin
    pub origin: Address,
}

impl TxResult {
    /// Result of a pseudo transaction: successful, no gas, no logs
    #[must_use]
    pub fn pseudo() -> Self {
        Self::default()
    }
}

/// Accessors every replayable payload provides
pub trait TxContext {
    /// Environment of the enclosing block
    fn block_environment(&self) -> &BlockEnvironment;
    /// Message to execute
    fn message(&self) -> &Message;
    /// Accounts read by the transaction
    fn input_state(&self) -> &WorldState;
    /// Accounts after the transaction; the full post-state for pseudo transactions
    fn output_state(&self) -> &WorldState;
    /// Recorded outcome
    fn result(&self) -> &TxResult;
}

/// Self-contained input/output slice of one transaction
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Substate {
    /// Block environment
    pub env: BlockEnvironment,
    /// Transaction message
    pub message: Message,
    /// Pre-state of touched accounts
    pub input_alloc: WorldState,
    /// Post-state of touched accounts
    pub output_alloc: WorldState,
    /// Recorded result
    pub result: TxResult,
}

impl Substate {
    /// A pseudo-transaction payload applying `output` directly
    #[must_use]
    pub fn pseudo(output: WorldState) -> Self {
        Self {
            output_alloc: output,
            ..Self::default()
        }
    }
}

impl TxContext for Substate {
    fn block_environment(&self) -> &BlockEnvironment {
        &self.env
    }

    fn message(&self) -> &Message {
        &self.message
    }

    fn input_state(&self) -> &WorldState {
        &self.input_alloc
    }

    fn output_state(&self) -> &WorldState {
        &self.output_alloc
    }

    fn result(&self) -> &TxResult {
        &self.result
    }
}
