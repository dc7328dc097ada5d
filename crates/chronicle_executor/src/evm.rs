//! Execution capability.
//!
//! The bytecode interpreter is an external collaborator; the pipeline only
//! needs something that applies one message to a [`VmState`] and packages the
//! outcome. [`TransferEvm`] covers plain value transfers.

use chronicle_core::{BlockEnvironment, ChainId, ExecutionError, Message, TxResult, TxStatus};
use chronicle_state::VmState;

/// Gas charged for a plain value transfer
pub const TRANSFER_GAS: u64 = 21_000;

/// Executes one message against a state
pub trait Evm: Send + Sync {
    /// Apply `msg` in `env` to `db`.
    ///
    /// Changes made before a failure are left in `db`; the caller reverts
    /// them.
    ///
    /// # Errors
    ///
    /// Returns error if the message is rejected or execution fails
    fn execute(
        &self,
        db: &mut dyn VmState,
        env: &BlockEnvironment,
        msg: &Message,
        chain_id: ChainId,
    ) -> Result<TxResult, ExecutionError>;
}

/// Value-transfer-only execution
#[derive(Debug, Clone, Copy, Default)]
pub struct TransferEvm;

impl Evm for TransferEvm {
    fn execute(
        &self,
        db: &mut dyn VmState,
        _env: &BlockEnvironment,
        msg: &Message,
        _chain_id: ChainId,
    ) -> Result<TxResult, ExecutionError> {
        let Some(to) = msg.to else {
            return Err(rejected("contract creation is not supported"));
        };
        if !msg.data.is_empty() {
            return Err(rejected("call data is not supported"));
        }
        if msg.gas < TRANSFER_GAS {
            return Err(rejected(format!("intrinsic gas too low: have {}, want {TRANSFER_GAS}", msg.gas)));
        }

        let nonce = db.get_nonce(&msg.from);
        if nonce != msg.nonce {
            return Err(rejected(format!("nonce mismatch: have {nonce}, want {}", msg.nonce)));
        }
        let Some(next_nonce) = nonce.checked_add(1) else {
            return Err(rejected(format!("nonce overflow: {nonce}")));
        };
        let balance = db.get_balance(&msg.from);
        if balance < msg.value {
            return Err(rejected(format!(
                "insufficient balance for transfer: have {balance}, want {}",
                msg.value
            )));
        }

        if !db.exist(&to) {
            db.create_account(to);
        }
        db.sub_balance(msg.from, msg.value);
        db.add_balance(to, msg.value);
        db.set_nonce(msg.from, next_nonce);

        Ok(TxResult {
            status: TxStatus::Success,
            gas_used: TRANSFER_GAS,
            logs: Vec::new(),
            contract_address: None,
            origin: msg.from,
        })
    }
}

fn rejected(reason: impl Into<String>) -> ExecutionError {
    ExecutionError::Rejected {
        reason: reason.into(),
    }
}
