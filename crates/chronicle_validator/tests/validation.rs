//! Record reference roots in one run, then validate a second run against them.

use chronicle_core::{
    Account, Address, Bytes, Config, Message, ReplayError, ReplayResult, State, StateKind,
    Substate, U256, WorldState, B256, PSEUDO_TX,
};
use chronicle_executor::{
    Context, Executor, Extension, ExtensionList, LiveTxProcessor, TRANSFER_GAS, TransferEvm,
    make_block_event_emitter, make_state_db_manager,
};
use chronicle_provider::{MemoryProvider, MemoryStateHashes, StateHashSource};
use chronicle_state::{MemoryStateDb, StateStore};
use chronicle_validator::make_state_hash_validator;
use parking_lot::Mutex;
use std::sync::Arc;

/// Copies the live root into a shared table after every block
struct HashRecorder(Arc<Mutex<MemoryStateHashes>>);

impl Extension<Substate> for HashRecorder {
    fn post_block(&mut self, state: State<'_, Substate>, ctx: &mut Context) -> ReplayResult<()> {
        let hash = ctx.state_mut()?.get_hash();
        self.0.lock().insert(state.block, hash);
        Ok(())
    }
}

/// Shared table handed to the validator
struct SharedHashes(Arc<Mutex<MemoryStateHashes>>);

impl StateHashSource for SharedHashes {
    fn get_state_hash(&self, block: u64) -> ReplayResult<B256> {
        self.0.lock().get_state_hash(block)
    }
}

fn alice() -> Address {
    Address::repeat_byte(0xa1)
}

fn bob() -> Address {
    Address::repeat_byte(0xb0)
}

fn provider() -> MemoryProvider<Substate> {
    let mut world = WorldState::new();
    world.insert(alice(), Account::new(U256::from(1_000), 0, Bytes::new()));
    let transfer = |nonce: u64| Substate {
        message: Message {
            from: alice(),
            to: Some(bob()),
            nonce,
            value: U256::from(10),
            gas: TRANSFER_GAS,
            ..Message::default()
        },
        ..Substate::default()
    };
    MemoryProvider::new()
        .with_record(0, PSEUDO_TX, Substate::pseudo(world))
        .with_record(1, 0, transfer(0))
        .with_record(2, 0, transfer(1))
        .with_record(2, 1, transfer(2))
        .with_record(3, 0, transfer(3))
}

/// Runs blocks 0..=3 on a fresh archive store with `checker` registered
/// last, so its Post* hooks run before the emitter ends the block
fn run(config: Config, checker: Box<dyn Extension<Substate>>) -> ReplayResult<()> {
    let config = Arc::new(config);
    let provider = provider();
    let processor = LiveTxProcessor::new(Arc::clone(&config), Arc::new(TransferEvm));
    let db = MemoryStateDb::with_archive();
    let mut extensions = ExtensionList::new()
        .with(make_state_db_manager(Box::new(move |_| {
            Ok(Box::new(db.clone()) as Box<dyn StateStore>)
        })))
        .with(make_block_event_emitter())
        .with(checker);
    let (ctx, _reports) = Context::with_channel(config);
    Executor::new(&provider).run(&processor, &mut extensions, ctx)
}

fn recorded() -> Arc<Mutex<MemoryStateHashes>> {
    let table = Arc::new(Mutex::new(MemoryStateHashes::new()));
    run(Config::new(0, 3), Box::new(HashRecorder(Arc::clone(&table)))).unwrap();
    table
}

#[test]
fn test_replay_matches_recorded_roots() {
    let table = recorded();
    let config = Config::new(0, 3)
        .with_archive_mode(true)
        .with_state_hash_validation(true);
    let validator = make_state_hash_validator(&config, Arc::new(SharedHashes(table)));
    run(config, validator).unwrap();
}

#[test]
fn test_tampered_root_aborts_the_run() {
    let table = recorded();
    table.lock().insert(2, B256::repeat_byte(0x42));
    let config = Config::new(0, 3).with_state_hash_validation(true);
    let validator = make_state_hash_validator(&config, Arc::new(SharedHashes(table)));

    let err = run(config, validator).unwrap_err();
    assert!(matches!(
        err.root_causes()[0],
        ReplayError::HashMismatch { kind: StateKind::Live, block: 2, .. }
    ));
}
