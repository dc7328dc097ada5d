//! Priming a fresh store to `first - 1` and replaying the rest of the range
//! on top of it, with the block emitter and the state-hash validator.

use chronicle_core::{
    Account, Address, B256, Bytes, Config, Message, ReplayError, ReplayResult, State, Substate,
    U256, UpdateSet, WorldState, PSEUDO_TX,
};
use chronicle_executor::{
    Context, Executor, Extension, ExtensionList, LiveTxProcessor, TRANSFER_GAS, TransferEvm,
    make_block_event_emitter, make_state_db_manager,
};
use chronicle_primer::make_state_db_primer;
use chronicle_provider::{
    MemoryProvider, MemoryStateHashes, MemoryUpdateSets, StateHashSource, UpdateSetSource,
};
use chronicle_state::{MemoryStateDb, StateStore, VmState};
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

struct SharedHashes(Arc<Mutex<MemoryStateHashes>>);

impl StateHashSource for SharedHashes {
    fn get_state_hash(&self, block: u64) -> ReplayResult<B256> {
        self.0.lock().get_state_hash(block)
    }
}

#[derive(Debug, Clone, Copy)]
enum Order {
    PrimerFirst,
    EmitterFirst,
}

fn alice() -> Address {
    Address::repeat_byte(0xa1)
}

fn bob() -> Address {
    Address::repeat_byte(0xb0)
}

fn carol() -> Address {
    Address::repeat_byte(0xc0)
}

fn genesis() -> WorldState {
    [(alice(), Account::new(U256::from(1_000), 0, Bytes::new()))]
        .into_iter()
        .collect()
}

fn transfer(nonce: u64) -> Substate {
    Substate {
        message: Message {
            from: alice(),
            to: Some(bob()),
            nonce,
            value: U256::from(10),
            gas: TRANSFER_GAS,
            ..Message::default()
        },
        ..Substate::default()
    }
}

/// Genesis and two migrations as pseudo transactions, then three transfers
fn provider() -> Arc<MemoryProvider<Substate>> {
    let migration = |balance: u64, slot: u8| {
        let account = Account::new(U256::from(balance), 1, Bytes::from_static(&[0x60, 0x00]))
            .with_slot(B256::repeat_byte(slot), B256::repeat_byte(0xff));
        Substate::pseudo([(carol(), account)].into_iter().collect())
    };
    Arc::new(
        MemoryProvider::new()
            .with_record(0, PSEUDO_TX, Substate::pseudo(genesis()))
            .with_record(1, PSEUDO_TX, migration(500, 1))
            .with_record(2, PSEUDO_TX, migration(700, 2))
            .with_record(3, 0, transfer(0))
            .with_record(4, 0, transfer(1))
            .with_record(5, 0, transfer(2)),
    )
}

/// Only genesis was precomputed; blocks 1 and 2 come from the records
fn update_sets() -> Arc<dyn UpdateSetSource> {
    Arc::new(MemoryUpdateSets::new().with_update_set(UpdateSet::new(0, genesis())))
}

/// Manager, primer and emitter in `order`, then `checker`
fn run(
    config: Config,
    db: &MemoryStateDb,
    order: Order,
    checker: Box<dyn Extension<Substate>>,
) -> ReplayResult<()> {
    let config = Arc::new(config);
    let provider = provider();
    let processor = LiveTxProcessor::new(Arc::clone(&config), Arc::new(TransferEvm));
    let primer = make_state_db_primer::<Substate>(&config, update_sets(), provider.clone());
    let store = db.clone();

    let mut extensions = ExtensionList::new().with(make_state_db_manager(Box::new(move |_| {
        Ok(Box::new(store.clone()) as Box<dyn StateStore>)
    })));
    extensions = match order {
        Order::PrimerFirst => extensions.with(primer).with(make_block_event_emitter()),
        Order::EmitterFirst => extensions.with(make_block_event_emitter()).with(primer),
    };
    extensions.push(checker);

    let (ctx, _reports) = Context::with_channel(config);
    Executor::new(provider.as_ref()).run(&processor, &mut extensions, ctx)
}

/// Roots of a full replay from block 0
fn reference() -> Arc<Mutex<MemoryStateHashes>> {
    let table = Arc::new(Mutex::new(MemoryStateHashes::new()));
    let db = MemoryStateDb::with_archive();
    let recorder = Box::new(HashRecorder(Arc::clone(&table)));
    run(Config::new(0, 5), &db, Order::PrimerFirst, recorder).unwrap();
    table
}

#[test]
fn test_primed_replay_matches_full_replay_in_either_order() {
    let table = reference();
    let expected = table.lock().get_state_hash(5).unwrap();

    for order in [Order::PrimerFirst, Order::EmitterFirst] {
        let config = Config::new(3, 5)
            .with_archive_mode(true)
            .with_state_hash_validation(true);
        let hashes = Arc::new(SharedHashes(Arc::clone(&table)));
        let validator = make_state_hash_validator(&config, hashes);
        let db = MemoryStateDb::with_archive();
        run(config, &db, order, validator).unwrap_or_else(|err| panic!("{order:?}: {err}"));

        assert_eq!(db.get_hash(), expected);
        assert_eq!(db.get_balance(&alice()), U256::from(970));
        assert_eq!(db.get_nonce(&alice()), 3);
        assert_eq!(db.get_balance(&bob()), U256::from(30));
        assert_eq!(db.get_balance(&carol()), U256::from(700));
        assert_eq!(db.get_state(&carol(), &B256::repeat_byte(1)), B256::repeat_byte(0xff));
        assert_eq!(db.get_state(&carol(), &B256::repeat_byte(2)), B256::repeat_byte(0xff));
        assert!(db.is_closed());
    }
}

#[test]
fn test_replay_without_priming_fails_first_transfer() {
    let table = reference();
    let config = Config {
        skip_priming: true,
        ..Config::new(3, 5).with_state_hash_validation(true)
    };
    let validator = make_state_hash_validator(&config, Arc::new(SharedHashes(table)));
    let db = MemoryStateDb::with_archive();

    let err = run(config, &db, Order::EmitterFirst, validator).unwrap_err();
    assert!(matches!(
        err.root_causes()[0],
        ReplayError::Processing { block: 3, transaction: 0, .. }
    ));
    assert_eq!(db.get_balance(&alice()), U256::ZERO);
}
