//! Bootstrapping a state store to a target block.
//!
//! World state is written through bulk loads. Each bulk load is committed
//! on its own block index; a failed commit leaves the store in an undefined
//! state, so it aborts priming immediately.

use crate::tracker::ProgressTracker;
use chronicle_core::{
    Account, Address, Config, ReplayError, ReplayResult, TxContext, UpdateSet, WorldState,
};
use chronicle_provider::{Provider, UpdateSetSource};
use chronicle_state::{BulkLoad, StateStore};
use rand::SeedableRng;
use rand::seq::SliceRandom;
use rand_chacha::ChaCha8Rng;
use tracing::{debug, info};

/// Accounts written per bulk load in sequential mode
pub const SEQUENTIAL_BATCH: usize = 1_000_000;

/// Priming session over one store
pub struct PrimeContext<'a> {
    config: &'a Config,
    db: &'a mut dyn StateStore,
    block: u64,
    ceiling: u64,
}

impl<'a> PrimeContext<'a> {
    /// Start priming `db` with bulk loads numbered from block 0
    #[must_use]
    pub fn new(config: &'a Config, db: &'a mut dyn StateStore) -> Self {
        Self {
            config,
            db,
            block: 0,
            ceiling: u64::MAX,
        }
    }

    /// Number the next bulk load `block`
    #[must_use]
    pub fn with_block(mut self, block: u64) -> Self {
        self.block = block;
        self
    }

    /// Block index the next bulk load commits on
    #[must_use]
    pub fn block(&self) -> u64 {
        self.block
    }

    fn next_block(&mut self) -> u64 {
        let block = self.block.min(self.ceiling);
        self.block += 1;
        block
    }

    /// Write every account of `ws` into the store
    ///
    /// # Errors
    ///
    /// Returns a lifecycle error if a bulk load cannot be started or committed
    pub fn prime_state_db(&mut self, ws: &WorldState) -> ReplayResult<()> {
        let slots = ws.storage_slot_count() as u64;
        info!("[Primer] Loading {} accounts with {slots} values", ws.len());
        let mut tracker = ProgressTracker::new(slots);

        if self.config.prime_random {
            let mut addresses: Vec<&Address> = ws.addresses().collect();
            addresses.sort_unstable();
            let mut rng = ChaCha8Rng::seed_from_u64(self.config.prime_seed);
            addresses.shuffle(&mut rng);

            let batch = match self.config.prime_threshold {
                0 => addresses.len().max(1),
                threshold => threshold,
            };
            let accounts = addresses
                .into_iter()
                .filter_map(|address| ws.get(address).map(|account| (address, account)));
            self.prime_in_batches(accounts, batch, &mut tracker)?;
        } else {
            self.prime_in_batches(ws.iter(), SEQUENTIAL_BATCH, &mut tracker)?;
        }

        info!("[Primer] Priming completed");
        Ok(())
    }

    fn prime_in_batches<'w>(
        &mut self,
        accounts: impl Iterator<Item = (&'w Address, &'w Account)>,
        batch: usize,
        tracker: &mut ProgressTracker,
    ) -> ReplayResult<()> {
        let mut load: Option<Box<dyn BulkLoad>> = None;
        let mut step = 0;
        for (address, account) in accounts {
            let mut current = match load.take() {
                Some(current) => current,
                None => self.start_bulk_load()?,
            };
            prime_one_account(&*self.db, current.as_mut(), *address, account, tracker);
            step += 1;
            if step % batch == 0 {
                close(current)?;
            } else {
                load = Some(current);
            }
        }
        match load {
            Some(rest) => close(rest),
            None => Ok(()),
        }
    }

    fn start_bulk_load(&mut self) -> ReplayResult<Box<dyn BulkLoad>> {
        let block = self.next_block();
        debug!(block, "bulk load started");
        self.db
            .start_bulk_load(block)
            .map_err(|err| ReplayError::lifecycle("start bulk load", err))
    }

    /// Self-destruct every existing account of `accounts` in one block.
    ///
    /// Only the block and transaction lifecycle is used, so this works
    /// whether or not a sync period is already open on the store.
    ///
    /// # Errors
    ///
    /// Returns error if the store rejects the lifecycle calls
    pub fn suicide_accounts(&mut self, accounts: &[Address]) -> ReplayResult<()> {
        let block = self.next_block();
        self.db.begin_block(block)?;
        self.db.begin_transaction(0)?;
        for address in accounts {
            if self.db.exist(address) {
                self.db.suicide(*address);
            }
        }
        self.db.end_transaction()?;
        self.db.end_block()
    }

    /// Prime the store with the world state after block `target`.
    ///
    /// Update sets up to `target` are merged into an accumulator that is
    /// flushed whenever it would outgrow `update_buffer_size`. Blocks past the
    /// last update set are rebuilt from the raw records of `provider`.
    ///
    /// # Errors
    ///
    /// Returns error if a source cannot be read or a bulk load fails
    pub fn load_world_state_and_prime<T: TxContext>(
        &mut self,
        update_sets: &dyn UpdateSetSource,
        provider: &dyn Provider<T>,
        target: u64,
    ) -> ReplayResult<()> {
        self.ceiling = target;
        let max_size = self.config.update_buffer_size;
        let mut total_size = 0u64;
        let mut block_pos: Option<u64> = None;
        let mut update = WorldState::new();

        let mut merge_set = |set: UpdateSet| -> ReplayResult<()> {
            block_pos = Some(set.block);

            let incremental = update.estimate_incremental_size(&set.world_state);
            if total_size.saturating_add(incremental) > max_size {
                info!("[Primer] Priming accumulated update sets before block {}", set.block);
                self.prime_state_db(&update)?;
                total_size = 0;
                self.block = self.block.max(set.block);
                update = WorldState::new();
            }

            update.clear_storage(&set.deleted_accounts);
            self.suicide_accounts(&set.deleted_accounts)?;

            update.merge(set.world_state);
            total_size += incremental;
            debug!(
                block = set.block,
                total_mib = total_size >> 20,
                added_mib = incremental >> 20,
                "update set merged"
            );
            Ok(())
        };

        // a store failure is reported as is, not as an aborted iteration
        let mut failure = None;
        let streamed = update_sets.for_each_update_set(0, target.saturating_add(1), &mut |set| {
            merge_set(set).inspect_err(|err| failure = Some(err.clone()))
        });
        if let Some(err) = failure {
            return Err(err);
        }
        streamed?;

        self.prime_state_db(&update)?;

        let next = block_pos.map_or(0, |b| b + 1);
        if next <= target {
            info!("[Primer] Priming from records of blocks {next}..={target}");
            let update = generate_update_set(provider, next, target)?;
            self.prime_state_db(&update)?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for PrimeContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrimeContext")
            .field("block", &self.block)
            .field("ceiling", &self.ceiling)
            .finish_non_exhaustive()
    }
}

fn prime_one_account(
    db: &dyn StateStore,
    load: &mut dyn BulkLoad,
    address: Address,
    account: &Account,
    tracker: &mut ProgressTracker,
) {
    // accounts primed by an earlier batch already exist
    if !db.exist(&address) {
        load.create_account(address);
    }
    load.set_balance(address, account.balance);
    load.set_nonce(address, account.nonce);
    load.set_code(address, account.code.clone());
    for (key, value) in &account.storage {
        load.set_state(address, *key, *value);
        tracker.print_progress();
    }
}

fn close(load: Box<dyn BulkLoad>) -> ReplayResult<()> {
    load.close()
        .map_err(|err| ReplayError::lifecycle("prime state-db", err))
}

/// Merge the output state of every record in `[from, to]`, in order
///
/// # Errors
///
/// Returns error if the provider fails
pub fn generate_update_set<T: TxContext>(
    provider: &dyn Provider<T>,
    from: u64,
    to: u64,
) -> ReplayResult<WorldState> {
    let mut update = WorldState::new();
    provider.run(from, to.saturating_add(1), &mut |record| {
        update.merge(record.data.output_state().clone());
        Ok(())
    })?;
    Ok(update)
}

/// Prime `db` to the state after block `target`
///
/// # Errors
///
/// Returns error if a source cannot be read or a bulk load fails
pub fn load_world_state_and_prime<T: TxContext>(
    db: &mut dyn StateStore,
    config: &Config,
    update_sets: &dyn UpdateSetSource,
    provider: &dyn Provider<T>,
    target: u64,
) -> ReplayResult<()> {
    PrimeContext::new(config, db).load_world_state_and_prime(update_sets, provider, target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chronicle_core::{B256, Bytes, Substate, U256};
    use chronicle_provider::{MemoryProvider, MemoryUpdateSets};
    use chronicle_state::{MemoryStateDb, VmState};
    use proptest::prelude::*;

    fn account(balance: u64, nonce: u64) -> Account {
        Account::new(U256::from(balance), nonce, Bytes::from(vec![nonce as u8; 3]))
    }

    fn assert_primed(db: &MemoryStateDb, ws: &WorldState) {
        for (address, account) in ws.iter() {
            assert_eq!(db.get_balance(address), account.balance);
            assert_eq!(db.get_nonce(address), account.nonce);
            assert_eq!(db.get_code(address), account.code);
            for (key, value) in &account.storage {
                assert_eq!(db.get_state(address, key), *value);
            }
        }
    }

    fn arb_world() -> impl Strategy<Value = WorldState> {
        let slot = any::<[u8; 32]>().prop_map(B256::from);
        let account = (any::<u64>(), any::<u64>(), prop::collection::btree_map(slot.clone(), slot, 0..5))
            .prop_map(|(balance, nonce, storage)| Account {
                storage,
                ..account(balance, nonce)
            });
        prop::collection::btree_map(any::<[u8; 20]>().prop_map(Address::from), account, 0..12)
            .prop_map(|accounts| accounts.into_iter().collect())
    }

    proptest! {
        #[test]
        fn prop_priming_round_trip(ws in arb_world(), random in any::<bool>(), seed in any::<u64>(), threshold in 0usize..4) {
            let mut config = Config::new(1, 1);
            if random {
                config = config.with_random_priming(seed, threshold);
            }
            let mut db = MemoryStateDb::new();
            PrimeContext::new(&config, &mut db).prime_state_db(&ws).unwrap();
            assert_primed(&db, &ws);
            prop_assert_eq!(db.world_state().len(), ws.len());
        }
    }

    #[test]
    fn test_random_batches_commit_on_consecutive_blocks() {
        let ws: WorldState = (1..=5u8)
            .map(|i| (Address::repeat_byte(i), account(u64::from(i), 1)))
            .collect();
        let config = Config::new(1, 1).with_random_priming(7, 2);
        let mut db = MemoryStateDb::with_archive();

        let mut ctx = PrimeContext::new(&config, &mut db);
        ctx.prime_state_db(&ws).unwrap();
        // five accounts in batches of two commit on blocks 0, 1 and 2
        assert_eq!(ctx.block(), 3);
        assert_primed(&db, &ws);
        assert_eq!(db.archived_blocks(), 3);
    }

    #[test]
    fn test_full_last_batch_opens_no_empty_bulk_load() {
        let ws: WorldState = (1..=4u8)
            .map(|i| (Address::repeat_byte(i), account(u64::from(i), 1)))
            .collect();
        let config = Config::new(1, 1).with_random_priming(7, 2);
        let mut db = MemoryStateDb::with_archive();

        let mut ctx = PrimeContext::new(&config, &mut db);
        ctx.prime_state_db(&ws).unwrap();
        assert_eq!(ctx.block(), 2);
        assert_eq!(db.archived_blocks(), 2);

        PrimeContext::new(&config, &mut db).prime_state_db(&WorldState::new()).unwrap();
        assert_eq!(db.archived_blocks(), 2);
        assert_primed(&db, &ws);
    }

    #[test]
    fn test_suicide_accounts_inside_open_sync_period() {
        let mut db = MemoryStateDb::from_world_state(
            [(Address::repeat_byte(1), account(5, 1))].into_iter().collect(),
        );
        db.begin_sync_period(0).unwrap();
        let config = Config::default();
        PrimeContext::new(&config, &mut db)
            .suicide_accounts(&[Address::repeat_byte(1)])
            .unwrap();
        assert!(!db.exist(&Address::repeat_byte(1)));
        // the caller's sync period is still open
        assert!(db.begin_sync_period(1).is_err());
        db.end_sync_period().unwrap();
    }

    #[test]
    fn test_store_failure_during_update_sets_is_not_wrapped() {
        let update_sets = MemoryUpdateSets::new()
            .with_update_set(UpdateSet::new(0, WorldState::new()).with_deleted(vec![Address::repeat_byte(1)]));
        let provider = MemoryProvider::<Substate>::new();
        let config = Config::new(3, 3);
        let mut db = MemoryStateDb::new();
        db.begin_block(0).unwrap();

        let err = load_world_state_and_prime::<Substate>(&mut db, &config, &update_sets, &provider, 2)
            .unwrap_err();
        assert!(matches!(err, ReplayError::Lifecycle { .. }), "{err:?}");
    }

    #[test]
    fn test_close_failure_is_fatal() {
        let ws: WorldState = [(Address::repeat_byte(1), account(1, 1))].into_iter().collect();
        let config = Config::new(1, 1);
        let mut db = MemoryStateDb::new();
        let mut handle = db.clone();
        let mut ctx = PrimeContext::new(&config, &mut db);

        let mut load = ctx.start_bulk_load().unwrap();
        load.set_balance(Address::repeat_byte(1), U256::from(1));
        handle.close().unwrap();
        let err = close(load).unwrap_err();
        assert!(matches!(err, ReplayError::Lifecycle { .. }));

        assert!(ctx.prime_state_db(&ws).is_err());
    }

    #[test]
    fn test_suicide_accounts_only_touches_existing() {
        let mut db = MemoryStateDb::from_world_state(
            [(Address::repeat_byte(1), account(5, 1).with_slot(B256::ZERO, B256::repeat_byte(1)))]
                .into_iter()
                .collect(),
        );
        let config = Config::default();
        PrimeContext::new(&config, &mut db)
            .suicide_accounts(&[Address::repeat_byte(1), Address::repeat_byte(2)])
            .unwrap();
        assert!(!db.exist(&Address::repeat_byte(1)));
        assert!(!db.exist(&Address::repeat_byte(2)));
    }

    #[test]
    fn test_generate_update_set_merges_in_order() {
        let a = Address::repeat_byte(0xa);
        let provider = MemoryProvider::new()
            .with_record(1, 0, Substate::pseudo([(a, account(1, 1))].into_iter().collect()))
            .with_record(2, 0, Substate::pseudo([(a, account(2, 2))].into_iter().collect()))
            .with_record(3, 0, Substate::pseudo([(a, account(3, 3))].into_iter().collect()));
        let update = generate_update_set::<Substate>(&provider, 1, 2).unwrap();
        assert_eq!(update.get(&a), Some(&account(2, 2)));
    }

    #[test]
    fn test_load_world_state_combines_update_sets_and_records() {
        let (a, b, c) = (Address::repeat_byte(0xa), Address::repeat_byte(0xb), Address::repeat_byte(0xc));
        let slot = B256::repeat_byte(0x11);
        let update_sets = MemoryUpdateSets::new()
            .with_update_set(UpdateSet::new(
                0,
                [(a, account(10, 1).with_slot(slot, B256::repeat_byte(1)))].into_iter().collect(),
            ))
            .with_update_set(UpdateSet::new(2, [(b, account(20, 2))].into_iter().collect()))
            .with_update_set(
                UpdateSet::new(4, [(a, account(11, 2))].into_iter().collect()).with_deleted(vec![a]),
            )
            .with_update_set(UpdateSet::new(9, [(c, account(99, 9))].into_iter().collect()));
        let provider = MemoryProvider::new()
            .with_record(5, 0, Substate::pseudo([(c, account(30, 3))].into_iter().collect()))
            .with_record(7, 0, Substate::pseudo([(b, account(21, 3))].into_iter().collect()))
            .with_record(8, 0, Substate::pseudo([(c, account(31, 4))].into_iter().collect()));

        // a tiny buffer forces a flush before every update set
        for buffer in [1, u64::MAX] {
            let config = Config::new(9, 9).with_update_buffer_size(buffer);
            let mut db = MemoryStateDb::new();
            load_world_state_and_prime::<Substate>(&mut db, &config, &update_sets, &provider, 7)
                .unwrap();

            assert_eq!(db.get_balance(&a), U256::from(11));
            assert_eq!(db.get_state(&a, &slot), B256::ZERO);
            assert_eq!(db.get_balance(&b), U256::from(21));
            assert_eq!(db.get_nonce(&b), 3);
            assert_eq!(db.get_balance(&c), U256::from(30));
        }
    }
}
