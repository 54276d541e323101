mod common;

use common::*;
use dagchain_consensus::{
    BehaviorFlags, BlockChain, Checkpoint, Error, ErrorCode, IndexManager, Notification,
};
use dagchain_dag::BlockStatus;
use dagchain_primitives::{Block, Hash, OutPoint, ATOMS_PER_COIN};
use dagchain_storage::WriteTransaction;
use dagchain_utxo::SpentTxOut;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

fn process(chain: &BlockChain, block: &Block) -> Result<bool, Error> {
    chain.process_block(block.clone(), BehaviorFlags::empty())
}

/// Extends `parent` by `count` blocks, one at a time.
fn extend(chain: &BlockChain, parent: Hash, count: usize) -> Vec<Block> {
    let mut blocks = Vec::with_capacity(count);
    let mut tip = parent;
    for _ in 0..count {
        let block = make_block(&[tip], Vec::new());
        assert!(!process(chain, &block).unwrap());
        tip = block.hash();
        blocks.push(block);
    }
    blocks
}

fn is_valid(chain: &BlockChain, hash: &Hash) -> bool {
    chain
        .block_status(hash)
        .is_some_and(|status| status.contains(BlockStatus::VALID))
}

fn is_failed(chain: &BlockChain, hash: &Hash) -> bool {
    chain
        .block_status(hash)
        .is_some_and(|status| status.contains(BlockStatus::VALIDATE_FAILED))
}

#[test]
fn test_genesis_only_chain() {
    let dir = tempfile::tempdir().unwrap();
    let chain = open_chain(dir.path());
    let genesis = regtest_params().genesis_hash();

    let best = chain.best_snapshot();
    assert_eq!(best.hash, genesis);
    assert_eq!(best.graph_state.main_order, 0);
    assert_eq!(best.graph_state.main_height, 0);
    assert_eq!(best.graph_state.total_blocks, 1);
    assert_eq!(best.graph_state.tips, vec![genesis]);
    assert_eq!(best.total_subsidy, 0);

    assert_eq!(chain.tip_generation(), vec![genesis]);
    assert_eq!(chain.block_order(&genesis), Some(0));
    assert!(chain.have_block(&genesis));
    assert!(is_valid(&chain, &genesis));
    assert_eq!(chain.block_by_order(0).unwrap().map(|block| block.hash()), Some(genesis));
    assert!(chain.block_by_order(1).unwrap().is_none());

    // Genesis outputs never enter the utxo set.
    let genesis_block = regtest_params().genesis_block;
    let outpoint = OutPoint::new(genesis_block.transactions[0].hash(), 0);
    assert!(chain.fetch_utxo_entry(&outpoint).unwrap().is_none());
}

#[test]
fn test_extend_and_spend_matured_coinbase() {
    let dir = tempfile::tempdir().unwrap();
    let chain = open_chain(dir.path());
    let genesis = regtest_params().genesis_hash();

    let blocks = extend(&chain, genesis, 4);
    let funding = coinbase_outpoint(&blocks[0]);
    assert!(chain.fetch_utxo_entry(&funding).unwrap().is_some());

    // Layer 5 is four layers above the coinbase at layer 1.
    let tx = spend(funding, ATOMS_PER_COIN / 2, 2);
    let spending = make_block(&[blocks[3].hash()], vec![tx.clone()]);
    assert!(!process(&chain, &spending).unwrap());

    assert!(is_valid(&chain, &spending.hash()));
    assert!(chain.fetch_utxo_entry(&funding).unwrap().is_none());
    let created = chain
        .fetch_utxo_entry(&OutPoint::new(tx.hash(), 0))
        .unwrap()
        .unwrap();
    assert_eq!(created.amount().value, ATOMS_PER_COIN / 2);
    assert_eq!(created.block_hash(), spending.hash());

    let best = chain.best_snapshot();
    assert_eq!(best.hash, spending.hash());
    assert_eq!(best.graph_state.main_height, 5);
    assert_eq!(best.graph_state.main_order, 5);
    assert_eq!(best.num_txns, 2);
    assert_eq!(best.total_txns, 7);
    assert_eq!(chain.block_by_hash(&spending.hash()).unwrap(), Some(spending));
}

#[test]
fn test_immature_spend_keeps_dag_position() {
    let dir = tempfile::tempdir().unwrap();
    let chain = open_chain(dir.path());
    let genesis = regtest_params().genesis_hash();

    let blocks = extend(&chain, genesis, 3);
    let funding = coinbase_outpoint(&blocks[0]);

    let early = make_block(&[blocks[2].hash()], vec![spend(funding, 1_000, 2)]);
    let err = process(&chain, &early).unwrap_err();
    assert_eq!(err.rule_code(), Some(ErrorCode::ImmatureSpend));

    assert!(chain.have_block(&early.hash()));
    assert!(is_failed(&chain, &early.hash()));
    assert!(chain.main_chain_has_block(&early.hash()));
    assert_eq!(chain.block_order(&early.hash()), Some(4));
    assert!(chain.fetch_utxo_entry(&funding).unwrap().is_some());
    assert!(chain
        .fetch_utxo_entry(&coinbase_outpoint(&early))
        .unwrap()
        .is_none());
}

#[test]
fn test_double_spend_across_siblings() {
    let dir = tempfile::tempdir().unwrap();
    let chain = open_chain(dir.path());
    let genesis = regtest_params().genesis_hash();

    let blocks = extend(&chain, genesis, 4);
    let funding = coinbase_outpoint(&blocks[0]);
    let parent = blocks[3].hash();

    let tx_b = spend(funding, 1_000, 2);
    let tx_c = spend(funding, 2_000, 3);
    let b = make_block(&[parent], vec![tx_b.clone()]);
    let c = make_block(&[parent], vec![tx_c.clone()]);

    assert!(!process(&chain, &b).unwrap());
    assert!(!process(&chain, &c).unwrap());

    let merge = make_block(&[b.hash(), c.hash()], Vec::new());
    assert!(!process(&chain, &merge).unwrap());
    assert!(is_valid(&chain, &merge.hash()));

    let (winner, loser, winner_tx, loser_tx) = if is_valid(&chain, &b.hash()) {
        (&b, &c, &tx_b, &tx_c)
    } else {
        (&c, &b, &tx_c, &tx_b)
    };
    assert!(is_valid(&chain, &winner.hash()));
    assert!(is_failed(&chain, &loser.hash()));
    assert!(!is_valid(&chain, &loser.hash()));

    assert!(chain.fetch_utxo_entry(&funding).unwrap().is_none());
    assert!(chain
        .fetch_utxo_entry(&OutPoint::new(winner_tx.hash(), 0))
        .unwrap()
        .is_some());
    assert!(chain
        .fetch_utxo_entry(&OutPoint::new(loser_tx.hash(), 0))
        .unwrap()
        .is_none());
    assert!(chain
        .fetch_utxo_entry(&coinbase_outpoint(loser))
        .unwrap()
        .is_none());
}

#[test]
fn test_reorganization_notifications() {
    let dir = tempfile::tempdir().unwrap();
    let chain = open_chain(dir.path());
    let genesis = regtest_params().genesis_hash();

    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    chain.subscribe(Box::new(move |notification: &Notification| {
        sink.lock().push(notification.clone())
    }));

    let a = extend(&chain, genesis, 2);
    let b = extend(&chain, genesis, 3);
    assert_eq!(chain.best_snapshot().hash, b[2].hash());

    let reorgs = events
        .lock()
        .iter()
        .filter_map(|event| match event {
            Notification::Reorganization {
                old_tip, detached, ..
            } => Some((*old_tip, detached.clone())),
            _ => None,
        })
        .collect::<Vec<_>>();
    assert_eq!(reorgs, vec![(a[1].hash(), vec![a[1].hash(), a[0].hash()])]);

    let disconnected = events
        .lock()
        .iter()
        .filter_map(|event| match event {
            Notification::BlockDisconnected { block } => Some(block.hash()),
            _ => None,
        })
        .collect::<Vec<_>>();
    assert_eq!(disconnected, vec![a[1].hash(), a[0].hash()]);

    // The losing branch is out of the order and out of the utxo set.
    for block in &a {
        assert_eq!(chain.block_order(&block.hash()), None);
        assert!(!is_valid(&chain, &block.hash()));
        assert!(chain
            .fetch_utxo_entry(&coinbase_outpoint(block))
            .unwrap()
            .is_none());
    }
    assert!(chain
        .fetch_utxo_entry(&coinbase_outpoint(&b[0]))
        .unwrap()
        .is_some());

    // Merging the losing branch orders and connects it again.
    let merge = make_block(&[b[2].hash(), a[1].hash()], Vec::new());
    assert!(!process(&chain, &merge).unwrap());
    assert_eq!(chain.best_snapshot().hash, merge.hash());
    for block in &a {
        assert!(chain.block_order(&block.hash()).is_some());
        assert!(is_valid(&chain, &block.hash()));
        assert!(chain
            .fetch_utxo_entry(&coinbase_outpoint(block))
            .unwrap()
            .is_some());
    }
    assert!(chain.main_chain_has_block(&b[2].hash()));
    assert!(!chain.main_chain_has_block(&a[1].hash()));

    let accepted = events
        .lock()
        .iter()
        .filter(|event| matches!(event, Notification::BlockAccepted { .. }))
        .count();
    assert_eq!(accepted, 6);
}

#[test]
fn test_orphan_resolution() {
    let dir = tempfile::tempdir().unwrap();
    let chain = open_chain(dir.path());
    let genesis = regtest_params().genesis_hash();

    let first = make_block(&[genesis], Vec::new());
    let second = make_block(&[first.hash()], Vec::new());
    let third = make_block(&[second.hash()], Vec::new());

    assert!(process(&chain, &third).unwrap());
    assert!(process(&chain, &second).unwrap());
    assert!(chain.is_orphan(&third.hash()));
    assert!(chain.have_block(&second.hash()));
    assert_eq!(chain.orphan_root(&third.hash()), second.hash());
    assert_eq!(chain.orphan_unknown_parents(), vec![first.hash()]);
    assert_eq!(
        process(&chain, &third).unwrap_err().rule_code(),
        Some(ErrorCode::DuplicateBlock)
    );

    assert!(!process(&chain, &first).unwrap());

    assert!(!chain.is_orphan(&second.hash()));
    assert!(!chain.is_orphan(&third.hash()));
    assert_eq!(chain.block_order(&third.hash()), Some(3));
    assert!(is_valid(&chain, &third.hash()));
    assert_eq!(chain.best_snapshot().hash, third.hash());
}

#[test]
fn test_duplicate_block() {
    let dir = tempfile::tempdir().unwrap();
    let chain = open_chain(dir.path());

    let block = make_block(&[regtest_params().genesis_hash()], Vec::new());
    assert!(!process(&chain, &block).unwrap());
    let err = process(&chain, &block).unwrap_err();
    assert_eq!(err.rule_code(), Some(ErrorCode::DuplicateBlock));
}

#[test]
fn test_rejects_unexpected_difficulty() {
    let dir = tempfile::tempdir().unwrap();
    let chain = open_chain(dir.path());
    let params = regtest_params();

    let block = make_block_with(
        &[params.genesis_hash()],
        coinbase(ATOMS_PER_COIN),
        Vec::new(),
        0x203fffff,
    );
    let err = process(&chain, &block).unwrap_err();
    assert_eq!(err.rule_code(), Some(ErrorCode::UnexpectedDifficulty));
    assert!(!chain.have_block(&block.hash()));
    assert_eq!(chain.calc_next_required_difficulty(), params.pow_limit_bits);
}

#[test]
fn test_rejects_excessive_coinbase() {
    let dir = tempfile::tempdir().unwrap();
    let chain = open_chain(dir.path());
    let params = regtest_params();

    let block = make_block_with(
        &[params.genesis_hash()],
        coinbase(1_000 * ATOMS_PER_COIN),
        Vec::new(),
        params.pow_limit_bits,
    );
    let err = process(&chain, &block).unwrap_err();
    assert_eq!(err.rule_code(), Some(ErrorCode::BadCoinbaseValue));
    assert!(is_failed(&chain, &block.hash()));
    assert!(chain
        .fetch_utxo_entry(&coinbase_outpoint(&block))
        .unwrap()
        .is_none());
    assert_eq!(chain.best_snapshot().total_subsidy, 0);
}

#[test]
fn test_rejects_block_conflicting_with_checkpoint() {
    let dir = tempfile::tempdir().unwrap();
    let mut params = regtest_params();
    params.checkpoints = vec![Checkpoint {
        layer: 1,
        hash: Hash::from_byte_array([7; 32]),
    }];
    let chain = BlockChain::new(&regtest_config(dir.path()), params).unwrap();

    let block = make_block(&[regtest_params().genesis_hash()], Vec::new());
    let err = process(&chain, &block).unwrap_err();
    assert_eq!(err.rule_code(), Some(ErrorCode::BadCheckpoint));
    assert!(!chain.verify_checkpoint(1, &block.hash()));

    chain.disable_checkpoints(true);
    assert!(!process(&chain, &block).unwrap());
}

#[test]
fn test_restart_restores_chain_state() {
    let dir = tempfile::tempdir().unwrap();
    let genesis = regtest_params().genesis_hash();

    let (best, a, b) = {
        let chain = open_chain(dir.path());
        let a = extend(&chain, genesis, 2);
        let b = extend(&chain, genesis, 3);
        let merge = make_block(&[b[2].hash(), a[1].hash()], Vec::new());
        assert!(!process(&chain, &merge).unwrap());
        (chain.best_snapshot(), a, b)
    };

    let chain = open_chain(dir.path());
    assert_eq!(*chain.best_snapshot(), *best);
    for block in a.iter().chain(&b) {
        assert!(is_valid(&chain, &block.hash()));
        assert!(chain.block_order(&block.hash()).is_some());
    }

    // The reloaded chain keeps extending.
    let next = make_block(&[best.hash], Vec::new());
    assert!(!process(&chain, &next).unwrap());
    assert_eq!(chain.best_snapshot().graph_state.total_blocks, 8);
}

#[test]
fn test_interrupted_startup() {
    let dir = tempfile::tempdir().unwrap();
    {
        let chain = open_chain(dir.path());
        extend(&chain, regtest_params().genesis_hash(), 2);
    }

    let mut config = regtest_config(dir.path());
    config.interrupt = Some(Arc::new(AtomicBool::new(true)));
    let Err(err) = BlockChain::new(&config, regtest_params()) else {
        panic!("Startup must observe the interrupt");
    };
    assert!(matches!(err, Error::Interrupted));

    // Nothing was written, a normal startup still works.
    let chain = open_chain(dir.path());
    assert_eq!(chain.best_snapshot().graph_state.main_height, 2);
}

#[derive(Default)]
struct CountingIndex {
    connected: Mutex<Vec<Hash>>,
    disconnected: Mutex<Vec<Hash>>,
}

impl IndexManager for CountingIndex {
    fn connect_block(
        &self,
        _db_tx: &mut WriteTransaction<'_>,
        block: &Block,
        _stxos: &[SpentTxOut],
    ) -> Result<(), Error> {
        self.connected.lock().push(block.hash());
        Ok(())
    }

    fn disconnect_block(
        &self,
        _db_tx: &mut WriteTransaction<'_>,
        block: &Block,
        _stxos: &[SpentTxOut],
    ) -> Result<(), Error> {
        self.disconnected.lock().push(block.hash());
        Ok(())
    }
}

#[test]
fn test_index_manager_follows_connected_blocks() {
    let dir = tempfile::tempdir().unwrap();
    let index = Arc::new(CountingIndex::default());
    let chain = BlockChain::with_collaborators(
        &regtest_config(dir.path()),
        regtest_params(),
        Arc::new(dagchain_consensus::AcceptAllScripts),
        Some(index.clone()),
    )
    .unwrap();

    let genesis = regtest_params().genesis_hash();
    let a = extend(&chain, genesis, 1);
    let b = extend(&chain, genesis, 2);

    let disconnected = index.disconnected.lock().clone();
    assert_eq!(disconnected, vec![a[0].hash()]);

    let connected = index.connected.lock().clone();
    assert_eq!(connected.first(), Some(&a[0].hash()));
    assert!(connected.contains(&b[0].hash()));
    assert!(connected.contains(&b[1].hash()));
}

/// Fails the first connection of `fail_on`.
struct FlakyIndex {
    fail_on: Hash,
    failed: AtomicBool,
}

impl IndexManager for FlakyIndex {
    fn connect_block(
        &self,
        _db_tx: &mut WriteTransaction<'_>,
        block: &Block,
        _stxos: &[SpentTxOut],
    ) -> Result<(), Error> {
        if block.hash() == self.fail_on && !self.failed.swap(true, Ordering::Relaxed) {
            return Err(Error::Index("index unavailable".into()));
        }
        Ok(())
    }

    fn disconnect_block(
        &self,
        _db_tx: &mut WriteTransaction<'_>,
        _block: &Block,
        _stxos: &[SpentTxOut],
    ) -> Result<(), Error> {
        Ok(())
    }
}

#[test]
fn test_failed_commit_leaves_chain_state_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let genesis = regtest_params().genesis_hash();
    let a = make_block(&[genesis], Vec::new());
    let b = make_block(&[a.hash()], Vec::new());

    let best = {
        let index = Arc::new(FlakyIndex {
            fail_on: a.hash(),
            failed: AtomicBool::new(false),
        });
        let chain = BlockChain::with_collaborators(
            &regtest_config(dir.path()),
            regtest_params(),
            Arc::new(dagchain_consensus::AcceptAllScripts),
            Some(index),
        )
        .unwrap();
        let before = chain.best_snapshot();

        assert!(matches!(process(&chain, &a), Err(Error::Index(_))));
        assert!(!chain.have_block(&a.hash()));
        assert_eq!(chain.block_order(&a.hash()), None);
        assert_eq!(chain.tip_generation(), vec![genesis]);
        assert_eq!(*chain.best_snapshot(), *before);

        // The child waits for the rejected parent, which is accepted on retry.
        assert!(process(&chain, &b).unwrap());
        assert!(!process(&chain, &a).unwrap());
        assert!(is_valid(&chain, &a.hash()));
        assert!(is_valid(&chain, &b.hash()));

        let best = chain.best_snapshot();
        assert_eq!(best.hash, b.hash());
        assert_eq!(best.graph_state.total_blocks, 3);
        assert_eq!(best.total_txns, before.total_txns + 2);
        best
    };

    let chain = open_chain(dir.path());
    assert_eq!(*chain.best_snapshot(), *best);
    assert_eq!(chain.block_order(&a.hash()), Some(1));
    assert_eq!(chain.block_order(&b.hash()), Some(2));
}
