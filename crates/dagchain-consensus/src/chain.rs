//! The block chain: a block DAG whose total order drives the utxo set.
//!
//! [`BlockChain`] owns the in-memory [`BlockDag`] and the [`ChainDb`]. Blocks enter through
//! [`BlockChain::process_block`]; every change of the order is replayed against the utxo set and
//! persisted in one atomic database update.

mod process;

use crate::best_state::{BestState, GraphState};
use crate::chain_params::ChainParams;
use crate::checkpoints::{load_checkpoints, Checkpoint, Checkpoints};
use crate::config::ChainConfig;
use crate::index_manager::IndexManager;
use crate::notifications::{NotificationCallback, Notifier};
use crate::orphan_blocks_pool::OrphanBlocksPool;
use crate::script::{AcceptAllScripts, ScriptVerifier};
use crate::subsidy::SubsidyCache;
use crate::{difficulty, Error};
use dagchain_dag::{BlockDag, BlockStatus, NodeId};
use dagchain_primitives::{Block, BlockHeader, Hash, OutPoint};
use dagchain_storage::{BestChainState, BlockIndexEntry, ChainDb, DatabaseInfo};
use dagchain_utxo::script::{classify, ScriptClass};
use dagchain_utxo::UtxoEntry;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// A chain tip older than this is not current.
const MAX_TIP_AGE: u32 = 24 * 60 * 60;

/// State guarded by the chain lock.
struct ChainState {
    dag: BlockDag,
    checkpoints: Checkpoints,
    /// Transactions in every block of the DAG.
    total_txns: u64,
    /// Subsidy of every valid ordered block.
    total_subsidy: u64,
}

pub struct BlockChain {
    params: Arc<ChainParams>,
    db: Arc<ChainDb>,
    /// The chain lock.
    state: RwLock<ChainState>,
    /// Locked after the chain lock when both are needed.
    orphans: RwLock<OrphanBlocksPool>,
    best_state: RwLock<Arc<BestState>>,
    subsidy_cache: SubsidyCache,
    script_verifier: Arc<dyn ScriptVerifier>,
    index_manager: Option<Arc<dyn IndexManager>>,
    notifier: Notifier,
}

impl BlockChain {
    /// Opens the chain at `config.data_dir`, verifying scripts with [`AcceptAllScripts`].
    pub fn new(config: &ChainConfig, params: ChainParams) -> Result<Self, Error> {
        Self::with_collaborators(config, params, Arc::new(AcceptAllScripts), None)
    }

    /// Opens the chain at `config.data_dir`.
    ///
    /// An empty database is initialized with the genesis block, otherwise the DAG is rebuilt
    /// from the stored block index.
    pub fn with_collaborators(
        config: &ChainConfig,
        params: ChainParams,
        script_verifier: Arc<dyn ScriptVerifier>,
        index_manager: Option<Arc<dyn IndexManager>>,
    ) -> Result<Self, Error> {
        if config.network != params.network {
            tracing::warn!(
                "Configured network {} differs from the chain params network {}",
                config.network,
                params.network
            );
        }

        let db = Arc::new(ChainDb::open(&config.data_dir)?);

        let mut checkpoint_list = params.checkpoints.clone();
        if let Some(path) = &config.checkpoints_file {
            checkpoint_list.extend(load_checkpoints(path)?);
        }
        let mut checkpoints = Checkpoints::new(checkpoint_list, config.disable_checkpoints);

        let mut dag = BlockDag::new(params.anticone_size, params.checkpoint_confirmations);
        let (total_txns, total_subsidy) = if db.db_info()?.is_none() {
            create_chain_state(&db, &params, &mut dag)?
        } else {
            load_chain_state(&db, &params, &mut dag, config.interrupt.as_deref())?
        };

        checkpoints.find_previous(&dag);

        let main_tip = dag.main_tip().expect("DAG holds at least the genesis block; qed");
        let tip_block = stored_block(&db, &dag.node(main_tip).hash())?;
        let best_state = make_best_state(
            &dag,
            total_txns,
            total_subsidy,
            tip_block.size() as u64,
            tip_block.transactions.len() as u64,
        );

        tracing::info!(
            "Chain state: main tip {} at layer {}, order {}, {} blocks, {} tips",
            best_state.hash,
            best_state.graph_state.main_height,
            best_state.graph_state.main_order,
            best_state.graph_state.total_blocks,
            best_state.graph_state.tips.len(),
        );

        let subsidy_cache = SubsidyCache::new(dag.main_height(), &params);
        let orphans = OrphanBlocksPool::new(
            config.max_orphan_blocks,
            Duration::from_secs(config.orphan_ttl_secs),
            config.stable_confirmations,
        );

        Ok(Self {
            params: Arc::new(params),
            db,
            state: RwLock::new(ChainState {
                dag,
                checkpoints,
                total_txns,
                total_subsidy,
            }),
            orphans: RwLock::new(orphans),
            best_state: RwLock::new(Arc::new(best_state)),
            subsidy_cache,
            script_verifier,
            index_manager,
            notifier: Notifier::default(),
        })
    }

    pub fn params(&self) -> &ChainParams {
        &self.params
    }

    pub fn chain_db(&self) -> &ChainDb {
        &self.db
    }

    /// Registers a callback for chain notifications.
    pub fn subscribe(&self, callback: NotificationCallback) {
        self.notifier.subscribe(callback);
    }

    /// Returns the current best state snapshot.
    pub fn best_snapshot(&self) -> Arc<BestState> {
        self.best_state.read().clone()
    }

    /// Hashes of the current DAG tips.
    pub fn tip_generation(&self) -> Vec<Hash> {
        self.state.read().dag.tip_hashes()
    }

    /// Returns `true` if the block is in the DAG or in the orphan pool.
    pub fn have_block(&self, hash: &Hash) -> bool {
        let state = self.state.read();
        state.dag.index().have_block(hash) || self.orphans.read().is_orphan(hash)
    }

    pub fn block_by_hash(&self, hash: &Hash) -> Result<Option<Block>, Error> {
        if !self.state.read().dag.index().have_block(hash) {
            return Ok(None);
        }
        Ok(self.db.block(hash)?)
    }

    pub fn block_by_order(&self, order: u64) -> Result<Option<Block>, Error> {
        let hash = {
            let state = self.state.read();
            match state.dag.node_by_order(order) {
                Some(id) => state.dag.node(id).hash(),
                None => return Ok(None),
            }
        };
        Ok(self.db.block(&hash)?)
    }

    pub fn header_by_hash(&self, hash: &Hash) -> Option<BlockHeader> {
        self.state
            .read()
            .dag
            .index()
            .lookup_node(hash)
            .map(|node| node.header().clone())
    }

    pub fn block_status(&self, hash: &Hash) -> Option<BlockStatus> {
        self.state
            .read()
            .dag
            .index()
            .lookup_node(hash)
            .map(|node| node.status())
    }

    /// Position of the block in the total order.
    pub fn block_order(&self, hash: &Hash) -> Option<u64> {
        self.state
            .read()
            .dag
            .index()
            .lookup_node(hash)
            .and_then(|node| node.order())
    }

    pub fn main_chain_has_block(&self, hash: &Hash) -> bool {
        let state = self.state.read();
        state
            .dag
            .index()
            .lookup_id(hash)
            .is_some_and(|id| state.dag.main_chain_has_block(id))
    }

    /// Number of blocks in the future of the block.
    pub fn confirmations(&self, hash: &Hash) -> Option<u64> {
        let state = self.state.read();
        state
            .dag
            .index()
            .lookup_id(hash)
            .map(|id| state.dag.confirmations(id))
    }

    /// Returns `true` if the chain caught up: the main chain passed the latest checkpoint and
    /// the main tip is less than a day old.
    pub fn is_current(&self) -> bool {
        let state = self.state.read();

        if let Some(checkpoint) = state.checkpoints.latest() {
            if state.dag.main_height() < checkpoint.layer {
                return false;
            }
        }

        let Some(main_tip) = state.dag.main_tip() else {
            return false;
        };

        let min_time = unix_time().saturating_sub(MAX_TIP_AGE);
        state.dag.node(main_tip).timestamp() >= min_time
    }

    /// Unspent output at `outpoint`, `None` if it does not exist or is spent.
    pub fn fetch_utxo_entry(&self, outpoint: &OutPoint) -> Result<Option<UtxoEntry>, Error> {
        let _state = self.state.read();
        Ok(self
            .db
            .utxo_entry(outpoint)?
            .filter(|entry| !entry.is_spent()))
    }

    /// Bits required for a block extending the current main tip.
    pub fn calc_next_required_difficulty(&self) -> u32 {
        let state = self.state.read();
        difficulty::calc_next_required_difficulty(
            state.dag.index(),
            state.dag.main_tip(),
            &self.params,
        )
    }

    /// Returns `true` if the block is suitable as a checkpoint.
    ///
    /// A candidate is an hourglass block below the main tip with at least
    /// `checkpoint_confirmations` confirmations, a timestamp not before its main parent and only
    /// recognized output scripts.
    pub fn is_checkpoint_candidate(&self, hash: &Hash) -> Result<bool, Error> {
        let state = self.state.read();
        let dag = &state.dag;
        let required = self.params.checkpoint_confirmations;

        let Some(id) = dag.index().lookup_id(hash) else {
            return Ok(false);
        };

        if dag.main_tip() == Some(id) {
            return Ok(false);
        }

        let node = dag.node(id);
        if node.layer() + required > dag.main_height() {
            return Ok(false);
        }

        if dag.confirmations(id) < required {
            return Ok(false);
        }

        let Some(main_parent) = node.selected_parent() else {
            return Ok(false);
        };

        if node.timestamp() < dag.node(main_parent).timestamp() {
            return Ok(false);
        }

        if !dag.is_hourglass(id) {
            return Ok(false);
        }

        let Some(block) = self.db.block(hash)? else {
            return Ok(false);
        };

        Ok(block
            .transactions
            .iter()
            .flat_map(|tx| &tx.outputs)
            .all(|output| classify(&output.pk_script) != ScriptClass::NonStandard))
    }

    pub fn latest_checkpoint(&self) -> Option<Checkpoint> {
        self.state.read().checkpoints.latest().copied()
    }

    /// Returns `false` if a checkpoint exists at `layer` for another block.
    pub fn verify_checkpoint(&self, layer: u64, hash: &Hash) -> bool {
        self.state.read().checkpoints.verify(layer, hash)
    }

    /// The most recent checkpoint block the main chain has passed.
    pub fn find_previous_checkpoint(&self) -> Option<Hash> {
        let mut state = self.state.write();
        let state = &mut *state;
        state
            .checkpoints
            .find_previous(&state.dag)
            .map(|id| state.dag.node(id).hash())
    }

    pub fn disable_checkpoints(&self, disable: bool) {
        self.state.write().checkpoints.set_disabled(disable);
    }

    pub fn is_orphan(&self, hash: &Hash) -> bool {
        self.orphans.read().is_orphan(hash)
    }

    pub fn get_orphan(&self, hash: &Hash) -> Option<Arc<Block>> {
        self.orphans.read().get_orphan(hash)
    }

    /// Earliest orphan ancestor of `hash`, the block to request from peers.
    pub fn orphan_root(&self, hash: &Hash) -> Hash {
        self.orphans.read().orphan_root(hash)
    }

    /// Parents the orphans are waiting for.
    pub fn orphan_unknown_parents(&self) -> Vec<Hash> {
        let state = self.state.read();
        self.orphans
            .read()
            .unknown_parents(|hash| state.dag.index().have_block(hash))
    }

    fn stored_block(&self, hash: &Hash) -> Result<Block, Error> {
        stored_block(&self.db, hash)
    }

    /// Rebuilds the DAG and the counters from the last committed database state.
    ///
    /// Used after a failed commit, which leaves the database untouched but the in-memory DAG
    /// holding the rejected insertion.
    fn reload_chain_state(&self, state: &mut ChainState) -> Result<(), Error> {
        let mut dag = BlockDag::new(self.params.anticone_size, self.params.checkpoint_confirmations);
        let (total_txns, total_subsidy) = load_chain_state(&self.db, &self.params, &mut dag, None)?;

        state.dag = dag;
        state.total_txns = total_txns;
        state.total_subsidy = total_subsidy;
        state.checkpoints.reset();
        state.checkpoints.find_previous(&state.dag);

        Ok(())
    }
}

pub(crate) fn unix_time() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_secs() as u32)
        .unwrap_or_default()
}

fn stored_block(db: &ChainDb, hash: &Hash) -> Result<Block, Error> {
    db.block(hash)?.ok_or_else(|| {
        dagchain_storage::Error::Corruption(format!("Block {hash} is missing from the database"))
            .into()
    })
}

fn index_entry(dag: &BlockDag, id: NodeId) -> BlockIndexEntry {
    let node = dag.node(id);
    BlockIndexEntry {
        header: node.header().clone(),
        parents: node
            .parents()
            .iter()
            .map(|parent| dag.index().hash_of(*parent))
            .collect(),
        status: node.status().bits(),
        order: node.order(),
        arrival: id.index() as u64,
    }
}

fn make_best_state(
    dag: &BlockDag,
    total_txns: u64,
    total_subsidy: u64,
    block_size: u64,
    num_txns: u64,
) -> BestState {
    let main_tip = dag.main_tip().expect("DAG holds at least the genesis block; qed");
    let node = dag.node(main_tip);
    BestState {
        hash: node.hash(),
        bits: node.bits(),
        block_size,
        num_txns,
        total_txns,
        median_time: dag.index().past_median_time(main_tip),
        total_subsidy,
        work_sum: node.work_sum().clone(),
        graph_state: GraphState {
            tips: dag.tip_hashes(),
            total_blocks: dag.block_total(),
            main_height: node.layer(),
            main_order: node.order().expect("Main tip is always ordered; qed"),
        },
    }
}

fn best_chain_state(best: &BestState) -> BestChainState {
    BestChainState {
        hash: best.hash,
        total_blocks: best.graph_state.total_blocks,
        total_txns: best.total_txns,
        work_sum: best.work_sum.clone(),
    }
}

/// Initializes an empty database with the genesis block.
fn create_chain_state(
    db: &ChainDb,
    params: &ChainParams,
    dag: &mut BlockDag,
) -> Result<(u64, u64), Error> {
    let genesis = &params.genesis_block;
    let hash = genesis.hash();

    let id = dag.add_block(genesis)?.node;
    dag.index_mut()
        .set_status_flags(id, BlockStatus::DATA_STORED | BlockStatus::VALID);
    dag.index_mut().take_dirty();

    let total_txns = genesis.transactions.len() as u64;
    let entry = index_entry(dag, id);
    let best = make_best_state(
        dag,
        total_txns,
        0,
        genesis.size() as u64,
        genesis.transactions.len() as u64,
    );

    db.update(|db_tx| -> Result<(), Error> {
        db_tx.put_db_info(&DatabaseInfo::current(u64::from(unix_time())))?;
        db_tx.put_block(genesis)?;
        db_tx.put_block_index_entry(&entry)?;
        db_tx.put_order(0, &hash)?;
        db_tx.put_spend_journal(&hash, &[])?;
        db_tx.put_best_chain_state(&best_chain_state(&best))?;
        db_tx.put_total_subsidy(0)?;
        Ok(())
    })?;

    tracing::info!("Created chain state with genesis block {hash}");

    Ok((total_txns, 0))
}

/// Rebuilds the DAG by replaying the stored block index in arrival order.
fn load_chain_state(
    db: &ChainDb,
    params: &ChainParams,
    dag: &mut BlockDag,
    interrupt: Option<&AtomicBool>,
) -> Result<(u64, u64), Error> {
    let corruption = |msg: String| Error::Database(dagchain_storage::Error::Corruption(msg));

    let best = db
        .best_chain_state()?
        .ok_or_else(|| corruption("Missing best chain state".to_string()))?;

    let entries = db.block_index_entries()?;
    tracing::info!("Loading block index with {} blocks", entries.len());

    let genesis_hash = params.genesis_hash();
    if entries.first().map(BlockIndexEntry::hash) != Some(genesis_hash) {
        return Err(corruption(format!(
            "Block index does not start with genesis block {genesis_hash}"
        )));
    }

    for entry in &entries {
        if interrupt.is_some_and(|interrupt| interrupt.load(Ordering::Relaxed)) {
            tracing::info!("Interrupted while loading the block index");
            return Err(Error::Interrupted);
        }

        let stub = Block {
            header: entry.header.clone(),
            parents: entry.parents.clone(),
            transactions: Vec::new(),
        };
        let id = dag
            .add_block(&stub)
            .map_err(|err| corruption(format!("Failed to replay block {}: {err}", stub.hash())))?
            .node;
        dag.index_mut()
            .set_status_flags(id, BlockStatus::from_bits_truncate(entry.status));
    }
    dag.index_mut().take_dirty();

    for entry in &entries {
        let hash = entry.hash();
        let order = dag.index().lookup_node(&hash).and_then(|node| node.order());
        if order != entry.order {
            return Err(corruption(format!(
                "Replayed order {order:?} of block {hash} differs from stored order {:?}",
                entry.order
            )));
        }
    }

    let main_tip = dag
        .main_tip()
        .map(|tip| dag.node(tip).hash())
        .unwrap_or(Hash::ZERO);
    if main_tip != best.hash {
        return Err(corruption(format!(
            "Replayed main tip {main_tip} differs from stored main tip {}",
            best.hash
        )));
    }

    let order_count = db.order_count()?;
    if order_count != dag.order().len() as u64 {
        return Err(corruption(format!(
            "Stored order count {order_count} differs from replayed order count {}",
            dag.order().len()
        )));
    }

    tracing::info!("Loaded chain state with main tip {main_tip}");

    Ok((best.total_txns, db.total_subsidy()?))
}
