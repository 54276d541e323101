use dagchain_primitives::Hash;
use num_bigint::BigUint;

/// Summary of the DAG shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphState {
    /// Tips of the DAG, sorted.
    pub tips: Vec<Hash>,
    pub total_blocks: u64,
    /// Layer of the main tip.
    pub main_height: u64,
    /// Order of the main tip.
    pub main_order: u64,
}

/// Snapshot of the chain as of the main tip.
///
/// Snapshots are immutable and replaced as a whole, readers never see a partially updated one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BestState {
    /// Hash of the main tip.
    pub hash: Hash,
    pub bits: u32,
    /// Serialized size of the main tip.
    pub block_size: u64,
    /// Transactions in the main tip.
    pub num_txns: u64,
    /// Transactions in every block of the DAG.
    pub total_txns: u64,
    /// Past median time of the main tip.
    pub median_time: u32,
    /// Cumulative subsidy of the valid ordered blocks.
    pub total_subsidy: u64,
    pub work_sum: BigUint,
    pub graph_state: GraphState,
}
