//! Consensus layer of the dagchain node.
//!
//! [`BlockChain`] drives a block through sanity and context validation, inserts it into the
//! block DAG and replays the resulting change of the total order against the utxo set:
//!
//! - A block with unknown parents is parked in the [`OrphanBlocksPool`] until they arrive.
//! - An insertion that only appends to the order connects the new block.
//! - An insertion that reorders blocks disconnects them newest first using their spend
//!   journals, then connects every reordered block in the new order.
//!
//! A block failing validation keeps its DAG position but contributes nothing to the utxo set.
//! Every change is committed to the chain database in a single atomic update.

mod best_state;
mod chain;
mod chain_params;
mod checkpoints;
mod config;
mod difficulty;
mod error;
mod index_manager;
mod notifications;
mod orphan_blocks_pool;
mod script;
mod subsidy;
pub mod verification;

pub use best_state::{BestState, GraphState};
pub use chain::BlockChain;
pub use chain_params::{ChainParams, Network};
pub use checkpoints::{load_checkpoints, parse_checkpoints, Checkpoint, Checkpoints};
pub use config::{
    ChainConfig, DEFAULT_MAX_ORPHAN_BLOCKS, DEFAULT_ORPHAN_TTL_SECS, DEFAULT_STABLE_CONFIRMATIONS,
};
pub use difficulty::{calc_easiest_difficulty, calc_next_required_difficulty};
pub use error::{Error, ErrorCode, RuleError};
pub use index_manager::IndexManager;
pub use notifications::{Notification, NotificationCallback};
pub use orphan_blocks_pool::OrphanBlocksPool;
pub use script::{AcceptAllScripts, ScriptError, ScriptVerifier};
pub use subsidy::SubsidyCache;
pub use verification::BehaviorFlags;

pub type Result<T, E = Error> = std::result::Result<T, E>;
