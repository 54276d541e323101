//! Block DAG ordering engine.
//!
//! Blocks reference any number of parents. [`BlockDag`] keeps every block in a [`BlockIndex`]
//! arena and derives from it:
//!
//! - the tips and the main chain, following the selected parent of the main tip,
//! - a blue/red split of every block's mergeset ([`GhostDag`]),
//! - a deterministic total order and, on every insertion, which blocks lost or gained an order,
//! - hourglass blocks (cut vertices between the tips and genesis), confirmations and the
//!   finality point below which forks are rejected.

mod blockdag;
mod blockindex;
mod blocknode;
mod blockset;
mod error;
mod ghostdag;

pub use blockdag::{AddBlockOutcome, BlockDag};
pub use blockindex::{BlockIndex, MainLineage, MEDIAN_TIME_BLOCKS};
pub use blocknode::{BlockNode, BlockStatus, GhostdagData, NodeId};
pub use blockset::BlockSet;
pub use error::DagError;
pub use ghostdag::{DagOrdering, GhostDag};
