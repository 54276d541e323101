use crate::chain_params::Network;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

/// Default number of orphans kept, the pool holds up to twice as many.
pub const DEFAULT_MAX_ORPHAN_BLOCKS: usize = 500;

/// Default seconds an orphan block is kept.
pub const DEFAULT_ORPHAN_TTL_SECS: u64 = 10 * 60;

/// Default main chain distance used by the stale orphan purge.
pub const DEFAULT_STABLE_CONFIRMATIONS: u64 = 10;

/// Node level chain configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ChainConfig {
    /// Directory of the chain database.
    pub data_dir: PathBuf,
    pub network: Network,
    /// JSON file with additional checkpoints.
    pub checkpoints_file: Option<PathBuf>,
    pub disable_checkpoints: bool,
    pub max_orphan_blocks: usize,
    pub orphan_ttl_secs: u64,
    pub stable_confirmations: u64,
    /// Set to abort loading the chain state.
    #[serde(skip)]
    pub interrupt: Option<Arc<AtomicBool>>,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("dagchain-data"),
            network: Network::default(),
            checkpoints_file: None,
            disable_checkpoints: false,
            max_orphan_blocks: DEFAULT_MAX_ORPHAN_BLOCKS,
            orphan_ttl_secs: DEFAULT_ORPHAN_TTL_SECS,
            stable_confirmations: DEFAULT_STABLE_CONFIRMATIONS,
            interrupt: None,
        }
    }
}

impl ChainConfig {
    pub fn new(data_dir: impl Into<PathBuf>, network: Network) -> Self {
        Self {
            data_dir: data_dir.into(),
            network,
            ..Default::default()
        }
    }
}
