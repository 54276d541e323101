//! Persistent chain database on RocksDB.
//!
//! Every logical bucket is its own column family. Writes go through [`ChainDb::update`], which
//! collects them in one `WriteBatch` so a block acceptance is stored entirely or not at all.

mod chain_db;
mod error;
mod index;
mod state;

pub use chain_db::{ChainDb, WriteTransaction};
pub use error::Error;
pub use index::BlockIndexEntry;
pub use state::{
    BestChainState, DatabaseInfo, BLOCK_INDEX_VERSION, COMPRESSION_VERSION, DATABASE_VERSION,
};

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Column family names.
mod cf {
    /// Key: block hash. Value: bincode [`crate::BlockIndexEntry`].
    pub const BLOCK_INDEX: &str = "block_index";

    /// Key: order (u64, big-endian). Value: block hash.
    pub const BLOCK_ORDER: &str = "block_order";

    /// Key: block hash. Value: spend journal.
    pub const SPEND_JOURNAL: &str = "spend_journal";

    /// Key: outpoint key. Value: compressed utxo entry.
    pub const UTXO_SET: &str = "utxo_set";

    /// Best chain state and cumulative subsidy.
    pub const CHAIN_STATE: &str = "chain_state";

    pub const DB_INFO: &str = "db_info";

    /// Key: block hash. Value: bincode block.
    pub const BLOCKS: &str = "blocks";
}

mod keys {
    pub const DB_INFO: &[u8] = b"dbinfo";
    pub const BEST_CHAIN_STATE: &[u8] = b"chainstate";
    pub const TOTAL_SUBSIDY: &[u8] = b"totalsubsidy";
}
