/// Chain database errors.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// RocksDB error.
    #[error("RocksDB error: {0}")]
    Rocksdb(#[from] rocksdb::Error),

    /// Bincode encoding or decoding error.
    #[error("Bincode error: {0}")]
    Bincode(#[from] bincode::Error),

    /// Stored bytes do not follow the expected layout.
    #[error("Database corruption: {0}")]
    Corruption(String),

    /// The database was written by a newer version of the software.
    #[error(
        "Database {what} version {found} is newer than the supported version {supported}, \
        remove the data directory and resync from genesis"
    )]
    NewerDatabase {
        what: &'static str,
        found: u32,
        supported: u32,
    },

    /// A column family is missing.
    #[error("Column family {0} not initialized")]
    NotInitialized(&'static str),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<dagchain_utxo::Error> for Error {
    fn from(err: dagchain_utxo::Error) -> Self {
        Self::Corruption(err.to_string())
    }
}
