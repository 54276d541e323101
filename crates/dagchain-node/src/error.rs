/// Node error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Chain(#[from] dagchain_consensus::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Bincode(#[from] bincode::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error("Block record of {0} bytes exceeds the maximum block size")]
    OversizedRecord(u32),
    #[error("Invalid log filter: {0}")]
    LogFilter(String),
}

impl From<dagchain_storage::Error> for Error {
    fn from(err: dagchain_storage::Error) -> Self {
        Self::Chain(err.into())
    }
}
