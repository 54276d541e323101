/// Utxo codec and store errors.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Serialized bytes do not follow the expected layout.
    #[error("Failed to deserialize {what}: {reason}")]
    Deserialize { what: &'static str, reason: String },
    /// The backing utxo store failed.
    #[error("Utxo store error: {0}")]
    Store(Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
    pub(crate) fn deserialize(what: &'static str, reason: impl Into<String>) -> Self {
        Self::Deserialize {
            what,
            reason: reason.into(),
        }
    }
}
