use dagchain_dag::DagError;
use std::fmt;

/// Identifies the consensus rule a block or transaction violates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    DuplicateBlock,
    MissingParent,
    BlockTooBig,
    TimeTooOld,
    TimeTooNew,
    DifficultyTooLow,
    UnexpectedDifficulty,
    HighHash,
    BadMerkleRoot,
    BadParentsMerkleRoot,
    BadCheckpoint,
    ForkTooOld,
    CheckpointTimeTooOld,
    NoTransactions,
    NoParents,
    DuplicateParent,
    TooManyTransactions,
    NoTxInputs,
    NoTxOutputs,
    TxTooBig,
    InvalidTxOutValue,
    DuplicateTxInputs,
    InvalidTxInput,
    MissingTxOut,
    UnfinalizedTx,
    DuplicateTx,
    OverwriteTx,
    ImmatureSpend,
    SpendTooHigh,
    TooManySigOps,
    FirstTxNotCoinbase,
    MultipleCoinbases,
    BadCoinbaseScriptLen,
    BadCoinbaseValue,
    ScriptValidation,
    ExpiredTx,
    InvalidAncestorBlock,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DuplicateBlock => "ErrDuplicateBlock",
            Self::MissingParent => "ErrMissingParent",
            Self::BlockTooBig => "ErrBlockTooBig",
            Self::TimeTooOld => "ErrTimeTooOld",
            Self::TimeTooNew => "ErrTimeTooNew",
            Self::DifficultyTooLow => "ErrDifficultyTooLow",
            Self::UnexpectedDifficulty => "ErrUnexpectedDifficulty",
            Self::HighHash => "ErrHighHash",
            Self::BadMerkleRoot => "ErrBadMerkleRoot",
            Self::BadParentsMerkleRoot => "ErrBadParentsMerkleRoot",
            Self::BadCheckpoint => "ErrBadCheckpoint",
            Self::ForkTooOld => "ErrForkTooOld",
            Self::CheckpointTimeTooOld => "ErrCheckpointTimeTooOld",
            Self::NoTransactions => "ErrNoTransactions",
            Self::NoParents => "ErrNoParents",
            Self::DuplicateParent => "ErrDuplicateParent",
            Self::TooManyTransactions => "ErrTooManyTransactions",
            Self::NoTxInputs => "ErrNoTxInputs",
            Self::NoTxOutputs => "ErrNoTxOutputs",
            Self::TxTooBig => "ErrTxTooBig",
            Self::InvalidTxOutValue => "ErrInvalidTxOutValue",
            Self::DuplicateTxInputs => "ErrDuplicateTxInputs",
            Self::InvalidTxInput => "ErrInvalidTxInput",
            Self::MissingTxOut => "ErrMissingTxOut",
            Self::UnfinalizedTx => "ErrUnfinalizedTx",
            Self::DuplicateTx => "ErrDuplicateTx",
            Self::OverwriteTx => "ErrOverwriteTx",
            Self::ImmatureSpend => "ErrImmatureSpend",
            Self::SpendTooHigh => "ErrSpendTooHigh",
            Self::TooManySigOps => "ErrTooManySigOps",
            Self::FirstTxNotCoinbase => "ErrFirstTxNotCoinbase",
            Self::MultipleCoinbases => "ErrMultipleCoinbases",
            Self::BadCoinbaseScriptLen => "ErrBadCoinbaseScriptLen",
            Self::BadCoinbaseValue => "ErrBadCoinbaseValue",
            Self::ScriptValidation => "ErrScriptValidation",
            Self::ExpiredTx => "ErrExpiredTx",
            Self::InvalidAncestorBlock => "ErrInvalidAncestorBlock",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Violation of a consensus rule.
///
/// The code is meant for machines (reject messages, tests), the description for humans.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{description}")]
pub struct RuleError {
    pub code: ErrorCode,
    pub description: String,
}

impl RuleError {
    pub fn new(code: ErrorCode, description: impl Into<String>) -> Self {
        Self {
            code,
            description: description.into(),
        }
    }
}

impl From<DagError> for RuleError {
    fn from(err: DagError) -> Self {
        let code = match &err {
            DagError::DuplicateBlock(_) => ErrorCode::DuplicateBlock,
            DagError::NoParents(_) => ErrorCode::NoParents,
            DagError::DuplicateParent { .. } => ErrorCode::DuplicateParent,
            DagError::MissingParents { .. } => ErrorCode::MissingParent,
            DagError::ForkTooOld { .. } => ErrorCode::ForkTooOld,
        };
        Self::new(code, err.to_string())
    }
}

/// Chain error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Rule(#[from] RuleError),
    #[error(transparent)]
    Database(#[from] dagchain_storage::Error),
    #[error(transparent)]
    Utxo(#[from] dagchain_utxo::Error),
    #[error("Invalid checkpoints: {0}")]
    Checkpoints(String),
    /// An [`IndexManager`](crate::IndexManager) failed to update its index.
    #[error("Index error: {0}")]
    Index(Box<dyn std::error::Error + Send + Sync>),
    #[error("Interrupted while loading the chain state")]
    Interrupted,
}

impl Error {
    /// The violated rule, if this is a rule error.
    pub fn rule_code(&self) -> Option<ErrorCode> {
        match self {
            Self::Rule(err) => Some(err.code),
            _ => None,
        }
    }
}

impl From<DagError> for Error {
    fn from(err: DagError) -> Self {
        Self::Rule(err.into())
    }
}
