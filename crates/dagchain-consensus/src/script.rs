use dagchain_primitives::Transaction;
use dagchain_utxo::UtxoEntry;

/// Script verification errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScriptError {
    #[error("Script evaluated to false")]
    EvalFalse,
    #[error("Input {0} is out of range")]
    InputOutOfRange(usize),
    #[error("{0}")]
    Other(String),
}

/// Script engine used to verify that an input may spend the output it references.
pub trait ScriptVerifier: Send + Sync {
    /// Verifies input `input_index` of `tx` against the spent output `prev`.
    fn verify_input(
        &self,
        tx: &Transaction,
        input_index: usize,
        prev: &UtxoEntry,
    ) -> Result<(), ScriptError>;
}

/// Accepts every input, for trusted imports and tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAllScripts;

impl ScriptVerifier for AcceptAllScripts {
    fn verify_input(
        &self,
        tx: &Transaction,
        input_index: usize,
        _prev: &UtxoEntry,
    ) -> Result<(), ScriptError> {
        if input_index >= tx.inputs.len() {
            return Err(ScriptError::InputOutOfRange(input_index));
        }
        Ok(())
    }
}
