use crate::error::{ErrorCode, RuleError};
use dagchain_primitives::{
    Encodable, Hash, Transaction, LOCK_TIME_THRESHOLD, MAX_AMOUNT, MAX_TX_IN_SEQUENCE_NUM,
};
use dagchain_utxo::UtxoViewpoint;
use std::collections::HashSet;

// MinCoinbaseScriptLen is the minimum length a coinbase script can be.
const MIN_COINBASE_SCRIPT_LEN: usize = 2;

// MaxCoinbaseScriptLen is the maximum length a coinbase script can be.
const MAX_COINBASE_SCRIPT_LEN: usize = 100;

/// Returns `true` if the lock time of `tx` has passed at main `layer` and `block_time`, or if
/// every input opted out of the lock time.
pub fn is_final(tx: &Transaction, layer: u64, block_time: u32) -> bool {
    if tx.lock_time == 0 {
        return true;
    }

    let lock_time = if tx.lock_time < LOCK_TIME_THRESHOLD {
        layer
    } else {
        u64::from(block_time)
    };

    if u64::from(tx.lock_time) < lock_time {
        return true;
    }

    tx.inputs
        .iter()
        .all(|input| input.sequence == MAX_TX_IN_SEQUENCE_NUM)
}

/// Returns `true` if `tx` carries an expiry that `layer` has reached.
pub fn is_expired(tx: &Transaction, layer: u64) -> bool {
    tx.has_expiry() && layer >= u64::from(tx.expire)
}

pub fn check_transaction_sanity(tx: &Transaction, max_tx_size: usize) -> Result<(), RuleError> {
    if tx.inputs.is_empty() {
        return Err(RuleError::new(ErrorCode::NoTxInputs, "Transaction has no inputs"));
    }

    if tx.outputs.is_empty() {
        return Err(RuleError::new(ErrorCode::NoTxOutputs, "Transaction has no outputs"));
    }

    let size = tx.encoded_size();
    if size > max_tx_size {
        return Err(RuleError::new(
            ErrorCode::TxTooBig,
            format!("Serialized transaction is too big: {size}, max: {max_tx_size}"),
        ));
    }

    let mut total_output_value = 0u64;
    for output in &tx.outputs {
        let value = output.amount.value;
        if value > MAX_AMOUNT {
            return Err(RuleError::new(
                ErrorCode::InvalidTxOutValue,
                format!("Transaction output value of {value} is higher than max of {MAX_AMOUNT}"),
            ));
        }

        total_output_value = total_output_value
            .checked_add(value)
            .filter(|total| *total <= MAX_AMOUNT)
            .ok_or_else(|| {
                RuleError::new(
                    ErrorCode::InvalidTxOutValue,
                    "Total value of all transaction outputs exceeds the max allowed value",
                )
            })?;
    }

    // Check for duplicate inputs.
    let mut seen_inputs = HashSet::with_capacity(tx.inputs.len());
    for (index, input) in tx.inputs.iter().enumerate() {
        if !seen_inputs.insert(input.previous_out) {
            return Err(RuleError::new(
                ErrorCode::DuplicateTxInputs,
                format!("Transaction contains duplicate inputs at index {index}"),
            ));
        }
    }

    if tx.is_coinbase() {
        let script_len = tx.inputs[0].sign_script.len();
        if !(MIN_COINBASE_SCRIPT_LEN..=MAX_COINBASE_SCRIPT_LEN).contains(&script_len) {
            return Err(RuleError::new(
                ErrorCode::BadCoinbaseScriptLen,
                format!(
                    "Coinbase transaction script length of {script_len} is out of range \
                    (min: {MIN_COINBASE_SCRIPT_LEN}, max: {MAX_COINBASE_SCRIPT_LEN})"
                ),
            ));
        }
    } else if tx.inputs.iter().any(|input| input.previous_out.is_null()) {
        return Err(RuleError::new(
            ErrorCode::InvalidTxInput,
            "Transaction input refers to previous output that is null",
        ));
    }

    Ok(())
}

/// Checks the inputs of a non-coinbase transaction against `view` and returns its fee.
///
/// `origin_layer` resolves the main layer of the block that created a spent output, used for
/// the coinbase maturity rule.
pub fn check_transaction_inputs(
    tx: &Transaction,
    tx_layer: u64,
    view: &UtxoViewpoint,
    origin_layer: impl Fn(&Hash) -> Option<u64>,
    coinbase_maturity: u64,
) -> Result<u64, RuleError> {
    let tx_hash = tx.hash();
    let mut total_input_value = 0u64;

    for (index, input) in tx.inputs.iter().enumerate() {
        let outpoint = input.previous_out;
        let entry = view
            .lookup_entry(&outpoint)
            .filter(|entry| !entry.is_spent())
            .ok_or_else(|| {
                RuleError::new(
                    ErrorCode::MissingTxOut,
                    format!(
                        "Output {outpoint} referenced from transaction {tx_hash}:{index} \
                        either does not exist or has already been spent"
                    ),
                )
            })?;

        if entry.is_coinbase() {
            let origin = origin_layer(&entry.block_hash()).ok_or_else(|| {
                RuleError::new(
                    ErrorCode::MissingTxOut,
                    format!(
                        "Block {} holding coinbase output {outpoint} is unknown",
                        entry.block_hash()
                    ),
                )
            })?;
            let blocks_since_prev = tx_layer.saturating_sub(origin);
            if blocks_since_prev < coinbase_maturity {
                return Err(RuleError::new(
                    ErrorCode::ImmatureSpend,
                    format!(
                        "Tried to spend coinbase output {outpoint} from layer {origin} at layer \
                        {tx_layer} before required maturity of {coinbase_maturity} blocks"
                    ),
                ));
            }
        }

        let value = entry.amount().value;
        if value > MAX_AMOUNT {
            return Err(RuleError::new(
                ErrorCode::InvalidTxOutValue,
                format!("Transaction input value of {value} is higher than max of {MAX_AMOUNT}"),
            ));
        }

        total_input_value = total_input_value
            .checked_add(value)
            .filter(|total| *total <= MAX_AMOUNT)
            .ok_or_else(|| {
                RuleError::new(
                    ErrorCode::InvalidTxOutValue,
                    "Total value of all transaction inputs exceeds the max allowed value",
                )
            })?;
    }

    let total_output_value = tx
        .outputs
        .iter()
        .map(|output| output.amount.value)
        .sum::<u64>();

    // Total input value must be no less than total output value.
    // Tx fee is the difference between inputs and outputs.
    total_input_value
        .checked_sub(total_output_value)
        .ok_or_else(|| {
            RuleError::new(
                ErrorCode::SpendTooHigh,
                format!(
                    "Total value of all transaction outputs for transaction {tx_hash} is \
                    {total_output_value}, which is more than the total input value of \
                    {total_input_value}"
                ),
            )
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use dagchain_primitives::{Amount, OutPoint, TxInput, TxOutput};
    use dagchain_utxo::UtxoEntry;
    use dagchain_primitives::TxType;

    fn tx(inputs: Vec<OutPoint>, values: &[u64]) -> Transaction {
        Transaction {
            version: 1,
            lock_time: 0,
            expire: 0,
            inputs: inputs
                .into_iter()
                .map(|outpoint| TxInput::new(outpoint, vec![0x51]))
                .collect(),
            outputs: values
                .iter()
                .map(|value| TxOutput::new(Amount::meer(*value), vec![0x51]))
                .collect(),
        }
    }

    fn outpoint(byte: u8, index: u32) -> OutPoint {
        OutPoint::new(Hash::from_byte_array([byte; 32]), index)
    }

    #[test]
    fn test_is_final() {
        let mut tx = tx(vec![outpoint(1, 0)], &[1]);
        assert!(is_final(&tx, 0, 0));

        tx.lock_time = 10;
        assert!(is_final(&tx, 11, 0));
        tx.inputs[0].sequence = 0;
        assert!(!is_final(&tx, 10, 0));
        tx.inputs[0].sequence = MAX_TX_IN_SEQUENCE_NUM;
        assert!(is_final(&tx, 10, 0));

        tx.inputs[0].sequence = 0;
        tx.lock_time = LOCK_TIME_THRESHOLD + 100;
        assert!(!is_final(&tx, 1_000_000, LOCK_TIME_THRESHOLD + 100));
        assert!(is_final(&tx, 0, LOCK_TIME_THRESHOLD + 101));
    }

    #[test]
    fn test_is_expired() {
        let mut tx = tx(vec![outpoint(1, 0)], &[1]);
        assert!(!is_expired(&tx, u64::MAX));
        tx.expire = 5;
        assert!(!is_expired(&tx, 4));
        assert!(is_expired(&tx, 5));
    }

    #[test]
    fn test_transaction_sanity() {
        let max = 100_000;
        assert!(check_transaction_sanity(&tx(vec![outpoint(1, 0)], &[1]), max).is_ok());

        let code = |tx: &Transaction| check_transaction_sanity(tx, max).unwrap_err().code;
        assert_eq!(code(&tx(vec![], &[1])), ErrorCode::NoTxInputs);
        assert_eq!(code(&tx(vec![outpoint(1, 0)], &[])), ErrorCode::NoTxOutputs);
        assert_eq!(
            code(&tx(vec![outpoint(1, 0)], &[MAX_AMOUNT + 1])),
            ErrorCode::InvalidTxOutValue
        );
        assert_eq!(
            code(&tx(vec![outpoint(1, 0)], &[MAX_AMOUNT, 1])),
            ErrorCode::InvalidTxOutValue
        );
        assert_eq!(
            code(&tx(vec![outpoint(1, 0), outpoint(1, 0)], &[1])),
            ErrorCode::DuplicateTxInputs
        );
        assert_eq!(
            code(&tx(vec![outpoint(1, 0), OutPoint::null()], &[1])),
            ErrorCode::InvalidTxInput
        );

        let mut coinbase = tx(vec![OutPoint::null()], &[1]);
        assert_eq!(code(&coinbase), ErrorCode::BadCoinbaseScriptLen);
        coinbase.inputs[0].sign_script = vec![1, 2];
        assert!(check_transaction_sanity(&coinbase, max).is_ok());

        let big = tx(vec![outpoint(1, 0)], &[1; 64]);
        assert_eq!(
            check_transaction_sanity(&big, 100).unwrap_err().code,
            ErrorCode::TxTooBig
        );
    }

    #[test]
    fn test_check_transaction_inputs() {
        let origin = Hash::from_byte_array([7; 32]);
        let mut view = UtxoViewpoint::new();
        view.add_entry(
            outpoint(1, 0),
            UtxoEntry::new(Amount::meer(50), vec![0x51], origin, 1, TxType::Coinbase, true, false),
        );
        view.add_entry(
            outpoint(2, 0),
            UtxoEntry::new(Amount::meer(30), vec![0x51], origin, 1, TxType::Regular, false, false),
        );
        let origin_layer = |hash: &Hash| (*hash == origin).then_some(10);

        let spend = tx(vec![outpoint(1, 0), outpoint(2, 0)], &[70]);
        assert_eq!(check_transaction_inputs(&spend, 14, &view, origin_layer, 4), Ok(10));

        let err = check_transaction_inputs(&spend, 13, &view, origin_layer, 4).unwrap_err();
        assert_eq!(err.code, ErrorCode::ImmatureSpend);

        let overspend = tx(vec![outpoint(2, 0)], &[31]);
        let err = check_transaction_inputs(&overspend, 14, &view, origin_layer, 4).unwrap_err();
        assert_eq!(err.code, ErrorCode::SpendTooHigh);

        let missing = tx(vec![outpoint(3, 0)], &[1]);
        let err = check_transaction_inputs(&missing, 14, &view, origin_layer, 4).unwrap_err();
        assert_eq!(err.code, ErrorCode::MissingTxOut);
    }
}
