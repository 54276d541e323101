//! Consensus rules checked before a block enters the DAG.
//!
//! - [`check_block_sanity`]: context free checks on the block alone.
//! - [`check_block_context`]: checks against the main parent the block would extend.
//!
//! Input checks that depend on the utxo set live in [`tx_verify`] and run when the block gets
//! connected in its position of the total order.

pub mod tx_verify;

use crate::chain_params::ChainParams;
use crate::difficulty::calc_next_required_difficulty;
use crate::error::{ErrorCode, RuleError};
use dagchain_dag::{BlockIndex, NodeId};
use dagchain_primitives::pow::{compact_to_big, hash_to_big};
use dagchain_primitives::{Block, BlockHeader, Hash};
use dagchain_utxo::script::count_sig_ops;
use num_traits::Zero;
use std::collections::HashSet;

pub use tx_verify::{check_transaction_inputs, check_transaction_sanity, is_expired, is_final};

/// Smallest possible serialized transaction, bounds the transaction count of a block.
const MIN_TRANSACTION_SIZE: usize = 60;

bitflags::bitflags! {
    /// Modifiers of the block processing.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct BehaviorFlags: u32 {
        /// The block is known good: skip the checks which only guard against malicious blocks,
        /// such as the difficulty and script checks.
        const FAST_ADD = 1 << 0;
        /// Skip the proof of work check, for block templates and tests.
        const NO_POW_CHECK = 1 << 1;
    }
}

/// Ensures the bits are in range and, unless `NO_POW_CHECK` is given, that the block hash
/// meets the target.
pub fn check_proof_of_work(
    header: &BlockHeader,
    pow_limit_bits: u32,
    flags: BehaviorFlags,
) -> Result<(), RuleError> {
    let target = compact_to_big(header.bits);
    if target.is_zero() {
        return Err(RuleError::new(
            ErrorCode::UnexpectedDifficulty,
            format!("Block target difficulty of {:08x} is too low", header.bits),
        ));
    }

    let pow_limit = compact_to_big(pow_limit_bits);
    if target > pow_limit {
        return Err(RuleError::new(
            ErrorCode::UnexpectedDifficulty,
            format!(
                "Block target difficulty of {:08x} is higher than max of {pow_limit_bits:08x}",
                header.bits
            ),
        ));
    }

    if !flags.contains(BehaviorFlags::NO_POW_CHECK) {
        let hash = header.hash();
        if hash_to_big(&hash) > target {
            return Err(RuleError::new(
                ErrorCode::HighHash,
                format!(
                    "Block hash of {hash} is higher than expected max of {:08x}",
                    header.bits
                ),
            ));
        }
    }

    Ok(())
}

/// Signature operations of every input and output script of the block.
pub fn count_block_sig_ops(block: &Block) -> usize {
    block
        .transactions
        .iter()
        .map(|tx| {
            let inputs = tx
                .inputs
                .iter()
                .map(|input| count_sig_ops(&input.sign_script))
                .sum::<usize>();
            let outputs = tx
                .outputs
                .iter()
                .map(|output| count_sig_ops(&output.pk_script))
                .sum::<usize>();
            inputs + outputs
        })
        .sum()
}

/// Performs the context free checks of a block.
///
/// `now` is the local unix time in seconds.
pub fn check_block_sanity(
    block: &Block,
    params: &ChainParams,
    flags: BehaviorFlags,
    now: u32,
) -> Result<(), RuleError> {
    let header = &block.header;

    if block.parents.is_empty() {
        return Err(RuleError::new(ErrorCode::NoParents, "Block has no parents"));
    }

    let mut seen_parents = HashSet::with_capacity(block.parents.len());
    for parent in &block.parents {
        if !seen_parents.insert(*parent) {
            return Err(RuleError::new(
                ErrorCode::DuplicateParent,
                format!("Block references parent {parent} more than once"),
            ));
        }
    }

    let parent_root = block.compute_parent_root();
    if header.parent_root != parent_root {
        return Err(RuleError::new(
            ErrorCode::BadParentsMerkleRoot,
            format!(
                "Block parents root is invalid, header indicates {}, but calculated value is \
                {parent_root}",
                header.parent_root
            ),
        ));
    }

    let max_time = now.saturating_add(params.max_time_offset);
    if header.timestamp > max_time {
        return Err(RuleError::new(
            ErrorCode::TimeTooNew,
            format!(
                "Block timestamp of {} is too far in the future, max {max_time}",
                header.timestamp
            ),
        ));
    }

    check_proof_of_work(header, params.pow_limit_bits, flags)?;

    // Transaction list must be non-empty.
    if block.transactions.is_empty() {
        return Err(RuleError::new(ErrorCode::NoTransactions, "Block does not contain any transactions"));
    }

    let max_transactions = params.max_block_size / MIN_TRANSACTION_SIZE;
    if block.transactions.len() > max_transactions {
        return Err(RuleError::new(
            ErrorCode::TooManyTransactions,
            format!(
                "Block contains too many transactions: {}, max: {max_transactions}",
                block.transactions.len()
            ),
        ));
    }

    let size = block.size();
    if size > params.max_block_size {
        return Err(RuleError::new(
            ErrorCode::BlockTooBig,
            format!("Serialized block is too big: {size}, max: {}", params.max_block_size),
        ));
    }

    // First transaction must be coinbase, the rest must not be.
    if !block.transactions[0].is_coinbase() {
        return Err(RuleError::new(
            ErrorCode::FirstTxNotCoinbase,
            "First transaction in block is not a coinbase",
        ));
    }

    if let Some(index) = block
        .transactions
        .iter()
        .skip(1)
        .position(|tx| tx.is_coinbase())
    {
        return Err(RuleError::new(
            ErrorCode::MultipleCoinbases,
            format!("Block contains second coinbase at index {}", index + 1),
        ));
    }

    let mut seen_transactions = HashSet::with_capacity(block.transactions.len());
    let mut tx_hashes = Vec::with_capacity(block.transactions.len());
    for (index, tx) in block.transactions.iter().enumerate() {
        check_transaction_sanity(tx, params.max_tx_size)?;

        let tx_hash = tx.hash();
        if !seen_transactions.insert(tx_hash) {
            return Err(RuleError::new(
                ErrorCode::DuplicateTx,
                format!("Block contains duplicate transaction {tx_hash} at index {index}"),
            ));
        }
        tx_hashes.push(tx_hash);
    }

    let tx_root = dagchain_primitives::merkle::merkle_root(&tx_hashes);
    if header.tx_root != tx_root {
        return Err(RuleError::new(
            ErrorCode::BadMerkleRoot,
            format!(
                "Block merkle root is invalid, header indicates {}, but calculated value is \
                {tx_root}",
                header.tx_root
            ),
        ));
    }

    let sig_ops = count_block_sig_ops(block);
    if sig_ops > params.max_sig_ops_per_block {
        return Err(RuleError::new(
            ErrorCode::TooManySigOps,
            format!(
                "Block contains too many signature operations: {sig_ops}, max: {}",
                params.max_sig_ops_per_block
            ),
        ));
    }

    Ok(())
}

/// Checks the rules depending on the main parent the block extends.
///
/// - The timestamp must be after the past median time of the main parent.
/// - Unless `FAST_ADD` is given, the bits must match the retarget.
/// - Every transaction must be final and not expired at the block's layer.
pub fn check_block_context(
    block: &Block,
    index: &BlockIndex,
    main_parent: NodeId,
    params: &ChainParams,
    flags: BehaviorFlags,
) -> Result<(), RuleError> {
    let header = &block.header;
    let layer = index.node(main_parent).layer() + 1;

    let median_time = index.past_median_time(main_parent);
    if header.timestamp <= median_time {
        return Err(RuleError::new(
            ErrorCode::TimeTooOld,
            format!(
                "Block timestamp of {} is not after expected {median_time}",
                header.timestamp
            ),
        ));
    }

    if !flags.contains(BehaviorFlags::FAST_ADD) {
        let expected = calc_next_required_difficulty(index, Some(main_parent), params);
        if header.bits != expected {
            return Err(RuleError::new(
                ErrorCode::UnexpectedDifficulty,
                format!(
                    "Block difficulty of {:08x} is not the expected value of {expected:08x}",
                    header.bits
                ),
            ));
        }
    }

    for tx in &block.transactions {
        if !is_final(tx, layer, header.timestamp) {
            return Err(RuleError::new(
                ErrorCode::UnfinalizedTx,
                format!("Block contains unfinalized transaction {}", tx.hash()),
            ));
        }

        if is_expired(tx, layer) {
            return Err(RuleError::new(
                ErrorCode::ExpiredTx,
                format!(
                    "Block contains transaction {} expired at layer {}",
                    tx.hash(),
                    tx.expire
                ),
            ));
        }
    }

    Ok(())
}

/// Returns the parents of `block` that `have_block` does not know.
pub fn missing_parents(block: &Block, have_block: impl Fn(&Hash) -> bool) -> Vec<Hash> {
    block
        .parents
        .iter()
        .filter(|parent| !have_block(parent))
        .copied()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain_params::Network;
    use dagchain_primitives::merkle::merkle_root;
    use dagchain_primitives::{Amount, OutPoint, Transaction, TxInput, TxOutput};
    use dagchain_utxo::script::OP_CHECKSIG;

    fn coinbase(tag: u8) -> Transaction {
        Transaction {
            version: 1,
            lock_time: 0,
            expire: 0,
            inputs: vec![TxInput::new(OutPoint::null(), vec![tag, tag])],
            outputs: vec![TxOutput::new(Amount::meer(1), vec![0x51])],
        }
    }

    fn block(params: &ChainParams, transactions: Vec<Transaction>) -> Block {
        let parents = vec![params.genesis_hash()];
        let tx_hashes = transactions.iter().map(Transaction::hash).collect::<Vec<_>>();
        let mut block = Block {
            header: BlockHeader {
                version: 1,
                parent_root: merkle_root(&parents),
                tx_root: merkle_root(&tx_hashes),
                state_root: Hash::ZERO,
                timestamp: params.genesis_block.header.timestamp + 1,
                bits: params.pow_limit_bits,
                nonce: 0,
            },
            parents,
            transactions,
        };
        while check_proof_of_work(&block.header, params.pow_limit_bits, BehaviorFlags::empty())
            .is_err()
        {
            block.header.nonce += 1;
        }
        block
    }

    fn sanity_code(block: &Block, params: &ChainParams) -> ErrorCode {
        check_block_sanity(block, params, BehaviorFlags::NO_POW_CHECK, u32::MAX / 2)
            .unwrap_err()
            .code
    }

    #[test]
    fn test_valid_block_passes_sanity() {
        let params = ChainParams::new(Network::Regtest);
        let block = block(&params, vec![coinbase(1)]);
        let now = block.header.timestamp;
        assert!(check_block_sanity(&block, &params, BehaviorFlags::empty(), now).is_ok());
    }

    #[test]
    fn test_block_sanity_failures() {
        let params = ChainParams::new(Network::Regtest);
        let valid = block(&params, vec![coinbase(1)]);

        let mut b = valid.clone();
        b.parents.clear();
        assert_eq!(sanity_code(&b, &params), ErrorCode::NoParents);

        let mut b = valid.clone();
        b.parents.push(b.parents[0]);
        assert_eq!(sanity_code(&b, &params), ErrorCode::DuplicateParent);

        let mut b = valid.clone();
        b.parents = vec![Hash::from_byte_array([3; 32])];
        assert_eq!(sanity_code(&b, &params), ErrorCode::BadParentsMerkleRoot);

        let mut b = valid.clone();
        b.transactions.clear();
        b.header.tx_root = Hash::ZERO;
        assert_eq!(sanity_code(&b, &params), ErrorCode::NoTransactions);

        let mut b = valid.clone();
        b.header.tx_root = Hash::ZERO;
        assert_eq!(sanity_code(&b, &params), ErrorCode::BadMerkleRoot);

        let b = block(&params, vec![coinbase(1), coinbase(2)]);
        assert_eq!(sanity_code(&b, &params), ErrorCode::MultipleCoinbases);

        let mut spend = coinbase(1);
        spend.inputs[0].previous_out = OutPoint::new(Hash::from_byte_array([4; 32]), 0);
        let b = block(&params, vec![spend.clone()]);
        assert_eq!(sanity_code(&b, &params), ErrorCode::FirstTxNotCoinbase);

        let b = block(&params, vec![coinbase(1), spend.clone(), spend]);
        assert_eq!(sanity_code(&b, &params), ErrorCode::DuplicateTx);

        let mut greedy = coinbase(1);
        greedy.outputs[0].pk_script = vec![OP_CHECKSIG; 100];
        let mut tight = params.clone();
        tight.max_sig_ops_per_block = 99;
        let b = block(&tight, vec![greedy]);
        assert_eq!(sanity_code(&b, &tight), ErrorCode::TooManySigOps);

        let mut small = params.clone();
        small.max_block_size = 100;
        assert_eq!(sanity_code(&valid, &small), ErrorCode::BlockTooBig);
    }

    #[test]
    fn test_time_too_new() {
        let params = ChainParams::new(Network::Regtest);
        let block = block(&params, vec![coinbase(1)]);
        let now = block.header.timestamp - params.max_time_offset - 1;
        let err = check_block_sanity(&block, &params, BehaviorFlags::NO_POW_CHECK, now).unwrap_err();
        assert_eq!(err.code, ErrorCode::TimeTooNew);
    }

    #[test]
    fn test_proof_of_work_range() {
        let params = ChainParams::new(Network::Regtest);
        let mut header = block(&params, vec![coinbase(1)]).header;

        header.bits = 0;
        let err = check_proof_of_work(&header, params.pow_limit_bits, BehaviorFlags::NO_POW_CHECK)
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::UnexpectedDifficulty);

        header.bits = 0x2100ffff;
        let err = check_proof_of_work(&header, params.pow_limit_bits, BehaviorFlags::NO_POW_CHECK)
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::UnexpectedDifficulty);

        // A target of one is unreachable in practice.
        header.bits = 0x03000001;
        let err = check_proof_of_work(&header, params.pow_limit_bits, BehaviorFlags::empty())
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::HighHash);
        assert!(check_proof_of_work(&header, params.pow_limit_bits, BehaviorFlags::NO_POW_CHECK).is_ok());
    }
}
