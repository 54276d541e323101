#![allow(dead_code)]

use dagchain_consensus::{BlockChain, ChainConfig, ChainParams, Network};
use dagchain_primitives::pow::{compact_to_big, hash_to_big};
use dagchain_primitives::{
    Amount, Block, BlockHeader, Hash, OutPoint, Transaction, TxInput, TxOutput, ATOMS_PER_COIN,
};
use dagchain_utxo::script::{OP_CHECKSIG, OP_DUP, OP_EQUALVERIFY, OP_HASH160};
use std::path::Path;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

/// Regtest genesis timestamp.
const GENESIS_TIME: u32 = 1_700_000_000;

static CLOCK: AtomicU32 = AtomicU32::new(GENESIS_TIME + 1);
static COINBASE_TAG: AtomicU64 = AtomicU64::new(1);

pub fn regtest_params() -> ChainParams {
    ChainParams::new(Network::Regtest)
}

pub fn regtest_config(dir: &Path) -> ChainConfig {
    ChainConfig::new(dir, Network::Regtest)
}

pub fn open_chain(dir: &Path) -> BlockChain {
    BlockChain::new(&regtest_config(dir), regtest_params()).unwrap()
}

pub fn p2pkh(fill: u8) -> Vec<u8> {
    let mut script = vec![OP_DUP, OP_HASH160, 20];
    script.extend_from_slice(&[fill; 20]);
    script.extend_from_slice(&[OP_EQUALVERIFY, OP_CHECKSIG]);
    script
}

/// A coinbase paying `value` atoms, unique across the test binary.
pub fn coinbase(value: u64) -> Transaction {
    let tag = COINBASE_TAG.fetch_add(1, Ordering::Relaxed);
    Transaction {
        version: 1,
        lock_time: 0,
        expire: 0,
        inputs: vec![TxInput::new(OutPoint::null(), tag.to_le_bytes().to_vec())],
        outputs: vec![TxOutput::new(Amount::meer(value), p2pkh(1))],
    }
}

/// Spends `outpoint` into a single output of `value` atoms.
pub fn spend(outpoint: OutPoint, value: u64, fill: u8) -> Transaction {
    Transaction {
        version: 1,
        lock_time: 0,
        expire: 0,
        inputs: vec![TxInput::new(outpoint, vec![0x51])],
        outputs: vec![TxOutput::new(Amount::meer(value), p2pkh(fill))],
    }
}

/// Builds a mined block on `parents` with a one coin coinbase followed by `transactions`.
pub fn make_block(parents: &[Hash], transactions: Vec<Transaction>) -> Block {
    make_block_with(parents, coinbase(ATOMS_PER_COIN), transactions, regtest_params().pow_limit_bits)
}

pub fn make_block_with(
    parents: &[Hash],
    coinbase: Transaction,
    transactions: Vec<Transaction>,
    bits: u32,
) -> Block {
    let mut block = Block {
        header: BlockHeader {
            version: 1,
            parent_root: Hash::ZERO,
            tx_root: Hash::ZERO,
            state_root: Hash::ZERO,
            timestamp: CLOCK.fetch_add(1, Ordering::Relaxed),
            bits,
            nonce: 0,
        },
        parents: parents.to_vec(),
        transactions: std::iter::once(coinbase).chain(transactions).collect(),
    };
    block.header.parent_root = block.compute_parent_root();
    block.header.tx_root = block.compute_tx_root();

    let target = compact_to_big(bits);
    while hash_to_big(&block.hash()) > target {
        block.header.nonce += 1;
    }

    block
}

/// Outpoint of the first coinbase output of `block`.
pub fn coinbase_outpoint(block: &Block) -> OutPoint {
    OutPoint::new(block.transactions[0].hash(), 0)
}
