//! Primitive types shared by the dagchain crates.
//!
//! - [`Hash`]: double SHA-256 digest identifying blocks and transactions.
//! - [`Block`], [`BlockHeader`]: a block references an ordered list of parents instead of a
//!   single predecessor.
//! - [`Transaction`], [`OutPoint`], [`Amount`]: UTXO model with coin ids.
//! - [`pow`]: compact difficulty bits and work.

mod block;
pub mod encode;
mod hash;
pub mod merkle;
pub mod pow;
mod transaction;

pub use block::{Block, BlockHeader, BLOCK_HEADER_SIZE};
pub use encode::Encodable;
pub use hash::{Hash, ParseHashError, HASH_SIZE};
pub use transaction::{
    Amount, CoinId, OutPoint, Transaction, TxInput, TxOutput, TxType, LOCK_TIME_THRESHOLD,
    MAX_TX_IN_SEQUENCE_NUM,
};

/// Number of atoms in one coin.
pub const ATOMS_PER_COIN: u64 = 100_000_000;

/// Maximum amount of atoms an output or a transaction may carry.
pub const MAX_AMOUNT: u64 = 21_000_000 * ATOMS_PER_COIN;
