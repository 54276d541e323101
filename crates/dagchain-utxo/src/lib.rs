//! Utxo set overlay, spend journal and their compact storage encodings.
//!
//! A [`UtxoViewpoint`] caches the outputs a block touches on top of a [`UtxoStore`]. Connecting a
//! block spends its inputs in the view and records one [`SpentTxOut`] per input; the journal of
//! those records is what allows the block to be disconnected again during a reorganization.

mod compressor;
mod entry;
mod error;
pub mod script;
mod serialize;
mod store;
mod stxo;
mod view;

pub use compressor::{
    compress_amount, compressed_txout_size, decompress_amount, read_compressed_txout,
    write_compressed_txout,
};
pub use entry::{UtxoEntry, UtxoFlags};
pub use error::Error;
pub use serialize::VarInt;
pub use store::{decode_outpoint_key, outpoint_key, tx_key_prefix, MemoryUtxoStore, UtxoStore};
pub use stxo::{
    count_spent_outputs, deserialize_spend_journal, serialize_spend_journal, SpentTxOut,
};
pub use view::UtxoViewpoint;

pub type Result<T, E = Error> = std::result::Result<T, E>;
