//! Spent transaction outputs and the per-block spend journal.
//!
//! Connecting a block records one [`SpentTxOut`] per spent input, in spend order. The journal
//! stores them newest first so that disconnecting replays the records front to back.

use crate::compressor::{compressed_txout_size, read_compressed_txout, write_compressed_txout};
use crate::entry::UtxoEntry;
use crate::serialize::{read_hash, read_u16_be, read_u32_be, VarInt};
use crate::{Error, Result};
use dagchain_primitives::{Amount, CoinId, Hash, Transaction, TxType, HASH_SIZE};

const STXO_COINBASE: u64 = 1 << 0;
const STXO_HAS_EXPIRY: u64 = 1 << 1;
const STXO_TX_TYPE_SHIFT: u64 = 2;
const STXO_FULLY_SPENT: u64 = 1 << 4;

/// Enough of a spent output to put it back into the utxo set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpentTxOut {
    pub amount: Amount,
    pub pk_script: Vec<u8>,
    /// Block that created the output.
    pub block_hash: Hash,
    pub is_coinbase: bool,
    pub has_expiry: bool,
    pub tx_type: TxType,
    /// Version of the creating transaction, only kept when this spend left no unspent output
    /// of that transaction behind.
    pub tx_version: Option<u32>,
    /// Index of the spending transaction in its block.
    pub tx_index: u32,
    /// Index of the input within the spending transaction.
    pub in_index: u32,
}

impl SpentTxOut {
    pub(crate) fn from_entry(entry: &UtxoEntry, tx_index: u32, in_index: u32) -> Self {
        Self {
            amount: entry.amount(),
            pk_script: entry.pk_script().to_vec(),
            block_hash: entry.block_hash(),
            is_coinbase: entry.is_coinbase(),
            has_expiry: entry.has_expiry(),
            tx_type: entry.tx_type(),
            tx_version: None,
            tx_index,
            in_index,
        }
    }

    pub fn is_fully_spent(&self) -> bool {
        self.tx_version.is_some()
    }

    fn flags(&self) -> u64 {
        let mut flags = u64::from(self.tx_type.to_bits()) << STXO_TX_TYPE_SHIFT;
        if self.is_coinbase {
            flags |= STXO_COINBASE;
        }
        if self.has_expiry {
            flags |= STXO_HAS_EXPIRY;
        }
        if self.is_fully_spent() {
            flags |= STXO_FULLY_SPENT;
        }
        flags
    }

    pub fn serialized_size(&self) -> usize {
        VarInt(self.flags()).serialized_size()
            + HASH_SIZE
            + 2
            + compressed_txout_size(self.amount.value, &self.pk_script)
            + self
                .tx_version
                .map_or(0, |version| VarInt(u64::from(version)).serialized_size())
            + 8
    }

    /// `[flags VLQ][blockHash][coinId 2BE][compressed txout][txVersion VLQ if fully spent]
    /// [txIndex 4BE][inIndex 4BE]`
    pub fn serialize_to(&self, out: &mut Vec<u8>) {
        VarInt(self.flags()).serialize(out);
        out.extend_from_slice(self.block_hash.as_bytes());
        out.extend_from_slice(&self.amount.id.0.to_be_bytes());
        write_compressed_txout(out, self.amount.value, &self.pk_script);
        if let Some(version) = self.tx_version {
            VarInt(u64::from(version)).serialize(out);
        }
        out.extend_from_slice(&self.tx_index.to_be_bytes());
        out.extend_from_slice(&self.in_index.to_be_bytes());
    }

    pub fn deserialize_from(input: &mut &[u8]) -> Result<Self> {
        let flags = VarInt::deserialize(input)?;
        let tx_type = TxType::from_bits(((flags >> STXO_TX_TYPE_SHIFT) & 0x03) as u8)
            .ok_or_else(|| Error::deserialize("stxo", format!("unknown tx type in flags {flags}")))?;

        let block_hash = read_hash(input, "stxo block hash")?;
        let coin_id = read_u16_be(input, "stxo coin id")?;
        let (value, pk_script) = read_compressed_txout(input)?;

        let tx_version = if flags & STXO_FULLY_SPENT != 0 {
            let version = VarInt::deserialize(input)?;
            Some(u32::try_from(version).map_err(|_| {
                Error::deserialize("stxo", format!("tx version {version} overflows u32"))
            })?)
        } else {
            None
        };

        Ok(Self {
            amount: Amount::new(value, CoinId(coin_id)),
            pk_script,
            block_hash,
            is_coinbase: flags & STXO_COINBASE != 0,
            has_expiry: flags & STXO_HAS_EXPIRY != 0,
            tx_type,
            tx_version,
            tx_index: read_u32_be(input, "stxo tx index")?,
            in_index: read_u32_be(input, "stxo input index")?,
        })
    }
}

/// Number of outputs connecting `transactions` spends, i.e. the exact number of journal records
/// such a block produces.
pub fn count_spent_outputs(transactions: &[Transaction]) -> usize {
    transactions
        .iter()
        .filter(|tx| !tx.is_coinbase())
        .map(|tx| tx.inputs.len())
        .sum()
}

/// Encodes a block's spend journal. `stxos` are given in spend order.
pub fn serialize_spend_journal(stxos: &[SpentTxOut]) -> Vec<u8> {
    let size = 4 + stxos.iter().map(SpentTxOut::serialized_size).sum::<usize>();
    let mut out = Vec::with_capacity(size);
    out.extend_from_slice(&(stxos.len() as u32).to_be_bytes());
    for stxo in stxos.iter().rev() {
        stxo.serialize_to(&mut out);
    }
    out
}

/// Decodes a spend journal back into spend order.
pub fn deserialize_spend_journal(serialized: &[u8]) -> Result<Vec<SpentTxOut>> {
    let mut input = serialized;
    let count = read_u32_be(&mut input, "spend journal count")? as usize;

    // Every record takes at least 43 bytes.
    if count > input.len() / 43 + 1 {
        return Err(Error::deserialize(
            "spend journal",
            format!("{count} records cannot fit in {} bytes", input.len()),
        ));
    }

    let mut stxos = Vec::with_capacity(count);
    for _ in 0..count {
        stxos.push(SpentTxOut::deserialize_from(&mut input)?);
    }

    if !input.is_empty() {
        return Err(Error::deserialize(
            "spend journal",
            format!("{} trailing bytes", input.len()),
        ));
    }

    stxos.reverse();
    Ok(stxos)
}
