use crate::entry::UtxoEntry;
use crate::serialize::{read_hash, VarInt};
use crate::view::UtxoViewpoint;
use crate::{Error, Result};
use dagchain_primitives::{Hash, OutPoint, HASH_SIZE};
use std::collections::BTreeMap;

/// Read access to the persisted utxo set.
///
/// Absence is not an error: a missing output is reported as `Ok(None)`.
pub trait UtxoStore {
    fn fetch_utxo_entry(&self, outpoint: &OutPoint) -> Result<Option<UtxoEntry>>;

    /// Returns every stored output of the transaction `tx_hash` as `(output index, entry)`.
    fn fetch_tx_outputs(&self, tx_hash: &Hash) -> Result<Vec<(u32, UtxoEntry)>>;
}

impl<T: UtxoStore + ?Sized> UtxoStore for &T {
    fn fetch_utxo_entry(&self, outpoint: &OutPoint) -> Result<Option<UtxoEntry>> {
        (**self).fetch_utxo_entry(outpoint)
    }

    fn fetch_tx_outputs(&self, tx_hash: &Hash) -> Result<Vec<(u32, UtxoEntry)>> {
        (**self).fetch_tx_outputs(tx_hash)
    }
}

/// `[txHash][outputIndex VLQ]`
pub fn outpoint_key(outpoint: &OutPoint) -> Vec<u8> {
    let index = VarInt(u64::from(outpoint.out_index));
    let mut key = Vec::with_capacity(HASH_SIZE + index.serialized_size());
    key.extend_from_slice(outpoint.hash.as_bytes());
    index.serialize(&mut key);
    key
}

/// Prefix shared by the keys of every output of `tx_hash`.
pub fn tx_key_prefix(tx_hash: &Hash) -> [u8; HASH_SIZE] {
    tx_hash.to_byte_array()
}

pub fn decode_outpoint_key(key: &[u8]) -> Result<OutPoint> {
    let mut input = key;
    let hash = read_hash(&mut input, "outpoint key hash")?;
    let index = VarInt::deserialize(&mut input)?;
    if !input.is_empty() {
        return Err(Error::deserialize("outpoint key", "trailing bytes"));
    }
    let out_index = u32::try_from(index)
        .map_err(|_| Error::deserialize("outpoint key", format!("index {index} overflows u32")))?;
    Ok(OutPoint::new(hash, out_index))
}

/// Utxo set held in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryUtxoStore {
    entries: BTreeMap<OutPoint, UtxoEntry>,
}

impl MemoryUtxoStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn insert(&mut self, outpoint: OutPoint, entry: UtxoEntry) {
        self.entries.insert(outpoint, entry);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&OutPoint, &UtxoEntry)> {
        self.entries.iter()
    }

    /// Writes the modified entries of `view`: spent ones are removed, the others stored.
    pub fn apply(&mut self, view: &UtxoViewpoint) {
        for (outpoint, entry) in view.modified_entries() {
            if entry.is_spent() {
                self.entries.remove(outpoint);
            } else {
                let mut entry = entry.clone();
                entry.clear_modified();
                self.entries.insert(*outpoint, entry);
            }
        }
    }
}

impl UtxoStore for MemoryUtxoStore {
    fn fetch_utxo_entry(&self, outpoint: &OutPoint) -> Result<Option<UtxoEntry>> {
        Ok(self.entries.get(outpoint).cloned())
    }

    fn fetch_tx_outputs(&self, tx_hash: &Hash) -> Result<Vec<(u32, UtxoEntry)>> {
        Ok(self
            .entries
            .range(OutPoint::new(*tx_hash, 0)..=OutPoint::new(*tx_hash, u32::MAX))
            .map(|(outpoint, entry)| (outpoint.out_index, entry.clone()))
            .collect())
    }
}
