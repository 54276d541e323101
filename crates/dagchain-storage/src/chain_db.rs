//! RocksDB backed chain database.

use crate::index::BlockIndexEntry;
use crate::state::{BestChainState, DatabaseInfo};
use crate::{cf, keys, Error, Result};
use dagchain_primitives::{Block, Hash, OutPoint};
use dagchain_utxo::{
    decode_outpoint_key, deserialize_spend_journal, outpoint_key, serialize_spend_journal,
    tx_key_prefix, SpentTxOut, UtxoEntry, UtxoStore, UtxoViewpoint,
};
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, Options, WriteBatch, DB};
use std::path::Path;

const COLUMN_FAMILIES: [&str; 7] = [
    cf::BLOCK_INDEX,
    cf::BLOCK_ORDER,
    cf::SPEND_JOURNAL,
    cf::UTXO_SET,
    cf::CHAIN_STATE,
    cf::DB_INFO,
    cf::BLOCKS,
];

/// Persistent chain state: blocks, block index, order index, utxo set, spend journals and the
/// best chain state.
///
/// Reads go straight to the database. Writes are grouped with [`ChainDb::update`] and applied
/// atomically.
pub struct ChainDb {
    db: DB,
}

impl ChainDb {
    /// Opens or creates the database at `path`.
    ///
    /// Fails with [`Error::NewerDatabase`] if the stored data comes from a newer version.
    pub fn open(path: &Path) -> Result<Self> {
        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);
        db_opts.set_compression_type(rocksdb::DBCompressionType::Lz4);

        let mut block_opts = rocksdb::BlockBasedOptions::default();
        block_opts.set_bloom_filter(10.0, false);
        db_opts.set_block_based_table_factory(&block_opts);

        let cf_descriptors = COLUMN_FAMILIES
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(*name, Options::default()))
            .collect::<Vec<_>>();

        let db = DB::open_cf_descriptors(&db_opts, path, cf_descriptors)?;
        let chain_db = Self { db };

        match chain_db.db_info()? {
            Some(info) => {
                info.ensure_supported()?;
                tracing::info!(
                    "Opened chain database at {} (version {}, created {})",
                    path.display(),
                    info.version,
                    info.created
                );
            }
            None => tracing::info!("Opened empty chain database at {}", path.display()),
        }

        Ok(chain_db)
    }

    fn cf(&self, name: &'static str) -> Result<&ColumnFamily> {
        self.db.cf_handle(name).ok_or(Error::NotInitialized(name))
    }

    fn get(&self, name: &'static str, key: impl AsRef<[u8]>) -> Result<Option<Vec<u8>>> {
        Ok(self.db.get_cf(self.cf(name)?, key)?)
    }

    /// Runs `f` against a write transaction and applies its writes atomically.
    ///
    /// Nothing is written if `f` fails.
    pub fn update<T, E>(&self, f: impl FnOnce(&mut WriteTransaction<'_>) -> Result<T, E>) -> Result<T, E>
    where
        E: From<Error>,
    {
        let mut tx = WriteTransaction {
            chain_db: self,
            batch: WriteBatch::default(),
        };
        let value = f(&mut tx)?;
        let len = tx.batch.len();
        self.db.write(tx.batch).map_err(Error::from)?;
        tracing::trace!("Committed {len} database operations");
        Ok(value)
    }

    /// Returns `None` for a database that has no chain state yet.
    pub fn db_info(&self) -> Result<Option<DatabaseInfo>> {
        self.get(cf::DB_INFO, keys::DB_INFO)?
            .map(|bytes| DatabaseInfo::deserialize(&bytes))
            .transpose()
    }

    pub fn best_chain_state(&self) -> Result<Option<BestChainState>> {
        self.get(cf::CHAIN_STATE, keys::BEST_CHAIN_STATE)?
            .map(|bytes| BestChainState::deserialize(&bytes))
            .transpose()
    }

    /// Cumulative subsidy paid out by the blue blocks of the main chain.
    pub fn total_subsidy(&self) -> Result<u64> {
        match self.get(cf::CHAIN_STATE, keys::TOTAL_SUBSIDY)? {
            Some(bytes) => {
                let bytes: [u8; 8] = bytes.as_slice().try_into().map_err(|_| {
                    Error::Corruption(format!("total subsidy is {} bytes", bytes.len()))
                })?;
                Ok(u64::from_be_bytes(bytes))
            }
            None => Ok(0),
        }
    }

    pub fn block(&self, hash: &Hash) -> Result<Option<Block>> {
        self.get(cf::BLOCKS, hash)?
            .map(|bytes| bincode::deserialize(&bytes).map_err(Error::from))
            .transpose()
    }

    pub fn has_block(&self, hash: &Hash) -> Result<bool> {
        Ok(self.get(cf::BLOCKS, hash)?.is_some())
    }

    pub fn block_index_entry(&self, hash: &Hash) -> Result<Option<BlockIndexEntry>> {
        self.get(cf::BLOCK_INDEX, hash)?
            .map(|bytes| BlockIndexEntry::decode(&bytes))
            .transpose()
    }

    /// Every block index entry, in arrival order.
    pub fn block_index_entries(&self) -> Result<Vec<BlockIndexEntry>> {
        let mut iter = self.db.raw_iterator_cf(self.cf(cf::BLOCK_INDEX)?);
        iter.seek_to_first();

        let mut entries = Vec::new();
        while iter.valid() {
            if let Some(value) = iter.value() {
                entries.push(BlockIndexEntry::decode(value)?);
            }
            iter.next();
        }
        iter.status()?;

        entries.sort_by_key(|entry| entry.arrival);
        Ok(entries)
    }

    pub fn block_hash_by_order(&self, order: u64) -> Result<Option<Hash>> {
        self.get(cf::BLOCK_ORDER, order.to_be_bytes())?
            .map(|bytes| {
                Hash::from_slice(&bytes).ok_or_else(|| {
                    Error::Corruption(format!("order {order} maps to {} bytes", bytes.len()))
                })
            })
            .transpose()
    }

    /// Number of consecutive orders stored from zero.
    pub fn order_count(&self) -> Result<u64> {
        let mut iter = self.db.raw_iterator_cf(self.cf(cf::BLOCK_ORDER)?);
        iter.seek_to_last();
        if !iter.valid() {
            iter.status()?;
            return Ok(0);
        }
        let key = iter.key().unwrap_or_default();
        let last: [u8; 8] = key
            .try_into()
            .map_err(|_| Error::Corruption(format!("order key is {} bytes", key.len())))?;
        Ok(u64::from_be_bytes(last) + 1)
    }

    /// Journal of the outputs spent by `hash`, in spend order.
    ///
    /// A block that was never connected, or that failed validation, has an empty journal.
    pub fn spend_journal(&self, hash: &Hash) -> Result<Vec<SpentTxOut>> {
        match self.get(cf::SPEND_JOURNAL, hash)? {
            Some(bytes) => Ok(deserialize_spend_journal(&bytes)?),
            None => Ok(Vec::new()),
        }
    }

    pub fn utxo_entry(&self, outpoint: &OutPoint) -> Result<Option<UtxoEntry>> {
        self.get(cf::UTXO_SET, outpoint_key(outpoint))?
            .map(|bytes| UtxoEntry::deserialize(&bytes).map_err(Error::from))
            .transpose()
    }

    /// Every stored output of `tx_hash`, ascending by output index.
    pub fn tx_outputs(&self, tx_hash: &Hash) -> Result<Vec<(u32, UtxoEntry)>> {
        let prefix = tx_key_prefix(tx_hash);
        let mut iter = self.db.raw_iterator_cf(self.cf(cf::UTXO_SET)?);
        iter.seek(prefix);

        let mut outputs = Vec::new();
        while iter.valid() {
            let (Some(key), Some(value)) = (iter.key(), iter.value()) else {
                break;
            };
            if !key.starts_with(&prefix) {
                break;
            }
            let outpoint = decode_outpoint_key(key)?;
            outputs.push((outpoint.out_index, UtxoEntry::deserialize(value)?));
            iter.next();
        }
        iter.status()?;

        Ok(outputs)
    }

    /// Number of entries in the utxo set.
    pub fn utxo_count(&self) -> Result<u64> {
        let mut iter = self.db.raw_iterator_cf(self.cf(cf::UTXO_SET)?);
        iter.seek_to_first();
        let mut count = 0;
        while iter.valid() {
            count += 1;
            iter.next();
        }
        iter.status()?;
        Ok(count)
    }
}

impl UtxoStore for ChainDb {
    fn fetch_utxo_entry(&self, outpoint: &OutPoint) -> dagchain_utxo::Result<Option<UtxoEntry>> {
        self.utxo_entry(outpoint)
            .map_err(|err| dagchain_utxo::Error::Store(Box::new(err)))
    }

    fn fetch_tx_outputs(&self, tx_hash: &Hash) -> dagchain_utxo::Result<Vec<(u32, UtxoEntry)>> {
        self.tx_outputs(tx_hash)
            .map_err(|err| dagchain_utxo::Error::Store(Box::new(err)))
    }
}

/// Pending writes of one [`ChainDb::update`].
pub struct WriteTransaction<'a> {
    chain_db: &'a ChainDb,
    batch: WriteBatch,
}

impl WriteTransaction<'_> {
    /// Reads committed state, pending writes of this transaction are not visible.
    pub fn chain_db(&self) -> &ChainDb {
        self.chain_db
    }

    fn put(&mut self, name: &'static str, key: impl AsRef<[u8]>, value: impl AsRef<[u8]>) -> Result<()> {
        let cf = self.chain_db.cf(name)?;
        self.batch.put_cf(cf, key, value);
        Ok(())
    }

    fn delete(&mut self, name: &'static str, key: impl AsRef<[u8]>) -> Result<()> {
        let cf = self.chain_db.cf(name)?;
        self.batch.delete_cf(cf, key);
        Ok(())
    }

    pub fn put_db_info(&mut self, info: &DatabaseInfo) -> Result<()> {
        self.put(cf::DB_INFO, keys::DB_INFO, info.serialize())
    }

    pub fn put_best_chain_state(&mut self, state: &BestChainState) -> Result<()> {
        self.put(cf::CHAIN_STATE, keys::BEST_CHAIN_STATE, state.serialize())
    }

    pub fn put_total_subsidy(&mut self, total_subsidy: u64) -> Result<()> {
        self.put(cf::CHAIN_STATE, keys::TOTAL_SUBSIDY, total_subsidy.to_be_bytes())
    }

    pub fn put_block(&mut self, block: &Block) -> Result<()> {
        let bytes = bincode::serialize(block)?;
        self.put(cf::BLOCKS, block.hash(), bytes)
    }

    pub fn put_block_index_entry(&mut self, entry: &BlockIndexEntry) -> Result<()> {
        let bytes = entry.encode()?;
        self.put(cf::BLOCK_INDEX, entry.hash(), bytes)
    }

    pub fn put_order(&mut self, order: u64, hash: &Hash) -> Result<()> {
        self.put(cf::BLOCK_ORDER, order.to_be_bytes(), hash)
    }

    pub fn delete_order(&mut self, order: u64) -> Result<()> {
        self.delete(cf::BLOCK_ORDER, order.to_be_bytes())
    }

    /// Stores the journal of `hash`, `stxos` in spend order.
    pub fn put_spend_journal(&mut self, hash: &Hash, stxos: &[SpentTxOut]) -> Result<()> {
        self.put(cf::SPEND_JOURNAL, hash, serialize_spend_journal(stxos))
    }

    pub fn delete_spend_journal(&mut self, hash: &Hash) -> Result<()> {
        self.delete(cf::SPEND_JOURNAL, hash)
    }

    /// Writes the modified entries of `view`, deleting the spent ones.
    pub fn put_utxo_view(&mut self, view: &UtxoViewpoint) -> Result<()> {
        for (outpoint, entry) in view.modified_entries() {
            let key = outpoint_key(outpoint);
            match entry.serialize() {
                Some(bytes) => self.put(cf::UTXO_SET, key, bytes)?,
                None => self.delete(cf::UTXO_SET, key)?,
            }
        }
        Ok(())
    }
}
