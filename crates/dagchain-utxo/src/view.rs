use crate::entry::UtxoEntry;
use crate::script::is_unspendable;
use crate::store::UtxoStore;
use crate::stxo::{count_spent_outputs, SpentTxOut};
use crate::Result;
use dagchain_primitives::{Hash, OutPoint, Transaction};
use std::collections::{BTreeMap, HashMap};

/// In-memory overlay of the utxo set as of a set of viewpoint blocks.
///
/// A missing key means the store has not been consulted yet. `None` records an output known
/// not to exist, so that it is not fetched again.
#[derive(Debug, Clone, Default)]
pub struct UtxoViewpoint {
    entries: BTreeMap<OutPoint, Option<UtxoEntry>>,
    viewpoints: Vec<Hash>,
}

impl UtxoViewpoint {
    pub fn new() -> Self {
        Self::default()
    }

    /// Blocks whose connected state this view represents.
    pub fn viewpoints(&self) -> &[Hash] {
        &self.viewpoints
    }

    pub fn set_viewpoints(&mut self, viewpoints: Vec<Hash>) {
        self.viewpoints = viewpoints;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the entry of `outpoint`, spent or not, if the view holds one.
    pub fn lookup_entry(&self, outpoint: &OutPoint) -> Option<&UtxoEntry> {
        self.entries.get(outpoint).and_then(Option::as_ref)
    }

    pub fn entries(&self) -> impl Iterator<Item = (&OutPoint, &UtxoEntry)> {
        self.entries
            .iter()
            .filter_map(|(outpoint, entry)| entry.as_ref().map(|entry| (outpoint, entry)))
    }

    /// Entries that differ from the store and must be written or deleted.
    pub fn modified_entries(&self) -> impl Iterator<Item = (&OutPoint, &UtxoEntry)> {
        self.entries().filter(|(_, entry)| entry.is_modified())
    }

    /// Adds an unspent entry that the store does not know about yet.
    pub fn add_entry(&mut self, outpoint: OutPoint, mut entry: UtxoEntry) {
        entry.set_modified();
        self.entries.insert(outpoint, Some(entry));
    }

    /// Adds every spendable output of `tx` as created in `block_hash`.
    pub fn add_tx_outputs(&mut self, tx: &Transaction, block_hash: Hash) {
        let tx_hash = tx.hash();
        for (index, output) in tx.outputs.iter().enumerate() {
            if is_unspendable(&output.pk_script) {
                continue;
            }
            self.add_entry(
                OutPoint::new(tx_hash, index as u32),
                UtxoEntry::from_tx_output(tx, output, block_hash),
            );
        }
    }

    /// Loads the given outputs from `store` unless the view already knows them.
    pub fn fetch_utxos<S: UtxoStore>(
        &mut self,
        store: &S,
        outpoints: impl IntoIterator<Item = OutPoint>,
    ) -> Result<()> {
        for outpoint in outpoints {
            if self.entries.contains_key(&outpoint) {
                continue;
            }
            let entry = store.fetch_utxo_entry(&outpoint)?;
            self.entries.insert(outpoint, entry);
        }
        Ok(())
    }

    /// Loads the outputs referenced by the inputs of `transactions`.
    ///
    /// Inputs spending an earlier transaction of the same block are resolved when that
    /// transaction is connected. Every output of a referenced transaction is loaded so that a
    /// spend can tell whether it empties the transaction. Outputs created by a block for which
    /// `is_invalid` returns true are dropped from the view.
    pub fn fetch_input_utxos<S: UtxoStore>(
        &mut self,
        store: &S,
        transactions: &[Transaction],
        is_invalid: impl Fn(&Hash) -> bool,
    ) -> Result<()> {
        let in_flight = transactions
            .iter()
            .enumerate()
            .map(|(index, tx)| (tx.hash(), index))
            .collect::<HashMap<_, _>>();

        for (tx_index, tx) in transactions.iter().enumerate() {
            if tx.is_coinbase() {
                continue;
            }

            for input in &tx.inputs {
                let outpoint = input.previous_out;

                if in_flight
                    .get(&outpoint.hash)
                    .is_some_and(|origin_index| *origin_index < tx_index)
                {
                    continue;
                }

                if self.entries.contains_key(&outpoint) {
                    continue;
                }

                for (out_index, entry) in store.fetch_tx_outputs(&outpoint.hash)? {
                    self.entries
                        .entry(OutPoint::new(outpoint.hash, out_index))
                        .or_insert(Some(entry));
                }
                self.entries.entry(outpoint).or_insert(None);
            }
        }

        for slot in self.entries.values_mut() {
            let Some(entry) = slot else {
                continue;
            };
            if entry.is_spent() || !is_invalid(&entry.block_hash()) {
                continue;
            }
            if entry.is_modified() {
                entry.spend();
            } else {
                *slot = None;
            }
        }

        Ok(())
    }

    /// Returns true if every output of `tx_hash` held by the view is spent.
    fn is_tx_fully_spent(&self, tx_hash: Hash) -> bool {
        self.entries
            .range(OutPoint::new(tx_hash, 0)..=OutPoint::new(tx_hash, u32::MAX))
            .all(|(_, entry)| entry.as_ref().is_none_or(UtxoEntry::is_spent))
    }

    fn sibling_tx_version<S: UtxoStore>(&self, store: &S, tx_hash: Hash) -> Result<Option<u32>> {
        let in_view = self
            .entries
            .range(OutPoint::new(tx_hash, 0)..=OutPoint::new(tx_hash, u32::MAX))
            .find_map(|(_, entry)| entry.as_ref().map(UtxoEntry::tx_version));
        if in_view.is_some() {
            return Ok(in_view);
        }
        Ok(store
            .fetch_tx_outputs(&tx_hash)?
            .first()
            .map(|(_, entry)| entry.tx_version()))
    }

    /// Spends the inputs of `tx` and adds its outputs.
    ///
    /// One [`SpentTxOut`] per input is appended to `stxos` when given.
    ///
    /// # Panics
    ///
    /// Panics if an input is missing from the view or already spent. Inputs are checked
    /// before connecting, so this is an internal invariant violation.
    pub fn connect_transaction(
        &mut self,
        tx: &Transaction,
        tx_index: u32,
        block_hash: Hash,
        mut stxos: Option<&mut Vec<SpentTxOut>>,
    ) {
        if tx.is_coinbase() {
            self.add_tx_outputs(tx, block_hash);
            return;
        }

        for (in_index, input) in tx.inputs.iter().enumerate() {
            let outpoint = input.previous_out;

            let mut stxo = match self.entries.get_mut(&outpoint) {
                Some(Some(entry)) if !entry.is_spent() => {
                    let stxo = SpentTxOut::from_entry(entry, tx_index, in_index as u32);
                    entry.spend();
                    stxo
                }
                _ => panic!(
                    "Connecting transaction {} with missing or spent input {outpoint}",
                    tx.hash()
                ),
            };

            let Some(stxos) = stxos.as_deref_mut() else {
                continue;
            };

            if self.is_tx_fully_spent(outpoint.hash) {
                stxo.tx_version = self.lookup_entry(&outpoint).map(UtxoEntry::tx_version);
            }
            stxos.push(stxo);
        }

        self.add_tx_outputs(tx, block_hash);
    }

    /// Undoes [`Self::connect_transaction`] for `transactions` of `block_hash` using the
    /// journal the connection produced.
    ///
    /// `transactions` may be a prefix of a block when rolling back a partially connected one.
    ///
    /// # Panics
    ///
    /// Panics if `stxos` does not hold exactly one record per input of `transactions`, or if
    /// the version of a resurrected output cannot be found.
    pub fn disconnect_transactions<S: UtxoStore>(
        &mut self,
        store: &S,
        transactions: &[Transaction],
        block_hash: Hash,
        stxos: &[SpentTxOut],
    ) -> Result<()> {
        let expected = count_spent_outputs(transactions);
        assert_eq!(
            stxos.len(),
            expected,
            "Spend journal of block {block_hash} has {} records, transactions spend {expected}",
            stxos.len()
        );

        let mut stxo_index = stxos.len();

        for tx in transactions.iter().rev() {
            let tx_hash = tx.hash();

            for (index, output) in tx.outputs.iter().enumerate() {
                if is_unspendable(&output.pk_script) {
                    continue;
                }
                let slot = self
                    .entries
                    .entry(OutPoint::new(tx_hash, index as u32))
                    .or_insert(None);
                slot.get_or_insert_with(|| UtxoEntry::from_tx_output(tx, output, block_hash))
                    .spend();
            }

            if tx.is_coinbase() {
                continue;
            }

            for input in tx.inputs.iter().rev() {
                stxo_index -= 1;
                let stxo = &stxos[stxo_index];
                let outpoint = input.previous_out;

                let tx_version = match stxo.tx_version {
                    Some(version) => version,
                    None => self.sibling_tx_version(store, outpoint.hash)?.unwrap_or_else(|| {
                        panic!("No unspent sibling left to recover the version of {outpoint}")
                    }),
                };

                self.add_entry(
                    outpoint,
                    UtxoEntry::new(
                        stxo.amount,
                        stxo.pk_script.clone(),
                        stxo.block_hash,
                        tx_version,
                        stxo.tx_type,
                        stxo.is_coinbase,
                        stxo.has_expiry,
                    ),
                );
            }
        }

        Ok(())
    }

    /// Forgets entries known to be absent and spent entries once the store reflects the view.
    pub fn commit(&mut self) {
        self.entries.retain(|_, slot| match slot {
            Some(entry) if entry.is_modified() && entry.is_spent() => false,
            Some(entry) => {
                entry.clear_modified();
                true
            }
            None => false,
        });
    }
}
