use crate::compressor::{compressed_txout_size, read_compressed_txout, write_compressed_txout};
use crate::serialize::{read_hash, read_u16_be, VarInt};
use crate::{Error, Result};
use dagchain_primitives::{Amount, CoinId, Hash, Transaction, TxOutput, TxType, HASH_SIZE};

bitflags::bitflags! {
    /// State of a [`UtxoEntry`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct UtxoFlags: u8 {
        /// Output of a coinbase transaction.
        const COINBASE = 1 << 0;
        /// The creating transaction carries an expiry.
        const HAS_EXPIRY = 1 << 1;
        /// The output has been spent in the view.
        const SPENT = 1 << 2;
        /// The entry differs from the backing store.
        const MODIFIED = 1 << 3;
    }
}

/// One unspent transaction output together with its origin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UtxoEntry {
    amount: Amount,
    pk_script: Vec<u8>,
    block_hash: Hash,
    tx_version: u32,
    tx_type: TxType,
    flags: UtxoFlags,
}

impl UtxoEntry {
    /// Creates an unspent, unmodified entry.
    pub fn new(
        amount: Amount,
        pk_script: Vec<u8>,
        block_hash: Hash,
        tx_version: u32,
        tx_type: TxType,
        is_coinbase: bool,
        has_expiry: bool,
    ) -> Self {
        let mut flags = UtxoFlags::empty();
        flags.set(UtxoFlags::COINBASE, is_coinbase);
        flags.set(UtxoFlags::HAS_EXPIRY, has_expiry);
        Self {
            amount,
            pk_script,
            block_hash,
            tx_version,
            tx_type,
            flags,
        }
    }

    /// Entry for an output of `tx` created in `block_hash`.
    pub fn from_tx_output(tx: &Transaction, output: &TxOutput, block_hash: Hash) -> Self {
        Self::new(
            output.amount,
            output.pk_script.clone(),
            block_hash,
            tx.version,
            tx.tx_type(),
            tx.is_coinbase(),
            tx.has_expiry(),
        )
    }

    pub fn amount(&self) -> Amount {
        self.amount
    }

    pub fn pk_script(&self) -> &[u8] {
        &self.pk_script
    }

    /// Block that created the output.
    pub fn block_hash(&self) -> Hash {
        self.block_hash
    }

    pub fn tx_version(&self) -> u32 {
        self.tx_version
    }

    pub fn tx_type(&self) -> TxType {
        self.tx_type
    }

    pub fn flags(&self) -> UtxoFlags {
        self.flags
    }

    pub fn is_coinbase(&self) -> bool {
        self.flags.contains(UtxoFlags::COINBASE)
    }

    pub fn has_expiry(&self) -> bool {
        self.flags.contains(UtxoFlags::HAS_EXPIRY)
    }

    pub fn is_spent(&self) -> bool {
        self.flags.contains(UtxoFlags::SPENT)
    }

    pub fn is_modified(&self) -> bool {
        self.flags.contains(UtxoFlags::MODIFIED)
    }

    /// Marks the output spent. Spending twice is a no-op.
    pub fn spend(&mut self) {
        if self.is_spent() {
            return;
        }
        self.flags |= UtxoFlags::SPENT | UtxoFlags::MODIFIED;
    }

    pub(crate) fn set_modified(&mut self) {
        self.flags |= UtxoFlags::MODIFIED;
    }

    pub(crate) fn clear_modified(&mut self) {
        self.flags.remove(UtxoFlags::MODIFIED);
    }

    /// `bit0` coinbase, `bit1` has expiry, `bits 2-3` tx type, `bits 4+` tx version.
    fn header_code(&self) -> u64 {
        u64::from(self.is_coinbase())
            | u64::from(self.has_expiry()) << 1
            | u64::from(self.tx_type.to_bits()) << 2
            | u64::from(self.tx_version) << 4
    }

    /// Serializes the entry as `[headerCode VLQ][blockHash][coinId 2BE][compressed txout]`.
    ///
    /// Spent outputs have no serialization.
    pub fn serialize(&self) -> Option<Vec<u8>> {
        if self.is_spent() {
            return None;
        }

        let header_code = VarInt(self.header_code());
        let size = header_code.serialized_size()
            + HASH_SIZE
            + 2
            + compressed_txout_size(self.amount.value, &self.pk_script);

        let mut out = Vec::with_capacity(size);
        header_code.serialize(&mut out);
        out.extend_from_slice(self.block_hash.as_bytes());
        out.extend_from_slice(&self.amount.id.0.to_be_bytes());
        write_compressed_txout(&mut out, self.amount.value, &self.pk_script);

        Some(out)
    }

    pub fn deserialize(serialized: &[u8]) -> Result<Self> {
        let mut input = serialized;

        let code = VarInt::deserialize(&mut input)?;
        let tx_type = TxType::from_bits(((code >> 2) & 0x03) as u8).ok_or_else(|| {
            Error::deserialize("utxo entry", format!("unknown tx type in header code {code}"))
        })?;
        let tx_version = u32::try_from(code >> 4).map_err(|_| {
            Error::deserialize("utxo entry", format!("tx version overflow in header code {code}"))
        })?;

        let block_hash = read_hash(&mut input, "utxo entry block hash")?;
        let coin_id = read_u16_be(&mut input, "utxo entry coin id")?;
        let (value, pk_script) = read_compressed_txout(&mut input)?;

        Ok(Self::new(
            Amount::new(value, CoinId(coin_id)),
            pk_script,
            block_hash,
            tx_version,
            tx_type,
            code & 0x01 != 0,
            code & 0x02 != 0,
        ))
    }
}
