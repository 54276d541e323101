use crate::encode::{write_compact_size, write_var_bytes, Encodable};
use crate::Hash;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lock times below this value are interpreted as main heights, above as unix timestamps.
pub const LOCK_TIME_THRESHOLD: u32 = 500_000_000;

/// Sequence number marking an input as final.
pub const MAX_TX_IN_SEQUENCE_NUM: u32 = u32::MAX;

/// Identifier of the coin type carried by an output.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct CoinId(pub u16);

impl CoinId {
    /// The native coin.
    pub const MEER: Self = Self(0);
}

/// Output value together with its coin type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Amount {
    pub value: u64,
    pub id: CoinId,
}

impl Amount {
    pub const fn new(value: u64, id: CoinId) -> Self {
        Self { value, id }
    }

    /// Amount of the native coin.
    pub const fn meer(value: u64) -> Self {
        Self {
            value,
            id: CoinId::MEER,
        }
    }
}

/// Two-bit transaction type recorded in the utxo set and spend journal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TxType {
    #[default]
    Regular = 0,
    Coinbase = 1,
}

impl TxType {
    pub fn from_bits(bits: u8) -> Option<Self> {
        match bits {
            0 => Some(Self::Regular),
            1 => Some(Self::Coinbase),
            _ => None,
        }
    }

    pub fn to_bits(self) -> u8 {
        self as u8
    }
}

/// Reference to a transaction output.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct OutPoint {
    pub hash: Hash,
    pub out_index: u32,
}

impl OutPoint {
    pub const fn new(hash: Hash, out_index: u32) -> Self {
        Self { hash, out_index }
    }

    /// The outpoint spent by coinbase inputs.
    pub const fn null() -> Self {
        Self {
            hash: Hash::ZERO,
            out_index: u32::MAX,
        }
    }

    pub fn is_null(&self) -> bool {
        self.out_index == u32::MAX && self.hash.is_zero()
    }
}

impl fmt::Display for OutPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.hash, self.out_index)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxInput {
    pub previous_out: OutPoint,
    pub sequence: u32,
    pub sign_script: Vec<u8>,
}

impl TxInput {
    pub fn new(previous_out: OutPoint, sign_script: Vec<u8>) -> Self {
        Self {
            previous_out,
            sequence: MAX_TX_IN_SEQUENCE_NUM,
            sign_script,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOutput {
    pub amount: Amount,
    pub pk_script: Vec<u8>,
}

impl TxOutput {
    pub fn new(amount: Amount, pk_script: Vec<u8>) -> Self {
        Self { amount, pk_script }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub version: u32,
    pub lock_time: u32,
    /// Main height at which the transaction expires, `0` means never.
    pub expire: u32,
    pub inputs: Vec<TxInput>,
    pub outputs: Vec<TxOutput>,
}

impl Transaction {
    pub fn hash(&self) -> Hash {
        Hash::double_sha256(&self.encode())
    }

    pub fn is_coinbase(&self) -> bool {
        self.inputs.len() == 1 && self.inputs[0].previous_out.is_null()
    }

    pub fn tx_type(&self) -> TxType {
        if self.is_coinbase() {
            TxType::Coinbase
        } else {
            TxType::Regular
        }
    }

    pub fn has_expiry(&self) -> bool {
        self.expire != 0
    }
}

impl Encodable for Transaction {
    fn encode_to(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.version.to_le_bytes());
        write_compact_size(out, self.inputs.len() as u64);
        for input in &self.inputs {
            out.extend_from_slice(input.previous_out.hash.as_bytes());
            out.extend_from_slice(&input.previous_out.out_index.to_le_bytes());
            out.extend_from_slice(&input.sequence.to_le_bytes());
            write_var_bytes(out, &input.sign_script);
        }
        write_compact_size(out, self.outputs.len() as u64);
        for output in &self.outputs {
            out.extend_from_slice(&output.amount.value.to_le_bytes());
            out.extend_from_slice(&output.amount.id.0.to_le_bytes());
            write_var_bytes(out, &output.pk_script);
        }
        out.extend_from_slice(&self.lock_time.to_le_bytes());
        out.extend_from_slice(&self.expire.to_le_bytes());
    }
}
