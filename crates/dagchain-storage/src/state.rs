use crate::{Error, Result};
use dagchain_primitives::{Hash, HASH_SIZE};
use num_bigint::BigUint;

/// Version of the overall database layout.
pub const DATABASE_VERSION: u32 = 1;
/// Version of the utxo and spend journal compression.
pub const COMPRESSION_VERSION: u32 = 1;
/// Version of the block index entry encoding.
pub const BLOCK_INDEX_VERSION: u32 = 1;

/// Persisted summary of the best chain, as of the main tip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BestChainState {
    pub hash: Hash,
    pub total_blocks: u64,
    pub total_txns: u64,
    pub work_sum: BigUint,
}

impl BestChainState {
    /// `[hash][totalBlocks 8BE][totalTxns 8BE][workSumLen 4BE][workSum BE bytes]`
    pub fn serialize(&self) -> Vec<u8> {
        let work_sum = self.work_sum.to_bytes_be();
        let mut out = Vec::with_capacity(HASH_SIZE + 8 + 8 + 4 + work_sum.len());
        out.extend_from_slice(self.hash.as_bytes());
        out.extend_from_slice(&self.total_blocks.to_be_bytes());
        out.extend_from_slice(&self.total_txns.to_be_bytes());
        out.extend_from_slice(&(work_sum.len() as u32).to_be_bytes());
        out.extend_from_slice(&work_sum);
        out
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Self> {
        const FIXED: usize = HASH_SIZE + 8 + 8 + 4;

        if bytes.len() < FIXED {
            return Err(Error::Corruption(format!(
                "best chain state is {} bytes, expected at least {FIXED}",
                bytes.len()
            )));
        }

        let (hash, rest) = bytes.split_at(HASH_SIZE);
        let (total_blocks, rest) = rest.split_at(8);
        let (total_txns, rest) = rest.split_at(8);
        let (work_sum_len, work_sum) = rest.split_at(4);

        let work_sum_len = u32::from_be_bytes(to_array(work_sum_len)) as usize;
        if work_sum.len() != work_sum_len {
            return Err(Error::Corruption(format!(
                "best chain state work sum is {} bytes, header says {work_sum_len}",
                work_sum.len()
            )));
        }

        Ok(Self {
            hash: Hash::from_byte_array(to_array(hash)),
            total_blocks: u64::from_be_bytes(to_array(total_blocks)),
            total_txns: u64::from_be_bytes(to_array(total_txns)),
            work_sum: BigUint::from_bytes_be(work_sum),
        })
    }
}

/// Versions of the stored data and the creation time of the database.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DatabaseInfo {
    pub version: u32,
    pub compression_version: u32,
    pub block_index_version: u32,
    /// Unix timestamp in seconds.
    pub created: u64,
}

impl DatabaseInfo {
    const SIZE: usize = 4 + 4 + 4 + 8;

    /// Info describing a database created now by this software.
    pub fn current(created: u64) -> Self {
        Self {
            version: DATABASE_VERSION,
            compression_version: COMPRESSION_VERSION,
            block_index_version: BLOCK_INDEX_VERSION,
            created,
        }
    }

    pub fn serialize(&self) -> [u8; Self::SIZE] {
        let mut out = [0u8; Self::SIZE];
        out[..4].copy_from_slice(&self.version.to_be_bytes());
        out[4..8].copy_from_slice(&self.compression_version.to_be_bytes());
        out[8..12].copy_from_slice(&self.block_index_version.to_be_bytes());
        out[12..].copy_from_slice(&self.created.to_be_bytes());
        out
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != Self::SIZE {
            return Err(Error::Corruption(format!(
                "database info is {} bytes, expected {}",
                bytes.len(),
                Self::SIZE
            )));
        }
        Ok(Self {
            version: u32::from_be_bytes(to_array(&bytes[..4])),
            compression_version: u32::from_be_bytes(to_array(&bytes[4..8])),
            block_index_version: u32::from_be_bytes(to_array(&bytes[8..12])),
            created: u64::from_be_bytes(to_array(&bytes[12..])),
        })
    }

    /// Fails if any stored version is newer than what this software understands.
    pub fn ensure_supported(&self) -> Result<()> {
        let checks = [
            ("layout", self.version, DATABASE_VERSION),
            ("compression", self.compression_version, COMPRESSION_VERSION),
            ("block index", self.block_index_version, BLOCK_INDEX_VERSION),
        ];
        for (what, found, supported) in checks {
            if found > supported {
                return Err(Error::NewerDatabase {
                    what,
                    found,
                    supported,
                });
            }
        }
        Ok(())
    }
}

/// Callers check the length beforehand.
fn to_array<const N: usize>(bytes: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(bytes);
    out
}
