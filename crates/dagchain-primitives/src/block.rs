use crate::encode::{write_compact_size, Encodable};
use crate::{Hash, Transaction};
use serde::{Deserialize, Serialize};

/// Size of the canonical header encoding.
pub const BLOCK_HEADER_SIZE: usize = 4 + 32 * 3 + 4 + 4 + 8;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    pub version: u32,
    /// Merkle root of the parent hashes.
    pub parent_root: Hash,
    /// Merkle root of the transaction hashes.
    pub tx_root: Hash,
    pub state_root: Hash,
    /// Block time in seconds since the unix epoch.
    pub timestamp: u32,
    /// Compact difficulty target.
    pub bits: u32,
    pub nonce: u64,
}

impl BlockHeader {
    pub fn hash(&self) -> Hash {
        Hash::double_sha256(&self.encode())
    }
}

impl Encodable for BlockHeader {
    fn encode_to(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.version.to_le_bytes());
        out.extend_from_slice(self.parent_root.as_bytes());
        out.extend_from_slice(self.tx_root.as_bytes());
        out.extend_from_slice(self.state_root.as_bytes());
        out.extend_from_slice(&self.timestamp.to_le_bytes());
        out.extend_from_slice(&self.bits.to_le_bytes());
        out.extend_from_slice(&self.nonce.to_le_bytes());
    }
}

/// A block referencing one or more parents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub header: BlockHeader,
    pub parents: Vec<Hash>,
    pub transactions: Vec<Transaction>,
}

impl Block {
    pub fn hash(&self) -> Hash {
        self.header.hash()
    }

    /// Merkle root over the parent hashes, as committed by [`BlockHeader::parent_root`].
    pub fn compute_parent_root(&self) -> Hash {
        crate::merkle::merkle_root(&self.parents)
    }

    /// Merkle root over the transaction hashes, as committed by [`BlockHeader::tx_root`].
    pub fn compute_tx_root(&self) -> Hash {
        let hashes = self
            .transactions
            .iter()
            .map(Transaction::hash)
            .collect::<Vec<_>>();
        crate::merkle::merkle_root(&hashes)
    }

    /// Serialized size of the block in bytes.
    pub fn size(&self) -> usize {
        self.encoded_size()
    }
}

impl Encodable for Block {
    fn encode_to(&self, out: &mut Vec<u8>) {
        self.header.encode_to(out);
        write_compact_size(out, self.parents.len() as u64);
        for parent in &self.parents {
            out.extend_from_slice(parent.as_bytes());
        }
        write_compact_size(out, self.transactions.len() as u64);
        for tx in &self.transactions {
            tx.encode_to(out);
        }
    }
}
