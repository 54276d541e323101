use dagchain_primitives::{BlockHeader, Hash};
use serde::{Deserialize, Serialize};

/// Stored form of one block index node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockIndexEntry {
    pub header: BlockHeader,
    pub parents: Vec<Hash>,
    /// Raw status bits of the node.
    pub status: u8,
    /// Position in the total order, `None` while the block is not ordered.
    pub order: Option<u64>,
    /// Insertion sequence number. Replaying entries by ascending arrival inserts every parent
    /// before its children.
    pub arrival: u64,
}

impl BlockIndexEntry {
    pub fn hash(&self) -> Hash {
        self.header.hash()
    }

    pub fn encode(&self) -> crate::Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    pub fn decode(bytes: &[u8]) -> crate::Result<Self> {
        Ok(bincode::deserialize(bytes)?)
    }
}
