use dagchain_primitives::{BlockHeader, Hash};
use num_bigint::BigUint;
use std::fmt;

/// Arena index of a [`BlockNode`] inside a [`crate::BlockIndex`].
///
/// Ids are handed out in insertion order, so a parent always has a smaller id than its children.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(u32);

impl NodeId {
    pub(crate) fn new(index: usize) -> Self {
        Self(index as u32)
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

bitflags::bitflags! {
    /// Validation state of a block.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct BlockStatus: u8 {
        /// The full block data is persisted.
        const DATA_STORED = 1 << 0;
        /// The block passed full validation against its position in the order.
        const VALID = 1 << 1;
        /// The block failed full validation.
        const VALIDATE_FAILED = 1 << 2;
        /// Every parent of the block is known to be invalid.
        const INVALID_ANCESTOR = 1 << 3;
    }
}

impl BlockStatus {
    pub fn known_valid(self) -> bool {
        self.contains(Self::VALID)
    }

    pub fn known_invalid(self) -> bool {
        self.intersects(Self::VALIDATE_FAILED | Self::INVALID_ANCESTOR)
    }
}

/// Blue/red classification of a block's past relative to its selected parent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GhostdagData {
    /// Parent with the largest blue score, `None` only for genesis.
    pub selected_parent: Option<NodeId>,
    /// Number of blue blocks in the past of the block.
    pub blue_score: u64,
    /// Blue blocks of the mergeset, the selected parent first.
    pub mergeset_blues: Vec<NodeId>,
    /// Red blocks of the mergeset.
    pub mergeset_reds: Vec<NodeId>,
}

impl GhostdagData {
    /// Size of `past(block) \ past(selected_parent)`, including the selected parent.
    pub fn mergeset_size(&self) -> usize {
        self.mergeset_blues.len() + self.mergeset_reds.len()
    }

    /// Mergeset members except the selected parent.
    pub fn mergeset_without_selected_parent(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.mergeset_blues
            .iter()
            .skip(1)
            .chain(self.mergeset_reds.iter())
            .copied()
    }
}

/// Position of one block in the DAG.
#[derive(Debug, Clone)]
pub struct BlockNode {
    pub(crate) id: NodeId,
    pub(crate) hash: Hash,
    pub(crate) header: BlockHeader,
    pub(crate) parents: Vec<NodeId>,
    pub(crate) children: Vec<NodeId>,
    pub(crate) order: Option<u64>,
    pub(crate) height: u64,
    pub(crate) layer: u64,
    pub(crate) work_sum: BigUint,
    pub(crate) status: BlockStatus,
    pub(crate) past_set_num: u64,
    pub(crate) ghostdag: GhostdagData,
    pub(crate) blue: bool,
}

impl BlockNode {
    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn hash(&self) -> Hash {
        self.hash
    }

    pub fn header(&self) -> &BlockHeader {
        &self.header
    }

    pub fn timestamp(&self) -> u32 {
        self.header.timestamp
    }

    pub fn bits(&self) -> u32 {
        self.header.bits
    }

    pub fn parents(&self) -> &[NodeId] {
        &self.parents
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn is_genesis(&self) -> bool {
        self.parents.is_empty()
    }

    /// Position in the total order, `None` while the block is not in the past of the main tip.
    pub fn order(&self) -> Option<u64> {
        self.order
    }

    /// Length of the longest path from genesis.
    pub fn height(&self) -> u64 {
        self.height
    }

    /// Depth along the selected parent chain, also called the main height.
    pub fn layer(&self) -> u64 {
        self.layer
    }

    /// Accumulated work along the selected parent chain, including this block.
    pub fn work_sum(&self) -> &BigUint {
        &self.work_sum
    }

    pub fn status(&self) -> BlockStatus {
        self.status
    }

    /// Number of blocks in the past of this block.
    pub fn past_set_num(&self) -> u64 {
        self.past_set_num
    }

    pub fn ghostdag(&self) -> &GhostdagData {
        &self.ghostdag
    }

    pub fn selected_parent(&self) -> Option<NodeId> {
        self.ghostdag.selected_parent
    }

    pub fn blue_score(&self) -> u64 {
        self.ghostdag.blue_score
    }

    /// Whether the block was classified blue by the chain block merging it.
    pub fn is_blue(&self) -> bool {
        self.blue
    }
}
