use crate::blocknode::{BlockNode, BlockStatus, GhostdagData, NodeId};
use crate::BlockSet;
use dagchain_primitives::pow::calc_work;
use dagchain_primitives::{BlockHeader, Hash};
use num_bigint::BigUint;
use std::collections::{HashMap, HashSet};

/// Number of main lineage timestamps used for the past median time.
pub const MEDIAN_TIME_BLOCKS: usize = 11;

/// In-memory arena of every known block.
///
/// Nodes are never removed. Parent and child links are stored as [`NodeId`] lists.
#[derive(Debug, Default)]
pub struct BlockIndex {
    nodes: Vec<BlockNode>,
    by_hash: HashMap<Hash, NodeId>,
    dirty: BlockSet<NodeId>,
}

impl BlockIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn lookup_node(&self, hash: &Hash) -> Option<&BlockNode> {
        self.by_hash.get(hash).map(|id| self.node(*id))
    }

    pub fn lookup_id(&self, hash: &Hash) -> Option<NodeId> {
        self.by_hash.get(hash).copied()
    }

    pub fn have_block(&self, hash: &Hash) -> bool {
        self.by_hash.contains_key(hash)
    }

    /// Returns the node for an id handed out by this index.
    pub fn node(&self, id: NodeId) -> &BlockNode {
        &self.nodes[id.index()]
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> &mut BlockNode {
        &mut self.nodes[id.index()]
    }

    pub fn hash_of(&self, id: NodeId) -> Hash {
        self.node(id).hash
    }

    /// Nodes in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &BlockNode> {
        self.nodes.iter()
    }

    /// Inserts a new node and links it to its parents.
    ///
    /// The caller is responsible for persisting it, see [`Self::take_dirty`].
    pub(crate) fn add_node(
        &mut self,
        hash: Hash,
        header: BlockHeader,
        parents: Vec<NodeId>,
        ghostdag: GhostdagData,
    ) -> NodeId {
        let id = NodeId::new(self.nodes.len());

        let height = parents
            .iter()
            .map(|p| self.node(*p).height + 1)
            .max()
            .unwrap_or(0);

        let (layer, parent_work, parent_psn) = match ghostdag.selected_parent {
            Some(sp) => {
                let sp = self.node(sp);
                (sp.layer + 1, sp.work_sum.clone(), sp.past_set_num)
            }
            None => (0, BigUint::default(), 0),
        };

        let work_sum = parent_work + calc_work(header.bits);
        let past_set_num = parent_psn + ghostdag.mergeset_size() as u64;

        for parent in &parents {
            self.nodes[parent.index()].children.push(id);
        }

        self.nodes.push(BlockNode {
            id,
            hash,
            header,
            parents,
            children: Vec::new(),
            order: None,
            height,
            layer,
            work_sum,
            status: BlockStatus::empty(),
            past_set_num,
            ghostdag,
            blue: false,
        });
        self.by_hash.insert(hash, id);
        self.dirty.add(id);

        id
    }

    pub fn node_status(&self, id: NodeId) -> BlockStatus {
        self.node(id).status
    }

    pub fn set_status_flags(&mut self, id: NodeId, flags: BlockStatus) {
        let node = self.node_mut(id);
        let status = node.status | flags;
        if status != node.status {
            node.status = status;
            self.dirty.add(id);
        }
    }

    pub fn unset_status_flags(&mut self, id: NodeId, flags: BlockStatus) {
        let node = self.node_mut(id);
        let status = node.status - flags;
        if status != node.status {
            node.status = status;
            self.dirty.add(id);
        }
    }

    pub(crate) fn mark_dirty(&mut self, id: NodeId) {
        self.dirty.add(id);
    }

    /// Drains the nodes modified since the last call, in id order.
    pub fn take_dirty(&mut self) -> Vec<NodeId> {
        std::mem::take(&mut self.dirty).to_vec()
    }

    /// Returns `true` if the block is invalid itself or if all of its parents are, recursively.
    ///
    /// Descendants are not tainted when a block becomes invalid. The taint is discovered here on
    /// demand and recorded as [`BlockStatus::INVALID_ANCESTOR`].
    pub fn has_invalid_ancestry(&mut self, id: NodeId) -> bool {
        let mut memo = HashMap::new();
        let tainted = self.invalid_ancestry(id, &mut memo);

        for (node, bad) in memo {
            if bad && !self.node(node).status.known_invalid() {
                self.set_status_flags(node, BlockStatus::INVALID_ANCESTOR);
            }
        }

        tainted
    }

    fn invalid_ancestry(&self, id: NodeId, memo: &mut HashMap<NodeId, bool>) -> bool {
        if let Some(tainted) = memo.get(&id) {
            return *tainted;
        }

        let node = self.node(id);
        let tainted = if node.status.known_invalid() {
            true
        } else if node.status.known_valid() || node.parents.is_empty() {
            false
        } else {
            node.parents
                .iter()
                .all(|parent| self.invalid_ancestry(*parent, memo))
        };

        memo.insert(id, tainted);
        tainted
    }

    /// Iterates from `id` down the selected parent chain to genesis.
    pub fn main_lineage(&self, id: NodeId) -> MainLineage<'_> {
        MainLineage {
            index: self,
            next: Some(id),
        }
    }

    /// Median timestamp of the block and its ancestors along the main lineage.
    pub fn past_median_time(&self, id: NodeId) -> u32 {
        let mut timestamps = self
            .main_lineage(id)
            .take(MEDIAN_TIME_BLOCKS)
            .map(BlockNode::timestamp)
            .collect::<Vec<_>>();
        timestamps.sort_unstable();
        timestamps[timestamps.len() / 2]
    }

    /// Returns `true` if `ancestor` is `node` or lies in its past.
    pub fn is_ancestor_or_self(&self, ancestor: NodeId, node: NodeId) -> bool {
        ancestor == node || self.is_ancestor(ancestor, node)
    }

    /// Returns `true` if `ancestor` lies in the past of `node`.
    ///
    /// Blocks with a past no larger than the one of `ancestor` can not reach it, so the walk
    /// never goes below that size.
    pub fn is_ancestor(&self, ancestor: NodeId, node: NodeId) -> bool {
        let floor = self.node(ancestor).past_set_num;
        if self.node(node).past_set_num <= floor {
            return false;
        }

        let mut visited = HashSet::new();
        let mut stack = vec![node];

        while let Some(current) = stack.pop() {
            for parent in &self.node(current).parents {
                if *parent == ancestor {
                    return true;
                }
                if self.node(*parent).past_set_num > floor && visited.insert(*parent) {
                    stack.push(*parent);
                }
            }
        }

        false
    }

    /// All ancestors of `id`.
    pub fn past_set(&self, id: NodeId) -> BlockSet<NodeId> {
        self.walk(id, |node| &node.parents)
    }

    /// All descendants of `id`.
    pub fn future_set(&self, id: NodeId) -> BlockSet<NodeId> {
        self.walk(id, |node| &node.children)
    }

    fn walk<F>(&self, start: NodeId, next: F) -> BlockSet<NodeId>
    where
        F: Fn(&BlockNode) -> &Vec<NodeId>,
    {
        let mut visited = BlockSet::new();
        let mut stack = next(self.node(start)).clone();

        while let Some(current) = stack.pop() {
            if visited.add(current) {
                stack.extend(next(self.node(current)).iter().copied());
            }
        }

        visited
    }
}

/// Iterator over the selected parent chain of a block.
pub struct MainLineage<'a> {
    index: &'a BlockIndex,
    next: Option<NodeId>,
}

impl<'a> Iterator for MainLineage<'a> {
    type Item = &'a BlockNode;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.index.node(self.next?);
        self.next = node.ghostdag.selected_parent;
        Some(node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(timestamp: u32) -> BlockHeader {
        BlockHeader {
            version: 1,
            parent_root: Hash::ZERO,
            tx_root: Hash::ZERO,
            state_root: Hash::ZERO,
            timestamp,
            bits: 0x207fffff,
            nonce: timestamp as u64,
        }
    }

    fn chain(index: &mut BlockIndex, len: u32) -> Vec<NodeId> {
        let mut ids = Vec::new();
        for i in 0..len {
            let parents = ids.last().copied().into_iter().collect::<Vec<_>>();
            let ghostdag = GhostdagData {
                selected_parent: parents.first().copied(),
                blue_score: i as u64,
                mergeset_blues: parents.clone(),
                mergeset_reds: Vec::new(),
            };
            let hash = Hash::from_byte_array([i as u8 + 1; 32]);
            ids.push(index.add_node(hash, header(1000 + i * 10), parents, ghostdag));
        }
        ids
    }

    #[test]
    fn test_lookup_and_derived_fields() {
        let mut index = BlockIndex::new();
        let ids = chain(&mut index, 4);

        let tip = index.lookup_node(&Hash::from_byte_array([4; 32])).unwrap();
        assert_eq!(tip.id(), ids[3]);
        assert_eq!(tip.height(), 3);
        assert_eq!(tip.layer(), 3);
        assert_eq!(tip.past_set_num(), 3);
        assert_eq!(tip.work_sum(), &BigUint::from(8u32));
        assert!(index.lookup_node(&Hash::from_byte_array([9; 32])).is_none());
        assert_eq!(index.node(ids[0]).children(), &[ids[1]]);
        assert_eq!(index.take_dirty(), ids);
        assert!(index.take_dirty().is_empty());
    }

    #[test]
    fn test_past_median_time() {
        let mut index = BlockIndex::new();
        let ids = chain(&mut index, 15);
        assert_eq!(index.past_median_time(ids[0]), 1000);
        assert_eq!(index.past_median_time(ids[2]), 1010);
        // Timestamps 1040..=1140, the median is the sixth one.
        assert_eq!(index.past_median_time(ids[14]), 1090);
    }

    #[test]
    fn test_ancestry() {
        let mut index = BlockIndex::new();
        let ids = chain(&mut index, 5);
        assert!(index.is_ancestor(ids[0], ids[4]));
        assert!(!index.is_ancestor(ids[4], ids[0]));
        assert!(!index.is_ancestor(ids[2], ids[2]));
        assert!(index.is_ancestor_or_self(ids[2], ids[2]));
        assert_eq!(index.future_set(ids[2]).to_vec(), vec![ids[3], ids[4]]);
        assert_eq!(index.past_set(ids[2]).to_vec(), vec![ids[0], ids[1]]);
    }

    #[test]
    fn test_invalid_ancestry_is_lazy() {
        let mut index = BlockIndex::new();
        let ids = chain(&mut index, 4);
        index.set_status_flags(ids[0], BlockStatus::VALID);
        index.set_status_flags(ids[1], BlockStatus::VALIDATE_FAILED);

        assert!(!index.node_status(ids[3]).known_invalid());
        assert!(index.has_invalid_ancestry(ids[3]));
        assert!(index.node_status(ids[2]).contains(BlockStatus::INVALID_ANCESTOR));
        assert!(index.node_status(ids[3]).contains(BlockStatus::INVALID_ANCESTOR));
        assert!(!index.has_invalid_ancestry(ids[0]));
    }
}
