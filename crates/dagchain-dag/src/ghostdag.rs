//! Blue set selection and mergeset ordering.

use crate::blockindex::BlockIndex;
use crate::blocknode::{GhostdagData, NodeId};
use crate::BlockSet;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, VecDeque};

/// Strategy deciding how the past of a new block is split and ordered.
///
/// [`crate::BlockDag`] only talks to the ordering through this trait.
pub trait DagOrdering: Send + Sync {
    /// Picks the parent that extends the main chain.
    fn select_parent(&self, index: &BlockIndex, parents: &[NodeId]) -> NodeId;

    /// Classifies the mergeset of a block with the given parents.
    fn ghostdag(&self, index: &BlockIndex, parents: &[NodeId]) -> GhostdagData;

    /// Orders the mergeset of a chain block, selected parent excluded, parents first.
    fn merge_order(&self, index: &BlockIndex, data: &GhostdagData) -> Vec<NodeId>;
}

/// GHOSTDAG with a fixed anticone size `k`.
#[derive(Debug, Clone, Copy)]
pub struct GhostDag {
    anticone_size: u64,
}

impl GhostDag {
    pub fn new(anticone_size: u64) -> Self {
        Self { anticone_size }
    }

    pub fn anticone_size(&self) -> u64 {
        self.anticone_size
    }

    /// `past(parents) \ past(selected_parent) \ {selected_parent}`, sorted by past size then hash.
    fn mergeset(&self, index: &BlockIndex, selected_parent: NodeId, parents: &[NodeId]) -> Vec<NodeId> {
        let mut visited = BlockSet::new();
        let mut queue = parents
            .iter()
            .copied()
            .filter(|p| *p != selected_parent)
            .collect::<VecDeque<_>>();
        let mut mergeset = Vec::new();

        while let Some(current) = queue.pop_front() {
            if !visited.add(current) {
                continue;
            }
            if index.is_ancestor_or_self(current, selected_parent) {
                continue;
            }
            mergeset.push(current);
            queue.extend(index.node(current).parents().iter().copied());
        }

        mergeset.sort_by_key(|id| {
            let node = index.node(*id);
            (node.past_set_num(), node.hash())
        });
        mergeset
    }

    /// Counts the blue blocks in the anticone of `candidate`, stopping once it exceeds `k`.
    fn blue_anticone_size(
        &self,
        index: &BlockIndex,
        candidate: NodeId,
        selected_parent: NodeId,
        new_blues: &[NodeId],
    ) -> u64 {
        let mut count = new_blues
            .iter()
            .skip(1)
            .filter(|blue| !index.is_ancestor(**blue, candidate))
            .count() as u64;

        let mut chain_block = Some(selected_parent);
        while let Some(current) = chain_block {
            if count > self.anticone_size || index.is_ancestor_or_self(current, candidate) {
                break;
            }
            let node = index.node(current);
            count += 1;
            count += node
                .ghostdag()
                .mergeset_blues
                .iter()
                .skip(1)
                .filter(|blue| !index.is_ancestor(**blue, candidate))
                .count() as u64;
            chain_block = node.selected_parent();
        }

        count
    }
}

impl DagOrdering for GhostDag {
    fn select_parent(&self, index: &BlockIndex, parents: &[NodeId]) -> NodeId {
        *parents
            .iter()
            .max_by_key(|id| {
                let node = index.node(**id);
                (node.blue_score(), Reverse(node.hash()))
            })
            .expect("Parents must not be empty; qed")
    }

    fn ghostdag(&self, index: &BlockIndex, parents: &[NodeId]) -> GhostdagData {
        if parents.is_empty() {
            return GhostdagData::default();
        }

        let selected_parent = self.select_parent(index, parents);
        let mut blues = vec![selected_parent];
        let mut reds = Vec::new();

        for candidate in self.mergeset(index, selected_parent, parents) {
            if self.blue_anticone_size(index, candidate, selected_parent, &blues)
                <= self.anticone_size
            {
                blues.push(candidate);
            } else {
                reds.push(candidate);
            }
        }

        GhostdagData {
            selected_parent: Some(selected_parent),
            blue_score: index.node(selected_parent).blue_score() + blues.len() as u64,
            mergeset_blues: blues,
            mergeset_reds: reds,
        }
    }

    /// Topological sort of the mergeset preferring blue blocks, then smaller pasts, then smaller
    /// hashes.
    fn merge_order(&self, index: &BlockIndex, data: &GhostdagData) -> Vec<NodeId> {
        let members = data
            .mergeset_without_selected_parent()
            .collect::<BlockSet<_>>();
        let reds = data.mergeset_reds.iter().copied().collect::<BlockSet<_>>();

        let mut pending = HashMap::with_capacity(members.len());
        for id in &members {
            let in_mergeset = index
                .node(*id)
                .parents()
                .iter()
                .filter(|p| members.has(p))
                .count();
            pending.insert(*id, in_mergeset);
        }

        let key = |id: NodeId| {
            let node = index.node(id);
            Reverse((reds.has(&id), node.past_set_num(), node.hash(), id))
        };

        let mut ready = pending
            .iter()
            .filter(|(_, count)| **count == 0)
            .map(|(id, _)| key(*id))
            .collect::<BinaryHeap<_>>();

        let mut ordered = Vec::with_capacity(members.len());
        while let Some(Reverse((_, _, _, id))) = ready.pop() {
            ordered.push(id);
            for child in index.node(id).children() {
                if let Some(count) = pending.get_mut(child) {
                    *count -= 1;
                    if *count == 0 {
                        ready.push(key(*child));
                    }
                }
            }
        }

        assert_eq!(
            ordered.len(),
            members.len(),
            "Mergeset of {:?} is not acyclic",
            data.selected_parent
        );

        ordered
    }
}
