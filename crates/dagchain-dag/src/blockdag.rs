use crate::blockindex::BlockIndex;
use crate::blocknode::{BlockNode, NodeId};
use crate::ghostdag::{DagOrdering, GhostDag};
use crate::{BlockSet, DagError};
use dagchain_primitives::{Block, Hash};
use std::collections::BTreeSet;

/// Result of inserting a block into the DAG.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddBlockOutcome {
    /// The inserted block.
    pub node: NodeId,
    /// Blocks that received an order, in ascending order.
    pub new_orders: Vec<NodeId>,
    /// Blocks that lost their order, in ascending order of their former positions.
    pub old_orders: Vec<NodeId>,
    /// Whether the main tip moved.
    pub main_tip_changed: bool,
    /// Number of ordered blocks before the insertion.
    pub previous_order_len: u64,
}

impl AddBlockOutcome {
    /// The block extends the main tip and nothing else moved.
    pub fn is_direct_extend(&self) -> bool {
        self.old_orders.is_empty() && self.new_orders == [self.node]
    }
}

/// The block DAG with its total order.
///
/// The order covers the main tip and its past: for every main chain block, from genesis up,
/// its mergeset is emitted in [`DagOrdering::merge_order`] followed by the chain block itself.
/// Tips outside the past of the main tip stay unordered until some chain block merges them.
pub struct BlockDag<O = GhostDag> {
    index: BlockIndex,
    ordering: O,
    genesis: Option<NodeId>,
    tips: BlockSet<NodeId>,
    order: Vec<NodeId>,
    /// Selected parent chain of the main tip, indexed by layer.
    main_chain: Vec<NodeId>,
    /// Every block all tip to genesis paths pass through, ascending.
    hourglasses: Vec<NodeId>,
    finality_depth: u64,
}

impl BlockDag<GhostDag> {
    /// Creates an empty DAG ordered by GHOSTDAG.
    pub fn new(anticone_size: u64, finality_depth: u64) -> Self {
        Self::with_ordering(GhostDag::new(anticone_size), finality_depth)
    }
}

impl<O: DagOrdering> BlockDag<O> {
    /// Creates an empty DAG using a custom ordering strategy.
    ///
    /// `finality_depth` is the number of confirmations an hourglass block needs before forks
    /// below it are rejected.
    pub fn with_ordering(ordering: O, finality_depth: u64) -> Self {
        Self {
            index: BlockIndex::new(),
            ordering,
            genesis: None,
            tips: BlockSet::new(),
            order: Vec::new(),
            main_chain: Vec::new(),
            hourglasses: Vec::new(),
            finality_depth,
        }
    }

    pub fn index(&self) -> &BlockIndex {
        &self.index
    }

    pub fn index_mut(&mut self) -> &mut BlockIndex {
        &mut self.index
    }

    pub fn node(&self, id: NodeId) -> &BlockNode {
        self.index.node(id)
    }

    pub fn genesis(&self) -> Option<NodeId> {
        self.genesis
    }

    /// Number of blocks in the DAG.
    pub fn block_total(&self) -> u64 {
        self.index.len() as u64
    }

    pub fn tips(&self) -> &BlockSet<NodeId> {
        &self.tips
    }

    /// Hashes of the current tips, sorted.
    pub fn tip_hashes(&self) -> Vec<Hash> {
        let mut hashes = self
            .tips
            .iter()
            .map(|id| self.index.hash_of(*id))
            .collect::<Vec<_>>();
        hashes.sort();
        hashes
    }

    pub fn main_tip(&self) -> Option<NodeId> {
        self.main_chain.last().copied()
    }

    /// Layer of the main tip.
    pub fn main_height(&self) -> u64 {
        self.main_tip().map(|tip| self.node(tip).layer()).unwrap_or(0)
    }

    pub fn main_chain(&self) -> &[NodeId] {
        &self.main_chain
    }

    pub fn main_chain_has_block(&self, id: NodeId) -> bool {
        self.main_chain.get(self.node(id).layer() as usize) == Some(&id)
    }

    /// Ordered blocks, indexed by order.
    pub fn order(&self) -> &[NodeId] {
        &self.order
    }

    pub fn node_by_order(&self, order: u64) -> Option<NodeId> {
        self.order.get(order as usize).copied()
    }

    /// Blocks classified blue by the chain blocks merging them.
    pub fn blue_set(&self) -> BlockSet<NodeId> {
        self.order
            .iter()
            .copied()
            .filter(|id| self.node(*id).is_blue())
            .collect()
    }

    pub fn select_parent(&self, parents: &[NodeId]) -> NodeId {
        self.ordering.select_parent(&self.index, parents)
    }

    /// Maps parent hashes to node ids, checking they are non-empty, distinct and known.
    pub fn resolve_parents(&self, block: Hash, parents: &[Hash]) -> Result<Vec<NodeId>, DagError> {
        if parents.is_empty() {
            return Err(DagError::NoParents(block));
        }

        let mut seen = BlockSet::new();
        for parent in parents {
            if !seen.add(*parent) {
                return Err(DagError::DuplicateParent {
                    block,
                    parent: *parent,
                });
            }
        }

        let missing = parents
            .iter()
            .filter(|parent| !self.index.have_block(parent))
            .copied()
            .collect::<Vec<_>>();
        if !missing.is_empty() {
            return Err(DagError::MissingParents { block, missing });
        }

        Ok(parents
            .iter()
            .filter_map(|parent| self.index.lookup_id(parent))
            .collect())
    }

    /// Inserts a block whose parents are all known and recomputes the order.
    ///
    /// The first block inserted is the genesis block and must not have parents.
    pub fn add_block(&mut self, block: &Block) -> Result<AddBlockOutcome, DagError> {
        let hash = block.hash();

        if self.index.have_block(&hash) {
            return Err(DagError::DuplicateBlock(hash));
        }

        let parents = if self.genesis.is_none() {
            if !block.parents.is_empty() {
                return Err(DagError::MissingParents {
                    block: hash,
                    missing: block.parents.clone(),
                });
            }
            Vec::new()
        } else {
            let parents = self.resolve_parents(hash, &block.parents)?;
            self.check_finality(hash, &parents)?;
            parents
        };

        let ghostdag = self.ordering.ghostdag(&self.index, &parents);
        let id = self
            .index
            .add_node(hash, block.header.clone(), parents.clone(), ghostdag);

        for parent in &parents {
            self.tips.remove(parent);
        }
        self.tips.add(id);
        self.genesis.get_or_insert(id);

        let outcome = self.update_order(id);
        self.update_hourglasses();

        tracing::trace!(
            "Added block {hash} to the DAG, blue score: {}, tips: {}, new orders: {}, old orders: {}",
            self.node(id).blue_score(),
            self.tips.len(),
            outcome.new_orders.len(),
            outcome.old_orders.len(),
        );

        Ok(outcome)
    }

    fn check_finality(&self, block: Hash, parents: &[NodeId]) -> Result<(), DagError> {
        let Some(finality_point) = self.finality_point() else {
            return Ok(());
        };

        if parents
            .iter()
            .all(|parent| self.index.is_ancestor_or_self(finality_point, *parent))
        {
            Ok(())
        } else {
            Err(DagError::ForkTooOld {
                block,
                finality_point: self.index.hash_of(finality_point),
            })
        }
    }

    fn update_order(&mut self, inserted: NodeId) -> AddBlockOutcome {
        let previous_order_len = self.order.len() as u64;
        let old_tip = self.main_tip();
        let new_tip = self.select_parent(&self.tips.to_vec());

        if old_tip == Some(new_tip) {
            return AddBlockOutcome {
                node: inserted,
                new_orders: Vec::new(),
                old_orders: Vec::new(),
                main_tip_changed: false,
                previous_order_len,
            };
        }

        // Chain blocks above the fork point, highest first.
        let mut segment = Vec::new();
        let mut cursor = Some(new_tip);
        let fork_point = loop {
            match cursor {
                Some(chain_block) if self.main_chain_has_block(chain_block) => {
                    break Some(chain_block);
                }
                Some(chain_block) => {
                    segment.push(chain_block);
                    cursor = self.node(chain_block).selected_parent();
                }
                None => break None,
            }
        };
        segment.reverse();

        let keep = fork_point
            .map(|fork| {
                self.node(fork)
                    .order()
                    .expect("Main chain blocks are always ordered; qed") as usize
                    + 1
            })
            .unwrap_or(0);

        let mut new_suffix = Vec::new();
        for chain_block in &segment {
            let data = self.node(*chain_block).ghostdag();
            new_suffix.extend(self.ordering.merge_order(&self.index, data));
            new_suffix.push(*chain_block);
        }

        let common = self.order[keep..]
            .iter()
            .zip(&new_suffix)
            .take_while(|(old, new)| old == new)
            .count();
        let old_orders = self.order[keep + common..].to_vec();
        let new_orders = new_suffix[common..].to_vec();

        for id in &old_orders {
            let node = self.index.node_mut(*id);
            node.order = None;
            node.blue = false;
            self.index.mark_dirty(*id);
        }

        self.order.truncate(keep + common);
        for id in &new_orders {
            self.index.node_mut(*id).order = Some(self.order.len() as u64);
            self.index.mark_dirty(*id);
            self.order.push(*id);
        }

        for chain_block in &segment {
            let data = self.node(*chain_block).ghostdag().clone();
            self.index.node_mut(*chain_block).blue = true;
            for blue in data.mergeset_blues.iter().skip(1) {
                self.index.node_mut(*blue).blue = true;
            }
            for red in &data.mergeset_reds {
                self.index.node_mut(*red).blue = false;
            }
        }

        let fork_len = fork_point
            .map(|fork| self.node(fork).layer() as usize + 1)
            .unwrap_or(0);
        self.main_chain.truncate(fork_len);
        self.main_chain.extend(segment);

        assert_eq!(
            self.order.len() as u64,
            self.node(new_tip).past_set_num() + 1,
            "Order count does not match the past of main tip {}",
            self.index.hash_of(new_tip),
        );

        if !old_orders.is_empty() {
            tracing::debug!(
                "Main tip moved from {:?} to {}, {} blocks unordered, {} blocks ordered",
                old_tip.map(|tip| self.index.hash_of(tip)),
                self.index.hash_of(new_tip),
                old_orders.len(),
                new_orders.len(),
            );
        }

        AddBlockOutcome {
            node: inserted,
            new_orders,
            old_orders,
            main_tip_changed: true,
            previous_order_len,
        }
    }

    /// Walks down from the tips collecting cut vertices until reaching one already known.
    fn update_hourglasses(&mut self) {
        let mut found = Vec::new();
        let mut frontier = self
            .tips
            .iter()
            .map(|tip| (self.node(*tip).past_set_num(), *tip))
            .collect::<BTreeSet<_>>();

        loop {
            if frontier.len() == 1 {
                if let Some((_, cut)) = frontier.first().copied() {
                    if let Some(pos) = self.hourglasses.iter().rposition(|known| *known == cut) {
                        self.hourglasses.truncate(pos + 1);
                        break;
                    }
                    found.push(cut);
                }
            }

            let Some((_, top)) = frontier.pop_last() else {
                break;
            };
            for parent in self.node(top).parents() {
                frontier.insert((self.node(*parent).past_set_num(), *parent));
            }
        }

        found.reverse();
        self.hourglasses.extend(found);
    }

    /// Cut vertices of the DAG, from genesis up.
    pub fn hourglasses(&self) -> &[NodeId] {
        &self.hourglasses
    }

    /// The highest block every tip to genesis path passes through.
    pub fn last_hourglass(&self) -> Option<NodeId> {
        self.hourglasses.last().copied()
    }

    pub fn is_hourglass(&self, id: NodeId) -> bool {
        let past = self.node(id).past_set_num();
        self.hourglasses
            .binary_search_by_key(&past, |known| self.node(*known).past_set_num())
            .is_ok_and(|pos| self.hourglasses[pos] == id)
    }

    /// Number of blocks in the future of `id`.
    pub fn confirmations(&self, id: NodeId) -> u64 {
        if self.is_hourglass(id) {
            self.block_total() - 1 - self.node(id).past_set_num()
        } else {
            self.index.future_set(id).len() as u64
        }
    }

    /// The highest hourglass block with at least `finality_depth` confirmations.
    pub fn finality_point(&self) -> Option<NodeId> {
        let total = self.block_total();
        self.hourglasses
            .iter()
            .rev()
            .find(|id| total - 1 - self.node(**id).past_set_num() >= self.finality_depth)
            .copied()
    }

    /// Blocks that are neither ancestors nor descendants of `id`.
    pub fn anticone(&self, id: NodeId) -> BlockSet<NodeId> {
        let past = self.index.past_set(id);
        let future = self.index.future_set(id);
        self.index
            .iter()
            .map(BlockNode::id)
            .filter(|other| *other != id && !past.has(other) && !future.has(other))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dagchain_primitives::merkle::merkle_root;
    use dagchain_primitives::BlockHeader;
    use std::collections::{HashMap, HashSet};

    fn make_block(parents: &[Hash], nonce: u64) -> Block {
        Block {
            header: BlockHeader {
                version: 1,
                parent_root: merkle_root(parents),
                tx_root: Hash::ZERO,
                state_root: Hash::ZERO,
                timestamp: 1_600_000_000u32.wrapping_add(nonce as u32),
                bits: 0x207fffff,
                nonce,
            },
            parents: parents.to_vec(),
            transactions: Vec::new(),
        }
    }

    /// Gen→A,B; A,B→C; A→D; B→F; C,D,F→E; A→G; F→J; J,C→I; E,G,I→H; I→K
    const FIXTURE: &[(&str, &[&str])] = &[
        ("Gen", &[]),
        ("A", &["Gen"]),
        ("B", &["Gen"]),
        ("C", &["A", "B"]),
        ("D", &["A"]),
        ("F", &["B"]),
        ("E", &["C", "D", "F"]),
        ("G", &["A"]),
        ("J", &["F"]),
        ("I", &["J", "C"]),
        ("H", &["E", "G", "I"]),
        ("K", &["I"]),
    ];

    fn fixture_blocks() -> HashMap<&'static str, Block> {
        let mut blocks: HashMap<&'static str, Block> = HashMap::new();
        for (nonce, (name, parents)) in FIXTURE.iter().enumerate() {
            let parents = parents
                .iter()
                .map(|parent| blocks[*parent].hash())
                .collect::<Vec<_>>();
            blocks.insert(*name, make_block(&parents, nonce as u64));
        }
        blocks
    }

    fn build(anticone_size: u64, arrival: &[&str]) -> (BlockDag, HashMap<&'static str, Block>) {
        let blocks = fixture_blocks();
        let mut dag = BlockDag::new(anticone_size, 100);
        for name in arrival {
            dag.add_block(&blocks[*name]).unwrap();
        }
        (dag, blocks)
    }

    fn hashes(dag: &BlockDag, ids: &[NodeId]) -> Vec<Hash> {
        ids.iter().map(|id| dag.index().hash_of(*id)).collect()
    }

    /// A random DAG in which every block references one to three of the five latest blocks.
    fn random_dag(rng: &mut fastrand::Rng, len: usize) -> Vec<Block> {
        let mut blocks = vec![make_block(&[], rng.u64(..))];
        while blocks.len() < len {
            let window = blocks.len().min(5);
            let mut parents = BlockSet::new();
            for _ in 0..rng.usize(1..=3) {
                parents.add(blocks[blocks.len() - 1 - rng.usize(..window)].hash());
            }
            blocks.push(make_block(&parents.to_vec(), rng.u64(..)));
        }
        blocks
    }

    /// Shuffles `blocks` into an arrival order that still delivers parents first.
    fn random_arrival(rng: &mut fastrand::Rng, blocks: &[Block]) -> Vec<Block> {
        let mut pending = blocks.to_vec();
        let mut arrived = HashSet::new();
        let mut arrival = Vec::with_capacity(blocks.len());
        while !pending.is_empty() {
            let ready = pending
                .iter()
                .enumerate()
                .filter(|(_, block)| block.parents.iter().all(|parent| arrived.contains(parent)))
                .map(|(i, _)| i)
                .collect::<Vec<_>>();
            let block = pending.swap_remove(ready[rng.usize(..ready.len())]);
            arrived.insert(block.hash());
            arrival.push(block);
        }
        arrival
    }

    fn assert_topological(dag: &BlockDag) {
        for id in dag.order() {
            let node = dag.node(*id);
            for parent in node.parents() {
                assert!(dag.node(*parent).order().unwrap() < node.order().unwrap());
            }
        }
    }

    #[test]
    fn test_genesis_only() {
        let genesis = make_block(&[], 0);
        let mut dag = BlockDag::new(3, 10);
        let outcome = dag.add_block(&genesis).unwrap();

        assert!(outcome.is_direct_extend());
        assert_eq!(dag.order(), &[outcome.node]);
        assert_eq!(dag.node(outcome.node).height(), 0);
        assert_eq!(dag.node(outcome.node).order(), Some(0));
        assert_eq!(dag.tip_hashes(), vec![genesis.hash()]);
        assert_eq!(dag.hourglasses(), &[outcome.node]);
        assert_eq!(dag.confirmations(outcome.node), 0);
    }

    #[test]
    fn test_fixture_is_deterministic() {
        let first = ["Gen", "A", "B", "C", "D", "F", "E", "G", "J", "I", "H", "K"];
        let second = ["Gen", "B", "A", "F", "J", "D", "G", "C", "I", "K", "E", "H"];

        for anticone_size in [0, 1, 3] {
            let (dag1, blocks) = build(anticone_size, &first);
            let (dag2, _) = build(anticone_size, &second);

            assert_eq!(hashes(&dag1, dag1.order()), hashes(&dag2, dag2.order()));
            assert_eq!(hashes(&dag1, dag1.main_chain()), hashes(&dag2, dag2.main_chain()));
            assert_eq!(dag1.tip_hashes(), dag2.tip_hashes());
            assert_eq!(
                hashes(&dag1, &dag1.blue_set().to_vec()).into_iter().collect::<BlockSet<_>>(),
                hashes(&dag2, &dag2.blue_set().to_vec()).into_iter().collect::<BlockSet<_>>(),
            );
            assert_eq!(
                hashes(&dag1, dag1.hourglasses()),
                hashes(&dag2, dag2.hourglasses())
            );
            assert_topological(&dag1);
            assert_topological(&dag2);

            let mut tips = vec![blocks["H"].hash(), blocks["K"].hash()];
            tips.sort();
            assert_eq!(dag1.tip_hashes(), tips);
        }
    }

    #[test]
    fn test_fixture_derived_fields() {
        // With a large anticone size every block is blue and blue scores equal past sizes.
        let (dag, blocks) = build(10, &["Gen", "A", "B", "C", "D", "F", "E", "G", "J", "I", "H", "K"]);
        let node = |name: &str| dag.index().lookup_node(&blocks[name].hash()).unwrap();

        assert_eq!(node("Gen").past_set_num(), 0);
        assert_eq!(node("C").past_set_num(), 3);
        assert_eq!(node("E").past_set_num(), 6);
        assert_eq!(node("H").past_set_num(), 10);
        assert_eq!(node("K").past_set_num(), 7);
        assert_eq!(node("E").height(), 3);
        assert_eq!(node("H").height(), 5);
        assert_eq!(node("H").blue_score(), 10);
        assert_eq!(node("K").blue_score(), 7);

        // H merges everything except K, so it is the main tip and K is unordered.
        assert_eq!(dag.main_tip(), Some(node("H").id()));
        assert_eq!(node("K").order(), None);
        assert_eq!(dag.order().len(), 11);
        assert_eq!(dag.confirmations(node("I").id()), 2);
        assert_eq!(
            dag.anticone(node("D").id()).to_vec(),
            vec![node("B").id(), node("C").id(), node("F").id(), node("G").id(), node("J").id(), node("I").id(), node("K").id()]
                .into_iter()
                .collect::<BlockSet<_>>()
                .to_vec()
        );
    }

    #[test]
    fn test_direct_extend() {
        let genesis = make_block(&[], 0);
        let a = make_block(&[genesis.hash()], 1);
        let b = make_block(&[a.hash()], 2);

        let mut dag = BlockDag::new(3, 10);
        dag.add_block(&genesis).unwrap();
        assert!(dag.add_block(&a).unwrap().is_direct_extend());
        let outcome = dag.add_block(&b).unwrap();
        assert!(outcome.is_direct_extend());
        assert!(outcome.main_tip_changed);
        assert_eq!(outcome.previous_order_len, 2);
        assert_eq!(dag.main_height(), 2);
        assert_eq!(dag.last_hourglass(), Some(outcome.node));
    }

    #[test]
    fn test_fork_and_reconverge() {
        let genesis = make_block(&[], 0);
        let a = make_block(&[genesis.hash()], 1);
        let b = make_block(&[a.hash()], 2);
        let c = make_block(&[a.hash()], 3);
        let d = make_block(&[b.hash(), c.hash()], 4);

        let mut dag = BlockDag::new(3, 10);
        for block in [&genesis, &a, &b] {
            dag.add_block(block).unwrap();
        }
        let id_of = |dag: &BlockDag, block: &Block| dag.index().lookup_id(&block.hash()).unwrap();
        let a_id = id_of(&dag, &a);
        let b_id = id_of(&dag, &b);

        // B and C have the same blue score, the smaller hash wins.
        let c_wins = c.hash() < b.hash();
        let outcome = dag.add_block(&c).unwrap();
        let c_id = outcome.node;
        if c_wins {
            assert_eq!(outcome.old_orders, vec![b_id]);
            assert_eq!(outcome.new_orders, vec![c_id]);
            assert!(outcome.main_tip_changed);
        } else {
            assert!(outcome.old_orders.is_empty());
            assert!(outcome.new_orders.is_empty());
            assert!(!outcome.main_tip_changed);
            assert_eq!(dag.node(c_id).order(), None);
        }
        assert_eq!(dag.last_hourglass(), Some(a_id));

        let (winner, loser) = if c_wins { (c_id, b_id) } else { (b_id, c_id) };
        let outcome = dag.add_block(&d).unwrap();
        let d_id = outcome.node;
        assert!(outcome.old_orders.is_empty());
        assert_eq!(outcome.new_orders, vec![loser, d_id]);
        assert_eq!(dag.node(d_id).selected_parent(), Some(winner));
        assert_eq!(
            hashes(&dag, dag.order()),
            hashes(&dag, &[dag.genesis().unwrap(), a_id, winner, loser, d_id])
        );
        assert_eq!(dag.hourglasses().last(), Some(&d_id));
        assert_eq!(dag.confirmations(a_id), 3);
        assert_eq!(dag.confirmations(loser), 1);
    }

    #[test]
    fn test_red_blocks_with_zero_anticone() {
        let genesis = make_block(&[], 0);
        let a = make_block(&[genesis.hash()], 1);
        let b = make_block(&[genesis.hash()], 2);
        let c = make_block(&[a.hash(), b.hash()], 3);

        let mut dag = BlockDag::new(0, 10);
        for block in [&genesis, &a, &b, &c] {
            dag.add_block(block).unwrap();
        }

        let c_node = dag.index().lookup_node(&c.hash()).unwrap();
        let data = c_node.ghostdag().clone();
        assert_eq!(data.mergeset_blues.len(), 1);
        assert_eq!(data.mergeset_reds.len(), 1);
        assert_eq!(c_node.blue_score(), 2);

        let red = data.mergeset_reds[0];
        assert!(!dag.node(red).is_blue());
        assert!(dag.node(data.mergeset_blues[0]).is_blue());
        assert!(!dag.blue_set().has(&red));
        assert_eq!(dag.node(red).order(), Some(2));
    }

    #[test]
    fn test_rejects_bad_parents() {
        let genesis = make_block(&[], 0);
        let a = make_block(&[genesis.hash()], 1);
        let unknown = Hash::from_byte_array([7; 32]);

        let mut dag = BlockDag::new(3, 10);
        assert!(matches!(
            dag.add_block(&a),
            Err(DagError::MissingParents { .. })
        ));
        dag.add_block(&genesis).unwrap();
        assert_eq!(
            dag.add_block(&genesis),
            Err(DagError::DuplicateBlock(genesis.hash()))
        );
        assert_eq!(
            dag.add_block(&make_block(&[], 9)),
            Err(DagError::NoParents(make_block(&[], 9).hash()))
        );

        let orphan = make_block(&[genesis.hash(), unknown], 2);
        assert_eq!(
            dag.add_block(&orphan),
            Err(DagError::MissingParents {
                block: orphan.hash(),
                missing: vec![unknown]
            })
        );

        let twice = make_block(&[genesis.hash(), genesis.hash()], 3);
        assert!(matches!(
            dag.add_block(&twice),
            Err(DagError::DuplicateParent { .. })
        ));
        assert_eq!(dag.block_total(), 1);
    }

    #[test]
    fn test_fork_too_old() {
        let genesis = make_block(&[], 0);
        let mut dag = BlockDag::new(3, 3);
        dag.add_block(&genesis).unwrap();

        let mut chain = vec![genesis.hash()];
        for nonce in 1..=6 {
            let block = make_block(&[*chain.last().unwrap()], nonce);
            dag.add_block(&block).unwrap();
            chain.push(block.hash());
        }

        // Seven blocks in a line, the block at layer 3 has three confirmations.
        let finality_point = dag.finality_point().unwrap();
        assert_eq!(dag.node(finality_point).hash(), chain[3]);

        let stale = make_block(&[chain[2]], 100);
        assert_eq!(
            dag.add_block(&stale),
            Err(DagError::ForkTooOld {
                block: stale.hash(),
                finality_point: chain[3]
            })
        );

        let fresh = make_block(&[chain[3]], 101);
        assert!(dag.add_block(&fresh).is_ok());
    }

    #[test]
    fn test_random_dags_order_deterministically() {
        let mut rng = fastrand::Rng::with_seed(42);

        for round in 0..20u64 {
            let anticone_size = round % 4;
            let blocks = random_dag(&mut rng, 51);

            let mut results = Vec::new();
            for _ in 0..2 {
                let mut dag = BlockDag::new(anticone_size, u64::MAX);
                for block in random_arrival(&mut rng, &blocks) {
                    let before = hashes(&dag, dag.order());
                    let outcome = dag.add_block(&block).unwrap();
                    let after = hashes(&dag, dag.order());

                    // Only the detached suffix may change.
                    let kept = before.len() - outcome.old_orders.len();
                    assert_eq!(outcome.previous_order_len, before.len() as u64);
                    assert_eq!(before[..kept], after[..kept]);
                    assert_eq!(hashes(&dag, &outcome.old_orders), before[kept..]);
                    assert_eq!(hashes(&dag, &outcome.new_orders), after[kept..]);
                }

                assert_topological(&dag);
                assert_eq!(dag.block_total(), 51);
                results.push((
                    hashes(&dag, dag.order()),
                    hashes(&dag, dag.main_chain()),
                    dag.tip_hashes(),
                ));
            }

            assert_eq!(results[0], results[1]);
        }
    }

    #[test]
    fn test_checkpoint_candidacy_is_monotone() {
        let finality_depth = 3;
        let mut rng = fastrand::Rng::with_seed(7);

        for _ in 0..5 {
            let genesis = make_block(&[], rng.u64(..));
            let mut dag = BlockDag::new(2, finality_depth);
            dag.add_block(&genesis).unwrap();

            let mut candidates: Vec<NodeId> = Vec::new();
            let mut recent = vec![genesis.hash()];

            for _ in 0..80 {
                let count = rng.usize(1..=3.min(recent.len()));
                let mut parents = BlockSet::new();
                for _ in 0..count {
                    let window = recent.len().min(6);
                    parents.add(recent[recent.len() - 1 - rng.usize(..window)]);
                }
                let block = make_block(&parents.to_vec(), rng.u64(..));
                if dag.add_block(&block).is_ok() {
                    recent.push(block.hash());
                }

                for id in &candidates {
                    assert!(dag.is_hourglass(*id));
                    assert!(dag.confirmations(*id) >= finality_depth);
                }
                for id in dag.hourglasses() {
                    if dag.confirmations(*id) >= finality_depth && !candidates.contains(id) {
                        candidates.push(*id);
                    }
                }
            }

            assert!(!candidates.is_empty());
            assert_topological(&dag);
        }
    }
}
