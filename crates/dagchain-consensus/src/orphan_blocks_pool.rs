use dagchain_primitives::{Block, Hash};
use indexmap::IndexMap;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
struct OrphanBlock {
    block: Arc<Block>,
    expiration: Instant,
    /// Main height of the chain when the orphan arrived.
    main_height: u64,
}

/// Storage for the blocks with at least one unknown parent.
///
/// Blocks leave the pool when all of their parents become known, when they expire or when the
/// chain moved too far past the point where they arrived.
#[derive(Debug, Clone)]
pub struct OrphanBlocksPool {
    /// Orphans in arrival order, oldest first.
    blocks: IndexMap<Hash, OrphanBlock>,
    /// parent_hash => children waiting for it.
    orphan_blocks: HashMap<Hash, HashSet<Hash>>,
    max_orphan_blocks: usize,
    ttl: Duration,
    stable_confirmations: u64,
}

impl OrphanBlocksPool {
    /// Constructs a new [`OrphanBlocksPool`] holding at most `2 * max_orphan_blocks` blocks.
    pub fn new(max_orphan_blocks: usize, ttl: Duration, stable_confirmations: u64) -> Self {
        Self {
            blocks: IndexMap::new(),
            orphan_blocks: HashMap::new(),
            max_orphan_blocks,
            ttl,
            stable_confirmations,
        }
    }

    /// Returns the total number of orphan blocks in pool, including expired ones not purged
    /// yet.
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.max_orphan_blocks * 2
    }

    pub fn is_orphan(&self, hash: &Hash) -> bool {
        self.live(hash).is_some()
    }

    pub fn get_orphan(&self, hash: &Hash) -> Option<Arc<Block>> {
        self.live(hash).map(|orphan| orphan.block.clone())
    }

    fn live(&self, hash: &Hash) -> Option<&OrphanBlock> {
        let now = Instant::now();
        self.blocks
            .get(hash)
            .filter(|orphan| orphan.expiration > now)
    }

    /// Inserts an orphan block, evicting the oldest one if the pool is full.
    pub fn insert_orphan_block(&mut self, block: Arc<Block>, main_height: u64) {
        let hash = block.hash();
        self.prune(main_height);

        if self.blocks.contains_key(&hash) {
            return;
        }

        while !self.blocks.is_empty() && self.blocks.len() + 1 > self.capacity() {
            if let Some((oldest, _)) = self.blocks.first() {
                let oldest = *oldest;
                tracing::debug!("Orphan pool is full, evicting {oldest}");
                self.remove_orphan_block(&oldest);
            }
        }

        if self.capacity() == 0 {
            return;
        }

        for parent in &block.parents {
            self.orphan_blocks.entry(*parent).or_default().insert(hash);
        }
        self.blocks.insert(
            hash,
            OrphanBlock {
                block,
                expiration: Instant::now() + self.ttl,
                main_height,
            },
        );
    }

    /// Removes expired orphans and orphans that arrived too far below `main_height`.
    ///
    /// Returns the number of removed blocks.
    pub fn prune(&mut self, main_height: u64) -> usize {
        let now = Instant::now();
        let stale_distance = self.stable_confirmations.saturating_mul(2);
        let stale = self
            .blocks
            .iter()
            .filter(|(_, orphan)| {
                orphan.expiration <= now
                    || orphan.main_height.saturating_add(stale_distance) < main_height
            })
            .map(|(hash, _)| *hash)
            .collect::<Vec<_>>();

        for hash in &stale {
            self.remove_orphan_block(hash);
        }

        if !stale.is_empty() {
            tracing::debug!("Purged {} expired or stale orphan blocks", stale.len());
        }

        stale.len()
    }

    pub fn remove_orphan_block(&mut self, hash: &Hash) -> Option<Arc<Block>> {
        let orphan = self.blocks.shift_remove(hash)?;
        for parent in &orphan.block.parents {
            if let Some(children) = self.orphan_blocks.get_mut(parent) {
                children.remove(hash);
                if children.is_empty() {
                    self.orphan_blocks.remove(parent);
                }
            }
        }
        Some(orphan.block)
    }

    /// Removes and returns the children of `parent` whose parents are now all known, oldest
    /// first. Children still waiting for another parent stay in the pool.
    pub fn remove_blocks_for_parent(
        &mut self,
        parent: &Hash,
        have_block: impl Fn(&Hash) -> bool,
    ) -> Vec<Arc<Block>> {
        let Some(children) = self.orphan_blocks.get(parent) else {
            return Vec::new();
        };

        let mut ready = children
            .iter()
            .filter_map(|child| {
                let index = self.blocks.get_index_of(child)?;
                let orphan = &self.blocks[index];
                orphan
                    .block
                    .parents
                    .iter()
                    .all(|p| have_block(p))
                    .then_some((index, *child))
            })
            .collect::<Vec<_>>();
        ready.sort_unstable();

        ready
            .into_iter()
            .filter_map(|(_, child)| self.remove_orphan_block(&child))
            .collect()
    }

    /// Follows the orphan parents of `hash` down to the earliest orphan ancestor.
    pub fn orphan_root(&self, hash: &Hash) -> Hash {
        let mut root = *hash;
        let mut visited = HashSet::new();
        while let Some(orphan) = self.blocks.get(&root) {
            if !visited.insert(root) {
                break;
            }
            match orphan
                .block
                .parents
                .iter()
                .find(|parent| self.blocks.contains_key(*parent))
            {
                Some(parent) => root = *parent,
                None => break,
            }
        }
        root
    }

    /// Parents referenced by orphans that are neither orphans themselves nor known.
    pub fn unknown_parents(&self, have_block: impl Fn(&Hash) -> bool) -> Vec<Hash> {
        let mut parents = self
            .orphan_blocks
            .keys()
            .filter(|parent| !self.blocks.contains_key(*parent) && !have_block(parent))
            .copied()
            .collect::<Vec<_>>();
        parents.sort();
        parents
    }
}
