//! Known good blocks hard-coded into the chain parameters or loaded from a JSON file.

use crate::Error;
use dagchain_dag::{BlockDag, DagOrdering, NodeId};
use dagchain_primitives::Hash;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// A block known to be on the main chain at `layer`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub layer: u64,
    #[serde(with = "hash_hex")]
    pub hash: Hash,
}

/// Parses a JSON array of `{"layer": .., "hash": ".."}` objects.
pub fn parse_checkpoints(json: &str) -> Result<Vec<Checkpoint>, Error> {
    serde_json::from_str(json).map_err(|err| Error::Checkpoints(err.to_string()))
}

pub fn load_checkpoints(path: &Path) -> Result<Vec<Checkpoint>, Error> {
    let json = std::fs::read_to_string(path)
        .map_err(|err| Error::Checkpoints(format!("Failed to read {}: {err}", path.display())))?;
    parse_checkpoints(&json)
}

/// Checkpoint bookkeeping of the chain.
///
/// The most recent checkpoint reached by the main chain is looked up lazily and only ever
/// advances forward.
#[derive(Debug, Clone)]
pub struct Checkpoints {
    /// Sorted by layer.
    checkpoints: Vec<Checkpoint>,
    by_layer: HashMap<u64, Hash>,
    disabled: bool,
    checkpoint_node: Option<NodeId>,
    /// Index of the next checkpoint the main chain has not reached yet.
    next_checkpoint: Option<usize>,
}

impl Checkpoints {
    pub fn new(mut checkpoints: Vec<Checkpoint>, disabled: bool) -> Self {
        checkpoints.sort_by_key(|checkpoint| checkpoint.layer);
        let by_layer = checkpoints
            .iter()
            .map(|checkpoint| (checkpoint.layer, checkpoint.hash))
            .collect();
        Self {
            checkpoints,
            by_layer,
            disabled,
            checkpoint_node: None,
            next_checkpoint: None,
        }
    }

    pub fn has_checkpoints(&self) -> bool {
        !self.disabled && !self.checkpoints.is_empty()
    }

    pub fn checkpoints(&self) -> &[Checkpoint] {
        if self.has_checkpoints() {
            &self.checkpoints
        } else {
            &[]
        }
    }

    pub fn set_disabled(&mut self, disabled: bool) {
        self.disabled = disabled;
    }

    /// Forgets the cached checkpoint block, for use after the DAG was rebuilt.
    pub fn reset(&mut self) {
        self.checkpoint_node = None;
        self.next_checkpoint = None;
    }

    pub fn latest(&self) -> Option<&Checkpoint> {
        if !self.has_checkpoints() {
            return None;
        }
        self.checkpoints.last()
    }

    /// Returns `false` if a checkpoint exists at `layer` and `hash` is not the checkpointed
    /// block.
    pub fn verify(&self, layer: u64, hash: &Hash) -> bool {
        if !self.has_checkpoints() {
            return true;
        }

        let Some(checkpoint) = self.by_layer.get(&layer) else {
            return true;
        };

        if checkpoint != hash {
            return false;
        }

        tracing::info!("Verified checkpoint at layer {layer}/block {checkpoint}");
        true
    }

    /// Returns the most recent checkpoint block the main chain has passed.
    ///
    /// # Panics
    ///
    /// Panics if the main chain reached the layer of the next checkpoint but the checkpoint
    /// block is not in the DAG, which the checkpoint verification rules out.
    pub fn find_previous<O: DagOrdering>(&mut self, dag: &BlockDag<O>) -> Option<NodeId> {
        if !self.has_checkpoints() {
            return None;
        }

        if self.checkpoint_node.is_none() && self.next_checkpoint.is_none() {
            for (i, checkpoint) in self.checkpoints.iter().enumerate().rev() {
                let Some(node) = dag.index().lookup_id(&checkpoint.hash) else {
                    continue;
                };
                self.checkpoint_node = Some(node);
                self.next_checkpoint = (i + 1 < self.checkpoints.len()).then_some(i + 1);
                return self.checkpoint_node;
            }

            self.next_checkpoint = Some(0);
            return None;
        }

        let Some(next) = self.next_checkpoint else {
            return self.checkpoint_node;
        };

        let next_checkpoint = self.checkpoints[next];
        if dag.main_height() < next_checkpoint.layer {
            return self.checkpoint_node;
        }

        let node = dag.index().lookup_id(&next_checkpoint.hash).unwrap_or_else(|| {
            panic!(
                "Failed lookup of known good checkpoint block {} at layer {}",
                next_checkpoint.hash, next_checkpoint.layer
            )
        });

        self.checkpoint_node = Some(node);
        self.next_checkpoint = (next + 1 < self.checkpoints.len()).then_some(next + 1);
        self.checkpoint_node
    }
}

mod hash_hex {
    use dagchain_primitives::Hash;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(hash: &Hash, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(hash)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Hash, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
