use dagchain_primitives::Hash;

/// Reasons a block can not be inserted into the DAG.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DagError {
    #[error("Block {0} already exists")]
    DuplicateBlock(Hash),
    #[error("Block {0} has no parents")]
    NoParents(Hash),
    #[error("Block {block} references parent {parent} more than once")]
    DuplicateParent { block: Hash, parent: Hash },
    #[error("Block {block} has unknown parents: {missing:?}")]
    MissingParents { block: Hash, missing: Vec<Hash> },
    #[error("Block {block} does not descend from the finality point {finality_point}")]
    ForkTooOld { block: Hash, finality_point: Hash },
}
