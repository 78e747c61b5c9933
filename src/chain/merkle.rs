// Merkle inclusion proofs

use crate::core::{hash256_pair, Hash256};
use crate::error::{Error, Result};

/// Inclusion branch of one transaction in a block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MerkleProof {
    /// Position of the leaf in the block
    pub pos: usize,
    /// Sibling hashes from the leaf level up to just below the root
    pub branch: Vec<Hash256>,
}

impl MerkleProof {
    /// Fold `leaf` up the branch; equals the block's Merkle root when the proof holds
    pub fn root(&self, leaf: &Hash256) -> Hash256 {
        self.branch
            .iter()
            .enumerate()
            .fold(*leaf, |node, (level, sibling)| {
                if (self.pos >> level) & 1 == 1 {
                    hash256_pair(sibling, &node)
                } else {
                    hash256_pair(&node, sibling)
                }
            })
    }
}

/// Merkle root over `txids`; zero hash for an empty list
pub fn merkle_root(txids: &[Hash256]) -> Hash256 {
    if txids.is_empty() {
        return Hash256::zero();
    }

    let mut level = txids.to_vec();
    while level.len() > 1 {
        level = next_level(&level);
    }
    level[0]
}

fn next_level(level: &[Hash256]) -> Vec<Hash256> {
    level
        .chunks(2)
        .map(|pair| {
            let left = &pair[0];
            let right = pair.get(1).unwrap_or(left);
            hash256_pair(left, right)
        })
        .collect()
}

/// Sibling path for `target` among a block's `txids`.
///
/// Odd levels duplicate their last node. At each level the pair holding the
/// tracked node contributes its other member, and the tracked node moves to
/// the pair's parent.
pub fn merkle_branch(txids: &[Hash256], target: &Hash256) -> Result<MerkleProof> {
    let pos = txids
        .iter()
        .position(|txid| txid == target)
        .ok_or_else(|| Error::NotFound(format!("transaction {} not in block", target)))?;

    let mut branch = Vec::new();
    let mut level = txids.to_vec();
    let mut index = pos;

    while level.len() > 1 {
        if level.len() % 2 == 1 {
            level.push(level[level.len() - 1]);
        }
        branch.push(level[index ^ 1]);
        level = next_level(&level);
        index /= 2;
    }

    Ok(MerkleProof { pos, branch })
}
