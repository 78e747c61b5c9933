// Header chain, transaction ordering and Merkle proofs

pub mod headers;
pub mod merkle;
pub mod toposort;

pub use headers::{HeaderChain, CHUNK_SIZE};
pub use merkle::{merkle_branch, merkle_root, MerkleProof};
pub use toposort::{dependency_order, sort_transactions};
