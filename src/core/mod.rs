// Core chain data structures and encodings

mod block;
mod hash;
mod network;
mod transaction;
mod types;
pub mod script;
pub mod serialize;

pub use block::{Block, BlockHeader, HEADER_HEX_LEN, HEADER_SIZE};
pub use hash::*;
pub use network::Network;
pub use transaction::{Transaction, TxInput, TxOutput};
pub use types::{Hash256, OutPoint};
