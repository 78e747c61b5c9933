// Block and transaction builders shared by tests

use crate::chain::merkle_root;
use crate::core::script::{encode_address, p2pkh_script_pubkey};
use crate::core::{
    hash160, Block, BlockHeader, Hash256, Network, OutPoint, Transaction, TxInput, TxOutput,
};

pub const NETWORK: Network = Network::Bitcoin;

/// Public key hash standing in for the key tagged `tag`
pub fn key_hash(tag: u8) -> [u8; 20] {
    hash160(&[tag])
}

pub fn address(tag: u8) -> String {
    encode_address(NETWORK.pubkey_hash_version(), &key_hash(tag))
}

pub fn p2pkh_output(tag: u8, value: u64) -> TxOutput {
    TxOutput::new(value, p2pkh_script_pubkey(&key_hash(tag)))
}

/// Address of a bare public key
pub fn pubkey_address(key: &[u8; 33]) -> String {
    encode_address(NETWORK.pubkey_hash_version(), &hash160(key))
}

/// Bare 1-of-n multisig output over `keys`
pub fn multisig_output(keys: &[[u8; 33]], value: u64) -> TxOutput {
    let mut script = vec![0x51];
    for key in keys {
        script.push(0x21);
        script.extend_from_slice(key);
    }
    script.push(0x50 + keys.len() as u8);
    script.push(0xae);
    TxOutput::new(value, script)
}

/// Coinbase paying `value` to `tag`; the height keeps txids unique
pub fn coinbase(height: u32, tag: u8, value: u64) -> Transaction {
    Transaction::new(
        vec![TxInput::coinbase(height.to_le_bytes().to_vec())],
        vec![p2pkh_output(tag, value)],
    )
}

/// Spend `prevs` into P2PKH outputs `(tag, value)`
pub fn spend(prevs: &[OutPoint], outputs: &[(u8, u64)]) -> Transaction {
    Transaction::new(
        prevs.iter().map(|prev| TxInput::new(*prev, vec![0x51])).collect(),
        outputs.iter().map(|(tag, value)| p2pkh_output(*tag, *value)).collect(),
    )
}

pub fn block(prev: Hash256, height: u32, transactions: Vec<Transaction>) -> Block {
    let txids: Vec<Hash256> = transactions.iter().map(Transaction::txid).collect();
    let header = BlockHeader::new(
        1,
        prev,
        merkle_root(&txids),
        1_600_000_000 + height * 600,
        0x1d00ffff,
        0,
    );
    Block::new(header, transactions)
}

/// Append a block holding a coinbase to `tag` plus `transactions`
pub fn extend(blocks: &mut Vec<Block>, tag: u8, transactions: Vec<Transaction>) {
    let height = blocks.len() as u32;
    let prev = blocks.last().map(Block::hash).unwrap_or_else(Hash256::zero);
    let mut all = vec![coinbase(height, tag, 5_000_000_000)];
    all.extend(transactions);
    blocks.push(block(prev, height, all));
}

/// `count` blocks from genesis, each paying its coinbase to `tag`
pub fn chain(count: u32, tag: u8) -> Vec<Block> {
    let mut blocks = Vec::with_capacity(count as usize);
    for _ in 0..count {
        extend(&mut blocks, tag, Vec::new());
    }
    blocks
}

/// Copy of `base` whose blocks from `height` on are replaced by `count`
/// blocks paying `tag`
pub fn fork(base: &[Block], height: u32, count: u32, tag: u8) -> Vec<Block> {
    let mut blocks = base[..height as usize].to_vec();
    for _ in 0..count {
        extend(&mut blocks, tag, Vec::new());
    }
    blocks
}

pub fn coinbase_outpoint(block: &Block) -> OutPoint {
    OutPoint::new(block.transactions[0].txid(), 0)
}
