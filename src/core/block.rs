// Block data structures

use crate::core::serialize::{write_varint, Decoder};
use crate::core::{hash256, Hash256, Transaction};
use crate::error::{Error, Result};
use std::io::{Cursor, Read};

/// Size of a serialized header in bytes
pub const HEADER_SIZE: usize = 80;

/// Size of a serialized header in hex characters
pub const HEADER_HEX_LEN: usize = HEADER_SIZE * 2;

/// Block header - 80 bytes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockHeader {
    pub version: u32,
    pub prev_block_hash: Hash256,
    pub merkle_root: Hash256,
    /// Unix epoch seconds
    pub timestamp: u32,
    /// Difficulty target (compact format)
    pub bits: u32,
    pub nonce: u32,
}

impl BlockHeader {
    pub fn new(
        version: u32,
        prev_block_hash: Hash256,
        merkle_root: Hash256,
        timestamp: u32,
        bits: u32,
        nonce: u32,
    ) -> Self {
        Self {
            version,
            prev_block_hash,
            merkle_root,
            timestamp,
            bits,
            nonce,
        }
    }

    pub fn hash(&self) -> Hash256 {
        hash256(&self.serialize())
    }

    /// Serialize the block header (always 80 bytes)
    pub fn serialize(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0..4].copy_from_slice(&self.version.to_le_bytes());
        buf[4..36].copy_from_slice(self.prev_block_hash.as_bytes());
        buf[36..68].copy_from_slice(self.merkle_root.as_bytes());
        buf[68..72].copy_from_slice(&self.timestamp.to_le_bytes());
        buf[72..76].copy_from_slice(&self.bits.to_le_bytes());
        buf[76..80].copy_from_slice(&self.nonce.to_le_bytes());
        buf
    }

    /// Fixed-width hex form kept by the header chain and storage
    pub fn to_hex(&self) -> String {
        hex::encode(self.serialize())
    }

    pub fn from_hex(hex_str: &str) -> Result<Self> {
        if hex_str.len() != HEADER_HEX_LEN {
            return Err(Error::Decode(format!(
                "header must be {} hex characters, got {}",
                HEADER_HEX_LEN,
                hex_str.len()
            )));
        }
        let bytes = hex::decode(hex_str)?;
        Self::decode(&mut Decoder::new(Cursor::new(bytes)))
    }

    pub fn decode<R: Read>(decoder: &mut Decoder<R>) -> Result<Self> {
        Ok(Self {
            version: decoder.read_u32()?,
            prev_block_hash: Hash256::new(decoder.read_array()?),
            merkle_root: Hash256::new(decoder.read_array()?),
            timestamp: decoder.read_u32()?,
            bits: decoder.read_u32()?,
            nonce: decoder.read_u32()?,
        })
    }
}

/// Block - header and transactions in block order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub header: BlockHeader,
    pub transactions: Vec<Transaction>,
}

impl Block {
    pub fn new(header: BlockHeader, transactions: Vec<Transaction>) -> Self {
        Self {
            header,
            transactions,
        }
    }

    pub fn hash(&self) -> Hash256 {
        self.header.hash()
    }

    /// Transaction ids in block order, the leaves of the Merkle tree
    pub fn txids(&self) -> Vec<Hash256> {
        self.transactions.iter().map(Transaction::txid).collect()
    }

    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = self.header.serialize().to_vec();
        let _ = write_varint(&mut buf, self.transactions.len() as u64);
        for tx in &self.transactions {
            buf.extend_from_slice(&tx.serialize());
        }
        buf
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let mut decoder = Decoder::new(Cursor::new(data));
        let header = BlockHeader::decode(&mut decoder)?;

        let tx_count = decoder.read_varint()?;
        let mut transactions = Vec::new();
        for _ in 0..tx_count {
            transactions.push(Transaction::decode(&mut decoder)?);
        }

        let consumed = decoder.into_inner().position() as usize;
        if consumed != data.len() {
            return Err(Error::Decode(format!(
                "{} trailing bytes after block",
                data.len() - consumed
            )));
        }

        Ok(Self {
            header,
            transactions,
        })
    }

    pub fn from_hex(hex_str: &str) -> Result<Self> {
        Self::from_bytes(&hex::decode(hex_str)?)
    }
}
