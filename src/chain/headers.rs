// In-memory header chain, chunked by difficulty epoch

use crate::core::{hash256, Hash256, HEADER_HEX_LEN};
use crate::error::{Error, Result};

/// Headers per chunk (one difficulty epoch)
pub const CHUNK_SIZE: usize = 2016;

const CHUNK_HEX_LEN: usize = CHUNK_SIZE * HEADER_HEX_LEN;

/// Validated header sequence held as concatenated hex chunks.
///
/// Every chunk but the last holds exactly [`CHUNK_SIZE`] headers, and the
/// last chunk is never empty. Chunks are served verbatim to clients that
/// bulk-download headers.
#[derive(Debug, Clone, Default)]
pub struct HeaderChain {
    chunks: Vec<String>,
}

impl HeaderChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from headers stored in height order
    pub fn from_headers<I, S>(headers: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut chain = Self::new();
        for header in headers {
            chain.append(header.as_ref())?;
        }
        Ok(chain)
    }

    /// Append a header, opening a new chunk when the last one is full.
    /// Content is trusted; only the width is checked.
    pub fn append(&mut self, header_hex: &str) -> Result<()> {
        if header_hex.len() != HEADER_HEX_LEN
            || !header_hex.bytes().all(|b| b.is_ascii_hexdigit())
        {
            return Err(Error::Decode(format!(
                "header must be {} hex characters, got {}",
                HEADER_HEX_LEN,
                header_hex.len()
            )));
        }

        match self.chunks.last_mut() {
            Some(last) if last.len() < CHUNK_HEX_LEN => last.push_str(header_hex),
            _ => {
                let mut chunk = String::with_capacity(CHUNK_HEX_LEN);
                chunk.push_str(header_hex);
                self.chunks.push(chunk);
            }
        }
        Ok(())
    }

    /// Remove the newest header, closing the last chunk when it empties
    pub fn rollback(&mut self) -> Result<String> {
        let last = self.chunks.last_mut().ok_or(Error::Underflow)?;
        let header = last.split_off(last.len() - HEADER_HEX_LEN);
        if last.is_empty() {
            self.chunks.pop();
        }
        Ok(header)
    }

    /// Number of headers held
    pub fn height(&self) -> u32 {
        match self.chunks.last() {
            Some(last) => {
                ((self.chunks.len() - 1) * CHUNK_SIZE + last.len() / HEADER_HEX_LEN) as u32
            }
            None => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn header_at(&self, height: u32) -> Result<&str> {
        if height >= self.height() {
            return Err(Error::range("header", height, self.height()));
        }
        let chunk = &self.chunks[height as usize / CHUNK_SIZE];
        let offset = (height as usize % CHUNK_SIZE) * HEADER_HEX_LEN;
        Ok(&chunk[offset..offset + HEADER_HEX_LEN])
    }

    pub fn chunk_at(&self, index: u32) -> Result<&str> {
        self.chunks
            .get(index as usize)
            .map(String::as_str)
            .ok_or_else(|| Error::range("chunk", index, self.chunks.len() as u32))
    }

    pub fn chunk_count(&self) -> u32 {
        self.chunks.len() as u32
    }

    /// Hash of the tip header; the zero hash for an empty chain, which is
    /// what genesis names as its previous block
    pub fn tip_hash(&self) -> Result<Hash256> {
        match self.height().checked_sub(1) {
            Some(tip) => {
                let bytes = hex::decode(self.header_at(tip)?)?;
                Ok(hash256(&bytes))
            }
            None => Ok(Hash256::zero()),
        }
    }
}
