// Coin records of the address index

use crate::core::{Hash256, OutPoint};
use crate::error::{Error, Result};

/// One output owned by one address.
///
/// A multisig output is stored once per participant, so several coins may
/// share an outpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Coin {
    pub address: String,
    pub outpoint: OutPoint,
    /// Amount in satoshis
    pub value: u64,
    /// Creation height, 0 while unconfirmed
    pub height: u32,
    /// Spending transaction, if any
    pub spent_by: Option<Hash256>,
    /// Spending height, 0 when spent by an unconfirmed transaction
    pub spent_height: Option<u32>,
}

impl Coin {
    pub fn new(address: &str, outpoint: OutPoint, value: u64, height: u32) -> Self {
        Self {
            address: address.to_string(),
            outpoint,
            value,
            height,
            spent_by: None,
            spent_height: None,
        }
    }

    pub fn is_spent(&self) -> bool {
        self.spent_by.is_some()
    }

    /// Height 0 marks unconfirmed coins, which genesis outputs share: coins
    /// created in block 0 count as unconfirmed.
    pub fn is_confirmed(&self) -> bool {
        self.height != 0
    }

    pub fn mark_spent(&mut self, spent_by: Hash256, height: u32) {
        self.spent_by = Some(spent_by);
        self.spent_height = Some(height);
    }

    pub fn mark_unspent(&mut self) {
        self.spent_by = None;
        self.spent_height = None;
    }

    /// Value part of the record: value, height, then optional spend
    pub fn record_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(49);
        bytes.extend_from_slice(&self.value.to_le_bytes());
        bytes.extend_from_slice(&self.height.to_le_bytes());
        match (self.spent_by, self.spent_height) {
            (Some(txid), Some(height)) => {
                bytes.push(1);
                bytes.extend_from_slice(txid.as_bytes());
                bytes.extend_from_slice(&height.to_le_bytes());
            }
            _ => bytes.push(0),
        }
        bytes
    }

    pub fn from_record(address: &str, outpoint: OutPoint, bytes: &[u8]) -> Result<Self> {
        if bytes.len() != 13 && bytes.len() != 49 {
            return Err(Error::Storage(format!(
                "corrupt coin record for {}: {} bytes",
                outpoint,
                bytes.len()
            )));
        }

        let mut value = [0u8; 8];
        value.copy_from_slice(&bytes[0..8]);
        let mut height = [0u8; 4];
        height.copy_from_slice(&bytes[8..12]);

        let mut coin = Self::new(address, outpoint, u64::from_le_bytes(value), u32::from_le_bytes(height));
        if bytes[12] == 1 && bytes.len() == 49 {
            let spent_by = Hash256::from_slice(&bytes[13..45])?;
            let mut spent_height = [0u8; 4];
            spent_height.copy_from_slice(&bytes[45..49]);
            coin.mark_spent(spent_by, u32::from_le_bytes(spent_height));
        }
        Ok(coin)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_bytes() {
        let outpoint = OutPoint::new(Hash256::new([1; 32]), 3);
        let mut coin = Coin::new("addr", outpoint, 5000, 100);
        assert_eq!(coin.record_bytes().len(), 13);
        assert_eq!(Coin::from_record("addr", outpoint, &coin.record_bytes()).unwrap(), coin);

        coin.mark_spent(Hash256::new([2; 32]), 0);
        let bytes = coin.record_bytes();
        assert_eq!(bytes.len(), 49);
        let decoded = Coin::from_record("addr", outpoint, &bytes).unwrap();
        assert_eq!(decoded.spent_height, Some(0));
        assert!(decoded.is_spent());
    }

    #[test]
    fn test_genesis_coin_counts_as_unconfirmed() {
        let outpoint = OutPoint::new(Hash256::new([1; 32]), 0);
        assert!(!Coin::new("addr", outpoint, 5000, 0).is_confirmed());
        assert!(Coin::new("addr", outpoint, 5000, 1).is_confirmed());
    }

    #[test]
    fn test_corrupt_record() {
        let outpoint = OutPoint::new(Hash256::zero(), 0);
        assert!(matches!(Coin::from_record("a", outpoint, &[1, 2, 3]), Err(Error::Storage(_))));
    }
}
