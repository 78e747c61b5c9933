// Coin index and header storage using sled

use super::{Coin, Storage};
use crate::core::{Hash256, OutPoint};
use crate::error::{Error, Result};
use sled::{Batch, Db};
use std::path::Path;

const INFO: u8 = b'i';
const HEADER: u8 = b'h';
const COIN: u8 = b'c';
const ADDRESS: u8 = b'a';
const TOUCHED: u8 = b't';
const EMPTY: &[u8] = &[];

/// Single sled tree, partitioned by key prefix:
///
/// - `i` key → info value
/// - `h` height(BE) → header hex
/// - `c` outpoint address → coin record
/// - `a` len address outpoint → ()
/// - `t` height(BE) len address outpoint → ()
///
/// Each mutation is applied as one batch.
pub struct SledStorage {
    db: Db,
}

impl SledStorage {
    /// Open or create the database at `path`
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let db = sled::open(path)?;
        Ok(Self { db })
    }

    /// Create a temporary database (for testing)
    pub fn memory() -> Result<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        Ok(Self { db })
    }

    pub fn flush(&self) -> Result<()> {
        self.db.flush()?;
        Ok(())
    }

    fn info_key(key: &str) -> Vec<u8> {
        let mut k = vec![INFO];
        k.extend_from_slice(key.as_bytes());
        k
    }

    fn header_key(height: u32) -> Vec<u8> {
        let mut k = vec![HEADER];
        k.extend_from_slice(&height.to_be_bytes());
        k
    }

    fn coin_prefix(outpoint: &OutPoint) -> Vec<u8> {
        let mut k = vec![COIN];
        k.extend_from_slice(&outpoint.to_bytes());
        k
    }

    fn coin_key(outpoint: &OutPoint, address: &str) -> Vec<u8> {
        let mut k = Self::coin_prefix(outpoint);
        k.extend_from_slice(address.as_bytes());
        k
    }

    fn push_address(k: &mut Vec<u8>, address: &str) -> Result<()> {
        let len = u8::try_from(address.len())
            .map_err(|_| Error::Storage(format!("address too long: {} bytes", address.len())))?;
        k.push(len);
        k.extend_from_slice(address.as_bytes());
        Ok(())
    }

    fn address_prefix(address: &str) -> Result<Vec<u8>> {
        let mut k = vec![ADDRESS];
        Self::push_address(&mut k, address)?;
        Ok(k)
    }

    fn address_key(address: &str, outpoint: &OutPoint) -> Result<Vec<u8>> {
        let mut k = Self::address_prefix(address)?;
        k.extend_from_slice(&outpoint.to_bytes());
        Ok(k)
    }

    fn touched_prefix(height: u32) -> Vec<u8> {
        let mut k = vec![TOUCHED];
        k.extend_from_slice(&height.to_be_bytes());
        k
    }

    fn touched_key(height: u32, address: &str, outpoint: &OutPoint) -> Result<Vec<u8>> {
        let mut k = Self::touched_prefix(height);
        Self::push_address(&mut k, address)?;
        k.extend_from_slice(&outpoint.to_bytes());
        Ok(k)
    }

    /// Every coin recorded for `outpoint`, one per owning address
    fn coins_at(&self, outpoint: &OutPoint) -> Result<Vec<Coin>> {
        let prefix = Self::coin_prefix(outpoint);
        let mut coins = Vec::new();
        for entry in self.db.scan_prefix(&prefix) {
            let (key, value) = entry?;
            let address = std::str::from_utf8(&key[prefix.len()..])
                .map_err(|e| Error::Storage(format!("corrupt coin key: {}", e)))?;
            coins.push(Coin::from_record(address, *outpoint, &value)?);
        }
        Ok(coins)
    }
}

impl Storage for SledStorage {
    fn info(&self, key: &str) -> Result<Option<String>> {
        match self.db.get(Self::info_key(key))? {
            Some(value) => Ok(Some(String::from_utf8_lossy(&value).into_owned())),
            None => Ok(None),
        }
    }

    fn put_info(&self, key: &str, value: &str) -> Result<()> {
        self.db.insert(Self::info_key(key), value.as_bytes())?;
        Ok(())
    }

    fn push_header(&self, header_hex: &str, height: u32) -> Result<()> {
        self.db.insert(Self::header_key(height), header_hex.as_bytes())?;
        Ok(())
    }

    fn pop_header(&self) -> Result<()> {
        if let Some(entry) = self.db.scan_prefix([HEADER]).next_back() {
            let (key, _) = entry?;
            self.db.remove(key)?;
        }
        Ok(())
    }

    fn all_headers(&self) -> Result<Vec<String>> {
        self.db
            .scan_prefix([HEADER])
            .values()
            .map(|value| {
                let value = value?;
                String::from_utf8(value.to_vec())
                    .map_err(|e| Error::Storage(format!("corrupt header: {}", e)))
            })
            .collect()
    }

    fn add_coin(&self, address: &str, outpoint: &OutPoint, value: u64, height: u32) -> Result<()> {
        let coin = Coin::new(address, *outpoint, value, height);

        let mut batch = Batch::default();
        batch.insert(Self::coin_key(outpoint, address), coin.record_bytes());
        batch.insert(Self::address_key(address, outpoint)?, EMPTY);
        batch.insert(Self::touched_key(height, address, outpoint)?, EMPTY);
        self.db.apply_batch(batch)?;
        Ok(())
    }

    fn remove_coin(&self, outpoint: &OutPoint) -> Result<()> {
        let mut batch = Batch::default();
        for coin in self.coins_at(outpoint)? {
            batch.remove(Self::coin_key(outpoint, &coin.address));
            batch.remove(Self::address_key(&coin.address, outpoint)?);
            batch.remove(Self::touched_key(coin.height, &coin.address, outpoint)?);
            if let Some(spent_height) = coin.spent_height {
                batch.remove(Self::touched_key(spent_height, &coin.address, outpoint)?);
            }
        }
        self.db.apply_batch(batch)?;
        Ok(())
    }

    fn set_spent(&self, outpoint: &OutPoint, spent_by: &Hash256, height: u32) -> Result<()> {
        let mut batch = Batch::default();
        for mut coin in self.coins_at(outpoint)? {
            if let Some(previous) = coin.spent_height.filter(|h| *h != coin.height) {
                batch.remove(Self::touched_key(previous, &coin.address, outpoint)?);
            }
            coin.mark_spent(*spent_by, height);
            batch.insert(Self::coin_key(outpoint, &coin.address), coin.record_bytes());
            batch.insert(Self::touched_key(height, &coin.address, outpoint)?, EMPTY);
        }
        self.db.apply_batch(batch)?;
        Ok(())
    }

    fn set_unspent(&self, outpoint: &OutPoint) -> Result<()> {
        let mut batch = Batch::default();
        for mut coin in self.coins_at(outpoint)? {
            // a spend in the creating block shares the creation entry
            if let Some(spent_height) = coin.spent_height.filter(|h| *h != coin.height) {
                batch.remove(Self::touched_key(spent_height, &coin.address, outpoint)?);
            }
            coin.mark_unspent();
            batch.insert(Self::coin_key(outpoint, &coin.address), coin.record_bytes());
        }
        self.db.apply_batch(batch)?;
        Ok(())
    }

    fn addresses_for(&self, outpoint: &OutPoint) -> Result<Vec<String>> {
        Ok(self.coins_at(outpoint)?.into_iter().map(|coin| coin.address).collect())
    }

    fn spender(&self, outpoint: &OutPoint) -> Result<Option<Hash256>> {
        Ok(self.coins_at(outpoint)?.into_iter().find_map(|coin| coin.spent_by))
    }

    fn coins(&self, address: &str) -> Result<Vec<Coin>> {
        let prefix = Self::address_prefix(address)?;
        let mut coins = Vec::new();
        for key in self.db.scan_prefix(&prefix).keys() {
            let key = key?;
            let outpoint = OutPoint::from_bytes(&key[prefix.len()..])?;
            if let Some(value) = self.db.get(Self::coin_key(&outpoint, address))? {
                coins.push(Coin::from_record(address, outpoint, &value)?);
            }
        }
        Ok(coins)
    }

    fn touched_addresses_at(&self, height: u32) -> Result<Vec<String>> {
        let prefix = Self::touched_prefix(height);
        let mut addresses: Vec<String> = Vec::new();
        for key in self.db.scan_prefix(&prefix).keys() {
            let key = key?;
            let rest = &key[prefix.len()..];
            let len = rest.first().copied().unwrap_or(0) as usize;
            let address = rest
                .get(1..1 + len)
                .and_then(|bytes| std::str::from_utf8(bytes).ok())
                .ok_or_else(|| Error::Storage("corrupt touched key".to_string()))?;
            // keys sort by address, so duplicates are adjacent
            if addresses.last().map(String::as_str) != Some(address) {
                addresses.push(address.to_string());
            }
        }
        Ok(addresses)
    }
}
