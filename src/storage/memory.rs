// In-process storage backend

use super::{Coin, Storage};
use crate::core::{Hash256, OutPoint};
use crate::error::Result;
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet, HashMap};

#[derive(Default)]
struct Inner {
    info: HashMap<String, String>,
    headers: Vec<String>,
    coins: HashMap<OutPoint, Vec<Coin>>,
    by_address: HashMap<String, BTreeSet<OutPoint>>,
    touched: BTreeMap<u32, BTreeSet<(String, OutPoint)>>,
}

impl Inner {
    fn touch(&mut self, height: u32, address: &str, outpoint: &OutPoint) {
        self.touched
            .entry(height)
            .or_default()
            .insert((address.to_string(), *outpoint));
    }

    fn untouch(&mut self, height: u32, address: &str, outpoint: &OutPoint) {
        if let Some(entries) = self.touched.get_mut(&height) {
            entries.remove(&(address.to_string(), *outpoint));
            if entries.is_empty() {
                self.touched.remove(&height);
            }
        }
    }
}

/// Storage held in process memory; everything is lost on exit.
/// Used for tests and for throwaway indexing runs.
#[derive(Default)]
pub struct MemoryStorage {
    inner: RwLock<Inner>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Storage for MemoryStorage {
    fn info(&self, key: &str) -> Result<Option<String>> {
        Ok(self.inner.read().info.get(key).cloned())
    }

    fn put_info(&self, key: &str, value: &str) -> Result<()> {
        self.inner.write().info.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn push_header(&self, header_hex: &str, height: u32) -> Result<()> {
        let mut inner = self.inner.write();
        let height = height as usize;
        if height < inner.headers.len() {
            inner.headers[height] = header_hex.to_string();
        } else {
            inner.headers.push(header_hex.to_string());
        }
        Ok(())
    }

    fn pop_header(&self) -> Result<()> {
        self.inner.write().headers.pop();
        Ok(())
    }

    fn all_headers(&self) -> Result<Vec<String>> {
        Ok(self.inner.read().headers.clone())
    }

    fn add_coin(&self, address: &str, outpoint: &OutPoint, value: u64, height: u32) -> Result<()> {
        let mut guard = self.inner.write();
        let inner = &mut *guard;
        let coins = inner.coins.entry(*outpoint).or_default();
        coins.retain(|coin| coin.address != address);
        coins.push(Coin::new(address, *outpoint, value, height));
        inner
            .by_address
            .entry(address.to_string())
            .or_default()
            .insert(*outpoint);
        inner.touch(height, address, outpoint);
        Ok(())
    }

    fn remove_coin(&self, outpoint: &OutPoint) -> Result<()> {
        let mut guard = self.inner.write();
        let inner = &mut *guard;
        for coin in inner.coins.remove(outpoint).unwrap_or_default() {
            if let Some(outpoints) = inner.by_address.get_mut(&coin.address) {
                outpoints.remove(outpoint);
                if outpoints.is_empty() {
                    inner.by_address.remove(&coin.address);
                }
            }
            inner.untouch(coin.height, &coin.address, outpoint);
            if let Some(spent_height) = coin.spent_height {
                inner.untouch(spent_height, &coin.address, outpoint);
            }
        }
        Ok(())
    }

    fn set_spent(&self, outpoint: &OutPoint, spent_by: &Hash256, height: u32) -> Result<()> {
        let mut inner = self.inner.write();
        let Some(mut coins) = inner.coins.remove(outpoint) else {
            return Ok(());
        };
        for coin in coins.iter_mut() {
            if let Some(previous) = coin.spent_height.filter(|h| *h != coin.height) {
                inner.untouch(previous, &coin.address, outpoint);
            }
            coin.mark_spent(*spent_by, height);
            inner.touch(height, &coin.address, outpoint);
        }
        inner.coins.insert(*outpoint, coins);
        Ok(())
    }

    fn set_unspent(&self, outpoint: &OutPoint) -> Result<()> {
        let mut inner = self.inner.write();
        let Some(mut coins) = inner.coins.remove(outpoint) else {
            return Ok(());
        };
        for coin in coins.iter_mut() {
            if let Some(spent_height) = coin.spent_height.filter(|h| *h != coin.height) {
                inner.untouch(spent_height, &coin.address, outpoint);
            }
            coin.mark_unspent();
        }
        inner.coins.insert(*outpoint, coins);
        Ok(())
    }

    fn addresses_for(&self, outpoint: &OutPoint) -> Result<Vec<String>> {
        Ok(self
            .inner
            .read()
            .coins
            .get(outpoint)
            .map(|coins| coins.iter().map(|coin| coin.address.clone()).collect())
            .unwrap_or_default())
    }

    fn spender(&self, outpoint: &OutPoint) -> Result<Option<Hash256>> {
        Ok(self
            .inner
            .read()
            .coins
            .get(outpoint)
            .and_then(|coins| coins.iter().find_map(|coin| coin.spent_by)))
    }

    fn coins(&self, address: &str) -> Result<Vec<Coin>> {
        let inner = self.inner.read();
        let Some(outpoints) = inner.by_address.get(address) else {
            return Ok(Vec::new());
        };
        Ok(outpoints
            .iter()
            .filter_map(|outpoint| inner.coins.get(outpoint))
            .flat_map(|coins| coins.iter().filter(|coin| coin.address == address))
            .cloned()
            .collect())
    }

    fn touched_addresses_at(&self, height: u32) -> Result<Vec<String>> {
        let inner = self.inner.read();
        let mut addresses: Vec<String> = inner
            .touched
            .get(&height)
            .map(|entries| entries.iter().map(|(address, _)| address.clone()).collect())
            .unwrap_or_default();
        addresses.dedup();
        Ok(addresses)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::tests::{exercise_handshake, exercise_storage};

    #[test]
    fn test_storage_behaviour() {
        exercise_storage(&MemoryStorage::new());
    }

    #[test]
    fn test_handshake() {
        exercise_handshake(&MemoryStorage::new());
    }

    #[test]
    fn test_spend_in_creating_block() {
        let storage = MemoryStorage::new();
        let outpoint = OutPoint::new(Hash256::new([5; 32]), 0);
        storage.add_coin("alice", &outpoint, 10, 7).unwrap();
        storage.set_spent(&outpoint, &Hash256::new([6; 32]), 7).unwrap();
        storage.set_unspent(&outpoint).unwrap();
        assert_eq!(storage.touched_addresses_at(7).unwrap(), vec!["alice".to_string()]);
    }
}
