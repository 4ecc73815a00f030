//! The backend seam of the key-value engine: any ordered byte-keyed map
//! with get/set/remove and range scans can host the engine. Backends need
//! no transactions of their own; every multi-slot invariant is maintained
//! by the layer above. The in-memory backend here is the test and template
//! implementation; production backends wrap an external ordered store.

use eyre::Result;
use parking_lot::RwLock;
use std::collections::BTreeMap;

/// An ordered key-value backend. Individual operations must be atomic and
/// immediately visible to subsequent operations; nothing more is assumed.
pub trait KvBackend: Send + Sync {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>>;

    fn set(&self, key: &[u8], value: &[u8]) -> Result<()>;

    /// Removing an absent key is a no-op.
    fn remove(&self, key: &[u8]) -> Result<()>;

    /// Entries with `lo <= key < hi` in key order.
    fn scan(&self, lo: &[u8], hi: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>>;
}

#[derive(Default)]
pub struct MemoryBackend {
    map: RwLock<BTreeMap<Vec<u8>, Vec<u8>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KvBackend for MemoryBackend {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.map.read().get(key).cloned())
    }

    fn set(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.map.write().insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn remove(&self, key: &[u8]) -> Result<()> {
        self.map.write().remove(key);
        Ok(())
    }

    fn scan(&self, lo: &[u8], hi: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        Ok(self
            .map
            .read()
            .range(lo.to_vec()..hi.to_vec())
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_get_remove() {
        let backend = MemoryBackend::new();
        backend.set(b"a", b"1").unwrap();
        assert_eq!(backend.get(b"a").unwrap(), Some(b"1".to_vec()));

        backend.set(b"a", b"2").unwrap();
        assert_eq!(backend.get(b"a").unwrap(), Some(b"2".to_vec()));

        backend.remove(b"a").unwrap();
        assert_eq!(backend.get(b"a").unwrap(), None);
        backend.remove(b"a").unwrap();
    }

    #[test]
    fn scan_is_ordered_and_half_open() {
        let backend = MemoryBackend::new();
        for k in [b"c", b"a", b"b", b"d"] {
            backend.set(k, k).unwrap();
        }

        let seen: Vec<Vec<u8>> = backend
            .scan(b"a", b"d")
            .unwrap()
            .into_iter()
            .map(|(k, _)| k)
            .collect();
        assert_eq!(seen, vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec()]);
    }
}
