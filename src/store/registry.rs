//! Engine registry: maps engine names to store constructors so callers
//! select storage by configuration rather than by type. Registration is
//! explicit; nothing is discovered at runtime.

use super::Store;
use crate::error::StoreError;
use crate::kvstore::{KvStore, MemoryBackend};
use crate::treestore::TreeStore;
use eyre::Result;
use hashbrown::HashMap;
use std::path::Path;
use std::sync::Arc;

pub type StoreConstructor = Box<dyn Fn(&Path) -> Result<Arc<dyn Store>> + Send + Sync>;

#[derive(Default)]
pub struct Registry {
    engines: HashMap<String, StoreConstructor>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with the built-in engines:
    ///
    /// - `"tree"`: the durable copy-on-write tree engine; the path names
    ///   its write-ahead log file.
    /// - `"memkv"`: the key-value engine over the in-memory backend; the
    ///   path is ignored. Mainly useful for tests and as a template for
    ///   registering the engine over a real backend.
    pub fn with_default_engines() -> Self {
        let mut registry = Self::new();
        registry.register("tree", |path| {
            Ok(Arc::new(TreeStore::open(path)?) as Arc<dyn Store>)
        });
        registry.register("memkv", |_| {
            Ok(Arc::new(KvStore::open(Arc::new(MemoryBackend::new()))?) as Arc<dyn Store>)
        });
        registry
    }

    pub fn register(
        &mut self,
        name: &str,
        constructor: impl Fn(&Path) -> Result<Arc<dyn Store>> + Send + Sync + 'static,
    ) {
        self.engines.insert(name.to_string(), Box::new(constructor));
    }

    pub fn open(&self, engine: &str, path: &Path) -> Result<Arc<dyn Store>> {
        match self.engines.get(engine) {
            Some(constructor) => constructor(path),
            None => Err(StoreError::NotFound(format!("storage engine {engine}")).into()),
        }
    }

    pub fn engine_names(&self) -> impl Iterator<Item = &str> {
        self.engines.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::is_not_found;

    #[test]
    fn unknown_engine_is_not_found() {
        let registry = Registry::with_default_engines();
        let err = registry.open("paper", Path::new("/dev/null")).unwrap_err();
        assert!(is_not_found(&err));
    }

    #[test]
    fn default_engines_are_registered() {
        let registry = Registry::with_default_engines();
        let mut names: Vec<&str> = registry.engine_names().collect();
        names.sort_unstable();
        assert_eq!(names, vec!["memkv", "tree"]);
    }

    #[test]
    fn custom_engine_can_be_registered() {
        let mut registry = Registry::new();
        registry.register("mem", |_| {
            Ok(Arc::new(KvStore::open(Arc::new(MemoryBackend::new()))?) as Arc<dyn Store>)
        });
        assert!(registry.open("mem", Path::new("ignored")).is_ok());
    }
}
