//! An in-process fake object store for tests, mirroring the teacher's
//! `backend::memory::MemoryBackend` role but implementing the async
//! `ObjectStore` trait instead.

use std::sync::Mutex;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use camino::Utf8Path;
use rustc_hash::FxHashMap;

use super::{ObjectStore, StorageClass, Verifier};

#[derive(Default)]
struct Inner {
    objects: FxHashMap<String, Vec<u8>>,
}

/// Great for testing: never touches the network, verifiers are just a
/// content digest of the bytes it received.
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
        }
    }

    pub fn seed(&self, key: &str, bytes: &[u8]) {
        self.inner
            .lock()
            .unwrap()
            .objects
            .insert(key.to_string(), bytes.to_vec());
    }

    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.inner.lock().unwrap().objects.get(key).cloned()
    }

    pub fn remaining_keys(&self) -> Vec<String> {
        self.inner.lock().unwrap().objects.keys().cloned().collect()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn put(
        &self,
        key: &str,
        local_path: &Utf8Path,
        _storage_class: StorageClass,
    ) -> Result<Option<Verifier>> {
        let bytes = std::fs::read(local_path)?;
        let verifier = Verifier(format!("{:x}", md5_stub(&bytes)));
        self.inner
            .lock()
            .unwrap()
            .objects
            .insert(key.to_string(), bytes);
        Ok(Some(verifier))
    }

    async fn head_verifier(&self, key: &str) -> Result<Option<Verifier>> {
        let guard = self.inner.lock().unwrap();
        let bytes = guard
            .objects
            .get(key)
            .ok_or_else(|| anyhow!("no object {key}"))?;
        Ok(Some(Verifier(format!("{:x}", md5_stub(bytes)))))
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .objects
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }

    async fn delete_batch(&self, keys: &[String]) -> Result<()> {
        let mut guard = self.inner.lock().unwrap();
        for key in keys {
            guard.objects.remove(key);
        }
        Ok(())
    }
}

/// A deliberately tiny, non-cryptographic digest; the fake store only needs
/// *a* verifier that changes when the bytes do, not a real ETag.
fn md5_stub(bytes: &[u8]) -> u64 {
    use std::hash::{Hash, Hasher};
    let mut hasher = rustc_hash::FxHasher::default();
    bytes.hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn put_then_head_returns_matching_verifier() -> Result<()> {
        let store = MemoryStore::new();
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("bag.tar");
        std::fs::File::create(&path)?.write_all(b"hello")?;
        let utf8 = Utf8Path::from_path(&path).unwrap();

        let put_verifier = store.put("2026-backup/x_bag_00001.tar", utf8, StorageClass::DeepArchive).await?;
        let head_verifier = store.head_verifier("2026-backup/x_bag_00001.tar").await?;
        assert_eq!(put_verifier, head_verifier);
        Ok(())
    }

    #[tokio::test]
    async fn list_filters_by_prefix() -> Result<()> {
        let store = MemoryStore::new();
        store.seed("2026-backup/manifests/a.txt", b"a");
        store.seed("2026-backup/host_br_bag_00001.tar", b"b");
        let keys = store.list("2026-backup/manifests/").await?;
        assert_eq!(keys, vec!["2026-backup/manifests/a.txt".to_string()]);
        Ok(())
    }
}
