//! The object store abstraction: the Uploader (C5) and the orphan pruner
//! (§4.10) talk to S3 only through this trait, the way the teacher's
//! `backend.rs` decouples its pack/index/snapshot store from the concrete
//! filesystem/B2 backend. Unlike the teacher, every method here is async —
//! `aws-sdk-s3` is async-first, and there's no local read-through cache to
//! reconcile with a synchronous call style (this crate uploads, it doesn't
//! repeatedly re-read content-addressed blobs).

use anyhow::Result;
use async_trait::async_trait;
use camino::Utf8Path;
use serde_derive::{Deserialize, Serialize};

pub mod memory;
pub mod s3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StorageClass {
    /// Bags: the cold-storage tier the whole system exists to use cheaply.
    DeepArchive,
    /// Manifests and system artifacts (§4.5): cheap to re-fetch, not worth
    /// the retrieval-fee/latency hit of Deep Archive.
    Standard,
}

/// The remote object's content-hash as returned after upload (the glossary's
/// "Verifier"). Not a locally computed hash — whatever the store says it is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verifier(pub String);

impl std::fmt::Display for Verifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Streams the file at `local_path` to `key` under the given storage
    /// class, returning the verifier from the upload response if the
    /// backend supplies one directly (some S3-compatible stores do, some
    /// require a follow-up head request — see `head_verifier`).
    async fn put(
        &self,
        key: &str,
        local_path: &Utf8Path,
        storage_class: StorageClass,
    ) -> Result<Option<Verifier>>;

    /// A metadata-only read to obtain the authoritative verifier after an
    /// upload whose response didn't include one (§4.5).
    async fn head_verifier(&self, key: &str) -> Result<Option<Verifier>>;

    /// Lists every key under `prefix`.
    async fn list(&self, prefix: &str) -> Result<Vec<String>>;

    /// Deletes up to 1000 keys in a single request (the S3 API's own cap,
    /// mirrored from `original_source/prune.py`'s batching).
    async fn delete_batch(&self, keys: &[String]) -> Result<()>;
}

/// Batches `keys` into groups of at most `BATCH_LIMIT` and issues one
/// `delete_batch` call per group, used by the orphan pruner (§4.10).
pub const DELETE_BATCH_LIMIT: usize = 1000;

pub async fn delete_all(store: &dyn ObjectStore, keys: &[String]) -> Result<()> {
    for chunk in keys.chunks(DELETE_BATCH_LIMIT) {
        store.delete_batch(chunk).await?;
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::backend::memory::MemoryStore;

    #[tokio::test]
    async fn delete_all_batches_at_the_limit() -> Result<()> {
        let store = MemoryStore::new();
        let keys: Vec<String> = (0..2500).map(|i| format!("k{i}")).collect();
        for k in &keys {
            store.seed(k, b"x");
        }
        delete_all(&store, &keys).await?;
        assert_eq!(store.remaining_keys().len(), 0);
        Ok(())
    }
}
