//! C6: the durable local catalog ("inventory"). A single JSON document
//! mapping branches to leaves, written atomically after every committed bag.
//!
//! Grounded on the teacher's write-temp-then-rename discipline
//! (`file_util::safe_copy_to_file`, `index.rs`'s WIP-file rewrite-per-pack
//! pattern) but targeting one small JSON file instead of a CBOR blob store,
//! per SPEC_FULL.md §9.1.

use std::collections::BTreeMap;
use std::io;

use anyhow::{Context, Result, bail};
use camino::Utf8Path;
use jiff::Timestamp;
use serde_derive::{Deserialize, Serialize};

use crate::bag::BagId;
use crate::fingerprint::Fingerprint;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Leaf {
    pub key: String,
    pub size_bytes: u64,
    pub fingerprint: Fingerprint,
    pub bag_id: Option<BagId>,
    pub object_key: Option<String>,
    pub needs_upload: bool,
    pub last_upload: Option<Timestamp>,
    pub verifier: Option<String>,
    pub encrypted: bool,
    pub compressed: bool,
}

impl Leaf {
    pub fn new(key: String, size_bytes: u64, fingerprint: Fingerprint) -> Self {
        Self {
            key,
            size_bytes,
            fingerprint,
            bag_id: None,
            object_key: None,
            needs_upload: true,
            last_upload: None,
            verifier: None,
            encrypted: false,
            compressed: false,
        }
    }

    /// Clears bag assignment and upload state, moving the leaf back to DIRTY
    /// (§4.9). Used on fingerprint change, REPACK, and RESET.
    pub fn mark_dirty(&mut self) {
        self.bag_id = None;
        self.needs_upload = true;
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BranchCatalog {
    pub leaves: BTreeMap<String, Leaf>,
    pub last_scan: Option<Timestamp>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Catalog {
    pub branches: BTreeMap<String, BranchCatalog>,
}

impl Catalog {
    /// Loads the catalog from `path`. A missing file is fine (fresh start);
    /// a malformed one is fatal per §4.6 — we never guess and overwrite it.
    pub fn load(path: &Utf8Path) -> Result<Catalog> {
        let text = match std::fs::read_to_string(path) {
            Ok(t) => t,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Catalog::default()),
            Err(e) => return Err(e).with_context(|| format!("couldn't open catalog {path}")),
        };
        let catalog: Catalog = serde_json::from_str(&text)
            .with_context(|| format!("catalog at {path} is malformed; refusing to overwrite it"))?;
        check_no_duplicate_object_keys(&catalog)
            .with_context(|| format!("catalog at {path} violates its own invariants; refusing to use it"))?;
        Ok(catalog)
    }

    /// Writes the catalog to a sibling temp file and atomically renames it
    /// into place, per §4.6 and §5's "catalog file protected by atomic
    /// rename" resource model.
    pub fn save(&self, path: &Utf8Path) -> Result<()> {
        let dir = path.parent().unwrap_or_else(|| Utf8Path::new("."));
        let mut tmp = tempfile::Builder::new()
            .prefix("catalog-")
            .suffix(".part")
            .tempfile_in(dir)
            .with_context(|| format!("couldn't create temp file for catalog in {dir}"))?;

        serde_json::to_writer_pretty(tmp.as_file_mut(), self)
            .context("couldn't serialize catalog")?;
        tmp.as_file_mut()
            .sync_all()
            .context("couldn't sync catalog temp file")?;

        tmp.persist(path)
            .with_context(|| format!("couldn't persist catalog to {path}"))?;
        Ok(())
    }

    /// The maximum bag id anywhere in the catalog, across all branches.
    pub fn max_bag_id(&self) -> Option<BagId> {
        self.branches
            .values()
            .flat_map(|b| b.leaves.values())
            .filter_map(|l| l.bag_id)
            .max()
    }

    /// The maximum bag id within one branch, if it has any leaves assigned.
    pub fn branch_max_bag_id(&self, branch_key: &str) -> Option<BagId> {
        self.branches
            .get(branch_key)
            .into_iter()
            .flat_map(|b| b.leaves.values())
            .filter_map(|l| l.bag_id)
            .max()
    }

    pub fn branch_mut(&mut self, branch_key: &str) -> &mut BranchCatalog {
        self.branches.entry(branch_key.to_string()).or_default()
    }

    pub fn branch(&self, branch_key: &str) -> Option<&BranchCatalog> {
        self.branches.get(branch_key)
    }

    /// Removes a branch and all its leaves entirely (explicit DELETE, §3).
    pub fn delete_branch(&mut self, branch_key: &str) -> Option<BranchCatalog> {
        self.branches.remove(branch_key)
    }

    /// All object keys currently referenced by any leaf in the catalog —
    /// the "active set" the orphan pruner (§4.10) diffs against a bucket
    /// listing.
    pub fn active_object_keys(&self) -> std::collections::BTreeSet<String> {
        self.branches
            .values()
            .flat_map(|b| b.leaves.values())
            .filter_map(|l| l.object_key.clone())
            .collect()
    }

    /// `leaf_path → (branch_key, leaf_key)` lookup, built on demand — the
    /// catalog is strictly a tree, so this is a single pass, never a stored
    /// back-reference (§9's "no cyclic references" note).
    pub fn owning_branch(&self, leaf_key: &str) -> Option<&str> {
        self.branches
            .iter()
            .find(|(_, b)| b.leaves.contains_key(leaf_key))
            .map(|(k, _)| k.as_str())
    }
}

/// Validates a just-loaded catalog's core invariant: bag ids are unique
/// across the whole catalog except where two leaves deliberately share one
/// (the common case — most bags hold several leaves).
pub fn check_no_duplicate_object_keys(catalog: &Catalog) -> Result<()> {
    let mut seen = std::collections::HashSet::new();
    for branch in catalog.branches.values() {
        for leaf in branch.leaves.values() {
            if let Some(key) = &leaf.object_key {
                if leaf.verifier.is_some() && !seen.insert(key.clone()) {
                    bail!("object key {key} is referenced by more than one committed leaf");
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use tempfile::tempdir;

    fn sample_fingerprint() -> Fingerprint {
        "00112233445566778899aabbccddeeff".parse().unwrap()
    }

    #[test]
    fn round_trips_through_json() -> Result<()> {
        let dir = tempdir()?;
        let path = camino::Utf8Path::from_path(dir.path()).unwrap().join("catalog.json");

        let mut catalog = Catalog::default();
        let branch = catalog.branch_mut("/data/alpha");
        branch.leaves.insert(
            "a".to_string(),
            Leaf::new("a".to_string(), 1024, sample_fingerprint()),
        );
        catalog.save(&path)?;

        let loaded = Catalog::load(&path)?;
        assert_eq!(loaded.branches["/data/alpha"].leaves["a"].size_bytes, 1024);
        Ok(())
    }

    #[test]
    fn missing_file_is_a_fresh_catalog() -> Result<()> {
        let dir = tempdir()?;
        let path = camino::Utf8Path::from_path(dir.path()).unwrap().join("nope.json");
        let catalog = Catalog::load(&path)?;
        assert!(catalog.branches.is_empty());
        Ok(())
    }

    #[test]
    fn malformed_file_is_fatal() -> Result<()> {
        let dir = tempdir()?;
        let path = camino::Utf8Path::from_path(dir.path()).unwrap().join("bad.json");
        std::fs::write(&path, b"not json")?;
        assert!(Catalog::load(&path).is_err());
        Ok(())
    }

    #[test]
    fn max_bag_id_spans_branches() {
        let mut catalog = Catalog::default();
        let mut leaf_a = Leaf::new("a".to_string(), 1, sample_fingerprint());
        leaf_a.bag_id = Some(BagId::new(3));
        catalog.branch_mut("alpha").leaves.insert("a".to_string(), leaf_a);

        let mut leaf_b = Leaf::new("b".to_string(), 1, sample_fingerprint());
        leaf_b.bag_id = Some(BagId::new(7));
        catalog.branch_mut("beta").leaves.insert("b".to_string(), leaf_b);

        assert_eq!(catalog.max_bag_id(), Some(BagId::new(7)));
    }
}
