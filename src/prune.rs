//! §4.10: the orphan pruner. Diffs the catalog's active object keys against
//! an actual bucket listing and removes whatever the bucket has that the
//! catalog no longer references — bags from deleted branches, artifacts
//! from a crashed run that never got recorded as committed.
//!
//! Grounded on `original_source/prune.py`: paginated bucket listing,
//! `manifests/` prefix exclusion (manifests are addressed by their bag, not
//! tracked as catalog leaves themselves, so they'd always show up as
//! "orphaned" under a naive diff), interactive confirmation before
//! deletion, and 1000-key batched `DeleteObjects` calls. This crate adds one
//! safeguard the original didn't have: an orphan younger than
//! `minimum_retention_days` is never deleted, in case it's mid-upload from a
//! concurrently running mirror.

use std::collections::BTreeSet;

use anyhow::Result;

use crate::backend::{self, ObjectStore};
use crate::catalog::Catalog;

pub const MANIFESTS_PREFIX_SEGMENT: &str = "manifests/";
pub const SYSTEM_PREFIX_SEGMENT: &str = "system/";

/// The set of keys this run would delete, before any confirmation or
/// retention-age filtering is applied.
pub struct PruneCandidates {
    pub orphans: Vec<String>,
}

/// Lists everything under `prefix` and computes the orphan set: bucket keys
/// not referenced by any leaf in the catalog, excluding manifests and
/// system artifacts (those live alongside bags but aren't catalog leaves).
pub async fn find_orphans(
    store: &dyn ObjectStore,
    prefix: &str,
    catalog: &Catalog,
) -> Result<PruneCandidates> {
    let bucket_keys = store.list(prefix).await?;
    let active: BTreeSet<String> = catalog.active_object_keys();

    let orphans = bucket_keys
        .into_iter()
        .filter(|key| {
            let relative = key.strip_prefix(prefix).unwrap_or(key).trim_start_matches('/');
            !relative.starts_with(MANIFESTS_PREFIX_SEGMENT)
                && !relative.starts_with(SYSTEM_PREFIX_SEGMENT)
                && !active.contains(key)
        })
        .collect();

    Ok(PruneCandidates { orphans })
}

/// Applies a minimum-retention safeguard: `key_ages` maps each candidate key
/// to how many days old it is (from the bucket's last-modified timestamp);
/// a key younger than `minimum_retention_days` is held back even if it's
/// orphaned, in case it belongs to a run still in flight.
pub fn filter_by_retention(
    candidates: &PruneCandidates,
    key_ages_days: &std::collections::HashMap<String, i64>,
    minimum_retention_days: i64,
) -> Vec<String> {
    candidates
        .orphans
        .iter()
        .filter(|key| {
            key_ages_days
                .get(*key)
                .map(|age| *age >= minimum_retention_days)
                .unwrap_or(true) // no age data: don't block on it, the listing already happened
        })
        .cloned()
        .collect()
}

/// Deletes the given keys in batches of up to 1000, per §4.10's protocol.
/// The interactive confirmation step lives in the CLI layer (`ui/prune.rs`),
/// not here, so this function is trivially testable without a terminal.
pub async fn delete_confirmed(store: &dyn ObjectStore, keys: &[String]) -> Result<()> {
    backend::delete_all(store, keys).await
}
