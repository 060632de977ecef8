//! The orchestrator tying C1–C9 together for one branch, per §2's control
//! flow: Guard vets the action, the Fingerprinter produces a catalog delta,
//! the Bag Packer assigns ids, each affected bag runs through the Leaf
//! Pipeline and Uploader, and the Catalog is committed after every bag.
//!
//! Grounded on `ui/backup.rs`'s top-level shape (one function walking a
//! root, building per-entry work, then handing off to packing/upload) but
//! restructured around this crate's bag-is-the-upload-unit model instead of
//! the teacher's content-addressed pack/index model.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use jiff::Timestamp;

use crate::audit::{self, AuditEvent};
use crate::backend::{ObjectStore, StorageClass};
use crate::bag::{self, BagId, Mode as PackMode, PackerLeaf};
use crate::branch::{BranchSpec, Mutability};
use crate::catalog::{Catalog, Leaf};
use crate::config::Configuration;
use crate::error::EngineError;
use crate::exclude::ExcludeSet;
use crate::fingerprint::{self, ScanMode};
use crate::guard::{self, Action};
use crate::pipeline::{self, PipelineOutput, Variant};
use crate::progress::{ProgressEvent, ProgressSender};
use crate::report::RunStats;
use crate::stager;
use crate::{manifest, uploader};

pub const BRANCH_ROOT_SENTINEL: &str = "__BRANCH_ROOT__";

/// Identifies a remote branch's mount for leaves that need a true local copy
/// before compression/encryption/tar run over them (§4.2). Whole-leaf-root
/// candidates (ordinary subdirectories, and immutable branch roots) get
/// rsync-staged into `scratch_dir` here; the synthetic branch-root sentinel's
/// loose-file leaf is read directly off the sshfs mount instead, since rsync
/// stages whole subtrees and that leaf is a flat file list, not a subtree.
pub struct RemoteContext<'a> {
    pub connection: &'a str,
    pub remote_base: &'a str,
    pub scratch_dir: &'a Utf8Path,
}

/// One discovered leaf, before fingerprinting.
struct Candidate {
    /// Catalog key: `<branch_root>/<subdir>` or `<branch_root>/__BRANCH_ROOT__`.
    key: String,
    /// Where to actually scan on local disk (already staged, for remotes).
    scan_root: Utf8PathBuf,
    mode: CandidateMode,
}

enum CandidateMode {
    WholeDir,
    ExplicitFiles(Vec<String>),
}

/// Discovers the leaf set for a (local) branch root per §3: IMMUTABLE means
/// the whole root is one leaf; MUTABLE means one leaf per immediate
/// subdirectory plus a synthetic branch-root leaf for loose files.
fn discover_leaves(local_root: &Utf8Path, branch_key: &str, mutability: Mutability) -> Result<Vec<Candidate>> {
    if mutability == Mutability::Immutable {
        return Ok(vec![Candidate {
            key: branch_key.to_string(),
            scan_root: local_root.to_owned(),
            mode: CandidateMode::WholeDir,
        }]);
    }

    let mut candidates = Vec::new();

    let entries = std::fs::read_dir(local_root)
        .with_context(|| format!("couldn't list {local_root}"))?;
    let mut paths: Vec<Utf8PathBuf> = entries
        .filter_map(|e| e.ok())
        .filter_map(|e| Utf8PathBuf::from_path_buf(e.path()).ok())
        .collect();
    paths.sort();

    for path in paths {
        let meta = std::fs::symlink_metadata(&path)?;
        if meta.is_dir() {
            let name = path.file_name().unwrap_or_default().to_string();
            candidates.push(Candidate {
                key: format!("{branch_key}/{name}"),
                scan_root: path,
                mode: CandidateMode::WholeDir,
            });
        }
    }

    let loose_files = loose_file_names(local_root)?;

    // The synthetic branch-root leaf only exists when there's at least one
    // loose file at the root (§8's boundary behavior).
    if !loose_files.is_empty() {
        candidates.push(Candidate {
            key: format!("{branch_key}/{BRANCH_ROOT_SENTINEL}"),
            scan_root: local_root.to_owned(),
            mode: CandidateMode::ExplicitFiles(loose_files),
        });
    }

    Ok(candidates)
}

/// The regular files sitting directly under a branch root, sorted — used
/// both to decide whether a synthetic branch-root leaf exists and, later, to
/// know exactly which files that leaf's pipeline should pack.
fn loose_file_names(local_root: &Utf8Path) -> Result<Vec<String>> {
    let mut names = Vec::new();
    let entries = std::fs::read_dir(local_root)
        .with_context(|| format!("couldn't list {local_root}"))?;
    for entry in entries.filter_map(|e| e.ok()) {
        let Ok(path) = Utf8PathBuf::from_path_buf(entry.path()) else {
            continue;
        };
        if std::fs::symlink_metadata(&path).map(|m| m.is_file()).unwrap_or(false) {
            names.push(path.file_name().unwrap_or_default().to_string());
        }
    }
    names.sort();
    Ok(names)
}

/// Scans every candidate, updating `catalog`'s branch entry in place: new
/// leaves are inserted, existing ones compared by fingerprint and marked
/// dirty on change. Returns the keys of leaves that are new or changed this
/// scan.
fn scan_branch(
    catalog: &mut Catalog,
    branch_key: &str,
    candidates: &[Candidate],
    excludes: &ExcludeSet,
) -> Result<()> {
    let branch = catalog.branch_mut(branch_key);

    for candidate in candidates {
        let scan_mode = match &candidate.mode {
            CandidateMode::WholeDir => ScanMode::Recursive,
            CandidateMode::ExplicitFiles(names) => ScanMode::ExplicitFiles(names),
        };
        let (fp, size) = fingerprint::fingerprint(&candidate.scan_root, scan_mode, excludes)
            .with_context(|| format!("couldn't fingerprint leaf {}", candidate.key))?;

        match branch.leaves.get_mut(&candidate.key) {
            Some(existing) if existing.fingerprint == fp => {
                existing.size_bytes = size;
            }
            Some(existing) => {
                existing.fingerprint = fp;
                existing.size_bytes = size;
                existing.mark_dirty();
            }
            None => {
                branch.leaves.insert(
                    candidate.key.clone(),
                    Leaf::new(candidate.key.clone(), size, fp),
                );
            }
        }
    }

    // Leaves no longer discovered (subdirectory removed) stay in the
    // catalog until an explicit DELETE; §3 only destroys leaves on branch
    // delete or explicit removal, never on a quiet disappearance.
    branch.last_scan = Some(Timestamp::now());
    Ok(())
}

/// Runs the full mirror pass for one branch: scan, pack, and upload every
/// bag that contains at least one leaf needing upload.
#[allow(clippy::too_many_arguments)]
pub async fn mirror_branch(
    config: &Configuration,
    catalog: &mut Catalog,
    spec: &BranchSpec,
    local_root: &Utf8Path,
    object_key_prefix: &str,
    store: &dyn ObjectStore,
    dry_run: bool,
    progress: Option<&ProgressSender>,
    remote: Option<&RemoteContext<'_>>,
) -> Result<RunStats> {
    let branch_key = spec.key();

    let decision = guard::check(spec, Action::Mirror);
    if !decision.allowed {
        audit::record(
            config.audit_log.as_deref(),
            &AuditEvent::PolicyDenied {
                branch: &branch_key,
                action: "mirror",
                reason: decision.reason.as_deref().unwrap_or("denied"),
            },
        );
        return Err(EngineError::PolicyDenied {
            branch: branch_key.clone(),
            reason: decision.reason.unwrap_or_default(),
        }
        .into());
    }

    let excludes = ExcludeSet::from_patterns(spec.excludes.iter().cloned().collect())?;

    let candidates = discover_leaves(local_root, &branch_key, spec.mutability)
        .map_err(|source| EngineError::Scan {
            branch: branch_key.clone(),
            source,
        })?;

    scan_branch(catalog, &branch_key, &candidates, &excludes)?;

    let mut packer_leaves: Vec<PackerLeaf> = {
        let branch = catalog.branch(&branch_key).expect("just scanned");
        branch
            .leaves
            .iter()
            .map(|(key, leaf)| PackerLeaf {
                key,
                size_bytes: leaf.size_bytes,
                existing_bag_id: leaf.bag_id,
            })
            .collect()
    };
    // The catalog's BTreeMap iterates leaves in raw key order, which puts
    // "__BRANCH_ROOT__" first ('_' sorts before any lowercase subdir name).
    // The packer needs discovery order instead: subdirs sorted, then the
    // branch-root sentinel last, matching original_source/glacier.py's
    // CLUSTER branch appending the root item to found_items after the
    // sorted subdirs.
    packer_leaves.sort_by_key(|l| (l.key.ends_with(BRANCH_ROOT_SENTINEL), l.key));

    let assignment = bag::pack(
        catalog,
        &branch_key,
        &packer_leaves,
        config.target_bag_size,
        PackMode::Standard,
    );

    {
        let branch = catalog.branch_mut(&branch_key);
        for (key, bag_id) in &assignment {
            if let Some(leaf) = branch.leaves.get_mut(key) {
                leaf.bag_id = Some(*bag_id);
            }
        }
    }

    // Group leaves by bag, so a bag is re-assembled whenever any of its
    // members needs upload (the bag, not the leaf, is the upload unit).
    let mut bags: BTreeMap<BagId, Vec<String>> = BTreeMap::new();
    {
        let branch = catalog.branch(&branch_key).expect("just scanned");
        for (key, leaf) in &branch.leaves {
            if let Some(bag_id) = leaf.bag_id {
                bags.entry(bag_id).or_default().push(key.clone());
            }
        }
    }

    let mut stats = RunStats::default();

    for (bag_id, member_keys) in bags {
        let needs_upload = {
            let branch = catalog.branch(&branch_key).expect("just scanned");
            member_keys
                .iter()
                .any(|k| branch.leaves.get(k).map(|l| l.needs_upload).unwrap_or(false))
        };

        if !needs_upload {
            let bag_bytes: u64 = {
                let branch = catalog.branch(&branch_key).expect("just scanned");
                member_keys.iter().filter_map(|k| branch.leaves.get(k)).map(|l| l.size_bytes).sum()
            };
            stats.record_skip(bag_bytes);
            continue;
        }

        if dry_run {
            tracing::info!("[dry run] would upload {bag_id} for branch {branch_key}");
            let members: Vec<Leaf> = {
                let branch = catalog.branch(&branch_key).expect("just scanned");
                member_keys.iter().filter_map(|k| branch.leaves.get(k).cloned()).collect()
            };
            let member_refs: Vec<&Leaf> = members.iter().collect();
            let manifest_text = manifest::render(&branch_key, bag_id, &member_refs);
            let stem = bag_object_key_stem(spec, bag_id);
            if let Err(source) = manifest::write_local(&config.manifest_dir, &stem, true, &manifest_text) {
                tracing::warn!("couldn't write dry-run manifest for {bag_id}: {source:#}");
            }
            continue;
        }

        let outcome = upload_bag(
            config,
            catalog,
            spec,
            local_root,
            &branch_key,
            bag_id,
            &member_keys,
            object_key_prefix,
            store,
            progress,
            &excludes,
            remote,
        )
        .await?;
        stats.record_upload(outcome);
    }

    catalog.save(&config.catalog_file)?;
    Ok(stats)
}

/// `<host>_<branch-short>_`: the part of a bag's object key stem that's
/// constant across every bag in a branch, exposed so callers that need to
/// list a branch's bag objects (e.g. the repack orphan-tail cleanup) can
/// scope a prefix listing without duplicating the host/short-name logic.
pub fn bag_object_key_stem_prefix(spec: &BranchSpec) -> String {
    let host = hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "unknown-host".to_string());
    let branch_short = spec.root.short_name();
    format!("{host}_{branch_short}_")
}

/// `<host>_<branch-short>_<bag-id>`: the bag's object key stem, shared
/// between the actual upload path and the dry-run manifest preview so the
/// two never drift on naming.
fn bag_object_key_stem(spec: &BranchSpec, bag_id: BagId) -> String {
    format!("{}{bag_id}", bag_object_key_stem_prefix(spec))
}

/// Packs, uploads, and commits a single bag: runs each member leaf through
/// its pipeline, assembles the container, uploads it plus its manifest, and
/// writes the catalog immediately after (§4.5's idempotence protocol).
#[allow(clippy::too_many_arguments)]
async fn upload_bag(
    config: &Configuration,
    catalog: &mut Catalog,
    spec: &BranchSpec,
    local_root: &Utf8Path,
    branch_key: &str,
    bag_id: BagId,
    member_keys: &[String],
    object_key_prefix: &str,
    store: &dyn ObjectStore,
    progress: Option<&ProgressSender>,
    excludes: &ExcludeSet,
    remote: Option<&RemoteContext<'_>>,
) -> Result<u64> {
    let assembly_dir = config.staging_dir.join(format!("assembly_{bag_id}"));
    std::fs::create_dir_all(&assembly_dir)
        .with_context(|| format!("couldn't create assembly dir {assembly_dir}"))?;

    let variant = Variant::from_tags(spec.compress, spec.encrypt);
    let mut bag_bytes = 0u64;

    for key in member_keys {
        if let Some(sender) = progress {
            let _ = sender.send(ProgressEvent::LeafStarted {
                leaf_key: key.clone(),
            });
        }

        let rel_or_sentinel = key
            .strip_prefix(branch_key)
            .unwrap_or(key)
            .trim_start_matches('/');
        let rel_or_sentinel = if rel_or_sentinel.is_empty() {
            BRANCH_ROOT_SENTINEL
        } else {
            rel_or_sentinel
        };

        let (mut leaf_root, entries): (Utf8PathBuf, Vec<String>) = if rel_or_sentinel == BRANCH_ROOT_SENTINEL
            && spec.mutability == Mutability::Mutable
        {
            (local_root.to_owned(), loose_file_names(local_root)?)
        } else if spec.mutability == Mutability::Immutable {
            (local_root.to_owned(), vec![".".to_string()])
        } else {
            (local_root.join(rel_or_sentinel), vec![".".to_string()])
        };

        // Whole-subtree leaves on a remote branch get rsync-staged to a
        // local scratch copy before packing; the sshfs mount alone is
        // walkable but slow and unreliable under tar/gpg subprocesses.
        if let Some(ctx) = remote {
            if entries == ["."] {
                let scratch = ctx.scratch_dir.join(pipeline::leaf_id(key));
                let outcome = stager::stage_leaf(
                    ctx.connection,
                    ctx.remote_base,
                    &leaf_root,
                    local_root,
                    &scratch,
                    excludes,
                )
                .map_err(|source| EngineError::RemoteStage {
                    branch: branch_key.to_string(),
                    leaf: key.clone(),
                    source,
                })?;
                if outcome.partial_warning {
                    tracing::warn!("partial transfer staging leaf {key}, proceeding with what arrived");
                }
                leaf_root = scratch;
            }
        }

        let output = pipeline::run(
            &config.staging_dir,
            key,
            &leaf_root,
            &entries,
            rel_or_sentinel,
            variant,
            config,
        )
        .map_err(|source| EngineError::Pipeline {
            leaf: key.clone(),
            source,
        })?;

        match output {
            PipelineOutput::Plain => {
                let dest = assembly_dir.join(rel_or_sentinel);
                std::fs::create_dir_all(&dest)?;
                for entry in &entries {
                    if entry == "." {
                        copy_tree(&leaf_root, &dest)?;
                    } else {
                        copy_tree(&leaf_root.join(entry), &dest.join(entry))?;
                    }
                }
            }
            PipelineOutput::Artifact { staged_path, inner_name } => {
                let dest = assembly_dir.join(&inner_name);
                if let Some(parent) = dest.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                std::fs::rename(&staged_path, &dest)
                    .or_else(|_| std::fs::copy(&staged_path, &dest).map(|_| ()))
                    .with_context(|| format!("couldn't move staged artifact into bag assembly: {dest}"))?;
            }
        }

        let leaf_size = catalog
            .branch(branch_key)
            .and_then(|b| b.leaves.get(key))
            .map(|l| l.size_bytes)
            .unwrap_or(0);
        bag_bytes += leaf_size;

        if let Some(sender) = progress {
            let _ = sender.send(ProgressEvent::LeafBytesTransferred {
                leaf_key: key.clone(),
                bytes: leaf_size,
            });
            let _ = sender.send(ProgressEvent::LeafFinished {
                leaf_key: key.clone(),
            });
        }
    }

    let object_key_stem = bag_object_key_stem(spec, bag_id);
    let object_key = format!("{object_key_prefix}/{object_key_stem}.tar");

    let container_path = config.staging_dir.join(format!("{object_key_stem}.tar"));
    tar_assembly(&assembly_dir, &container_path).map_err(|source| EngineError::Pipeline {
        leaf: bag_id.to_string(),
        source,
    })?;

    let members: Vec<Leaf> = {
        let branch = catalog.branch(branch_key).expect("leaves exist");
        member_keys
            .iter()
            .filter_map(|k| branch.leaves.get(k).cloned())
            .collect()
    };
    let member_refs: Vec<&Leaf> = members.iter().collect();
    let manifest_text = manifest::render(branch_key, bag_id, &member_refs);
    let manifest_path = manifest::write_local(&config.manifest_dir, &object_key_stem, false, &manifest_text)?;
    let manifest_key = manifest::manifest_object_key(object_key_prefix, &object_key_stem, false);

    let bag_outcome = uploader::upload_one(store, &container_path, &object_key, StorageClass::DeepArchive, config)
        .await
        .map_err(|source| EngineError::Upload {
            object_key: object_key.clone(),
            source,
        })?;
    store
        .put(&manifest_key, &manifest_path, StorageClass::Standard)
        .await
        .map_err(|source| EngineError::Upload {
            object_key: manifest_key.clone(),
            source,
        })?;

    {
        let branch = catalog.branch_mut(branch_key);
        for key in member_keys {
            if let Some(leaf) = branch.leaves.get_mut(key) {
                leaf.object_key = Some(object_key.clone());
                leaf.needs_upload = false;
                leaf.last_upload = Some(bag_outcome.uploaded_at);
                leaf.verifier = Some(bag_outcome.verifier.0.clone());
                leaf.compressed = spec.compress;
                leaf.encrypted = spec.encrypt;
            }
        }
    }

    // Commit now, not just at the end of the branch's loop: a crash partway
    // through a multi-bag branch must only cost the in-flight bag, not every
    // bag already uploaded this run.
    catalog.save(&config.catalog_file)?;

    audit::record(
        config.audit_log.as_deref(),
        &AuditEvent::BagUploaded {
            branch: branch_key,
            bag_id: bag_id.to_string(),
            object_key: &object_key,
            verifier: &bag_outcome.verifier.0,
        },
    );

    let _ = std::fs::remove_file(&container_path);
    let _ = std::fs::remove_dir_all(&assembly_dir);

    if let Some(sender) = progress {
        let _ = sender.send(ProgressEvent::BagUploaded {
            bag_id: bag_id.to_string(),
            bytes: bag_bytes,
        });
    }

    Ok(bag_bytes)
}

/// Tars up an assembled bag directory as-is (no compression: individual
/// leaves were already compressed/encrypted by their own pipeline variant
/// before landing here, per §4.3).
fn tar_assembly(assembly_dir: &Utf8Path, out: &Utf8Path) -> Result<()> {
    let status = std::process::Command::new("tar")
        .arg("-cf")
        .arg(out.as_str())
        .arg("-C")
        .arg(assembly_dir.as_str())
        .arg(".")
        .status()
        .with_context(|| format!("couldn't spawn tar assembling {out}"))?;
    anyhow::ensure!(status.success(), "tar exited with {status} assembling {out}");
    Ok(())
}

fn copy_tree(from: &Utf8Path, to: &Utf8Path) -> Result<()> {
    let meta = std::fs::symlink_metadata(from)?;
    if meta.is_dir() {
        std::fs::create_dir_all(to)?;
        for entry in std::fs::read_dir(from)? {
            let entry = entry?;
            let name = entry.file_name();
            let child_from = from.join(name.to_string_lossy().as_ref());
            let child_to = to.join(name.to_string_lossy().as_ref());
            copy_tree(&child_from, &child_to)?;
        }
    } else if meta.is_file() {
        std::fs::copy(from, to)?;
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn discover_leaves_finds_subdirs_and_branch_root_sentinel() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let root = Utf8Path::from_path(dir.path()).unwrap();
        std::fs::create_dir(root.join("a"))?;
        std::fs::create_dir(root.join("b"))?;
        std::fs::write(root.join("loose.txt"), b"x")?;

        let candidates = discover_leaves(root, "/data/alpha", Mutability::Mutable)?;
        let keys: Vec<_> = candidates.iter().map(|c| c.key.clone()).collect();
        assert!(keys.contains(&"/data/alpha/a".to_string()));
        assert!(keys.contains(&"/data/alpha/b".to_string()));
        assert!(keys.contains(&"/data/alpha/__BRANCH_ROOT__".to_string()));
        Ok(())
    }

    #[test]
    fn discover_leaves_skips_branch_root_sentinel_without_loose_files() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let root = Utf8Path::from_path(dir.path()).unwrap();
        std::fs::create_dir(root.join("a"))?;

        let candidates = discover_leaves(root, "/data/alpha", Mutability::Mutable)?;
        assert_eq!(candidates.len(), 1);
        Ok(())
    }

    #[test]
    fn immutable_branch_is_a_single_leaf() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let root = Utf8Path::from_path(dir.path()).unwrap();
        std::fs::create_dir(root.join("a"))?;

        let candidates = discover_leaves(root, "/data/alpha", Mutability::Immutable)?;
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].key, "/data/alpha");
        Ok(())
    }
}
