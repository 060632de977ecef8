//! CLI subcommand glue: one module per `Commands` variant, each exposing an
//! `Args` struct (clap derive) and a `run` function that wires `engine.rs`'s
//! orchestration into a synchronous entry point `main.rs` can call.
//!
//! Grounded on the teacher's `ui/backup.rs` shape: one Args struct, one
//! `run(repo, args) -> Result<()>` function per subcommand, logging progress
//! with `tracing` rather than returning a report struct the caller has to
//! format itself.

pub mod audit;
pub mod cron;
pub mod delete;
pub mod init;
pub mod mirror_bag;
pub mod mirror_branch;
pub mod mirror_tree;
pub mod prune;
pub mod repack;
pub mod restore;

use anyhow::Result;
use camino::Utf8PathBuf;
use jiff::{Timestamp, Unit, Zoned};

use crate::backend::ObjectStore;
use crate::branch::{BranchSpec, Root};
use crate::catalog::Catalog;
use crate::config::Configuration;
use crate::engine::{self, RemoteContext};
use crate::progress::ProgressSender;
use crate::report::RunStats;
use crate::stager::RemoteMount;

/// Resolves a branch spec's root to a local, walkable path: a local root is
/// returned as-is; a remote root is mounted via sshfs under
/// `config.mount_base`, and the mount guard is handed back so the caller
/// keeps it alive (and so it unmounts, via `Drop`) for exactly as long as the
/// branch is being mirrored.
pub fn resolve_local_root(config: &Configuration, spec: &BranchSpec) -> Result<(Utf8PathBuf, Option<RemoteMount>)> {
    match &spec.root {
        Root::Local(path) => Ok((path.clone(), None)),
        Root::Remote { connection, path } => {
            let mount = RemoteMount::mount(&config.mount_base, connection, path)?;
            let mount_path = mount.path().to_owned();
            Ok((mount_path, Some(mount)))
        }
    }
}

/// Builds the `RemoteContext` `engine::mirror_branch` needs to rsync-stage
/// whole-subtree leaves, for branches whose root is remote. `None` for local
/// branches — there's nothing to stage, the catalog's local_root is already
/// the real filesystem.
pub fn remote_context<'a>(
    spec: &'a BranchSpec,
    scratch_dir: &'a camino::Utf8Path,
) -> Option<RemoteContext<'a>> {
    match &spec.root {
        Root::Remote { connection, path } => Some(RemoteContext {
            connection,
            remote_base: path,
            scratch_dir,
        }),
        Root::Local(_) => None,
    }
}

/// Mirrors one branch end to end: resolves its root (mounting a remote one
/// if needed), computes this year's object-key prefix, and hands off to
/// `engine::mirror_branch`. Shared by `mirror_tree`, `mirror_branch`, and
/// `cron` so the three commands can't drift on how a branch gets mirrored.
pub async fn mirror_one(
    config: &Configuration,
    catalog: &mut Catalog,
    spec: &BranchSpec,
    store: &dyn ObjectStore,
    dry_run: bool,
    progress: Option<&ProgressSender>,
) -> anyhow::Result<RunStats> {
    let (local_root, _mount) = resolve_local_root(config, spec)?;
    let scratch_dir = config.staging_dir.join("remote_scratch");
    let remote = remote_context(spec, &scratch_dir);
    let prefix = year_prefix(&Zoned::now());
    engine::mirror_branch(config, catalog, spec, &local_root, &prefix, store, dry_run, progress, remote.as_ref()).await
}

/// The calendar-year prefix bags and system artifacts are filed under
/// (`<YYYY>-backup`, §6), computed from the local timezone at the moment the
/// run starts.
pub fn year_prefix(now: &Zoned) -> String {
    format!("{}-backup", now.year())
}

/// How many whole days have elapsed since `moment`, for the orphan pruner's
/// retention-age lookup (§4.10).
pub fn days_since(moment: Timestamp, now: Timestamp) -> i64 {
    now.since(moment)
        .ok()
        .and_then(|span| span.total(Unit::Day).ok())
        .map(|days| days as i64)
        .unwrap_or(0)
}
