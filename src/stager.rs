//! C2: the remote stager. Mirrors a remote leaf subtree to a local scratch
//! directory via `rsync` over SSH, and manages the FUSE-style `sshfs` mount
//! lifecycle a remote branch needs to be walked and staged from at all.
//!
//! Grounded on `original_source/glacier.py`'s `mount_remote_source` /
//! `unmount_remote_source` (idempotent via `mountpoint -q`, mount under a
//! configured base directory, `sshfs -o reconnect`) and on the teacher's
//! scoped-resource idiom (RAII guards releasing on every exit path, as seen
//! in `ui/backup.rs`'s `thread::scope`-scoped progress threads).

use std::process::Command;

use anyhow::{Context, Result, ensure};
use camino::{Utf8Path, Utf8PathBuf};

use crate::exclude::{ExcludeSet, rewrite_for_leaf};

/// An active (or reused) `sshfs` mount of a remote branch root. Unmounts on
/// drop, on every exit path, per §9's "scoped resources" design note.
pub struct RemoteMount {
    mount_point: Utf8PathBuf,
    we_mounted_it: bool,
}

impl RemoteMount {
    /// Mounts `connection:remote_path` under `<mount_base>/<host>_<slug>`,
    /// reusing an existing mount idempotently (checked via `mountpoint -q`).
    pub fn mount(mount_base: &Utf8Path, connection: &str, remote_path: &str) -> Result<Self> {
        let host_slug = connection.rsplit('@').next().unwrap_or(connection);
        let base_slug = Utf8Path::new(remote_path)
            .file_name()
            .unwrap_or(remote_path)
            .replace(' ', "_");
        let mount_point = mount_base.join(format!("{host_slug}_{base_slug}"));

        std::fs::create_dir_all(&mount_point)
            .with_context(|| format!("couldn't create mount point {mount_point}"))?;

        if is_mounted(&mount_point) {
            tracing::debug!("{mount_point} is already an active mount, reusing it");
            return Ok(Self {
                mount_point,
                we_mounted_it: false,
            });
        }

        tracing::info!("mounting {connection}:{remote_path} -> {mount_point}");
        let status = Command::new("sshfs")
            .arg("-o")
            .arg("reconnect")
            .arg(format!("{connection}:{remote_path}"))
            .arg(mount_point.as_str())
            .status()
            .context("couldn't spawn sshfs")?;
        ensure!(status.success(), "sshfs failed to mount {connection}:{remote_path}");

        Ok(Self {
            mount_point,
            we_mounted_it: true,
        })
    }

    pub fn path(&self) -> &Utf8Path {
        &self.mount_point
    }
}

impl Drop for RemoteMount {
    fn drop(&mut self) {
        if !self.we_mounted_it {
            return;
        }
        if !is_mounted(&self.mount_point) {
            return;
        }
        tracing::info!("unmounting {}", self.mount_point);
        if let Err(e) = Command::new("fusermount")
            .arg("-u")
            .arg(self.mount_point.as_str())
            .status()
        {
            tracing::warn!("couldn't unmount {}: {e}", self.mount_point);
        }
    }
}

fn is_mounted(path: &Utf8Path) -> bool {
    Command::new("mountpoint")
        .arg("-q")
        .arg(path.as_str())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

/// The outcome of a stage attempt, distinguishing rsync's own "some files
/// vanished mid-transfer" partial-success exit code (24) from a hard
/// failure (§4.2).
pub struct StageOutcome {
    pub partial_warning: bool,
}

/// Mirrors the remote leaf at `remote_base/leaf_subpath` into `scratch_dir`,
/// rewriting the branch's exclude patterns to be leaf-relative first.
///
/// `leaf_absolute_path_as_mounted` is the leaf's path under the local FUSE
/// mount; `local_branch_root` is the mount point itself, used only to
/// compute `leaf_subpath` by relativizing.
pub fn stage_leaf(
    connection: &str,
    remote_base: &str,
    leaf_absolute_path_as_mounted: &Utf8Path,
    local_branch_root: &Utf8Path,
    scratch_dir: &Utf8Path,
    branch_excludes: &ExcludeSet,
) -> Result<StageOutcome> {
    let leaf_subpath = leaf_absolute_path_as_mounted
        .strip_prefix(local_branch_root)
        .with_context(|| {
            format!("{leaf_absolute_path_as_mounted} isn't under branch root {local_branch_root}")
        })?;

    let remote_source = format!(
        "{remote_base}/{leaf_subpath}",
        remote_base = remote_base.trim_end_matches('/'),
    );

    let rewritten = rewrite_for_leaf(branch_excludes.patterns(), leaf_subpath.as_str());

    let mut exclude_file = tempfile::Builder::new()
        .prefix("coldcellar-exclude-")
        .tempfile()
        .context("couldn't create temporary exclude file")?;
    {
        use std::io::Write;
        for pattern in &rewritten {
            writeln!(exclude_file, "{pattern}")?;
        }
        exclude_file.flush()?;
    }

    std::fs::create_dir_all(scratch_dir)
        .with_context(|| format!("couldn't create scratch dir {scratch_dir}"))?;

    let remote_spec = format!("{connection}:{remote_source}/");
    let status = Command::new("rsync")
        .arg("-a")
        .arg("--delete")
        .arg("--inplace")
        .arg("--exclude-from")
        .arg(exclude_file.path())
        .arg(&remote_spec)
        .arg(scratch_dir.as_str())
        .status();

    // The temp exclude file is unlinked when `exclude_file` drops here,
    // regardless of how `status` came out (§4.2's cleanup requirement).
    drop(exclude_file);

    let status = status.context("couldn't spawn rsync")?;
    match status.code() {
        Some(0) => Ok(StageOutcome {
            partial_warning: false,
        }),
        // rsync exit 24: "some files vanished before they could be
        // transferred" — surfaced as a warning, but the stage still fails
        // so the caller (Leaf Pipeline) decides whether to retry or abort.
        Some(24) => {
            tracing::warn!("rsync reported vanished files while staging {remote_spec}");
            anyhow::bail!("partial transfer while staging {remote_spec} (rsync exit 24)")
        }
        _ => anyhow::bail!("rsync failed staging {remote_spec}: {status}"),
    }
}
