//! Per-bag manifest generation (§3.1, §4.2), grounded on
//! `original_source/glacier.py`'s `generate_real_manifest`: a plain-text
//! listing of a bag's members, their sizes and fingerprints, written
//! locally and also uploaded to the `manifests/` prefix so the bucket alone
//! (independent of the local catalog) carries enough metadata to reason
//! about what each bag contains.

use std::fmt::Write as _;

use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};

use crate::bag::BagId;
use crate::catalog::Leaf;

/// Renders the manifest text for one bag: one line per member leaf.
pub fn render(branch_key: &str, bag_id: BagId, members: &[&Leaf]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "branch: {branch_key}");
    let _ = writeln!(out, "bag: {bag_id}");
    let _ = writeln!(out, "members: {}", members.len());
    out.push('\n');
    for leaf in members {
        let _ = writeln!(
            out,
            "{key}\t{size}\t{fingerprint}",
            key = leaf.key,
            size = leaf.size_bytes,
            fingerprint = leaf.fingerprint,
        );
    }
    out
}

/// `<unix-seconds>_<object-key-stem>_{liverun|dryrun}.txt`, the filename
/// convention shared between the local copy and the uploaded object key.
fn manifest_file_name(object_key_stem: &str, dry_run: bool) -> String {
    let now = jiff::Timestamp::now().as_second();
    let mode = if dry_run { "dryrun" } else { "liverun" };
    format!("{now}_{object_key_stem}_{mode}.txt")
}

/// Writes the manifest locally and returns its path. A dry-run manifest
/// documents what a live run would upload (§6) without anything being
/// queued for actual upload.
pub fn write_local(manifest_dir: &Utf8Path, object_key_stem: &str, dry_run: bool, text: &str) -> Result<Utf8PathBuf> {
    std::fs::create_dir_all(manifest_dir)
        .with_context(|| format!("couldn't create manifest dir {manifest_dir}"))?;
    let path = manifest_dir.join(manifest_file_name(object_key_stem, dry_run));
    std::fs::write(&path, text).with_context(|| format!("couldn't write manifest {path}"))?;
    Ok(path)
}

/// The object key a bag's manifest is uploaded under, mirroring
/// `original_source/glacier.py`'s convention of a sibling `manifests/`
/// prefix next to the bag prefix itself.
pub fn manifest_object_key(prefix: &str, object_key_stem: &str, dry_run: bool) -> String {
    format!("{prefix}/manifests/{}", manifest_file_name(object_key_stem, dry_run))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::catalog::Leaf;

    fn sample_leaf(key: &str, size: u64) -> Leaf {
        Leaf::new(
            key.to_string(),
            size,
            "00112233445566778899aabbccddeeff".parse().unwrap(),
        )
    }

    #[test]
    fn render_lists_every_member_with_size_and_fingerprint() {
        let a = sample_leaf("a", 100);
        let b = sample_leaf("b", 200);
        let text = render("/data/alpha", BagId::new(1), &[&a, &b]);
        assert!(text.contains("branch: /data/alpha"));
        assert!(text.contains("bag: bag_00001"));
        assert!(text.contains("a\t100\t"));
        assert!(text.contains("b\t200\t"));
    }

    #[test]
    fn manifest_object_key_lives_under_the_manifests_prefix_and_tags_run_mode() {
        let live = manifest_object_key("2026-backup", "host_alpha_bag_00001", false);
        assert!(live.starts_with("2026-backup/manifests/"));
        assert!(live.ends_with("_host_alpha_bag_00001_liverun.txt"));

        let dry = manifest_object_key("2026-backup", "host_alpha_bag_00001", true);
        assert!(dry.ends_with("_host_alpha_bag_00001_dryrun.txt"));
    }

    #[test]
    fn write_local_creates_the_manifest_dir_if_missing() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let manifest_dir = camino::Utf8Path::from_path(dir.path())
            .unwrap()
            .join("nested/manifests");
        let path = write_local(&manifest_dir, "host_alpha_bag_00001", false, "hello")?;
        assert_eq!(std::fs::read_to_string(path)?, "hello");
        Ok(())
    }
}
