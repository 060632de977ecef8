#![allow(dead_code)]

use byte_unit::Byte;
use camino::{Utf8Path, Utf8PathBuf};
use coldcellar::config::Configuration;

/// A `Configuration` rooted entirely under a scratch directory, so tests
/// never touch a real `~/.config` or leave staging artifacts behind.
pub fn test_config(scratch: &Utf8Path) -> Configuration {
    let staging_dir = scratch.join("staging");
    let manifest_dir = scratch.join("manifests");
    let mount_base = scratch.join("mounts");
    std::fs::create_dir_all(&staging_dir).unwrap();
    std::fs::create_dir_all(&manifest_dir).unwrap();
    std::fs::create_dir_all(&mount_base).unwrap();

    Configuration {
        staging_dir,
        manifest_dir,
        catalog_file: scratch.join("catalog.json"),
        mount_base,
        bucket: "test-bucket".to_string(),
        target_bag_size: Byte::from_u64(1024 * 1024), // 1 MiB, so test trees span multiple bags
        scan_interval_days: 190,
        pricing: None,
        encryption: None,
        catalog_backup_dir: None,
        audit_log: None,
        allow_unverified_upload: false,
        bandwidth_cap: None,
        upload_concurrency: 4,
    }
}

pub fn write_file(dir: &Utf8Path, rel: &str, contents: &[u8]) {
    let path = dir.join(rel);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, contents).unwrap();
}

pub fn tmp_utf8() -> (tempfile::TempDir, Utf8PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let path = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
    (dir, path)
}
