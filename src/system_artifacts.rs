//! Disaster-recovery system artifact backup (§3.1), grounded on
//! `original_source/glacier.py`'s `upload_system_artifacts`: a fixed list of
//! local files (config, tree definitions, the catalog itself) copied
//! verbatim to a `system/` prefix, best-effort — a missing file is skipped,
//! an upload failure is a warning, never a fatal abort of the run.

use camino::Utf8Path;

use crate::backend::{ObjectStore, StorageClass};

/// The local files considered part of the disaster-recovery bundle: enough
/// to reconstruct which branches existed and what they contained, even if
/// the machine running the orchestrator is lost entirely.
pub fn artifact_paths(
    config_path: &Utf8Path,
    tree_files: &[camino::Utf8PathBuf],
    catalog_file: &Utf8Path,
) -> Vec<camino::Utf8PathBuf> {
    let mut paths = vec![config_path.to_owned(), catalog_file.to_owned()];
    paths.extend(tree_files.iter().cloned());
    paths
}

/// Uploads every artifact in `paths` under `<prefix>/system/<filename>`,
/// skipping any that don't currently exist and logging (not failing on)
/// any individual upload error.
pub async fn upload_all(store: &dyn ObjectStore, prefix: &str, paths: &[camino::Utf8PathBuf]) {
    for path in paths {
        if !path.exists() {
            tracing::debug!("system artifact {path} doesn't exist, skipping");
            continue;
        }
        let Some(filename) = path.file_name() else {
            continue;
        };
        let key = format!("{prefix}/system/{filename}");
        tracing::info!("backing up system artifact {path} -> {key}");
        if let Err(e) = store.put(&key, path, StorageClass::Standard).await {
            tracing::warn!("failed to back up system artifact {path}: {e}");
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::backend::memory::MemoryStore;

    #[tokio::test]
    async fn missing_artifacts_are_skipped_not_fatal() {
        let store = MemoryStore::new();
        let paths = vec![camino::Utf8PathBuf::from("/nonexistent/coldcellar.toml")];
        upload_all(&store, "2026-backup", &paths).await;
        assert!(store.remaining_keys().is_empty());
    }

    #[tokio::test]
    async fn existing_artifacts_land_under_the_system_prefix() -> Result<(), anyhow::Error> {
        let store = MemoryStore::new();
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("coldcellar.toml");
        std::fs::write(&path, b"bucket = \"x\"")?;
        let utf8 = camino::Utf8PathBuf::from_path_buf(path).unwrap();

        upload_all(&store, "2026-backup", &[utf8]).await;
        let keys = store.remaining_keys();
        assert_eq!(keys, vec!["2026-backup/system/coldcellar.toml".to_string()]);
        Ok(())
    }
}
