//! C1: deterministic metadata fingerprinting over a leaf's files.
//!
//! Grounded on the teacher's `fs_tree::forest_from_fs`/`file_changed` walk
//! structure, but simplified: there's no chunk reuse or content addressing
//! here (see SPEC_FULL.md §9.1), just "hash these `(rel_path, size, mtime)`
//! triples in sorted order."

use std::fmt;
use std::fs;
use std::str::FromStr;

use anyhow::{Context, Result, anyhow};
use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::exclude::ExcludeSet;

/// A 128-bit digest over a leaf's `(rel_path, size, mtime)` records.
///
/// Not content-addressed storage: this has nothing to do with the bytes of
/// the files, only their metadata, and exists purely to answer "did anything
/// change since the last scan?"
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint([u8; 16]);

impl Fingerprint {
    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({self})")
    }
}

impl FromStr for Fingerprint {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        anyhow::ensure!(s.len() == 32, "fingerprint {s} isn't 32 hex digits");
        let mut bytes = [0u8; 16];
        for (i, byte) in bytes.iter_mut().enumerate() {
            *byte = u8::from_str_radix(&s[i * 2..i * 2 + 2], 16)
                .with_context(|| format!("bad hex in fingerprint {s}"))?;
        }
        Ok(Fingerprint(bytes))
    }
}

impl Serialize for Fingerprint {
    fn serialize<S: Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        s.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Fingerprint {
    fn deserialize<D: Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(d)?;
        Fingerprint::from_str(&s).map_err(serde::de::Error::custom)
    }
}

/// Where a fingerprint scan should look for files.
pub enum ScanMode<'a> {
    /// Walk the directory recursively, honoring `excludes`.
    Recursive,
    /// Hash only the listed file names directly under `root`, no walk.
    /// Used for the synthetic branch-root leaf (§4.1).
    ExplicitFiles(&'a [String]),
}

/// A streaming hasher that absorbs `rel_path|size|mtime` records in sorted
/// order. Directory entries themselves are never hashed, only their walked
/// contents.
struct RunningHash {
    hasher: blake3::Hasher,
}

impl RunningHash {
    fn new() -> Self {
        Self {
            hasher: blake3::Hasher::new(),
        }
    }

    fn absorb(&mut self, rel_path: &Utf8Path, size: u64, mtime: &str) {
        self.hasher.update(rel_path.as_str().as_bytes());
        self.hasher.update(b"|");
        self.hasher.update(size.to_string().as_bytes());
        self.hasher.update(b"|");
        self.hasher.update(mtime.as_bytes());
        self.hasher.update(b"\n");
    }

    fn finalize(self) -> Fingerprint {
        let full = self.hasher.finalize();
        let mut bytes = [0u8; 16];
        bytes.copy_from_slice(&full.as_bytes()[..16]);
        Fingerprint(bytes)
    }
}

/// Formats a file's mtime as `secs.nanos`, the frozen unit documented in
/// SPEC_FULL.md §4.1.
fn mtime_string(meta: &fs::Metadata) -> Result<String> {
    let modified = meta.modified().context("couldn't read mtime")?;
    let dur = modified
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default();
    Ok(format!("{}.{:09}", dur.as_secs(), dur.subsec_nanos()))
}

/// Walks `root` (or hashes the explicit file list), producing a fingerprint
/// and total byte count. Unreadable entries are skipped silently; an I/O
/// error on `root` itself propagates as a scan error for the whole branch.
pub fn fingerprint(
    root: &Utf8Path,
    mode: ScanMode,
    excludes: &ExcludeSet,
) -> Result<(Fingerprint, u64)> {
    let mut hash = RunningHash::new();
    let mut total_size = 0u64;
    let mut warned_zero_nanos = false;

    match mode {
        ScanMode::ExplicitFiles(names) => {
            let mut sorted: Vec<&String> = names.iter().collect();
            sorted.sort();
            for name in sorted {
                let path = root.join(name);
                let meta = match fs::symlink_metadata(&path) {
                    Ok(m) if m.is_file() => m,
                    _ => continue,
                };
                let mtime = mtime_string(&meta)?;
                if mtime.ends_with(".000000000") && !warned_zero_nanos {
                    tracing::warn!(
                        "{path} has an exactly-zero-nanosecond mtime; filesystem may truncate precision"
                    );
                    warned_zero_nanos = true;
                }
                hash.absorb(Utf8Path::new(name), meta.len(), &mtime);
                total_size += meta.len();
            }
        }
        ScanMode::Recursive => {
            let mut files = Vec::new();
            walk_sorted(root, root, excludes, &mut files)
                .with_context(|| format!("error walking {root}"))?;
            for (rel_path, abs_path) in files {
                let meta = match fs::symlink_metadata(&abs_path) {
                    Ok(m) if m.is_file() => m,
                    _ => continue,
                };
                let mtime = match mtime_string(&meta) {
                    Ok(m) => m,
                    Err(_) => continue,
                };
                if mtime.ends_with(".000000000") && !warned_zero_nanos {
                    tracing::warn!(
                        "{abs_path} has an exactly-zero-nanosecond mtime; filesystem may truncate precision"
                    );
                    warned_zero_nanos = true;
                }
                hash.absorb(&rel_path, meta.len(), &mtime);
                total_size += meta.len();
            }
        }
    }

    Ok((hash.finalize(), total_size))
}

/// Recursively collects `(relative_path, absolute_path)` pairs for regular
/// files, in sorted order at every level, honoring excludes. Unreadable
/// subdirectories are skipped silently (per §4.1's failure policy); an error
/// reading the root itself propagates.
fn walk_sorted(
    root: &Utf8Path,
    dir: &Utf8Path,
    excludes: &ExcludeSet,
    out: &mut Vec<(Utf8PathBuf, Utf8PathBuf)>,
) -> Result<()> {
    let mut entries: Vec<_> = match fs::read_dir(dir) {
        Ok(rd) => rd
            .filter_map(|e| e.ok())
            .filter_map(|e| Utf8PathBuf::from_path_buf(e.path()).ok())
            .collect(),
        Err(e) if dir != root => {
            tracing::debug!("skipping unreadable directory {dir}: {e}");
            return Ok(());
        }
        Err(e) => return Err(e).with_context(|| format!("couldn't read {dir}")),
    };
    entries.sort();

    for path in entries {
        if excludes.matches(&path) {
            continue;
        }
        let meta = match fs::symlink_metadata(&path) {
            Ok(m) => m,
            Err(_) => continue,
        };
        if meta.is_dir() {
            walk_sorted(root, &path, excludes, out)?;
        } else if meta.is_file() {
            let rel = path
                .strip_prefix(root)
                .map_err(|_| anyhow!("{path} isn't under {root}"))?
                .to_owned();
            out.push((rel, path));
        }
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn stable_under_unchanged_rescan() -> Result<()> {
        let dir = tempdir()?;
        let root = Utf8Path::from_path(dir.path()).unwrap();
        std::fs::create_dir_all(root.join("sub"))?;
        writeln!(std::fs::File::create(root.join("sub/a.txt"))?, "hello")?;

        let excludes = ExcludeSet::empty();
        let (fp1, size1) = fingerprint(root, ScanMode::Recursive, &excludes)?;
        let (fp2, size2) = fingerprint(root, ScanMode::Recursive, &excludes)?;
        assert_eq!(fp1, fp2);
        assert_eq!(size1, size2);
        Ok(())
    }

    #[test]
    fn changes_when_a_file_is_added() -> Result<()> {
        let dir = tempdir()?;
        let root = Utf8Path::from_path(dir.path()).unwrap();
        writeln!(std::fs::File::create(root.join("a.txt"))?, "hello")?;

        let excludes = ExcludeSet::empty();
        let (fp1, _) = fingerprint(root, ScanMode::Recursive, &excludes)?;

        writeln!(std::fs::File::create(root.join("b.txt"))?, "world")?;
        let (fp2, _) = fingerprint(root, ScanMode::Recursive, &excludes)?;

        assert_ne!(fp1, fp2);
        Ok(())
    }

    #[test]
    fn explicit_file_list_ignores_other_root_files() -> Result<()> {
        let dir = tempdir()?;
        let root = Utf8Path::from_path(dir.path()).unwrap();
        writeln!(std::fs::File::create(root.join("x"))?, "1")?;
        writeln!(std::fs::File::create(root.join("y"))?, "22")?;
        writeln!(std::fs::File::create(root.join("z"))?, "ignored")?;

        let excludes = ExcludeSet::empty();
        let names = vec!["x".to_string(), "y".to_string()];
        let (_, size) = fingerprint(root, ScanMode::ExplicitFiles(&names), &excludes)?;
        assert_eq!(size, 3);
        Ok(())
    }

    #[test]
    fn fingerprint_round_trips_through_display_and_fromstr() -> Result<()> {
        let dir = tempdir()?;
        let root = Utf8Path::from_path(dir.path()).unwrap();
        writeln!(std::fs::File::create(root.join("a.txt"))?, "hello")?;
        let excludes = ExcludeSet::empty();
        let (fp, _) = fingerprint(root, ScanMode::Recursive, &excludes)?;

        let s = fp.to_string();
        let parsed: Fingerprint = s.parse()?;
        assert_eq!(fp, parsed);
        Ok(())
    }
}
