//! Parses the declarative tree file (§6) into structured branch specs, once,
//! per SPEC_FULL.md §9's sum-type modeling note: no string-sniffing of tags
//! at every call site downstream.

use std::collections::BTreeSet;
use std::fmt;

use anyhow::{Context, Result, bail};
use camino::Utf8PathBuf;

/// Where a branch's root actually lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Root {
    Local(Utf8PathBuf),
    /// `user@host:/remote/path`
    Remote { connection: String, path: String },
}

impl fmt::Display for Root {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Root::Local(p) => write!(f, "{p}"),
            Root::Remote { connection, path } => write!(f, "{connection}:{path}"),
        }
    }
}

impl Root {
    pub fn is_remote(&self) -> bool {
        matches!(self, Root::Remote { .. })
    }

    /// A filesystem/object-key-safe short name: the host if remote, or the
    /// final path component if local.
    pub fn short_name(&self) -> String {
        match self {
            Root::Local(p) => p
                .file_name()
                .unwrap_or(p.as_str())
                .replace(' ', "_"),
            Root::Remote { connection, .. } => {
                connection.split('@').next_back().unwrap_or(connection).to_string()
            }
        }
    }
}

fn parse_root(s: &str) -> Root {
    // A remote spec is `user@host:/path`; a Windows-style local path like
    // `C:\foo` also contains a colon, so require an `@` before the colon to
    // disambiguate (the grammar in §6 always has one for remotes).
    if let Some(colon) = s.find(':') {
        let (before, after) = (&s[..colon], &s[colon + 1..]);
        if before.contains('@') {
            return Root::Remote {
                connection: before.to_string(),
                path: after.to_string(),
            };
        }
    }
    Root::Local(Utf8PathBuf::from(s))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Mutability {
    Mutable,
    Immutable,
}

/// A fully parsed branch line: root, mutability, and the action/encoding
/// tags layered on top.
#[derive(Debug, Clone)]
pub struct BranchSpec {
    pub root: Root,
    pub mutability: Mutability,
    pub compress: bool,
    pub encrypt: bool,
    pub locked: bool,
    pub excludes: BTreeSet<String>,
}

impl BranchSpec {
    /// The branch line, minus its tags: a stable key for catalog lookups.
    pub fn key(&self) -> String {
        self.root.to_string()
    }
}

/// Parses one non-comment, non-empty line of the tree file:
/// `<path> [ :: <TAG> ]*`
pub fn parse_line(line: &str) -> Result<BranchSpec> {
    let mut parts = line.split("::").map(str::trim);
    let root_str = parts
        .next()
        .filter(|s| !s.is_empty())
        .context("branch line has no path")?;
    let root = parse_root(root_str);

    let mut mutability = Mutability::Mutable;
    let mut compress = false;
    let mut encrypt = false;
    let mut locked = false;
    let mut excludes = BTreeSet::new();

    for tag in parts {
        if tag.is_empty() {
            continue;
        }
        let upper_first = tag.split_whitespace().next().unwrap_or("").to_uppercase();
        match upper_first.as_str() {
            "MUTABLE" => mutability = Mutability::Mutable,
            "IMMUTABLE" => mutability = Mutability::Immutable,
            "COMPRESS" => compress = true,
            "ENCRYPT" => encrypt = true,
            "LOCKED" => locked = true,
            "EXCLUDE" => {
                let name = tag
                    .split_whitespace()
                    .nth(1)
                    .with_context(|| format!("EXCLUDE tag with no name in: {line}"))?;
                excludes.insert(name.to_string());
            }
            other => bail!("unrecognized tag '{other}' in branch line: {line}"),
        }
    }

    Ok(BranchSpec {
        root,
        mutability,
        compress,
        encrypt,
        locked,
        excludes,
    })
}

/// Parses a whole tree file: one branch per non-empty, non-comment (`#`) line.
pub fn parse_tree_file(text: &str) -> Result<Vec<BranchSpec>> {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(parse_line)
        .collect()
}
