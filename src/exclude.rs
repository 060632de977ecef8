//! Exclude-pattern loading and matching, shared verbatim between the
//! Fingerprinter (C1) and the Remote Stager (C2) so both apply patterns
//! identically, per SPEC_FULL.md §8's boundary-behavior requirement.
//!
//! Matching is deliberately "pattern is a substring of the full path" (see
//! SPEC_FULL.md §9's Open Question resolution) rather than path-segment
//! matching, to stay bug-for-bug compatible with the system this one mirrors.

use anyhow::{Context, Result};
use camino::Utf8Path;
use regex::RegexSet;

/// A loaded, ready-to-match set of exclude substrings.
pub struct ExcludeSet {
    patterns: Vec<String>,
    set: RegexSet,
}

impl ExcludeSet {
    pub fn empty() -> Self {
        Self {
            patterns: Vec::new(),
            set: RegexSet::new(std::iter::empty::<&str>()).unwrap(),
        }
    }

    pub fn from_patterns(patterns: Vec<String>) -> Result<Self> {
        let regexes = patterns.iter().map(|p| regex::escape(p));
        let set = RegexSet::new(regexes).context("couldn't build exclude pattern set")?;
        Ok(Self { patterns, set })
    }

    /// Loads a text file, one substring pattern per line; `#`-prefixed and
    /// blank lines are comments/ignored.
    pub fn load(path: &Utf8Path) -> Result<Self> {
        let text =
            std::fs::read_to_string(path).with_context(|| format!("couldn't read {path}"))?;
        Self::from_patterns(parse_lines(&text))
    }

    pub fn matches(&self, path: &Utf8Path) -> bool {
        self.set.is_match(path.as_str())
    }

    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }
}

fn parse_lines(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(str::to_owned)
        .collect()
}

/// Rewrites a branch-rooted exclude list to be rooted at a specific leaf
/// subpath, per SPEC_FULL.md §4.2:
/// - a pattern starting with `<leaf_subpath>/` is rewritten to start at `/`
/// - a pattern with no `/` at all is propagated unchanged (it could match
///   anywhere, including inside the leaf)
/// - anything else is outside the leaf and is dropped
pub fn rewrite_for_leaf(patterns: &[String], leaf_subpath: &str) -> Vec<String> {
    let prefix = format!("{leaf_subpath}/");
    patterns
        .iter()
        .filter_map(|p| {
            if let Some(rest) = p.strip_prefix(&prefix) {
                Some(format!("/{rest}"))
            } else if !p.contains('/') {
                Some(p.clone())
            } else {
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn matches_as_substring_anywhere_in_path() -> Result<()> {
        let excludes = ExcludeSet::from_patterns(vec![".cache".to_string()])?;
        assert!(excludes.matches(Utf8Path::new("/data/nocache/x")));
        assert!(excludes.matches(Utf8Path::new("/data/.cache/x")));
        Ok(())
    }

    #[test]
    fn rewrite_keeps_slashless_patterns_and_roots_leaf_patterns() {
        let patterns = vec![
            "sub/.cache".to_string(),
            "*.tmp".to_string(),
            "other/thing".to_string(),
        ];
        let rewritten = rewrite_for_leaf(&patterns, "sub");
        assert_eq!(rewritten, vec!["/.cache".to_string(), "*.tmp".to_string()]);
    }

    #[test]
    fn parse_lines_skips_comments_and_blanks() {
        let text = "# comment\n\nfoo\n  bar  \n";
        assert_eq!(parse_lines(text), vec!["foo".to_string(), "bar".to_string()]);
    }
}
