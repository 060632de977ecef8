//! C4: the bag packer. Assigns leaves to stably-numbered, globally-unique,
//! target-sized bags.
//!
//! The teacher's `pack.rs` is the architectural ancestor of "accumulate
//! things into a container until it's full, then start a new one," but its
//! sizing strategy (compress, then check the compressed size) doesn't apply
//! here: bags aren't compressed at the container level (only individual
//! leaves are, per §4.3), and §4.4 fully specifies a simpler first-fit over
//! uncompressed leaf size, which is what's implemented below.

use std::fmt;
use std::str::FromStr;

use anyhow::{Context, Result};
use byte_unit::Byte;
use serde_derive::{Deserialize, Serialize};

use crate::catalog::Catalog;

/// A bag's identifier: a globally-monotonic sequence number, rendered as
/// `bag_NNNNN` (5-digit zero-padded). Not content-derived — see
/// SPEC_FULL.md §9.1 for why this crate has no general content-addressed ID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BagId(u32);

impl BagId {
    pub fn new(n: u32) -> Self {
        BagId(n)
    }

    pub fn next(self) -> Self {
        BagId(self.0 + 1)
    }

    pub fn number(self) -> u32 {
        self.0
    }
}

impl fmt::Display for BagId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bag_{:05}", self.0)
    }
}

impl FromStr for BagId {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let digits = s
            .strip_prefix("bag_")
            .with_context(|| format!("{s} doesn't start with 'bag_'"))?;
        Ok(BagId(digits.parse().with_context(|| format!("bad bag number in {s}"))?))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Standard,
    Repack,
}

/// One leaf as seen by the packer: just enough to decide bag membership.
pub struct PackerLeaf<'a> {
    pub key: &'a str,
    pub size_bytes: u64,
    pub existing_bag_id: Option<BagId>,
}

/// The outcome of packing: each leaf key's newly-assigned bag id (leaves
/// that kept a reserved seat are included too, unchanged, so the caller can
/// apply the whole map uniformly).
pub type Assignment = std::collections::BTreeMap<String, BagId>;

/// Runs the Bag Packer algorithm (§4.4) for one branch.
///
/// `leaves` must already be in discovery order: subdirs sorted by name, then
/// the branch-root sentinel leaf last. This is NOT the catalog's raw
/// `BTreeMap<String, Leaf>` iteration order — `"__BRANCH_ROOT__"` sorts
/// before every lowercase subdir name, so a caller iterating the map
/// directly would put the root leaf first instead of last. The caller
/// (`engine::mirror_branch`) re-sorts for this reason before calling in.
pub fn pack(
    catalog: &Catalog,
    branch_key: &str,
    leaves: &[PackerLeaf],
    target_size: Byte,
    mode: Mode,
) -> Assignment {
    let target = target_size.as_u64();

    let mut counter = match mode {
        Mode::Repack => BagId::new(1),
        Mode::Standard => match catalog.branch_max_bag_id(branch_key) {
            Some(existing_max) => existing_max,
            None => catalog.max_bag_id().map(BagId::next).unwrap_or(BagId::new(1)),
        },
    };

    let mut current_bag_size: u64 = if mode == Mode::Standard {
        leaves
            .iter()
            .filter(|l| l.existing_bag_id == Some(counter))
            .map(|l| l.size_bytes)
            .sum()
    } else {
        0
    };

    let mut assignment = Assignment::new();

    for leaf in leaves {
        if mode == Mode::Standard {
            if let Some(reserved) = leaf.existing_bag_id {
                // Reserved seat: never reassign an unchanged leaf's bag.
                assignment.insert(leaf.key.to_string(), reserved);
                continue;
            }
        }

        if current_bag_size > 0 && current_bag_size + leaf.size_bytes > target {
            counter = counter.next();
            current_bag_size = 0;
        }

        assignment.insert(leaf.key.to_string(), counter);
        current_bag_size += leaf.size_bytes;
    }

    assignment
}

#[cfg(test)]
mod test {
    use super::*;

    fn leaf(key: &'static str, size_gb: u64) -> PackerLeaf<'static> {
        PackerLeaf {
            key,
            size_bytes: size_gb * 1024 * 1024 * 1024,
            existing_bag_id: None,
        }
    }

    #[test]
    fn bag_id_display_and_parse_round_trip() {
        let id = BagId::new(42);
        assert_eq!(id.to_string(), "bag_00042");
        assert_eq!("bag_00042".parse::<BagId>().unwrap(), id);
    }

    #[test]
    fn fresh_branch_packs_first_fit_scenario_one() {
        // Mirrors SPEC_FULL.md §8 scenario 1: a(10) b(20) c(15) root(2), target 40.
        // Keys are full catalog keys in the order engine::mirror_branch
        // actually hands to the packer: subdirs sorted, root sentinel last.
        let leaves = vec![
            leaf("/data/alpha/a", 10),
            leaf("/data/alpha/b", 20),
            leaf("/data/alpha/c", 15),
            leaf("/data/alpha/__BRANCH_ROOT__", 2),
        ];
        let catalog = Catalog::default();
        let target = Byte::from_u64(40 * 1024 * 1024 * 1024);
        let assignment = pack(&catalog, "/data/alpha", &leaves, target, Mode::Standard);

        assert_eq!(assignment["/data/alpha/a"], BagId::new(1));
        assert_eq!(assignment["/data/alpha/b"], BagId::new(1));
        assert_eq!(assignment["/data/alpha/c"], BagId::new(2));
        assert_eq!(assignment["/data/alpha/__BRANCH_ROOT__"], BagId::new(2));
    }

    #[test]
    fn raw_btreemap_key_order_would_misplace_the_root_leaf() {
        // '_' sorts before every lowercase subdir name, so a
        // BTreeMap<String, Leaf>'s native iteration order puts the root
        // sentinel first, not last. This is why engine::mirror_branch
        // re-sorts (subdirs, then root) before calling pack() instead of
        // handing the catalog's raw iteration order straight through.
        let leaves = vec![
            leaf("/data/alpha/__BRANCH_ROOT__", 2),
            leaf("/data/alpha/a", 10),
            leaf("/data/alpha/b", 20),
            leaf("/data/alpha/c", 15),
        ];
        let catalog = Catalog::default();
        let target = Byte::from_u64(40 * 1024 * 1024 * 1024);
        let assignment = pack(&catalog, "/data/alpha", &leaves, target, Mode::Standard);

        // root+a+b = 32 GiB fits under the 40 GiB target, landing all three
        // in bag 1 and leaving c alone in bag 2 -- not scenario one's
        // {a,b}/{c,root} split.
        assert_eq!(assignment["/data/alpha/__BRANCH_ROOT__"], BagId::new(1));
        assert_eq!(assignment["/data/alpha/a"], BagId::new(1));
        assert_eq!(assignment["/data/alpha/b"], BagId::new(1));
        assert_eq!(assignment["/data/alpha/c"], BagId::new(2));
    }

    #[test]
    fn new_branch_continues_after_global_maximum() {
        let mut catalog = Catalog::default();
        let mut other_leaf =
            crate::catalog::Leaf::new("x".to_string(), 1, "00000000000000000000000000000000".parse().unwrap());
        other_leaf.bag_id = Some(BagId::new(5));
        catalog
            .branch_mut("/data/other")
            .leaves
            .insert("x".to_string(), other_leaf);

        let leaves = vec![leaf("a", 10)];
        let target = Byte::from_u64(40 * 1024 * 1024 * 1024);
        let assignment = pack(&catalog, "/data/new-branch", &leaves, target, Mode::Standard);
        assert_eq!(assignment["a"], BagId::new(6));
    }

    #[test]
    fn existing_branch_continues_its_own_tail_bag() {
        let mut catalog = Catalog::default();
        let mut a = crate::catalog::Leaf::new(
            "a".to_string(),
            10 * 1024 * 1024 * 1024,
            "00000000000000000000000000000000".parse().unwrap(),
        );
        a.bag_id = Some(BagId::new(1));
        catalog.branch_mut("/data/alpha").leaves.insert("a".to_string(), a);

        // b is a brand-new leaf in the same branch, should land in bag 1
        // too (room remains) rather than jumping to a fresh global max+1.
        let leaves = vec![
            PackerLeaf { key: "a", size_bytes: 10 * 1024 * 1024 * 1024, existing_bag_id: Some(BagId::new(1)) },
            leaf("b", 5),
        ];
        let target = Byte::from_u64(40 * 1024 * 1024 * 1024);
        let assignment = pack(&catalog, "/data/alpha", &leaves, target, Mode::Standard);
        assert_eq!(assignment["a"], BagId::new(1));
        assert_eq!(assignment["b"], BagId::new(1));
    }

    #[test]
    fn oversized_single_leaf_gets_its_own_bag_without_splitting() {
        let leaves = vec![leaf("huge", 100)];
        let catalog = Catalog::default();
        let target = Byte::from_u64(40 * 1024 * 1024 * 1024);
        let assignment = pack(&catalog, "/data/alpha", &leaves, target, Mode::Standard);
        assert_eq!(assignment.len(), 1);
        assert_eq!(assignment["huge"], BagId::new(1));
    }

    #[test]
    fn repack_clears_reservations_and_starts_at_one() {
        let leaves = vec![
            PackerLeaf { key: "a", size_bytes: 10 * 1024 * 1024 * 1024, existing_bag_id: Some(BagId::new(99)) },
            leaf("b", 5),
        ];
        let catalog = Catalog::default();
        let target = Byte::from_u64(40 * 1024 * 1024 * 1024);
        let assignment = pack(&catalog, "/data/alpha", &leaves, target, Mode::Repack);
        assert_eq!(assignment["a"], BagId::new(1));
        assert_eq!(assignment["b"], BagId::new(1));
    }

    #[test]
    fn exact_target_match_does_not_open_a_new_bag() {
        let leaves = vec![leaf("a", 20), leaf("b", 20)];
        let catalog = Catalog::default();
        let target = Byte::from_u64(40 * 1024 * 1024 * 1024);
        let assignment = pack(&catalog, "/data/alpha", &leaves, target, Mode::Standard);
        assert_eq!(assignment["a"], BagId::new(1));
        assert_eq!(assignment["b"], BagId::new(1));
    }
}
