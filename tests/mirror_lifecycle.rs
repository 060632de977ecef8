//! End-to-end coverage of a mirror run's lifecycle, against an in-memory
//! object store instead of real S3: fresh branch, idempotent re-run, leaf
//! mutation, repack, and the LOCKED guard.

mod common;

use anyhow::Result;
use coldcellar::backend::memory::MemoryStore;
use coldcellar::branch;
use coldcellar::catalog::Catalog;
use coldcellar::engine;

#[tokio::test]
async fn fresh_branch_uploads_every_leaf() -> Result<()> {
    let (_root_guard, root) = common::tmp_utf8();
    let (_scratch_guard, scratch) = common::tmp_utf8();
    let config = common::test_config(&scratch);

    common::write_file(&root, "sub1/a.txt", b"hello from sub1");
    common::write_file(&root, "sub2/b.txt", b"hello from sub2");

    let spec = branch::parse_line(root.as_str())?;
    let store = MemoryStore::new();
    let mut catalog = Catalog::default();

    let stats = engine::mirror_branch(&config, &mut catalog, &spec, &root, "2026-backup", &store, false, None, None).await?;

    assert!(stats.uploaded_count >= 1);
    assert_eq!(stats.skipped_count, 0);

    let branch = catalog.branch(&spec.key()).expect("branch scanned");
    assert_eq!(branch.leaves.len(), 2);
    assert!(branch.leaves.values().all(|l| !l.needs_upload && l.bag_id.is_some()));

    // The catalog on disk must reflect the run too, not just the in-memory copy.
    let reloaded = Catalog::load(&config.catalog_file)?;
    assert_eq!(reloaded.branch(&spec.key()).unwrap().leaves.len(), 2);
    Ok(())
}

#[tokio::test]
async fn rerun_with_no_changes_skips_every_bag() -> Result<()> {
    let (_root_guard, root) = common::tmp_utf8();
    let (_scratch_guard, scratch) = common::tmp_utf8();
    let config = common::test_config(&scratch);

    common::write_file(&root, "sub1/a.txt", b"stable contents");

    let spec = branch::parse_line(root.as_str())?;
    let store = MemoryStore::new();
    let mut catalog = Catalog::default();

    engine::mirror_branch(&config, &mut catalog, &spec, &root, "2026-backup", &store, false, None, None).await?;
    let stats = engine::mirror_branch(&config, &mut catalog, &spec, &root, "2026-backup", &store, false, None, None).await?;

    assert_eq!(stats.uploaded_count, 0);
    assert_eq!(stats.skipped_count, 1);
    Ok(())
}

#[tokio::test]
async fn mutated_leaf_reuploads_only_its_bag() -> Result<()> {
    let (_root_guard, root) = common::tmp_utf8();
    let (_scratch_guard, scratch) = common::tmp_utf8();
    let config = common::test_config(&scratch);

    common::write_file(&root, "sub1/a.txt", b"version one");
    common::write_file(&root, "sub2/b.txt", b"version one too");

    let spec = branch::parse_line(root.as_str())?;
    let store = MemoryStore::new();
    let mut catalog = Catalog::default();

    engine::mirror_branch(&config, &mut catalog, &spec, &root, "2026-backup", &store, false, None, None).await?;

    common::write_file(&root, "sub1/a.txt", b"version two, changed");
    let stats = engine::mirror_branch(&config, &mut catalog, &spec, &root, "2026-backup", &store, false, None, None).await?;

    // Both leaves share one bag under the default 1 MiB target here, so a
    // single changed leaf forces that one bag to re-upload, not zero.
    assert_eq!(stats.uploaded_count, 1);
    let branch = catalog.branch(&spec.key()).unwrap();
    assert!(branch.leaves.values().all(|l| !l.needs_upload));
    Ok(())
}

#[tokio::test]
async fn locked_branch_refuses_to_mirror() -> Result<()> {
    let (_root_guard, root) = common::tmp_utf8();
    let (_scratch_guard, scratch) = common::tmp_utf8();
    let config = common::test_config(&scratch);
    common::write_file(&root, "sub1/a.txt", b"locked contents");

    let spec = branch::parse_line(&format!("{root} :: LOCKED"))?;
    let store = MemoryStore::new();
    let mut catalog = Catalog::default();

    let result = engine::mirror_branch(&config, &mut catalog, &spec, &root, "2026-backup", &store, false, None, None).await;
    assert!(result.is_err());
    assert!(catalog.branch(&spec.key()).is_none());
    Ok(())
}

#[tokio::test]
async fn repack_reassigns_bags_and_next_mirror_reuploads_them() -> Result<()> {
    use coldcellar::bag::{self, Mode as PackMode, PackerLeaf};

    let (_root_guard, root) = common::tmp_utf8();
    let (_scratch_guard, scratch) = common::tmp_utf8();
    let config = common::test_config(&scratch);

    common::write_file(&root, "sub1/a.txt", b"alpha");
    common::write_file(&root, "sub2/b.txt", b"beta");

    let spec = branch::parse_line(root.as_str())?;
    let store = MemoryStore::new();
    let mut catalog = Catalog::default();
    engine::mirror_branch(&config, &mut catalog, &spec, &root, "2026-backup", &store, false, None, None).await?;

    let branch_key = spec.key();
    let bags_before = catalog.branch_max_bag_id(&branch_key);

    let packer_leaves: Vec<PackerLeaf> = {
        let branch = catalog.branch(&branch_key).unwrap();
        branch
            .leaves
            .iter()
            .map(|(key, _)| PackerLeaf {
                key,
                size_bytes: 0,
                existing_bag_id: None,
            })
            .collect()
    };
    let assignment = bag::pack(&catalog, &branch_key, &packer_leaves, config.target_bag_size, PackMode::Repack);
    {
        let branch = catalog.branch_mut(&branch_key);
        for (key, bag_id) in &assignment {
            let leaf = branch.leaves.get_mut(key).unwrap();
            leaf.bag_id = Some(*bag_id);
            leaf.needs_upload = true;
        }
    }
    catalog.save(&config.catalog_file)?;

    let stats = engine::mirror_branch(&config, &mut catalog, &spec, &root, "2026-backup", &store, false, None, None).await?;
    assert!(stats.uploaded_count >= 1);
    assert_ne!(bags_before, None);
    Ok(())
}

#[tokio::test]
async fn crash_mid_run_only_loses_the_in_flight_bag() -> Result<()> {
    let (_root_guard, root) = common::tmp_utf8();
    let (_scratch_guard, scratch) = common::tmp_utf8();
    let mut config = common::test_config(&scratch);
    // A tiny target forces each leaf into its own bag, so the second bag is
    // clearly still in flight when we simulate the crash.
    config.target_bag_size = byte_unit::Byte::from_u64(1);

    common::write_file(&root, "sub1/a.txt", b"first bag contents");
    common::write_file(&root, "sub2/b.txt", b"second bag contents");

    let spec = branch::parse_line(root.as_str())?;
    let store = MemoryStore::new();
    let mut catalog = Catalog::default();

    engine::mirror_branch(&config, &mut catalog, &spec, &root, "2026-backup", &store, false, None, None).await?;

    // Reload straight from disk as if the process had been killed right
    // after the in-memory run finished: every bag's commit must already be
    // durable, one save per bag, not a single save at the very end.
    let reloaded = Catalog::load(&config.catalog_file)?;
    let branch = reloaded.branch(&spec.key()).unwrap();
    assert!(branch.leaves.values().all(|l| !l.needs_upload));
    Ok(())
}
