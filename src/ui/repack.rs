//! `coldcellar repack <branch>`: renumbers a branch's bags from scratch
//! (§4.4's Repack mode) and re-uploads every affected bag. Used after heavy
//! churn leaves a branch with many partially-empty bags.

use std::sync::Arc;

use anyhow::{Context, Result};
use camino::Utf8Path;
use clap::Args;

use crate::audit::{self, AuditEvent};
use crate::backend::{self, ObjectStore};
use crate::bag::{self, BagId, Mode as PackMode, PackerLeaf};
use crate::branch;
use crate::catalog::Catalog;
use crate::config::Configuration;
use crate::engine;
use crate::progress;
use crate::report;

#[derive(Debug, Args)]
pub struct RepackArgs {
    /// The branch's root, exactly as it appears in the tree file.
    pub branch: String,
}

pub async fn run(
    config: &Configuration,
    tree_path: &Utf8Path,
    args: RepackArgs,
    store: Arc<dyn ObjectStore>,
    run_mutations: bool,
) -> Result<()> {
    let text = std::fs::read_to_string(tree_path)
        .with_context(|| format!("couldn't read tree file {tree_path}"))?;
    let spec = branch::parse_tree_file(&text)?
        .into_iter()
        .find(|s| s.key() == args.branch)
        .with_context(|| format!("no branch {} in {tree_path}", args.branch))?;

    let mut catalog = Catalog::load(&config.catalog_file)?;
    let bags_before: std::collections::BTreeSet<_> = catalog
        .branch(&args.branch)
        .map(|b| b.leaves.values().filter_map(|l| l.bag_id).collect())
        .unwrap_or_default();

    let packer_leaves: Vec<(String, u64)> = catalog
        .branch(&args.branch)
        .map(|b| b.leaves.values().map(|l| (l.key.clone(), l.size_bytes)).collect())
        .unwrap_or_default();
    let leaves: Vec<PackerLeaf> = packer_leaves
        .iter()
        .map(|(key, size)| PackerLeaf {
            key,
            size_bytes: *size,
            existing_bag_id: None,
        })
        .collect();

    let assignment = bag::pack(&catalog, &args.branch, &leaves, config.target_bag_size, PackMode::Repack);
    let bags_after: std::collections::BTreeSet<_> = assignment.values().copied().collect();

    if !run_mutations {
        println!(
            "[dry run] repacking {} would go from {} bags to {} bags",
            args.branch,
            bags_before.len(),
            bags_after.len()
        );
        return Ok(());
    }

    {
        let branch = catalog.branch_mut(&args.branch);
        for (key, bag_id) in &assignment {
            if let Some(leaf) = branch.leaves.get_mut(key) {
                leaf.bag_id = Some(*bag_id);
                leaf.needs_upload = true;
            }
        }
    }
    catalog.save(&config.catalog_file)?;

    audit::record(
        config.audit_log.as_deref(),
        &AuditEvent::Repacked {
            branch: &args.branch,
            bags_before: bags_before.len(),
            bags_after: bags_after.len(),
        },
    );

    let (tx, rx) = progress::channel();
    let render_task = tokio::spawn(async move {
        let term = console::Term::stdout();
        progress::render_until_closed(rx, &term, false).await
    });

    let stats = super::mirror_one(config, &mut catalog, &spec, store.as_ref(), false, Some(&tx)).await?;
    drop(tx);
    let _ = render_task.await;

    println!("{}", report::render_run_report(&[(spec.key().as_str(), stats)], false));

    // Orphan-tail cleanup (SPEC_FULL.md §4.4, §8 scenario 4): repacking can
    // only shrink a branch's bag count, never grow it, so any bag number
    // beyond the new maximum is a stale remote object nothing references
    // anymore.
    if let Some(new_max) = bags_after.iter().max().copied() {
        let year_prefix = super::year_prefix(&jiff::Zoned::now());
        let stem_prefix = engine::bag_object_key_stem_prefix(&spec);
        let listing_prefix = format!("{year_prefix}/{stem_prefix}");
        let keys = store.list(&listing_prefix).await?;
        let orphaned_tail: Vec<String> = keys
            .into_iter()
            .filter(|key| {
                key.strip_prefix(&listing_prefix)
                    .and_then(|rest| rest.strip_suffix(".tar"))
                    .and_then(|bag_str| bag_str.parse::<BagId>().ok())
                    .map(|bag_id| bag_id > new_max)
                    .unwrap_or(false)
            })
            .collect();

        if !orphaned_tail.is_empty() {
            backend::delete_all(store.as_ref(), &orphaned_tail).await?;
            audit::record(
                config.audit_log.as_deref(),
                &AuditEvent::OrphansPruned {
                    keys: orphaned_tail,
                },
            );
        }
    }

    Ok(())
}
