//! `coldcellar mirror-bag <branch> <bag>`: forces a single already-assigned
//! bag to be reassembled and re-uploaded, without rescanning or repacking
//! the rest of the branch. Useful after a manual bucket-side loss of one
//! bag, or to re-run a bag that failed mid-upload.

use std::sync::Arc;

use anyhow::{Context, Result};
use camino::Utf8Path;
use clap::Args;

use crate::backend::ObjectStore;
use crate::bag::BagId;
use crate::branch;
use crate::catalog::Catalog;
use crate::config::Configuration;
use crate::progress;
use crate::report;

#[derive(Debug, Args)]
pub struct BagArgs {
    /// The branch's root, exactly as it appears in the tree file.
    pub branch: String,
    /// A bag id in `bag_NNNNN` form.
    pub bag: String,
}

pub async fn run(
    config: &Configuration,
    tree_path: &Utf8Path,
    args: BagArgs,
    store: Arc<dyn ObjectStore>,
    run_mutations: bool,
) -> Result<()> {
    let bag_id: BagId = args.bag.parse().with_context(|| format!("'{}' isn't a bag id", args.bag))?;

    let mut catalog = Catalog::load(&config.catalog_file)?;
    let member_count = catalog
        .branch_mut(&args.branch)
        .leaves
        .values()
        .filter(|leaf| leaf.bag_id == Some(bag_id))
        .count();
    anyhow::ensure!(member_count > 0, "bag {bag_id} has no members in branch {}", args.branch);

    for leaf in catalog.branch_mut(&args.branch).leaves.values_mut() {
        if leaf.bag_id == Some(bag_id) {
            leaf.needs_upload = true;
        }
    }
    catalog.save(&config.catalog_file)?;

    if !run_mutations {
        println!("[dry run] would force re-upload of {bag_id} in branch {}", args.branch);
        return Ok(());
    }

    // We only need this branch's spec to re-enter the normal mirror path;
    // marking the bag dirty above is what actually targets just this bag.
    let text = std::fs::read_to_string(tree_path)
        .with_context(|| format!("couldn't read tree file {tree_path}"))?;
    let spec = branch::parse_tree_file(&text)?
        .into_iter()
        .find(|s| s.key() == args.branch)
        .with_context(|| format!("no branch {} in {tree_path}", args.branch))?;

    let (tx, rx) = progress::channel();
    let render_task = tokio::spawn(async move {
        let term = console::Term::stdout();
        progress::render_until_closed(rx, &term, false).await
    });

    let stats = super::mirror_one(config, &mut catalog, &spec, store.as_ref(), false, Some(&tx)).await?;
    drop(tx);
    let _ = render_task.await;

    println!("{}", report::render_run_report(&[(spec.key().as_str(), stats)], false));
    Ok(())
}
