//! `coldcellar mirror-branch <branch>`: mirrors a single named branch.

use std::sync::Arc;

use anyhow::{Context, Result};
use camino::Utf8Path;
use clap::Args;

use crate::backend::ObjectStore;
use crate::branch;
use crate::catalog::Catalog;
use crate::config::Configuration;
use crate::progress;
use crate::report;

#[derive(Debug, Args)]
pub struct BranchArgs {
    /// The branch's root, exactly as it appears in the tree file (its key).
    pub branch: String,
}

pub async fn run(
    config: &Configuration,
    tree_path: &Utf8Path,
    args: BranchArgs,
    store: Arc<dyn ObjectStore>,
    run_mutations: bool,
) -> Result<()> {
    let text = std::fs::read_to_string(tree_path)
        .with_context(|| format!("couldn't read tree file {tree_path}"))?;
    let specs = branch::parse_tree_file(&text)?;

    let spec = specs
        .into_iter()
        .find(|s| s.key() == args.branch)
        .with_context(|| format!("no branch {} in {tree_path}", args.branch))?;

    if spec.root.is_remote() && !run_mutations {
        tracing::info!("dry run against a remote branch still mounts it read-only to scan");
    }

    let mut catalog = Catalog::load(&config.catalog_file)?;
    let dry_run = !run_mutations;

    let (tx, rx) = progress::channel();
    let render_task = tokio::spawn(async move {
        let term = console::Term::stdout();
        progress::render_until_closed(rx, &term, false).await
    });

    let stats = super::mirror_one(config, &mut catalog, &spec, store.as_ref(), dry_run, Some(&tx)).await?;
    drop(tx);
    let _ = render_task.await;

    println!("{}", report::render_run_report(&[(spec.key().as_str(), stats)], dry_run));
    Ok(())
}
