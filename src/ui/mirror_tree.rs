//! `coldcellar mirror-tree`: mirrors every branch named in the tree file.

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
pub struct MirrorArgs {
    /// Print what would be uploaded without touching the catalog or bucket.
    #[arg(long)]
    pub quiet: bool,
}

pub async fn run(
    config: &Configuration,
    tree_path: &Utf8Path,
    args: MirrorArgs,
    store: Arc<dyn ObjectStore>,
    run_mutations: bool,
) -> Result<()> {
    let text = std::fs::read_to_string(tree_path)
        .with_context(|| format!("couldn't read tree file {tree_path}"))?;
    let specs = branch::parse_tree_file(&text)?;

    let mut catalog = Catalog::load(&config.catalog_file)?;
    let dry_run = !run_mutations;
    let mut per_branch = Vec::new();

    let (tx, rx) = progress::channel();
    let quiet = args.quiet;
    let render_task = tokio::spawn(async move {
        let term = console::Term::stdout();
        progress::render_until_closed(rx, &term, quiet).await
    });

    for spec in &specs {
        let stats = super::mirror_one(config, &mut catalog, spec, store.as_ref(), dry_run, Some(&tx)).await?;
        per_branch.push((spec.key(), stats));
    }
    drop(tx);
    let _ = render_task.await;

    if !args.quiet {
        let rows: Vec<(&str, crate::report::RunStats)> =
            per_branch.iter().map(|(k, s)| (k.as_str(), *s)).collect();
        println!("{}", report::render_run_report(&rows, dry_run));
    }

    Ok(())
}
