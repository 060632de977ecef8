//! `coldcellar cron`: "smart cron" mode (§4.8). Mirrors only the branches
//! whose last scan is past the configured interval, and stays silent on
//! stdout unless it actually did something — meant to run unattended from a
//! system timer without spamming logs on every no-op tick.

use std::sync::Arc;

use anyhow::{Context, Result};
use camino::Utf8Path;
use clap::Args;

use crate::backend::ObjectStore;
use crate::branch;
use crate::catalog::Catalog;
use crate::config::Configuration;
use crate::progress;
use crate::scheduler::{self, CronBuffer};

#[derive(Debug, Args)]
pub struct CronArgs {}

pub async fn run(
    config: &Configuration,
    tree_path: &Utf8Path,
    _args: CronArgs,
    store: Arc<dyn ObjectStore>,
    run_mutations: bool,
) -> Result<()> {
    let text = std::fs::read_to_string(tree_path)
        .with_context(|| format!("couldn't read tree file {tree_path}"))?;
    let specs = branch::parse_tree_file(&text)?;

    let mut catalog = Catalog::load(&config.catalog_file)?;
    let now = jiff::Timestamp::now();
    let mut buffer = CronBuffer::new();
    let dry_run = !run_mutations;

    // Cron runs unattended: draw nothing to the (likely absent) tty, but
    // still drain the channel so totals accumulate for the log line below.
    let (tx, rx) = progress::channel();
    let render_task = tokio::spawn(async move {
        let term = console::Term::stdout();
        progress::render_until_closed(rx, &term, true).await
    });

    for spec in &specs {
        let last_scan = catalog.branch(&spec.key()).and_then(|b| b.last_scan);
        if !scheduler::is_ripe(last_scan, now, config.scan_interval_days) {
            continue;
        }

        let stats = super::mirror_one(config, &mut catalog, spec, store.as_ref(), dry_run, Some(&tx)).await?;
        if stats.uploaded_count > 0 {
            buffer.mark_work_done();
        }
        buffer.push(format!(
            "{}: uploaded {} bag(s), skipped {} unchanged",
            spec.key(),
            stats.uploaded_count,
            stats.skipped_count
        ));
    }
    drop(tx);
    let _ = render_task.await;

    buffer.flush();
    Ok(())
}
