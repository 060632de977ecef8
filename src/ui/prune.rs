//! `coldcellar prune`: finds bucket objects the catalog no longer
//! references and deletes them, after interactive confirmation (§4.10).
//!
//! This build has no last-modified lookup wired through `ObjectStore` yet,
//! so every orphan is treated as having unknown age; `prune::filter_by_retention`
//! already defaults an unknown-age key to "don't block it", so the
//! retention safeguard is effectively a no-op until that plumbing exists.

use std::io::Write as _;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;

use crate::backend::ObjectStore;
use crate::catalog::Catalog;
use crate::config::Configuration;
use crate::prune;
use crate::ui::year_prefix;

#[derive(Debug, Args)]
pub struct PruneArgs {
    /// Skip the interactive confirmation prompt.
    #[arg(long)]
    pub yes: bool,
}

pub async fn run(
    config: &Configuration,
    args: PruneArgs,
    store: Arc<dyn ObjectStore>,
    run_mutations: bool,
) -> Result<()> {
    let catalog = Catalog::load(&config.catalog_file)?;
    let prefix = year_prefix(&jiff::Zoned::now());

    let candidates = prune::find_orphans(store.as_ref(), &prefix, &catalog).await?;
    let ages = std::collections::HashMap::new();
    let minimum_retention_days = config.pricing.as_ref().map(|p| p.minimum_retention_days).unwrap_or(180);
    let keys = prune::filter_by_retention(&candidates, &ages, minimum_retention_days);

    if keys.is_empty() {
        println!("nothing to prune under {prefix}");
        return Ok(());
    }

    println!("{} orphaned object(s) under {prefix}:", keys.len());
    for key in &keys {
        println!("  {key}");
    }

    if !run_mutations {
        println!("[dry run] would delete the above");
        return Ok(());
    }

    if !args.yes {
        print!("delete these {} objects? [y/N] ", keys.len());
        std::io::stdout().flush().ok();
        let mut line = String::new();
        std::io::stdin().read_line(&mut line).context("couldn't read confirmation")?;
        if !line.trim().eq_ignore_ascii_case("y") {
            println!("aborted");
            return Ok(());
        }
    }

    prune::delete_confirmed(store.as_ref(), &keys).await?;
    crate::audit::record(
        config.audit_log.as_deref(),
        &crate::audit::AuditEvent::OrphansPruned { keys: keys.clone() },
    );
    println!("deleted {} object(s)", keys.len());
    Ok(())
}
