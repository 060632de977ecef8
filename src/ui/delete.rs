//! `coldcellar delete <branch>`: removes a branch and all its leaves from
//! the catalog (§3). This never deletes the bucket's bags themselves — that
//! happens later, when `prune` notices they're no longer referenced and the
//! retention window has passed. Guarded like every other mutation (§4.7).

use std::io::Write as _;

use anyhow::{Context, Result, bail};
use clap::Args;

use crate::audit::{self, AuditEvent};
use crate::backend::ObjectStore;
use crate::branch::parse_line;
use crate::catalog::Catalog;
use crate::config::Configuration;
use crate::guard::{self, Action};

#[derive(Debug, Args)]
pub struct DeleteArgs {
    /// The branch's root, exactly as it appears in the tree file.
    pub branch: String,
    /// Skip the interactive confirmation prompt.
    #[arg(long)]
    pub yes: bool,
}

pub async fn run(
    config: &Configuration,
    args: DeleteArgs,
    _store: std::sync::Arc<dyn ObjectStore>,
    run_mutations: bool,
) -> Result<()> {
    // Delete only needs enough of a BranchSpec to check LOCKED; a bare path
    // with no tags parses fine and defers to whatever's actually catalogued.
    let spec = parse_line(&args.branch).with_context(|| format!("couldn't parse branch {}", args.branch))?;
    let decision = guard::check(&spec, Action::Delete);
    if !decision.allowed {
        audit::record(
            config.audit_log.as_deref(),
            &AuditEvent::PolicyDenied {
                branch: &args.branch,
                action: "delete",
                reason: decision.reason.as_deref().unwrap_or("denied"),
            },
        );
        bail!("{}", decision.reason.unwrap_or_default());
    }

    let mut catalog = Catalog::load(&config.catalog_file)?;
    let leaf_count = catalog.branch(&args.branch).map(|b| b.leaves.len()).unwrap_or(0);
    anyhow::ensure!(leaf_count > 0 || catalog.branch(&args.branch).is_some(), "branch {} isn't in the catalog", args.branch);

    if !run_mutations {
        println!("[dry run] would delete branch {} ({leaf_count} leaves)", args.branch);
        return Ok(());
    }

    if !args.yes {
        print!("delete branch {} and its {leaf_count} catalog entries? [y/N] ", args.branch);
        std::io::stdout().flush().ok();
        let mut line = String::new();
        std::io::stdin().read_line(&mut line).context("couldn't read confirmation")?;
        if !line.trim().eq_ignore_ascii_case("y") {
            println!("aborted");
            return Ok(());
        }
    }

    catalog.delete_branch(&args.branch);
    catalog.save(&config.catalog_file)?;

    audit::record(
        config.audit_log.as_deref(),
        &AuditEvent::BranchDeleted {
            branch: &args.branch,
            leaf_count,
        },
    );
    println!("deleted branch {} ({leaf_count} leaves removed from the catalog)", args.branch);
    Ok(())
}
