//! `coldcellar audit`: prints the newline-delimited JSON audit log (§4.6).
//! Read-only; there's no store interaction, only the local log file.

use anyhow::{Context, Result, bail};
use clap::Args;

use crate::config::Configuration;

#[derive(Debug, Args)]
pub struct AuditArgs {
    /// Only print the last N events instead of the whole log.
    #[arg(long)]
    pub tail: Option<usize>,
}

pub fn run(config: &Configuration, args: AuditArgs) -> Result<()> {
    let Some(path) = &config.audit_log else {
        bail!("no audit_log configured; nothing to show");
    };

    let text = std::fs::read_to_string(path).with_context(|| format!("couldn't read audit log {path}"))?;
    let lines: Vec<&str> = text.lines().collect();
    let start = args.tail.map(|n| lines.len().saturating_sub(n)).unwrap_or(0);
    for line in &lines[start..] {
        println!("{line}");
    }
    Ok(())
}
