//! `coldcellar restore-hint`: prints the manual recovery steps for one
//! committed object (§1's Non-goal: this crate never restores anything
//! itself, only documents how a human would).

use clap::Args;

#[derive(Debug, Args)]
pub struct RestoreArgs {
    /// The bag's object key, e.g. `2026-backup/host_alpha_bag_00001.tar`.
    pub object_key: String,
    /// The leaf's inner name inside the bag, e.g. `sub/dir.tar.gz`.
    pub inner_name: String,
    #[arg(long)]
    pub compressed: bool,
    #[arg(long)]
    pub encrypted: bool,
}

pub fn run(args: RestoreArgs) -> anyhow::Result<()> {
    let hint = crate::restore::recovery_hint(&args.object_key, &args.inner_name, args.compressed, args.encrypted);
    println!("{hint}");
    Ok(())
}
