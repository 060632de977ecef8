use std::sync::Arc;

use anyhow::{Context, Result};
use camino::Utf8PathBuf;
use clap::Parser;
use coldcellar::backend::ObjectStore;
use coldcellar::backend::s3::S3Store;
use coldcellar::{branch, config, pipeline, ui};

#[derive(Debug, Parser)]
#[command(name = "coldcellar", about = "Mirrors filesystem trees into S3 Deep Archive as fixed-size bags")]
struct Args {
    /// Path to coldcellar.toml, overriding the default `~/.config/coldcellar.toml`.
    #[arg(long)]
    config: Option<Utf8PathBuf>,

    /// Path to the declarative tree file listing branches to mirror.
    #[arg(long)]
    tree: Option<Utf8PathBuf>,

    /// Verbosity (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Actually mutate remote state. Without this, every command is a dry run.
    #[arg(long)]
    run: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, clap::Subcommand)]
enum Commands {
    MirrorTree(ui::mirror_tree::MirrorArgs),
    MirrorBranch(ui::mirror_branch::BranchArgs),
    MirrorBag(ui::mirror_bag::BagArgs),
    Delete(ui::delete::DeleteArgs),
    Repack(ui::repack::RepackArgs),
    Audit(ui::audit::AuditArgs),
    Prune(ui::prune::PruneArgs),
    Restore(ui::restore::RestoreArgs),
    Cron(ui::cron::CronArgs),
    Init(ui::init::InitArgs),
}

fn main() {
    let args = Args::parse();
    init_logging(args.verbose);

    if let Err(e) = run(args) {
        eprintln!("{e:?}");
        std::process::exit(1);
    }
}

fn init_logging(verbosity: u8) {
    let level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

#[tokio::main(flavor = "multi_thread")]
async fn run(args: Args) -> Result<()> {
    let config = config::load(args.config.as_ref())?;
    let tree_path = resolve_tree_path(&args)?;
    let run_mutations = args.run;

    // Init and restore-hint never touch the configured bucket or catalog,
    // so they run before a client is built at all.
    match args.command {
        Commands::Init(sub) => return ui::init::run(sub),
        Commands::Restore(sub) => return ui::restore::run(sub),
        _ => {}
    }

    let store: Arc<dyn ObjectStore> = Arc::new(S3Store::connect(config.bucket.clone()).await?);

    // Fail fast, before any branch is touched, if a branch tagged ENCRYPT has
    // no encryption method configured (§4.3). Delete/Audit/Prune don't read
    // the tree file at all, so they skip this check.
    if matches!(
        args.command,
        Commands::MirrorTree(_)
            | Commands::MirrorBranch(_)
            | Commands::MirrorBag(_)
            | Commands::Repack(_)
            | Commands::Cron(_)
    ) {
        let text = std::fs::read_to_string(&tree_path)
            .with_context(|| format!("couldn't read tree file {tree_path}"))?;
        let specs = branch::parse_tree_file(&text)?;
        let any_branch_uses_encrypt = specs.iter().any(|s| s.encrypt);
        pipeline::validate_encryption_config(any_branch_uses_encrypt, &config)?;
    }

    match args.command {
        Commands::MirrorTree(sub) => {
            ui::mirror_tree::run(&config, &tree_path, sub, store, run_mutations).await
        }
        Commands::MirrorBranch(sub) => {
            ui::mirror_branch::run(&config, &tree_path, sub, store, run_mutations).await
        }
        Commands::MirrorBag(sub) => {
            ui::mirror_bag::run(&config, &tree_path, sub, store, run_mutations).await
        }
        Commands::Delete(sub) => ui::delete::run(&config, sub, store, run_mutations).await,
        Commands::Repack(sub) => {
            ui::repack::run(&config, &tree_path, sub, store, run_mutations).await
        }
        Commands::Audit(sub) => ui::audit::run(&config, sub),
        Commands::Prune(sub) => ui::prune::run(&config, sub, store, run_mutations).await,
        Commands::Cron(sub) => ui::cron::run(&config, &tree_path, sub, store, run_mutations).await,
        Commands::Init(_) | Commands::Restore(_) => unreachable!("handled above"),
    }
}

fn resolve_tree_path(args: &Args) -> Result<Utf8PathBuf> {
    if let Some(p) = &args.tree {
        return Ok(p.clone());
    }
    let mut home: Utf8PathBuf = home::home_dir()
        .ok_or_else(|| anyhow::anyhow!("can't find home directory"))?
        .try_into()
        .map_err(|_| anyhow::anyhow!("home directory isn't UTF-8"))?;
    home.extend([".config", "coldcellar-tree.txt"]);
    Ok(home)
}
