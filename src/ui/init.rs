//! `coldcellar init`: writes a starter configuration and empty tree file,
//! so a first run has somewhere to edit from instead of hand-authoring
//! `coldcellar.toml` from the documentation.

use anyhow::{Context, Result};
use camino::Utf8PathBuf;
use clap::Args;

const TEMPLATE_CONFIG: &str = r#"# staging_dir holds work-in-progress bag assembly and pipeline artifacts.
staging_dir = "/var/lib/coldcellar/staging"
manifest_dir = "/var/lib/coldcellar/manifests"
catalog_file = "/var/lib/coldcellar/catalog.json"
mount_base = "/var/lib/coldcellar/mounts"
bucket = "my-deep-archive-bucket"

# target_bag_size = "40 GiB"
# scan_interval_days = 190
# upload_concurrency = 10
# allow_unverified_upload = false

# [encryption]
# type = "password"
# passphrase_file = "/etc/coldcellar/passphrase"

# [pricing]
# price_per_gb_month = 0.00099
# minimum_retention_days = 180
"#;

const TEMPLATE_TREE: &str = r#"# One branch root per line: <path> [ :: <TAG> ]*
# Tags: MUTABLE, IMMUTABLE, COMPRESS, ENCRYPT, LOCKED, EXCLUDE <name>
#
# /data/photos :: IMMUTABLE :: COMPRESS
# /data/projects :: MUTABLE :: EXCLUDE .cache :: EXCLUDE node_modules
"#;

#[derive(Debug, Args)]
pub struct InitArgs {
    /// Where to write `coldcellar.toml`; defaults to `~/.config/coldcellar.toml`.
    #[arg(long)]
    pub config_path: Option<Utf8PathBuf>,
    /// Where to write the starter tree file, alongside the config by default.
    #[arg(long)]
    pub tree_path: Option<Utf8PathBuf>,
}

pub fn run(args: InitArgs) -> Result<()> {
    let config_path = match args.config_path {
        Some(p) => p,
        None => default_config_dir()?.join("coldcellar.toml"),
    };
    let tree_path = match args.tree_path {
        Some(p) => p,
        None => default_config_dir()?.join("coldcellar-tree.txt"),
    };

    write_if_absent(&config_path, TEMPLATE_CONFIG)?;
    write_if_absent(&tree_path, TEMPLATE_TREE)?;

    println!("wrote {config_path}");
    println!("wrote {tree_path}");
    println!("edit both, then run `coldcellar --run mirror-tree`");
    Ok(())
}

fn default_config_dir() -> Result<Utf8PathBuf> {
    let home: Utf8PathBuf = home::home_dir()
        .context("can't find home directory")?
        .try_into()
        .map_err(|_| anyhow::anyhow!("home directory isn't UTF-8"))?;
    Ok(home.join(".config"))
}

fn write_if_absent(path: &Utf8PathBuf, contents: &str) -> Result<()> {
    if path.exists() {
        anyhow::bail!("{path} already exists; remove it first if you want a fresh template");
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).with_context(|| format!("couldn't create {parent}"))?;
    }
    std::fs::write(path, contents).with_context(|| format!("couldn't write {path}"))
}
