//! Engine-wide configuration, loaded once at startup and threaded explicitly
//! through the call graph (SPEC_FULL.md §9: no process-wide singletons).

use std::{fs, io};

use anyhow::{Context, Result, anyhow};
use byte_unit::Byte;
use camino::Utf8PathBuf;
use serde_derive::Deserialize;

fn default_bag_size() -> Byte {
    Byte::from_u64(40 * 1024 * 1024 * 1024) // 40 GiB
}

fn default_scan_interval_days() -> i64 {
    190
}

#[derive(Debug, Clone, Deserialize)]
pub enum EncryptionMethod {
    #[serde(rename = "password")]
    Password { passphrase_file: Utf8PathBuf },
    #[serde(rename = "key")]
    Key { recipient: String },
}

#[derive(Debug, Clone, Deserialize)]
pub struct PricingConfig {
    pub price_per_gb_month: f64,
    #[serde(default = "default_min_retention_days")]
    pub minimum_retention_days: i64,
    #[serde(default)]
    pub put_price: f64,
    #[serde(default)]
    pub egress_price_per_gb: f64,
    #[serde(default)]
    pub retrieval_price_per_gb: f64,
}

fn default_min_retention_days() -> i64 {
    180
}

#[derive(Debug, Clone, Deserialize)]
pub struct Configuration {
    pub staging_dir: Utf8PathBuf,
    pub manifest_dir: Utf8PathBuf,
    pub catalog_file: Utf8PathBuf,
    pub mount_base: Utf8PathBuf,
    pub bucket: String,

    #[serde(default = "default_bag_size")]
    pub target_bag_size: Byte,

    #[serde(default = "default_scan_interval_days")]
    pub scan_interval_days: i64,

    pub pricing: Option<PricingConfig>,
    pub encryption: Option<EncryptionMethod>,

    pub catalog_backup_dir: Option<Utf8PathBuf>,
    pub audit_log: Option<Utf8PathBuf>,

    /// See SPEC_FULL.md §4.5: relax a head-object verification failure from
    /// fatal to a logged warning. Off by default.
    #[serde(default)]
    pub allow_unverified_upload: bool,

    /// Upload bandwidth cap, in bytes/sec. None means unbounded.
    pub bandwidth_cap: Option<Byte>,

    #[serde(default = "default_upload_concurrency")]
    pub upload_concurrency: usize,
}

fn default_upload_concurrency() -> usize {
    10
}

/// Load `~/.config/coldcellar.toml`, falling back to the default config file
/// location override. A missing file is *not* tolerated the way the teacher's
/// cache-size-only config is: every required key here (staging dir, bucket, ...)
/// has no sane default, so a missing config is a startup-fatal Configuration
/// error (§7 kind 1), not a silent default.
pub fn load(override_path: Option<&Utf8PathBuf>) -> Result<Configuration> {
    let confpath: Utf8PathBuf = match override_path {
        Some(p) => p.clone(),
        None => {
            let mut home: Utf8PathBuf = home::home_dir()
                .ok_or_else(|| anyhow!("Can't find home directory"))?
                .try_into()
                .context("Home directory isn't UTF-8")?;
            home.extend([".config", "coldcellar.toml"]);
            home
        }
    };

    let s = match fs::read_to_string(&confpath) {
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            anyhow::bail!("No configuration file found at {confpath}");
        }
        found => found,
    }
    .with_context(|| format!("Couldn't open {confpath}"))?;

    let conf: Configuration =
        toml::from_str(&s).with_context(|| format!("Couldn't parse {confpath}"))?;

    if let Some(EncryptionMethod::Password { passphrase_file }) = &conf.encryption {
        anyhow::ensure!(
            passphrase_file.exists(),
            "encryption is configured but passphrase file {passphrase_file} doesn't exist"
        );
    }

    Ok(conf)
}
