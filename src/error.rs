//! The handful of error kinds the engine needs to match on (§7 of the design doc).
//!
//! Everything else just flows through as `anyhow::Error` with `.context(...)`
//! attached at each hop, the way the rest of this crate does it.

use camino::Utf8PathBuf;
use thiserror::Error;

/// A branch-scoped or run-scoped failure the scheduler needs to distinguish
/// from a generic I/O error, so it knows whether to skip-and-continue or abort.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("branch {branch} is LOCKED: {reason}")]
    PolicyDenied { branch: String, reason: String },

    #[error("couldn't scan branch {branch}: {source}")]
    Scan {
        branch: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("remote stage failed for branch {branch}, leaf {leaf}: {source}")]
    RemoteStage {
        branch: String,
        leaf: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("pipeline step failed for leaf {leaf}: {source}")]
    Pipeline {
        leaf: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("upload of {object_key} failed: {source}")]
    Upload {
        object_key: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("catalog at {path} is malformed, refusing to overwrite: {source}")]
    CatalogParse {
        path: Utf8PathBuf,
        #[source]
        source: anyhow::Error,
    },
}

impl EngineError {
    /// Per §7's propagation policy: does this kind abort the whole run,
    /// or just the branch that raised it?
    pub fn aborts_run(&self) -> bool {
        !matches!(
            self,
            EngineError::PolicyDenied { .. } | EngineError::Scan { .. }
        )
    }
}
