//! Newline-delimited JSON audit log (§4.6's ambient audit trail). Every
//! committed state change — bag upload, branch delete, repack, prune — gets
//! one line here, best-effort: a failed audit write is logged and swallowed,
//! never allowed to abort a run that otherwise succeeded.
//!
//! Grounded on the teacher's own `tracing`-based structured logging
//! convention (fields, not formatted strings) combined with `serde_json`
//! lines, the common "event sourcing to a flat file" idiom seen across the
//! pack's manifest-style outputs.

use camino::Utf8Path;
use jiff::Timestamp;
use serde_derive::Serialize;
use std::io::Write;

#[derive(Debug, Serialize)]
#[serde(tag = "event")]
pub enum AuditEvent<'a> {
    BagUploaded {
        branch: &'a str,
        bag_id: String,
        object_key: &'a str,
        verifier: &'a str,
    },
    BranchDeleted {
        branch: &'a str,
        leaf_count: usize,
    },
    Repacked {
        branch: &'a str,
        bags_before: usize,
        bags_after: usize,
    },
    OrphansPruned {
        keys: Vec<String>,
    },
    PolicyDenied {
        branch: &'a str,
        action: &'a str,
        reason: &'a str,
    },
}

#[derive(Serialize)]
struct Record<'a> {
    timestamp: Timestamp,
    #[serde(flatten)]
    event: &'a AuditEvent<'a>,
}

/// Appends one line to the configured audit log, if any. A missing
/// `audit_log` path in the configuration means auditing is simply off — not
/// an error.
pub fn record(audit_log: Option<&Utf8Path>, event: &AuditEvent) {
    let Some(path) = audit_log else { return };

    let record = Record {
        timestamp: Timestamp::now(),
        event,
    };

    let line = match serde_json::to_string(&record) {
        Ok(l) => l,
        Err(e) => {
            tracing::warn!("couldn't serialize audit record: {e}");
            return;
        }
    };

    let result = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .and_then(|mut f| writeln!(f, "{line}"));

    if let Err(e) = result {
        tracing::warn!("couldn't append to audit log {path}: {e}");
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn record_appends_one_json_line_per_event() {
        let dir = tempfile::tempdir().unwrap();
        let path = camino::Utf8Path::from_path(dir.path()).unwrap().join("audit.jsonl");

        record(
            Some(&path),
            &AuditEvent::BagUploaded {
                branch: "/data/alpha",
                bag_id: "bag_00001".to_string(),
                object_key: "2026-backup/host_alpha_bag_00001.tar",
                verifier: "\"abc123\"",
            },
        );
        record(
            Some(&path),
            &AuditEvent::BranchDeleted {
                branch: "/data/beta",
                leaf_count: 4,
            },
        );

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("BagUploaded"));
        assert!(lines[1].contains("BranchDeleted"));
    }

    #[test]
    fn no_configured_path_is_a_silent_no_op() {
        record(
            None,
            &AuditEvent::PolicyDenied {
                branch: "/data/x",
                action: "delete",
                reason: "branch is LOCKED",
            },
        );
    }
}
