//! The restore pipeline is out of scope (§1's explicit Non-goal): this
//! crate only produces archives a human or a separate tool can restore from
//! using `aws s3 cp`/`tar`/`gpg` directly. This module exists purely to
//! document the contract those external tools rely on, so the naming and
//! layout decisions elsewhere in the crate (§4.3's `.tar.gz`/`.gpg` naming,
//! §4.6's per-bag manifest) don't drift without a single place recording why
//! they look the way they do.

/// Describes, for one committed leaf, exactly what a human would need to
/// run by hand to recover it — no restore logic is implemented, this is
/// purely informational (e.g. for `coldcellar audit` or support tooling
/// that wants to print recovery instructions).
pub fn recovery_hint(object_key: &str, inner_name: &str, compressed: bool, encrypted: bool) -> String {
    let local_name = object_key.rsplit('/').next().unwrap_or(object_key);
    let mut steps = vec![format!("aws s3 cp s3://<bucket>/{object_key} ./{local_name}")];
    let mut current = inner_name.to_string();
    if encrypted {
        steps.push(format!("gpg --decrypt {current} > {stripped}", stripped = strip_suffix(&current, ".gpg")));
        current = strip_suffix(&current, ".gpg");
    }
    if compressed {
        steps.push(format!("tar -xzf {current}"));
    } else if !encrypted {
        steps.push(format!("tar -xf {current}"));
    }
    steps.join(" && ")
}

fn strip_suffix(s: &str, suffix: &str) -> String {
    s.strip_suffix(suffix).unwrap_or(s).to_string()
}
