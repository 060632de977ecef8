//! C9: the progress monitor. SPEC_FULL.md §9 calls for a rewrite away from
//! the teacher's shared-`AtomicU64`-plus-polling-closure model (built for a
//! single in-process worker pool counting bytes packed/uploaded) to a
//! producer/consumer channel: each upload task emits `ProgressEvent`s, and a
//! single rendering task drains them and draws the terminal line. That fits
//! better here because uploads are spawned `tokio` tasks that can be running
//! concurrently (the Stager's rsync progress, the Uploader's transfer
//! progress) rather than a tight loop sharing one counter.
//!
//! The render loop's shape — fixed-rate redraw, one last draw after the
//! channel closes — is carried over from the teacher's `ProgressTask`/
//! `periodically` idiom; only the data source changes.

use std::time::Duration;

use camino::Utf8Path;
use console::Term;
use tokio::sync::mpsc;
use unicode_segmentation::UnicodeSegmentation;

fn nice_size(bytes: u64) -> String {
    byte_unit::Byte::from_u64(bytes)
        .get_appropriate_unit(byte_unit::UnitType::Binary)
        .to_string()
}

#[derive(Debug, Clone)]
pub enum ProgressEvent {
    LeafStarted { leaf_key: String },
    LeafBytesTransferred { leaf_key: String, bytes: u64 },
    LeafFinished { leaf_key: String },
    BagUploaded { bag_id: String, bytes: u64 },
}

pub type ProgressSender = mpsc::UnboundedSender<ProgressEvent>;

pub fn channel() -> (ProgressSender, mpsc::UnboundedReceiver<ProgressEvent>) {
    mpsc::unbounded_channel()
}

#[derive(Default)]
pub struct RunTotals {
    pub leaves_finished: u64,
    pub bags_uploaded: u64,
    pub bytes_transferred: u64,
}

pub fn spinner(i: usize) -> char {
    match i % 4 {
        0 => '|',
        1 => '/',
        2 => '-',
        _ => '\\',
    }
}

/// Drains `events` until the sender side is dropped, redrawing a single
/// status line at a fixed rate. Returns the final totals, mostly for tests
/// — the CLI layer relies on `report.rs` for the end-of-run summary.
pub async fn render_until_closed(
    mut events: mpsc::UnboundedReceiver<ProgressEvent>,
    term: &Term,
    quiet: bool,
) -> RunTotals {
    let mut totals = RunTotals::default();
    let mut current_leaf: Option<String> = None;
    let mut tick = 0usize;
    let mut redraw = tokio::time::interval(Duration::from_millis(100));

    loop {
        tokio::select! {
            maybe_event = events.recv() => {
                match maybe_event {
                    Some(ProgressEvent::LeafStarted { leaf_key }) => {
                        current_leaf = Some(leaf_key);
                    }
                    Some(ProgressEvent::LeafBytesTransferred { bytes, .. }) => {
                        totals.bytes_transferred += bytes;
                    }
                    Some(ProgressEvent::LeafFinished { .. }) => {
                        totals.leaves_finished += 1;
                        current_leaf = None;
                    }
                    Some(ProgressEvent::BagUploaded { bytes, .. }) => {
                        totals.bags_uploaded += 1;
                        totals.bytes_transferred += bytes;
                    }
                    None => break,
                }
            }
            _ = redraw.tick() => {
                tick += 1;
                draw_line(term, quiet, tick, &current_leaf, &totals);
            }
        }
    }

    draw_line(term, quiet, tick, &current_leaf, &totals);
    totals
}

fn draw_line(term: &Term, quiet: bool, tick: usize, current_leaf: &Option<String>, totals: &RunTotals) {
    if quiet {
        return;
    }
    let leaf_display = current_leaf.as_deref().unwrap_or("(idle)");
    let truncated = truncate_str(leaf_display, term);
    let line = format!(
        "{} leaves {} bags {} transferred  {}",
        spinner(tick),
        totals.leaves_finished,
        totals.bags_uploaded,
        nice_size(totals.bytes_transferred),
    );
    let _ = term.clear_line();
    let _ = term.write_str(&format!("{line}  {truncated}"));
}

fn truncate_str(s: &str, term: &Term) -> String {
    let w = term.size().1 as usize;
    if w <= 3 {
        return ".".repeat(w);
    }
    let syms: Vec<_> = s.graphemes(true).collect();
    if syms.len() > w {
        format!("...{}", syms[syms.len() - w + 3..].concat())
    } else {
        s.to_string()
    }
}

/// A minimal non-interactive report line, used by dry-run/scripted output
/// where a redrawing spinner would just add noise to captured logs.
pub fn plain_line_for(leaf_path: &Utf8Path, bytes: u64, action: &str) -> String {
    format!("{action} {leaf_path} ({})", nice_size(bytes))
}

#[cfg(test)]
mod test {
    use super::*;

    #[tokio::test]
    async fn render_until_closed_tallies_events_then_returns() {
        let (tx, rx) = channel();
        tx.send(ProgressEvent::LeafStarted {
            leaf_key: "a".to_string(),
        })
        .unwrap();
        tx.send(ProgressEvent::LeafBytesTransferred {
            leaf_key: "a".to_string(),
            bytes: 100,
        })
        .unwrap();
        tx.send(ProgressEvent::LeafFinished {
            leaf_key: "a".to_string(),
        })
        .unwrap();
        tx.send(ProgressEvent::BagUploaded {
            bag_id: "bag_00001".to_string(),
            bytes: 50,
        })
        .unwrap();
        drop(tx);

        let term = Term::buffered_stdout();
        let totals = render_until_closed(rx, &term, true).await;
        assert_eq!(totals.leaves_finished, 1);
        assert_eq!(totals.bags_uploaded, 1);
        assert_eq!(totals.bytes_transferred, 150);
    }

    #[test]
    fn plain_line_mentions_action_and_size() {
        let line = plain_line_for(Utf8Path::new("/data/alpha/a"), 1024, "uploaded");
        assert!(line.contains("uploaded"));
        assert!(line.contains("/data/alpha/a"));
    }
}
