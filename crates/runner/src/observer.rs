//! Headless console rendering of the protocol view.

use pbftviz_reducer::ProtocolState;
use std::io::Write;
use tokio::sync::watch;
use tracing::warn;

/// One-line summary: stage, sequence and commit quorum progress.
pub fn summary(state: &ProtocolState) -> String {
    let stage = state.stage();
    let seq = stage
        .seq
        .map(|s| s.to_string())
        .unwrap_or_else(|| "-".to_string());
    format!(
        "[{}] seq={} commits={}/{} prepares={} n={} f={}",
        stage.label(),
        seq,
        state.commits().len(),
        state.quorum_threshold(),
        state.prepares().len(),
        state.n(),
        state.f(),
    )
}

/// Lines of `current` that were not yet in `previous`.
///
/// Both are trailing windows of the same log, so the new lines are whatever
/// follows the longest suffix of `previous` that starts `current`.
pub fn new_lines<'a>(previous: &[String], current: &'a [String]) -> &'a [String] {
    let max = previous.len().min(current.len());
    let overlap = (0..=max)
        .rev()
        .find(|&k| previous[previous.len() - k..] == current[..k])
        .unwrap_or(0);
    &current[overlap..]
}

/// Print stage changes and new log lines until the state channel closes.
pub async fn observe<W: Write>(mut state: watch::Receiver<ProtocolState>, mut out: W) {
    let mut last_summary = String::new();
    let mut last_log: Vec<String> = Vec::new();

    loop {
        let (summary, log) = {
            let current = state.borrow_and_update();
            (summary(&current), current.event_log().iter().cloned().collect::<Vec<_>>())
        };

        let mut lines: Vec<&str> = Vec::new();
        if summary != last_summary {
            lines.push(&summary);
        }
        for line in new_lines(&last_log, &log) {
            lines.push(line);
        }
        for line in lines {
            if let Err(e) = writeln!(out, "{line}") {
                warn!(error = %e, "Console output failed, observer stopping");
                return;
            }
        }
        let _ = out.flush();

        last_summary = summary;
        last_log = log;

        if state.changed().await.is_err() {
            return;
        }
    }
}
