//! Diagnostics aggregator (spec §4.10). Subscribes to editor diagnostics
//! updates, diffs each snapshot against the last broadcast one, and throttles
//! emissions without ever dropping a change.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, Mutex};
use tokio::time::Instant;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
    Info,
    Hint,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagnosticEntry {
    pub line: u32,
    pub column: u32,
    pub severity: Severity,
    pub message: String,
    pub source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct WorkspaceSummary {
    pub errors: usize,
    pub warnings: usize,
    #[serde(rename = "filesWithErrors")]
    pub files_with_errors: usize,
    #[serde(rename = "filesWithWarnings")]
    pub files_with_warnings: usize,
}

#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub by_file: HashMap<String, Vec<DiagnosticEntry>>,
}

impl Snapshot {
    pub fn summary(&self) -> WorkspaceSummary {
        let mut summary = WorkspaceSummary::default();
        for entries in self.by_file.values() {
            let mut file_has_error = false;
            let mut file_has_warning = false;
            for e in entries {
                match e.severity {
                    Severity::Error => {
                        summary.errors += 1;
                        file_has_error = true;
                    }
                    Severity::Warning => {
                        summary.warnings += 1;
                        file_has_warning = true;
                    }
                    _ => {}
                }
            }
            if file_has_error {
                summary.files_with_errors += 1;
            }
            if file_has_warning {
                summary.files_with_warnings += 1;
            }
        }
        summary
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DiagnosticsDiff {
    pub file: String,
    pub added: Vec<DiagnosticEntry>,
    pub removed: Vec<DiagnosticEntry>,
    pub changed: Vec<DiagnosticEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DiagnosticsUpdate {
    pub diffs: Vec<DiagnosticsDiff>,
    pub summary: WorkspaceSummary,
}

/// Content-sensitive diff between two per-file diagnostic sets: entries are
/// matched on `(line, column, source, code)`; a match whose message or
/// severity differs is `changed` rather than an add/remove pair.
fn diff_file(previous: &[DiagnosticEntry], current: &[DiagnosticEntry]) -> Option<DiagnosticsDiff> {
    let key = |e: &DiagnosticEntry| (e.line, e.column, e.source.clone(), e.code.clone());

    let prev_by_key: HashMap<_, _> = previous.iter().map(|e| (key(e), e)).collect();
    let curr_by_key: HashMap<_, _> = current.iter().map(|e| (key(e), e)).collect();

    let mut added = Vec::new();
    let mut removed = Vec::new();
    let mut changed = Vec::new();

    for (k, entry) in &curr_by_key {
        match prev_by_key.get(k) {
            None => added.push((*entry).clone()),
            Some(prev_entry) => {
                if prev_entry.message != entry.message || prev_entry.severity != entry.severity {
                    changed.push((*entry).clone());
                }
            }
        }
    }
    for (k, entry) in &prev_by_key {
        if !curr_by_key.contains_key(k) {
            removed.push((*entry).clone());
        }
    }

    if added.is_empty() && removed.is_empty() && changed.is_empty() {
        None
    } else {
        Some(DiagnosticsDiff {
            file: String::new(),
            added,
            removed,
            changed,
        })
    }
}

pub struct ThrottleConfig {
    pub min_interval: Duration,
    pub batch_window: Duration,
    pub max_batch: usize,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            min_interval: Duration::from_secs(2),
            batch_window: Duration::from_millis(500),
            max_batch: 10,
        }
    }
}

/// Aggregates raw per-file diagnostic pushes into throttled
/// [`DiagnosticsUpdate`] emissions. The aggregator never drops a change: it
/// only delays and merges them into the next batch.
pub struct DiagnosticsAggregator {
    config: ThrottleConfig,
    state: Mutex<AggregatorState>,
}

struct AggregatorState {
    snapshot: Snapshot,
    pending: Vec<DiagnosticsDiff>,
    last_emit: Option<Instant>,
}

impl DiagnosticsAggregator {
    pub fn new(config: ThrottleConfig) -> Self {
        Self {
            config,
            state: Mutex::new(AggregatorState {
                snapshot: Snapshot::default(),
                pending: Vec::new(),
                last_emit: None,
            }),
        }
    }

    pub async fn get_all(&self) -> Snapshot {
        self.state.lock().await.snapshot.clone()
    }

    pub async fn get_file(&self, file: &str) -> Vec<DiagnosticEntry> {
        self.state
            .lock()
            .await
            .snapshot
            .by_file
            .get(file)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn get_summary(&self) -> WorkspaceSummary {
        self.state.lock().await.snapshot.summary()
    }

    /// Apply a fresh diagnostics snapshot for one file, updating the stored
    /// snapshot immediately and queuing the diff for a throttled emission.
    /// Returns `Some` when the batch should be emitted now.
    pub async fn apply_file_update(
        &self,
        file: String,
        entries: Vec<DiagnosticEntry>,
    ) -> Option<DiagnosticsUpdate> {
        let mut state = self.state.lock().await;

        let previous = state.snapshot.by_file.get(&file).cloned().unwrap_or_default();
        if let Some(mut diff) = diff_file(&previous, &entries) {
            diff.file = file.clone();
            state.pending.push(diff);
        }
        state.snapshot.by_file.insert(file, entries);

        let should_emit_now = state.pending.len() >= self.config.max_batch
            || state
                .last_emit
                .map(|t| t.elapsed() >= self.config.min_interval)
                .unwrap_or(true);

        if should_emit_now && !state.pending.is_empty() {
            let diffs = std::mem::take(&mut state.pending);
            state.last_emit = Some(Instant::now());
            let summary = state.snapshot.summary();
            Some(DiagnosticsUpdate { diffs, summary })
        } else {
            None
        }
    }

    /// Drain any pending diffs after `batch_window` has elapsed, even if
    /// `min_interval` hasn't. Intended to be driven by a periodic tick.
    pub async fn flush_if_batch_window_elapsed(&self, since: Instant) -> Option<DiagnosticsUpdate> {
        let mut state = self.state.lock().await;
        if state.pending.is_empty() || since.elapsed() < self.config.batch_window {
            return None;
        }
        let diffs = std::mem::take(&mut state.pending);
        state.last_emit = Some(Instant::now());
        let summary = state.snapshot.summary();
        Some(DiagnosticsUpdate { diffs, summary })
    }
}

/// Drive the aggregator's batch-window flush on a fixed tick, forwarding
/// emitted updates to `out`.
pub fn spawn_batch_flusher(
    aggregator: std::sync::Arc<DiagnosticsAggregator>,
    batch_window: Duration,
    out: mpsc::Sender<DiagnosticsUpdate>,
) {
    tokio::spawn(async move {
        let mut since = Instant::now();
        let mut ticker = tokio::time::interval(batch_window);
        loop {
            ticker.tick().await;
            if let Some(update) = aggregator.flush_if_batch_window_elapsed(since).await {
                since = Instant::now();
                if out.send(update).await.is_err() {
                    break;
                }
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(line: u32, severity: Severity, message: &str) -> DiagnosticEntry {
        DiagnosticEntry {
            line,
            column: 1,
            severity,
            message: message.to_string(),
            source: "rustc".to_string(),
            code: None,
        }
    }

    #[tokio::test]
    async fn first_update_emits_only_added() {
        let aggregator = DiagnosticsAggregator::new(ThrottleConfig {
            min_interval: Duration::ZERO,
            ..Default::default()
        });
        let update = aggregator
            .apply_file_update("a.rs".to_string(), vec![entry(1, Severity::Error, "oops")])
            .await
            .unwrap();
        assert_eq!(update.diffs.len(), 1);
        assert_eq!(update.diffs[0].added.len(), 1);
        assert!(update.diffs[0].removed.is_empty());
    }

    #[tokio::test]
    async fn removed_entry_is_diffed() {
        let aggregator = DiagnosticsAggregator::new(ThrottleConfig {
            min_interval: Duration::ZERO,
            ..Default::default()
        });
        aggregator
            .apply_file_update("a.rs".to_string(), vec![entry(1, Severity::Error, "oops")])
            .await;
        let update = aggregator.apply_file_update("a.rs".to_string(), vec![]).await.unwrap();
        assert_eq!(update.diffs[0].removed.len(), 1);
    }

    #[tokio::test]
    async fn max_batch_forces_emission() {
        let aggregator = DiagnosticsAggregator::new(ThrottleConfig {
            min_interval: Duration::from_secs(600),
            batch_window: Duration::from_secs(600),
            max_batch: 2,
        });
        let first = aggregator
            .apply_file_update("a.rs".to_string(), vec![entry(1, Severity::Error, "a")])
            .await;
        assert!(first.is_some(), "first emission always goes through (no last_emit yet)");

        let second = aggregator
            .apply_file_update("b.rs".to_string(), vec![entry(1, Severity::Error, "b")])
            .await;
        assert!(second.is_none(), "within min_interval, should be held");
    }

    #[tokio::test]
    async fn summary_counts_errors_and_warnings() {
        let mut snapshot = Snapshot::default();
        snapshot.by_file.insert(
            "a.rs".to_string(),
            vec![entry(1, Severity::Error, "e"), entry(2, Severity::Warning, "w")],
        );
        let summary = snapshot.summary();
        assert_eq!(summary.errors, 1);
        assert_eq!(summary.warnings, 1);
        assert_eq!(summary.files_with_errors, 1);
    }
}
