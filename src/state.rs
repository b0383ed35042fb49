use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde_json::Value;

use crate::config::Config;
use crate::models::{LogEntry, ProgressSnapshot, Severity};
use crate::queue::PendingQueue;

/// Fixed-capacity ring of recent log entries; the oldest entry is dropped first.
#[derive(Debug)]
pub struct LogBuffer {
    capacity: usize,
    entries: Mutex<VecDeque<LogEntry>>,
}

impl LogBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    pub fn push(&self, entry: LogEntry) {
        let mut entries = lock(&self.entries);
        if entries.len() == self.capacity {
            entries.pop_front();
        }
        entries.push_back(entry);
    }

    /// The last `n` entries, oldest first.
    pub fn recent(&self, n: usize) -> Vec<LogEntry> {
        let entries = lock(&self.entries);
        let skip = entries.len().saturating_sub(n);
        entries.iter().skip(skip).cloned().collect()
    }

    pub fn clear(&self) {
        lock(&self.entries).clear();
    }

    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Progress of the batches currently being transferred.
///
/// Each batch gets its own id from [`UploadProgress::begin`], so two
/// requesters confirming at once do not overwrite each other. While nothing
/// runs, the snapshot of the last finished batch is reported.
#[derive(Debug, Default)]
pub struct UploadProgress {
    next_id: AtomicU64,
    running: DashMap<u64, ProgressSnapshot>,
    last: Mutex<ProgressSnapshot>,
}

impl UploadProgress {
    pub fn begin(&self, total: usize) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.running.insert(
            id,
            ProgressSnapshot {
                active: true,
                total,
                completed: 0,
                current: None,
            },
        );
        id
    }

    pub fn start_item(&self, batch: u64, name: &str) {
        if let Some(mut snapshot) = self.running.get_mut(&batch) {
            snapshot.current = Some(name.to_string());
        }
    }

    pub fn finish_item(&self, batch: u64) {
        if let Some(mut snapshot) = self.running.get_mut(&batch) {
            snapshot.completed += 1;
            snapshot.current = None;
        }
    }

    pub fn end(&self, batch: u64) {
        let Some(mut finished) = self.running.get(&batch).map(|s| s.clone()) else {
            return;
        };
        finished.active = false;
        finished.current = None;
        *lock(&self.last) = finished;
        self.running.remove(&batch);
    }

    /// Sums the running batches, or the last finished one when idle.
    pub fn snapshot(&self) -> ProgressSnapshot {
        if self.running.is_empty() {
            return lock(&self.last).clone();
        }

        let mut total = 0;
        let mut completed = 0;
        let mut current = Vec::new();
        for entry in self.running.iter() {
            total += entry.total;
            completed += entry.completed;
            current.extend(entry.current.clone());
        }
        current.sort();

        ProgressSnapshot {
            active: true,
            total,
            completed,
            current: (!current.is_empty()).then(|| current.join(", ")),
        }
    }
}

/// Process-wide state shared by the webhook and the dashboard routes.
///
/// Everything here lives in memory. On a host that starts a fresh process
/// per request, pending batches and logs do not survive between requests.
#[derive(Debug)]
pub struct AppState {
    pub config: Config,
    pub queue: PendingQueue,
    pub logs: LogBuffer,
    pub progress: UploadProgress,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(config: Config) -> Arc<Self> {
        let logs = LogBuffer::new(config.log_capacity);
        Arc::new(Self {
            config,
            queue: PendingQueue::new(),
            logs,
            progress: UploadProgress::default(),
            started_at: Utc::now(),
        })
    }

    /// Writes to the terminal log and keeps a copy for `/logs`.
    pub fn record(&self, severity: Severity, message: impl Into<String>, raw: Option<Value>) {
        let message = message.into();
        log::log!(log::Level::from(severity), "{}", message);
        self.logs.push(LogEntry::new(severity, message, raw));
    }

    pub fn info(&self, message: impl Into<String>) {
        self.record(Severity::Info, message, None);
    }

    pub fn warn(&self, message: impl Into<String>) {
        self.record(Severity::Warn, message, None);
    }
}

// A panic while holding one of these locks leaves plain data behind, so a
// poisoned lock is still safe to reuse.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ring_drops_oldest_entries() {
        let logs = LogBuffer::new(3);
        for i in 0..5 {
            logs.push(LogEntry::new(Severity::Info, format!("m{i}"), None));
        }
        let messages: Vec<_> = logs.recent(10).into_iter().map(|e| e.message).collect();
        assert_eq!(messages, vec!["m2", "m3", "m4"]);

        let tail: Vec<_> = logs.recent(2).into_iter().map(|e| e.message).collect();
        assert_eq!(tail, vec!["m3", "m4"]);

        logs.clear();
        assert!(logs.is_empty());
    }

    #[test]
    fn progress_tracks_items() {
        let progress = UploadProgress::default();
        let batch = progress.begin(2);
        progress.start_item(batch, "a.mp4");
        assert_eq!(
            progress.snapshot(),
            ProgressSnapshot {
                active: true,
                total: 2,
                completed: 0,
                current: Some("a.mp4".into()),
            }
        );
        progress.finish_item(batch);
        progress.end(batch);
        let snapshot = progress.snapshot();
        assert!(!snapshot.active);
        assert_eq!(snapshot.completed, 1);
        assert_eq!(snapshot.current, None);
    }

    #[test]
    fn overlapping_batches_keep_their_own_counts() {
        let progress = UploadProgress::default();
        let first = progress.begin(3);
        let second = progress.begin(2);
        assert_ne!(first, second);

        progress.start_item(first, "b.mp4");
        progress.start_item(second, "a.mkv");
        progress.finish_item(second);
        assert_eq!(
            progress.snapshot(),
            ProgressSnapshot {
                active: true,
                total: 5,
                completed: 1,
                current: Some("b.mp4".into()),
            }
        );

        // The second batch ending must not hide the one still running.
        progress.end(second);
        let snapshot = progress.snapshot();
        assert!(snapshot.active);
        assert_eq!(snapshot.total, 3);
        assert_eq!(snapshot.current.as_deref(), Some("b.mp4"));

        progress.finish_item(first);
        progress.end(first);
        assert_eq!(
            progress.snapshot(),
            ProgressSnapshot {
                active: false,
                total: 3,
                completed: 1,
                current: None,
            }
        );
    }

    #[test]
    fn unknown_batch_ids_are_ignored() {
        let progress = UploadProgress::default();
        progress.start_item(7, "x.mp4");
        progress.finish_item(7);
        progress.end(7);
        assert_eq!(progress.snapshot(), ProgressSnapshot::default());
    }
}
