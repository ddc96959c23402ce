//! Sync progress reporting.
//!
//! Progress is published on a `watch` channel, so observers always see the
//! latest snapshot and publishing never waits on them.

use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::info;

/// Default interval between progress log lines.
pub const DEFAULT_PROGRESS_INTERVAL: Duration = Duration::from_secs(10);

/// Stage of a sync run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncPhase {
    #[default]
    Pending,
    DetectingVendor,
    ReadingUsers,
    ReadingGroups,
    Resolving,
    Completed,
    Failed,
}

impl std::fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SyncPhase::Pending => "pending",
            SyncPhase::DetectingVendor => "detecting_vendor",
            SyncPhase::ReadingUsers => "reading_users",
            SyncPhase::ReadingGroups => "reading_groups",
            SyncPhase::Resolving => "resolving",
            SyncPhase::Completed => "completed",
            SyncPhase::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Snapshot of a running sync.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncProgress {
    pub phase: SyncPhase,
    /// Pages received so far.
    pub pages: usize,
    /// Records received so far.
    pub records: usize,
    pub users: usize,
    pub groups: usize,
    /// Records the transformer chose to drop.
    pub skipped: usize,
}

/// Publishes progress for one run and logs it at a fixed interval.
pub struct ProgressReporter {
    sender: Arc<watch::Sender<SyncProgress>>,
    interval: Duration,
    last_logged: Instant,
}

impl ProgressReporter {
    /// Start a run, resetting the published snapshot.
    pub fn start(sender: Arc<watch::Sender<SyncProgress>>, interval: Duration) -> Self {
        sender.send_replace(SyncProgress::default());
        Self {
            sender,
            interval,
            last_logged: Instant::now(),
        }
    }

    pub fn set_phase(&mut self, phase: SyncPhase) {
        self.sender.send_modify(|progress| progress.phase = phase);
    }

    pub fn update(&mut self, modify: impl FnOnce(&mut SyncProgress)) {
        self.sender.send_modify(modify);

        if self.last_logged.elapsed() >= self.interval {
            self.last_logged = Instant::now();
            let progress = *self.sender.borrow();
            info!(
                phase = %progress.phase,
                pages = progress.pages,
                records = progress.records,
                users = progress.users,
                groups = progress.groups,
                skipped = progress.skipped,
                "Sync progress"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reporter_publishes_updates() {
        let (sender, receiver) = watch::channel(SyncProgress {
            records: 99,
            ..Default::default()
        });

        let mut reporter = ProgressReporter::start(Arc::new(sender), Duration::from_secs(3600));
        assert_eq!(receiver.borrow().records, 0);

        reporter.set_phase(SyncPhase::ReadingUsers);
        reporter.update(|p| {
            p.pages += 1;
            p.records += 3;
            p.users += 2;
            p.skipped += 1;
        });

        let progress = *receiver.borrow();
        assert_eq!(progress.phase, SyncPhase::ReadingUsers);
        assert_eq!(progress.records, 3);
        assert_eq!(progress.users, 2);
    }

    #[test]
    fn test_reporter_works_without_receivers() {
        let (sender, receiver) = watch::channel(SyncProgress::default());
        drop(receiver);
        let sender = Arc::new(sender);

        let mut reporter = ProgressReporter::start(Arc::clone(&sender), Duration::ZERO);
        reporter.update(|p| p.groups += 1);
        assert_eq!(sender.borrow().groups, 1);
    }
}
