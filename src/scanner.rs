//! Periodic notification scanning.
//!
//! A long-lived tokio task that ticks on a fixed interval, evaluates every
//! rule through [`Tracker::scan`], purges read notices past retention, and
//! broadcasts newly created notifications to subscribers.

use std::time::Duration;

use chrono::Utc;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::models::Notification;
use crate::tracker::Tracker;

const CHANNEL_CAPACITY: usize = 256;

/// Handle to a running scanner.
pub struct ScannerHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<u64>,
}

impl ScannerHandle {
    /// Stop the loop and wait for it. Returns the number of completed scans.
    pub async fn shutdown(self) -> u64 {
        let _ = self.shutdown.send(true);
        match self.task.await {
            Ok(scans) => scans,
            Err(e) => {
                tracing::warn!(error = %e, "Scanner task ended abnormally");
                0
            }
        }
    }
}

/// Spawn a scanner using the tracker's configured interval.
pub fn spawn(tracker: Tracker) -> (ScannerHandle, broadcast::Receiver<Notification>) {
    let period = tracker.settings().scan_interval();
    spawn_with_period(tracker, period)
}

/// Spawn a scanner with an explicit period. The first scan runs immediately.
///
/// The returned receiver exists before the task starts, so it sees the
/// notices of that first scan.
pub fn spawn_with_period(
    tracker: Tracker,
    period: Duration,
) -> (ScannerHandle, broadcast::Receiver<Notification>) {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (notices_tx, notices_rx) = broadcast::channel(CHANNEL_CAPACITY);

    let task = tokio::spawn(run(tracker, period, notices_tx, shutdown_rx));

    let handle = ScannerHandle {
        shutdown: shutdown_tx,
        task,
    };
    (handle, notices_rx)
}

async fn run(
    tracker: Tracker,
    period: Duration,
    notices: broadcast::Sender<Notification>,
    mut shutdown: watch::Receiver<bool>,
) -> u64 {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut scans = 0u64;

    tracing::info!(period_secs = period.as_secs(), "Notification scanner started");

    loop {
        tokio::select! {
            _ = interval.tick() => {
                let now = Utc::now();
                let report = tracker.scan(now.date_naive());
                let purged = tracker.purge(now);
                scans += 1;

                tracing::debug!(
                    scan = scans,
                    created = report.created.len(),
                    dismissed = report.dismissed.len(),
                    purged,
                    "Scanner tick"
                );
                for notification in report.created {
                    // No subscribers is fine; the notice is still stored.
                    let _ = notices.send(notification);
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }

    tracing::info!(scans, "Notification scanner stopped");
    scans
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NotificationSettings;
    use crate::models::*;

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_first_tick_broadcasts_created_notices() {
        let tracker = Tracker::new(NotificationSettings::default());
        let project = tracker
            .create_project(CreateProjectInput {
                name: "Launch".to_string(),
                description: None,
            })
            .unwrap();
        let phase = tracker
            .add_phase(
                project.id,
                CreatePhaseInput {
                    name: "Build".to_string(),
                    end_date: Some(Utc::now().date_naive() + chrono::Duration::days(1)),
                    ..Default::default()
                },
            )
            .unwrap();

        let (handle, mut rx) = spawn_with_period(tracker.clone(), Duration::from_secs(3600));
        // Let the first scan finish before anyone starts receiving.
        while tracker.unread_count() == 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        let notice = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("scan did not run")
            .unwrap();
        assert_eq!(notice.kind, NotificationKind::DeadlineApproaching);
        assert!(notice.is_about(phase.id));

        let scans = handle.shutdown().await;
        assert_eq!(scans, 1);
        assert_eq!(tracker.unread_count(), 1);
    }

    #[test]
    fn test_shutdown_before_work_completes_cleanly() {
        let scans = tokio_test::block_on(async {
            let tracker = Tracker::new(NotificationSettings::default());
            let (handle, _rx) = spawn_with_period(tracker, Duration::from_secs(3600));
            handle.shutdown().await
        });
        assert!(scans <= 1);
    }
}
