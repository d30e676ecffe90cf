//! Latest frame report with TTL expiration
//!
//! The frame loop publishes here; HTTP handlers read. A report older than the TTL
//! is treated as absent so a stalled loop is visible to clients.

use std::time::{Duration, Instant};
use tokio::sync::RwLock;

use crate::pipeline::FrameReport;

/// Default TTL for published reports
pub const SNAPSHOT_TTL: Duration = Duration::from_secs(5);

struct Snapshot {
    report: FrameReport,
    expires_at: Instant,
}

impl Snapshot {
    fn is_expired(&self) -> bool {
        Instant::now() > self.expires_at
    }
}

pub struct SnapshotStore {
    ttl: Duration,
    latest: RwLock<Option<Snapshot>>,
}

impl SnapshotStore {
    pub fn new() -> Self {
        Self::with_ttl(SNAPSHOT_TTL)
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            ttl,
            latest: RwLock::new(None),
        }
    }

    /// Latest report if still fresh
    pub async fn get(&self) -> Option<FrameReport> {
        let latest = self.latest.read().await;
        latest.as_ref().and_then(|s| {
            if s.is_expired() {
                None
            } else {
                Some(s.report.clone())
            }
        })
    }

    pub async fn publish(&self, report: FrameReport) {
        let mut latest = self.latest.write().await;
        *latest = Some(Snapshot {
            report,
            expires_at: Instant::now() + self.ttl,
        });
    }
}

impl Default for SnapshotStore {
    fn default() -> Self {
        Self::new()
    }
}
