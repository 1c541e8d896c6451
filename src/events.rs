// src/events.rs

//! Push notifications about engine activity, delivered best-effort over a
//! broadcast channel. No subscriber means the notification is dropped; a
//! slow subscriber lags and misses, never blocks the engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::memory::ConsolidationReport;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NotificationKind {
    Stored { id: Uuid },
    Retrieved { id: Uuid },
    Updated { id: Uuid },
    Deleted { id: Uuid },
    Consolidated { promoted: usize },
    Pruned { ids: Vec<Uuid> },
    Archived { ids: Vec<Uuid> },
    EpochStarted { epoch_id: Uuid, name: String },
    EpochEnded { epoch_id: Uuid, name: String, memory_count: usize },
    EventCaptured { event_id: Uuid },
    /// A non-fatal problem (index repair, persistence hiccup) surfaced as a
    /// notification instead of an error return.
    EngineError { message: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryNotification {
    pub kind: NotificationKind,
    pub at: DateTime<Utc>,
}

/// Thin wrapper owning the broadcast sender.
#[derive(Clone)]
pub struct NotificationBus {
    sender: broadcast::Sender<MemoryNotification>,
}

impl NotificationBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MemoryNotification> {
        self.sender.subscribe()
    }

    pub fn emit(&self, kind: NotificationKind) {
        // SendError just means nobody is listening right now.
        let _ = self.sender.send(MemoryNotification {
            kind,
            at: Utc::now(),
        });
    }

    /// Fan a consolidation report out into its component notifications.
    pub fn emit_report(&self, report: &ConsolidationReport) {
        if report.consolidated > 0 {
            self.emit(NotificationKind::Consolidated {
                promoted: report.consolidated,
            });
        }
        if !report.pruned_ids.is_empty() {
            self.emit(NotificationKind::Pruned {
                ids: report.pruned_ids.clone(),
            });
        }
        if !report.archived_ids.is_empty() {
            self.emit(NotificationKind::Archived {
                ids: report.archived_ids.clone(),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscriber_receives_emitted_notification() {
        let bus = NotificationBus::new(8);
        let mut rx = bus.subscribe();

        let id = Uuid::new_v4();
        bus.emit(NotificationKind::Stored { id });

        let notification = rx.recv().await.unwrap();
        match notification.kind {
            NotificationKind::Stored { id: got } => assert_eq!(got, id),
            other => panic!("unexpected notification: {other:?}"),
        }
    }

    #[test]
    fn emit_without_subscribers_does_not_panic() {
        let bus = NotificationBus::new(8);
        bus.emit(NotificationKind::Deleted { id: Uuid::new_v4() });
    }

    #[tokio::test]
    async fn report_fan_out_skips_empty_sections() {
        let bus = NotificationBus::new(8);
        let mut rx = bus.subscribe();

        let report = ConsolidationReport {
            consolidated: 2,
            ..Default::default()
        };
        bus.emit_report(&report);

        let first = rx.recv().await.unwrap();
        assert!(matches!(
            first.kind,
            NotificationKind::Consolidated { promoted: 2 }
        ));
        assert!(rx.try_recv().is_err());
    }
}
