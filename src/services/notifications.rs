//! Indexer lifecycle notifications and library lifecycle events
//!
//! Both are broadcast best-effort: a missing or lagging subscriber never
//! affects indexing.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::indexer::library::PassReport;

/// Library lifecycle notification consumed by the indexer manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "library", rename_all = "snake_case")]
pub enum LibraryEvent {
    Created(String),
    Updated(String),
    Deleted(String),
    Enabled(String),
    Disabled(String),
}

impl LibraryEvent {
    pub fn library_slug(&self) -> &str {
        match self {
            Self::Created(slug)
            | Self::Updated(slug)
            | Self::Deleted(slug)
            | Self::Enabled(slug)
            | Self::Disabled(slug) => slug,
        }
    }
}

/// Running totals for one pass, as published with progress events.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanCounters {
    pub scanned: usize,
    pub titles_created: usize,
    pub chapters_added: usize,
    pub chapters_removed: usize,
    pub unchanged: usize,
    pub promotions: usize,
    pub duplicates_recorded: usize,
    pub failed: usize,
}

/// Event emitted by a library indexer while it runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IndexerEvent {
    Started {
        library: String,
    },
    Progress {
        library: String,
        current: String,
        counters: ScanCounters,
    },
    Finished {
        library: String,
        report: PassReport,
    },
}

impl IndexerEvent {
    pub fn library(&self) -> &str {
        match self {
            Self::Started { library }
            | Self::Progress { library, .. }
            | Self::Finished { library, .. } => library,
        }
    }
}

/// Broadcast hub for [IndexerEvent]s.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<IndexerEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<IndexerEvent> {
        self.tx.subscribe()
    }

    /// Publish an event. Delivery failures (no subscribers) are ignored.
    pub fn publish(&self, event: IndexerEvent) {
        let _ = self.tx.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_without_subscribers_is_silent() {
        let bus = EventBus::default();
        bus.publish(IndexerEvent::Started {
            library: "manga".into(),
        });
    }

    #[tokio::test]
    async fn test_subscriber_receives_events() {
        let bus = EventBus::new(8);
        let mut rx = bus.subscribe();
        bus.publish(IndexerEvent::Started {
            library: "manga".into(),
        });
        let event = rx.recv().await.unwrap();
        assert_eq!(event.library(), "manga");
    }

    #[test]
    fn test_library_event_serialization() {
        let json = serde_json::to_string(&LibraryEvent::Enabled("comics".into())).unwrap();
        assert_eq!(json, r#"{"event":"enabled","library":"comics"}"#);
        assert_eq!(LibraryEvent::Deleted("x".into()).library_slug(), "x");
    }
}
