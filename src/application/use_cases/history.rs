//! Append-only audit trail for the version pipeline.
//!
//! Every mutating operation hands a typed `HistoryAction` to this component.
//! The trail is capped at the newest 500 entries; rollback events live in
//! their own uncapped log owned by the rollback controller. Entries that
//! reference versions later deleted by retention are kept as-is.

use crate::domain::error::Result;
use crate::domain::events::{HistoryAction, HistoryEvent};
use crate::infrastructure::kv::{keys, KvStore};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

/// Cap on retained audit entries.
const MAX_HISTORY_ENTRIES: usize = 500;

pub struct History {
    kv: Arc<dyn KvStore>,
    write_lock: Mutex<()>,
}

impl History {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self {
            kv,
            write_lock: Mutex::new(()),
        }
    }

    /// Append one event, evicting the oldest entries beyond the cap.
    pub async fn append(&self, action: HistoryAction) -> Result<HistoryEvent> {
        let _guard = self.write_lock.lock().await;

        let mut events = self.load().await?;
        let event = HistoryEvent::new(action);
        debug!(event_id = %event.id, "Appending history event");
        events.push(event.clone());
        if events.len() > MAX_HISTORY_ENTRIES {
            let excess = events.len() - MAX_HISTORY_ENTRIES;
            events.drain(0..excess);
        }

        self.kv
            .set(keys::HISTORY, serde_json::to_value(&events)?)
            .await?;
        Ok(event)
    }

    /// Most recent events, newest first.
    pub async fn recent(&self, limit: usize) -> Result<Vec<HistoryEvent>> {
        let events = self.load().await?;
        Ok(events.into_iter().rev().take(limit).collect())
    }

    async fn load(&self) -> Result<Vec<HistoryEvent>> {
        match self.kv.get(keys::HISTORY).await? {
            Some(value) => Ok(serde_json::from_value(value)?),
            None => Ok(Vec::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::memory::MemoryKvStore;

    #[tokio::test]
    async fn test_append_and_recent_order() {
        let history = History::new(Arc::new(MemoryKvStore::new()));
        for i in 0..3 {
            history
                .append(HistoryAction::VersionTagged {
                    version_id: format!("v{i}"),
                    tag: "stable".to_string(),
                })
                .await
                .unwrap();
        }

        let recent = history.recent(2).await.unwrap();
        assert_eq!(recent.len(), 2);
        match &recent[0].action {
            HistoryAction::VersionTagged { version_id, .. } => assert_eq!(version_id, "v2"),
            other => panic!("unexpected action: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_trail_is_capped() {
        let history = History::new(Arc::new(MemoryKvStore::new()));
        for i in 0..(MAX_HISTORY_ENTRIES + 10) {
            history
                .append(HistoryAction::VersionTagged {
                    version_id: format!("v{i}"),
                    tag: "t".to_string(),
                })
                .await
                .unwrap();
        }

        let all = history.recent(MAX_HISTORY_ENTRIES * 2).await.unwrap();
        assert_eq!(all.len(), MAX_HISTORY_ENTRIES);
        // Oldest entries were evicted, newest survive.
        match &all[0].action {
            HistoryAction::VersionTagged { version_id, .. } => {
                assert_eq!(version_id, &format!("v{}", MAX_HISTORY_ENTRIES + 9));
            }
            other => panic!("unexpected action: {other:?}"),
        }
    }
}
