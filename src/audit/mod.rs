use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One entry in the append-only audit trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub id: Uuid,
    pub actor: String,
    pub action: String,
    pub entity_type: String,
    pub entity_id: String,
    pub detail: String,
    pub recorded_at: DateTime<Utc>,
}

/// Append-only audit-event sink. The surrounding compliance system owns the
/// durable trail; this is the interface the collections pipeline writes to.
pub struct AuditLog {
    events: tokio::sync::RwLock<Vec<AuditEvent>>,
}

impl AuditLog {
    pub fn new() -> Self {
        Self {
            events: tokio::sync::RwLock::new(Vec::new()),
        }
    }

    pub async fn record(
        &self,
        actor: &str,
        action: &str,
        entity_type: &str,
        entity_id: &str,
        detail: String,
    ) {
        let event = AuditEvent {
            id: Uuid::new_v4(),
            actor: actor.to_string(),
            action: action.to_string(),
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            detail,
            recorded_at: Utc::now(),
        };
        let mut events = self.events.write().await;
        events.push(event);
    }

    /// Most recent events first, bounded.
    pub async fn recent(&self, limit: usize) -> Vec<AuditEvent> {
        let events = self.events.read().await;
        events.iter().rev().take(limit).cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn recent_returns_newest_first() {
        let log = AuditLog::new();
        log.record("system", "run_created", "run", "r1", "first".into())
            .await;
        log.record("operator", "retry", "transaction", "t1", "second".into())
            .await;

        let recent = log.recent(10).await;
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].detail, "second");
        assert_eq!(recent[1].detail, "first");
    }
}
