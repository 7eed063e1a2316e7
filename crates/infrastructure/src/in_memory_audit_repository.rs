use async_trait::async_trait;
use tokio::sync::RwLock;

use taskgate_application::{AuditLogQuery, AuditLogRepository, AuditRepository};
use taskgate_core::AppResult;
use taskgate_domain::AuditRecord;

/// In-memory append-only audit trail.
#[derive(Debug, Default)]
pub struct InMemoryAuditRepository {
    records: RwLock<Vec<AuditRecord>>,
}

impl InMemoryAuditRepository {
    /// Creates an empty trail.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AuditRepository for InMemoryAuditRepository {
    async fn append_record(&self, record: AuditRecord) -> AppResult<()> {
        self.records.write().await.push(record);
        Ok(())
    }
}

#[async_trait]
impl AuditLogRepository for InMemoryAuditRepository {
    async fn list_records(&self, query: AuditLogQuery) -> AppResult<Vec<AuditRecord>> {
        let mut records: Vec<AuditRecord> = self
            .records
            .read()
            .await
            .iter()
            .filter(|record| query.matches(record))
            .cloned()
            .collect();
        records.sort_by(|left, right| right.occurred_at.cmp(&left.occurred_at));

        Ok(records
            .into_iter()
            .skip(query.offset)
            .take(query.limit)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use taskgate_application::{AuditLogQuery, AuditLogRepository, AuditRepository};
    use taskgate_domain::{AuditAction, AuditEntityType, AuditRecord, AuditStatus};

    use super::InMemoryAuditRepository;

    #[tokio::test]
    async fn filters_and_pages_newest_first() {
        let repository = InMemoryAuditRepository::new();
        let now = Utc::now();
        for (minutes_ago, status) in [
            (3, AuditStatus::Success),
            (1, AuditStatus::Failed),
            (2, AuditStatus::Success),
        ] {
            let record = AuditRecord::new(
                AuditAction::Read,
                AuditEntityType::Task,
                "",
                status,
                now - Duration::minutes(minutes_ago),
            );
            assert!(repository.append_record(record).await.is_ok());
        }

        let successes = repository
            .list_records(AuditLogQuery {
                status: Some(AuditStatus::Success),
                ..AuditLogQuery::default()
            })
            .await
            .unwrap_or_default();
        assert_eq!(successes.len(), 2);
        assert!(successes[0].occurred_at > successes[1].occurred_at);
        assert_eq!(successes[0].actor_email, "anonymous");

        let second_page = repository
            .list_records(AuditLogQuery {
                limit: 1,
                offset: 1,
                ..AuditLogQuery::default()
            })
            .await
            .unwrap_or_default();
        assert_eq!(second_page.len(), 1);
        assert_eq!(second_page[0].occurred_at, now - Duration::minutes(2));
    }
}
