use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use faq_core::{ConversationSession, FeedbackRecord, FeedbackSummary};
use parking_lot::RwLock;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Row, SqlitePool};

pub trait SessionRepository: Send + Sync {
    async fn load_session(&self, session_id: &str) -> Result<Option<ConversationSession>>;
    async fn upsert_session(&self, session: &ConversationSession) -> Result<()>;
    async fn clear_session(&self, session_id: &str) -> Result<bool>;
    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64>;
}

pub trait FeedbackRepository: Send + Sync {
    async fn record_feedback(&self, record: FeedbackRecord) -> Result<()>;
    async fn feedback_summary(&self) -> Result<FeedbackSummary>;
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    sessions: Arc<RwLock<HashMap<String, ConversationSession>>>,
    feedback: Arc<RwLock<Vec<FeedbackRecord>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionRepository for MemoryStore {
    async fn load_session(&self, session_id: &str) -> Result<Option<ConversationSession>> {
        Ok(self.sessions.read().get(session_id).cloned())
    }

    async fn upsert_session(&self, session: &ConversationSession) -> Result<()> {
        self.sessions
            .write()
            .insert(session.session_id.clone(), session.clone());
        Ok(())
    }

    async fn clear_session(&self, session_id: &str) -> Result<bool> {
        Ok(self.sessions.write().remove(session_id).is_some())
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        let mut removed = 0_u64;
        self.sessions.write().retain(|_, value| {
            let keep = value.expires_at > now;
            if !keep {
                removed += 1;
            }
            keep
        });

        Ok(removed)
    }
}

impl FeedbackRepository for MemoryStore {
    async fn record_feedback(&self, record: FeedbackRecord) -> Result<()> {
        self.feedback.write().push(record);
        Ok(())
    }

    async fn feedback_summary(&self) -> Result<FeedbackSummary> {
        let items = self.feedback.read();
        let helpful = items.iter().filter(|item| item.helpful).count() as u64;
        Ok(FeedbackSummary {
            helpful,
            not_helpful: items.len() as u64 - helpful,
        })
    }
}

#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub async fn connect(database_url: &str) -> Result<Self> {
        // Every connection to an in-memory database sees its own empty schema.
        let in_memory = database_url.contains(":memory:");
        let mut options = SqlitePoolOptions::new().max_connections(if in_memory { 1 } else { 5 });
        if in_memory {
            options = options.idle_timeout(None).max_lifetime(None);
        }
        let pool = options
            .connect(database_url)
            .await
            .with_context(|| format!("failed connecting to sqlite at {}", database_url))?;

        let store = Self { pool };
        store.ensure_schema().await?;
        Ok(store)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn ensure_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sessions (
              session_id TEXT PRIMARY KEY,
              expires_at TEXT NOT NULL,
              turns_json TEXT NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS feedback (
              feedback_id TEXT PRIMARY KEY,
              session_id TEXT,
              helpful INTEGER NOT NULL,
              comment TEXT,
              created_at TEXT NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

fn timestamp(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Millis, true)
}

impl SessionRepository for SqliteStore {
    async fn load_session(&self, session_id: &str) -> Result<Option<ConversationSession>> {
        let row = sqlx::query(
            r#"
            SELECT session_id, expires_at, turns_json
            FROM sessions
            WHERE session_id = ?1
            "#,
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let turns_json: String = row.get("turns_json");
        let turns = serde_json::from_str(&turns_json)
            .with_context(|| format!("corrupt turns for session {}", session_id))?;

        let session = ConversationSession {
            session_id: row.get("session_id"),
            expires_at: row
                .get::<String, _>("expires_at")
                .parse()
                .unwrap_or_else(|_| Utc::now()),
            turns,
        };

        Ok(Some(session))
    }

    async fn upsert_session(&self, session: &ConversationSession) -> Result<()> {
        let turns_json = serde_json::to_string(&session.turns)?;

        sqlx::query(
            r#"
            INSERT INTO sessions (session_id, expires_at, turns_json)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(session_id) DO UPDATE SET
              expires_at=excluded.expires_at,
              turns_json=excluded.turns_json
            "#,
        )
        .bind(&session.session_id)
        .bind(timestamp(session.expires_at))
        .bind(turns_json)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn clear_session(&self, session_id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM sessions WHERE session_id = ?1")
            .bind(session_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM sessions WHERE expires_at <= ?1")
            .bind(timestamp(now))
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}

impl FeedbackRepository for SqliteStore {
    async fn record_feedback(&self, record: FeedbackRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO feedback (feedback_id, session_id, helpful, comment, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )
        .bind(&record.feedback_id)
        .bind(&record.session_id)
        .bind(record.helpful)
        .bind(&record.comment)
        .bind(timestamp(record.created_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn feedback_summary(&self) -> Result<FeedbackSummary> {
        let row = sqlx::query(
            r#"
            SELECT
              COALESCE(SUM(CASE WHEN helpful = 1 THEN 1 ELSE 0 END), 0) AS helpful,
              COALESCE(SUM(CASE WHEN helpful = 0 THEN 1 ELSE 0 END), 0) AS not_helpful
            FROM feedback
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(FeedbackSummary {
            helpful: row.get::<i64, _>("helpful") as u64,
            not_helpful: row.get::<i64, _>("not_helpful") as u64,
        })
    }
}

#[derive(Clone)]
pub enum Store {
    Memory(MemoryStore),
    Sqlite(SqliteStore),
}

impl Store {
    pub fn memory() -> Self {
        Self::Memory(MemoryStore::new())
    }

    pub async fn sqlite(database_url: &str) -> Result<Self> {
        let sqlite = SqliteStore::connect(database_url).await?;
        Ok(Self::Sqlite(sqlite))
    }

    pub fn backend_name(&self) -> &'static str {
        match self {
            Store::Memory(_) => "memory",
            Store::Sqlite(_) => "sqlite",
        }
    }
}

impl SessionRepository for Store {
    async fn load_session(&self, session_id: &str) -> Result<Option<ConversationSession>> {
        match self {
            Store::Memory(store) => store.load_session(session_id).await,
            Store::Sqlite(store) => store.load_session(session_id).await,
        }
    }

    async fn upsert_session(&self, session: &ConversationSession) -> Result<()> {
        match self {
            Store::Memory(store) => store.upsert_session(session).await,
            Store::Sqlite(store) => store.upsert_session(session).await,
        }
    }

    async fn clear_session(&self, session_id: &str) -> Result<bool> {
        match self {
            Store::Memory(store) => store.clear_session(session_id).await,
            Store::Sqlite(store) => store.clear_session(session_id).await,
        }
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        match self {
            Store::Memory(store) => store.purge_expired(now).await,
            Store::Sqlite(store) => store.purge_expired(now).await,
        }
    }
}

impl FeedbackRepository for Store {
    async fn record_feedback(&self, record: FeedbackRecord) -> Result<()> {
        match self {
            Store::Memory(store) => store.record_feedback(record).await,
            Store::Sqlite(store) => store.record_feedback(record).await,
        }
    }

    async fn feedback_summary(&self) -> Result<FeedbackSummary> {
        match self {
            Store::Memory(store) => store.feedback_summary().await,
            Store::Sqlite(store) => store.feedback_summary().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use faq_core::{ConversationTurn, ReplySource};

    fn session(id: &str, expires_at: DateTime<Utc>) -> ConversationSession {
        ConversationSession {
            session_id: id.to_string(),
            expires_at,
            turns: vec![ConversationTurn {
                at: Utc::now(),
                user_text: "certificado de notas".to_string(),
                bot_text: "Solicítalo en línea.".to_string(),
                source: ReplySource::Faq,
                intent: Some("certificado de notas".to_string()),
            }],
        }
    }

    fn feedback(helpful: bool) -> FeedbackRecord {
        FeedbackRecord {
            feedback_id: uuid::Uuid::new_v4().to_string(),
            session_id: None,
            helpful,
            comment: None,
            created_at: Utc::now(),
        }
    }

    async fn exercise(store: Store) {
        let now = Utc::now();
        store
            .upsert_session(&session("live", now + Duration::hours(1)))
            .await
            .unwrap();
        store
            .upsert_session(&session("stale", now - Duration::hours(1)))
            .await
            .unwrap();

        let loaded = store.load_session("live").await.unwrap().expect("session");
        assert_eq!(loaded.turns.len(), 1);
        assert_eq!(loaded.turns[0].source, ReplySource::Faq);

        assert_eq!(store.purge_expired(now).await.unwrap(), 1);
        assert!(store.load_session("stale").await.unwrap().is_none());

        assert!(store.clear_session("live").await.unwrap());
        assert!(!store.clear_session("live").await.unwrap());

        store.record_feedback(feedback(true)).await.unwrap();
        store.record_feedback(feedback(true)).await.unwrap();
        store.record_feedback(feedback(false)).await.unwrap();
        assert_eq!(
            store.feedback_summary().await.unwrap(),
            FeedbackSummary {
                helpful: 2,
                not_helpful: 1
            }
        );
    }

    #[tokio::test]
    async fn memory_store_round_trip() {
        exercise(Store::memory()).await;
    }

    #[tokio::test]
    async fn sqlite_store_round_trip() {
        let store = Store::sqlite("sqlite::memory:").await.unwrap();
        assert_eq!(store.backend_name(), "sqlite");
        exercise(store).await;
    }
}
