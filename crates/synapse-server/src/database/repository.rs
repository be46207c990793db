use super::models::{
    ActionItem, Alert, DailyUploads, DocumentRecord, DocumentStats, DocumentStatus, MessageRecord,
    NewDocument, NewMessage,
};
use super::store::{DocumentStore, MessageStore};
use super::DbPool;
use crate::services::analysis::AnalysisReport;
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::FromRow;
use tracing::debug;
use uuid::Uuid;

/// Notification channel fired inside the insert transaction of
/// [`Repository::create_document`]; the in-process worker listens on it.
pub const DOCUMENT_CREATED_CHANNEL: &str = "document_created";

pub struct Repository {
    pool: DbPool,
}

/// Raw row shape: JSONB columns come back wrapped, unwrapped into the public
/// record before leaving this module.
#[derive(FromRow)]
struct DocumentRow {
    id: Uuid,
    owner_id: String,
    title: String,
    content_type: String,
    size_bytes: i64,
    storage_key: String,
    status: DocumentStatus,
    summary: Option<String>,
    key_points: Option<Json<Vec<String>>>,
    action_items: Option<Json<Vec<ActionItem>>>,
    alerts: Option<Json<Vec<Alert>>>,
    confidence: Option<i32>,
    insights: Option<i32>,
    error: Option<String>,
    uploaded_at: DateTime<Utc>,
}

impl From<DocumentRow> for DocumentRecord {
    fn from(row: DocumentRow) -> Self {
        DocumentRecord {
            id: row.id,
            owner_id: row.owner_id,
            title: row.title,
            content_type: row.content_type,
            size_bytes: row.size_bytes,
            storage_key: row.storage_key,
            status: row.status,
            summary: row.summary,
            key_points: row.key_points.map(|j| j.0),
            action_items: row.action_items.map(|j| j.0),
            alerts: row.alerts.map(|j| j.0),
            confidence: row.confidence,
            insights: row.insights,
            error: row.error,
            uploaded_at: row.uploaded_at,
        }
    }
}

impl Repository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DocumentStore for Repository {
    async fn create_document(&self, new: NewDocument) -> Result<DocumentRecord> {
        let mut tx = self.pool.get_pool().begin().await?;

        let row = sqlx::query_as::<_, DocumentRow>(
            r#"INSERT INTO documents (owner_id, title, content_type, size_bytes, storage_key, status)
               VALUES ($1, $2, $3, $4, $5, 'uploaded')
               RETURNING *"#,
        )
        .bind(&new.owner_id)
        .bind(&new.title)
        .bind(&new.content_type)
        .bind(new.size_bytes)
        .bind(&new.storage_key)
        .fetch_one(&mut *tx)
        .await?;

        // Notify in the same transaction so the worker only ever sees
        // committed rows.
        sqlx::query("SELECT pg_notify($1, $2)")
            .bind(DOCUMENT_CREATED_CHANNEL)
            .bind(row.id.to_string())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        debug!("Created document {} ({})", row.id, row.title);
        Ok(row.into())
    }

    async fn get_document(&self, id: Uuid) -> Result<Option<DocumentRecord>> {
        let row = sqlx::query_as::<_, DocumentRow>("SELECT * FROM documents WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool.get_pool())
            .await?;

        Ok(row.map(Into::into))
    }

    async fn list_documents(&self, owner_id: &str) -> Result<Vec<DocumentRecord>> {
        let rows = sqlx::query_as::<_, DocumentRow>(
            "SELECT * FROM documents WHERE owner_id = $1 ORDER BY uploaded_at DESC",
        )
        .bind(owner_id)
        .fetch_all(self.pool.get_pool())
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn claim_for_analysis(
        &self,
        id: Uuid,
        allow_reanalysis: bool,
    ) -> Result<Option<DocumentRecord>> {
        let row = sqlx::query_as::<_, DocumentRow>(
            r#"UPDATE documents
               SET status = 'processing', error = NULL
               WHERE id = $1
                 AND (status IN ('uploaded', 'processing')
                      OR ($2 AND status = 'analyzed'))
               RETURNING *"#,
        )
        .bind(id)
        .bind(allow_reanalysis)
        .fetch_optional(self.pool.get_pool())
        .await?;

        Ok(row.map(Into::into))
    }

    async fn mark_analyzed(&self, id: Uuid, report: &AnalysisReport) -> Result<()> {
        sqlx::query(
            r#"UPDATE documents
               SET status = 'analyzed',
                   summary = $2,
                   key_points = $3,
                   action_items = $4,
                   alerts = $5,
                   confidence = $6,
                   insights = $7,
                   error = NULL
               WHERE id = $1 AND status = 'processing'"#,
        )
        .bind(id)
        .bind(&report.summary)
        .bind(Json(&report.key_points))
        .bind(Json(&report.action_items))
        .bind(Json(&report.alerts))
        .bind(report.confidence)
        .bind(report.insights)
        .execute(self.pool.get_pool())
        .await?;

        Ok(())
    }

    async fn mark_failed(&self, id: Uuid, error: &str) -> Result<()> {
        sqlx::query(
            "UPDATE documents SET status = 'failed', error = $2 WHERE id = $1 AND status = 'processing'",
        )
        .bind(id)
        .bind(error)
        .execute(self.pool.get_pool())
        .await?;

        Ok(())
    }

    async fn archive_document(&self, id: Uuid) -> Result<Option<DocumentRecord>> {
        let row = sqlx::query_as::<_, DocumentRow>(
            "UPDATE documents SET status = 'archived' WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .fetch_optional(self.pool.get_pool())
        .await?;

        Ok(row.map(Into::into))
    }

    async fn document_stats(&self) -> Result<DocumentStats> {
        #[derive(FromRow)]
        struct StatsRow {
            total: i64,
            analyzed: i64,
            processing: i64,
            failed: i64,
            insights: i64,
            avg_confidence: Option<f64>,
        }

        let stats = sqlx::query_as::<_, StatsRow>(
            r#"SELECT COUNT(*) AS total,
                      COUNT(*) FILTER (WHERE status = 'analyzed') AS analyzed,
                      COUNT(*) FILTER (WHERE status = 'processing') AS processing,
                      COUNT(*) FILTER (WHERE status = 'failed') AS failed,
                      COALESCE(SUM(insights), 0) AS insights,
                      AVG(confidence)::float8 AS avg_confidence
               FROM documents"#,
        )
        .fetch_one(self.pool.get_pool())
        .await?;

        let uploads_per_day = sqlx::query_as::<_, DailyUploads>(
            r#"SELECT to_char(uploaded_at, 'YYYY-MM-DD') AS day, COUNT(*) AS count
               FROM documents
               WHERE uploaded_at > now() - interval '30 days'
               GROUP BY 1
               ORDER BY 1"#,
        )
        .fetch_all(self.pool.get_pool())
        .await?;

        Ok(DocumentStats {
            total_documents: stats.total,
            analyzed_documents: stats.analyzed,
            processing_documents: stats.processing,
            failed_documents: stats.failed,
            total_insights: stats.insights,
            average_confidence: stats.avg_confidence,
            uploads_per_day,
        })
    }
}

#[async_trait]
impl MessageStore for Repository {
    async fn append_message(&self, new: NewMessage) -> Result<MessageRecord> {
        let message = sqlx::query_as::<_, MessageRecord>(
            r#"INSERT INTO messages (channel, sender_id, sender_name, content, origin)
               VALUES ($1, $2, $3, $4, $5)
               RETURNING *"#,
        )
        .bind(&new.channel)
        .bind(&new.sender_id)
        .bind(&new.sender_name)
        .bind(&new.content)
        .bind(new.origin)
        .fetch_one(self.pool.get_pool())
        .await?;

        Ok(message)
    }

    async fn list_messages(&self, channel: &str) -> Result<Vec<MessageRecord>> {
        let messages = sqlx::query_as::<_, MessageRecord>(
            "SELECT * FROM messages WHERE channel = $1 ORDER BY sent_at",
        )
        .bind(channel)
        .fetch_all(self.pool.get_pool())
        .await?;

        Ok(messages)
    }
}
