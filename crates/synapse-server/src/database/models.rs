use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Lifecycle tag of a document. Forward-progressing: the pipeline only moves
/// `uploaded`/`processing` records; `failed` and `archived` are terminal until
/// an explicit re-trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "document_status", rename_all = "lowercase")]
pub enum DocumentStatus {
    Uploaded,
    Processing,
    Analyzed,
    Failed,
    Archived,
}

impl fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DocumentStatus::Uploaded => "uploaded",
            DocumentStatus::Processing => "processing",
            DocumentStatus::Analyzed => "analyzed",
            DocumentStatus::Failed => "failed",
            DocumentStatus::Archived => "archived",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionPriority {
    #[serde(alias = "High", alias = "HIGH")]
    High,
    #[serde(alias = "Medium", alias = "MEDIUM")]
    Medium,
    #[serde(alias = "Low", alias = "LOW")]
    Low,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionItem {
    pub priority: ActionPriority,
    #[serde(default)]
    pub item: String,
    #[serde(default)]
    pub department: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertKind {
    #[serde(alias = "Warning", alias = "WARNING")]
    Warning,
    #[serde(alias = "Info", alias = "INFO")]
    Info,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    #[serde(rename = "type")]
    pub kind: AlertKind,
    #[serde(default)]
    pub message: String,
}

/// One row per uploaded document. The AI output fields are written together
/// on success and stay NULL otherwise.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentRecord {
    pub id: Uuid,
    pub owner_id: String,
    pub title: String,
    pub content_type: String,
    pub size_bytes: i64,
    pub storage_key: String,
    pub status: DocumentStatus,
    pub summary: Option<String>,
    pub key_points: Option<Vec<String>>,
    pub action_items: Option<Vec<ActionItem>>,
    pub alerts: Option<Vec<Alert>>,
    pub confidence: Option<i32>,
    pub insights: Option<i32>,
    pub error: Option<String>,
    pub uploaded_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewDocument {
    pub owner_id: String,
    pub title: String,
    pub content_type: String,
    pub size_bytes: i64,
    pub storage_key: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "message_origin", rename_all = "lowercase")]
pub enum MessageOrigin {
    User,
    Assistant,
    System,
}

/// Append-only chat message. Never mutated or deleted.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct MessageRecord {
    pub id: Uuid,
    pub channel: String,
    pub sender_id: String,
    pub sender_name: String,
    pub content: String,
    pub origin: MessageOrigin,
    pub sent_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewMessage {
    pub channel: String,
    pub sender_id: String,
    pub sender_name: String,
    pub content: String,
    pub origin: MessageOrigin,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct DailyUploads {
    pub day: String,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentStats {
    pub total_documents: i64,
    pub analyzed_documents: i64,
    pub processing_documents: i64,
    pub failed_documents: i64,
    pub total_insights: i64,
    pub average_confidence: Option<f64>,
    pub uploads_per_day: Vec<DailyUploads>,
}
