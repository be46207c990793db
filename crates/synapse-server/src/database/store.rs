use super::models::{
    DocumentRecord, DocumentStats, MessageRecord, NewDocument, NewMessage,
};
use crate::services::analysis::AnalysisReport;
use anyhow::Result;
use async_trait::async_trait;
use uuid::Uuid;

/// Persistence seam for document records. Handlers and the analysis pipeline
/// only see this trait so tests can substitute an in-memory store.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn create_document(&self, new: NewDocument) -> Result<DocumentRecord>;

    async fn get_document(&self, id: Uuid) -> Result<Option<DocumentRecord>>;

    async fn list_documents(&self, owner_id: &str) -> Result<Vec<DocumentRecord>>;

    /// Atomically move a claimable document to `processing` and return it.
    /// Returns None when the record does not exist or sits in a state the
    /// pipeline must not touch (terminal, or `analyzed` without
    /// `allow_reanalysis`). A concurrent second claim observes `processing`
    /// and still succeeds; the final UPDATE guards keep the writes
    /// single-shot.
    async fn claim_for_analysis(
        &self,
        id: Uuid,
        allow_reanalysis: bool,
    ) -> Result<Option<DocumentRecord>>;

    /// Write all AI output fields and `status = analyzed` in one statement.
    async fn mark_analyzed(&self, id: Uuid, report: &AnalysisReport) -> Result<()>;

    async fn mark_failed(&self, id: Uuid, error: &str) -> Result<()>;

    async fn archive_document(&self, id: Uuid) -> Result<Option<DocumentRecord>>;

    async fn document_stats(&self) -> Result<DocumentStats>;
}

/// Persistence seam for the append-only message log.
#[async_trait]
pub trait MessageStore: Send + Sync {
    async fn append_message(&self, new: NewMessage) -> Result<MessageRecord>;

    async fn list_messages(&self, channel: &str) -> Result<Vec<MessageRecord>>;
}
