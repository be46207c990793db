//! In-memory store used by unit tests in place of Postgres. Mirrors the
//! repository's guard semantics exactly.

use super::models::{
    DailyUploads, DocumentRecord, DocumentStats, DocumentStatus, MessageRecord, NewDocument,
    NewMessage,
};
use super::store::{DocumentStore, MessageStore};
use crate::services::analysis::AnalysisReport;
use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

#[derive(Default)]
pub struct MemoryStore {
    documents: Mutex<HashMap<Uuid, DocumentRecord>>,
    messages: Mutex<Vec<MessageRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed_document(&self, record: DocumentRecord) {
        self.documents.lock().unwrap().insert(record.id, record);
    }

    pub fn document(&self, id: Uuid) -> Option<DocumentRecord> {
        self.documents.lock().unwrap().get(&id).cloned()
    }

    pub fn messages_in(&self, channel: &str) -> Vec<MessageRecord> {
        self.messages
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.channel == channel)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn create_document(&self, new: NewDocument) -> Result<DocumentRecord> {
        let record = DocumentRecord {
            id: Uuid::new_v4(),
            owner_id: new.owner_id,
            title: new.title,
            content_type: new.content_type,
            size_bytes: new.size_bytes,
            storage_key: new.storage_key,
            status: DocumentStatus::Uploaded,
            summary: None,
            key_points: None,
            action_items: None,
            alerts: None,
            confidence: None,
            insights: None,
            error: None,
            uploaded_at: Utc::now(),
        };
        self.documents
            .lock()
            .unwrap()
            .insert(record.id, record.clone());
        Ok(record)
    }

    async fn get_document(&self, id: Uuid) -> Result<Option<DocumentRecord>> {
        Ok(self.documents.lock().unwrap().get(&id).cloned())
    }

    async fn list_documents(&self, owner_id: &str) -> Result<Vec<DocumentRecord>> {
        let mut docs: Vec<DocumentRecord> = self
            .documents
            .lock()
            .unwrap()
            .values()
            .filter(|d| d.owner_id == owner_id)
            .cloned()
            .collect();
        docs.sort_by(|a, b| b.uploaded_at.cmp(&a.uploaded_at));
        Ok(docs)
    }

    async fn claim_for_analysis(
        &self,
        id: Uuid,
        allow_reanalysis: bool,
    ) -> Result<Option<DocumentRecord>> {
        let mut docs = self.documents.lock().unwrap();
        let Some(doc) = docs.get_mut(&id) else {
            return Ok(None);
        };

        let claimable = matches!(
            doc.status,
            DocumentStatus::Uploaded | DocumentStatus::Processing
        ) || (allow_reanalysis && doc.status == DocumentStatus::Analyzed);

        if !claimable {
            return Ok(None);
        }

        doc.status = DocumentStatus::Processing;
        doc.error = None;
        Ok(Some(doc.clone()))
    }

    async fn mark_analyzed(&self, id: Uuid, report: &AnalysisReport) -> Result<()> {
        let mut docs = self.documents.lock().unwrap();
        if let Some(doc) = docs.get_mut(&id) {
            if doc.status == DocumentStatus::Processing {
                doc.status = DocumentStatus::Analyzed;
                doc.summary = Some(report.summary.clone());
                doc.key_points = Some(report.key_points.clone());
                doc.action_items = Some(report.action_items.clone());
                doc.alerts = Some(report.alerts.clone());
                doc.confidence = Some(report.confidence);
                doc.insights = Some(report.insights);
                doc.error = None;
            }
        }
        Ok(())
    }

    async fn mark_failed(&self, id: Uuid, error: &str) -> Result<()> {
        let mut docs = self.documents.lock().unwrap();
        if let Some(doc) = docs.get_mut(&id) {
            if doc.status == DocumentStatus::Processing {
                doc.status = DocumentStatus::Failed;
                doc.error = Some(error.to_string());
            }
        }
        Ok(())
    }

    async fn archive_document(&self, id: Uuid) -> Result<Option<DocumentRecord>> {
        let mut docs = self.documents.lock().unwrap();
        Ok(docs.get_mut(&id).map(|doc| {
            doc.status = DocumentStatus::Archived;
            doc.clone()
        }))
    }

    async fn document_stats(&self) -> Result<DocumentStats> {
        let docs = self.documents.lock().unwrap();
        let count = |status: DocumentStatus| {
            docs.values().filter(|d| d.status == status).count() as i64
        };

        let mut per_day: HashMap<String, i64> = HashMap::new();
        for doc in docs.values() {
            *per_day
                .entry(doc.uploaded_at.format("%Y-%m-%d").to_string())
                .or_default() += 1;
        }
        let mut uploads_per_day: Vec<DailyUploads> = per_day
            .into_iter()
            .map(|(day, count)| DailyUploads { day, count })
            .collect();
        uploads_per_day.sort_by(|a, b| a.day.cmp(&b.day));

        let confidences: Vec<i32> = docs.values().filter_map(|d| d.confidence).collect();

        Ok(DocumentStats {
            total_documents: docs.len() as i64,
            analyzed_documents: count(DocumentStatus::Analyzed),
            processing_documents: count(DocumentStatus::Processing),
            failed_documents: count(DocumentStatus::Failed),
            total_insights: docs.values().filter_map(|d| d.insights).map(i64::from).sum(),
            average_confidence: if confidences.is_empty() {
                None
            } else {
                Some(confidences.iter().map(|&c| f64::from(c)).sum::<f64>() / confidences.len() as f64)
            },
            uploads_per_day,
        })
    }
}

#[async_trait]
impl MessageStore for MemoryStore {
    async fn append_message(&self, new: NewMessage) -> Result<MessageRecord> {
        let record = MessageRecord {
            id: Uuid::new_v4(),
            channel: new.channel,
            sender_id: new.sender_id,
            sender_name: new.sender_name,
            content: new.content,
            origin: new.origin,
            sent_at: Utc::now(),
        };
        self.messages.lock().unwrap().push(record.clone());
        Ok(record)
    }

    async fn list_messages(&self, channel: &str) -> Result<Vec<MessageRecord>> {
        Ok(self.messages_in(channel))
    }
}
