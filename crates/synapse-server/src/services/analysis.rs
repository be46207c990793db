use crate::config::AnalysisConfig;
use crate::database::{ActionItem, Alert, DynDocumentStore};
use crate::document::{extract_text, ExtractError};
use crate::services::generator::TextGenerator;
use crate::storage::{DynStorage, StorageError};
use serde::Deserialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Terminal failure of a single pipeline run. The display strings are the
/// exact error texts recorded on the document.
#[derive(Error, Debug)]
pub enum PipelineFailure {
    #[error("Unsupported file type")]
    UnsupportedType,

    #[error("Could not extract text from document")]
    NoText,

    #[error("AI analysis failed")]
    Generation,

    #[error("AI analysis or data parsing failed")]
    Parse,
}

#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("Document not found: {0}")]
    NotFound(Uuid),

    #[error("Failed to read file from storage")]
    StorageRead(#[source] StorageError),

    #[error(transparent)]
    Pipeline(#[from] PipelineFailure),

    #[error("Store error: {0}")]
    Store(#[from] anyhow::Error),
}

/// Structured insights extracted from one document.
#[derive(Debug, Clone)]
pub struct AnalysisReport {
    pub summary: String,
    pub key_points: Vec<String>,
    pub action_items: Vec<ActionItem>,
    pub alerts: Vec<Alert>,
    pub confidence: i32,
    pub insights: i32,
}

#[derive(Debug)]
pub enum AnalysisOutcome {
    Analyzed { insights: i32 },
    /// The record was not claimable (already analyzed, failed or archived);
    /// re-invocation is a no-op.
    Skipped,
}

/// Run the pipeline on raw bytes: extract, prompt, generate, parse. Pure with
/// respect to persistence; both the event trigger and the explicit callable
/// go through here.
pub async fn run_analysis(
    content_type: &str,
    bytes: &[u8],
    generator: &dyn TextGenerator,
    max_prompt_chars: usize,
) -> Result<AnalysisReport, PipelineFailure> {
    let text = match extract_text(content_type, bytes) {
        Ok(text) => text,
        Err(ExtractError::Unsupported(t)) => {
            warn!("Unsupported content type: {}", t);
            return Err(PipelineFailure::UnsupportedType);
        }
        Err(ExtractError::Malformed(msg)) => {
            warn!("Text extraction failed: {}", msg);
            return Err(PipelineFailure::NoText);
        }
    };

    if text.trim().is_empty() {
        return Err(PipelineFailure::NoText);
    }

    let prompt = build_prompt(&text, max_prompt_chars);

    let raw = generator.generate(&prompt).await.map_err(|e| {
        error!("Model call failed: {}", e);
        PipelineFailure::Generation
    })?;

    parse_report(&raw).map_err(|e| {
        error!("Could not parse model output as JSON: {}", e);
        PipelineFailure::Parse
    })
}

/// Orchestrates claim, fetch, pipeline and persistence for one document.
pub struct AnalysisService {
    store: DynDocumentStore,
    storage: DynStorage,
    generator: Arc<dyn TextGenerator>,
    config: AnalysisConfig,
}

impl AnalysisService {
    pub fn new(
        store: DynDocumentStore,
        storage: DynStorage,
        generator: Arc<dyn TextGenerator>,
        config: AnalysisConfig,
    ) -> Self {
        Self {
            store,
            storage,
            generator,
            config,
        }
    }

    pub async fn analyze(&self, id: Uuid) -> Result<AnalysisOutcome, AnalysisError> {
        let Some(doc) = self
            .store
            .claim_for_analysis(id, self.config.allow_reanalysis)
            .await?
        else {
            return if self.store.get_document(id).await?.is_some() {
                debug!("Document {} not claimable, skipping", id);
                Ok(AnalysisOutcome::Skipped)
            } else {
                Err(AnalysisError::NotFound(id))
            };
        };

        info!("Analyzing document {} ({})", doc.id, doc.title);

        let bytes = match self.storage.download(&doc.storage_key).await {
            Ok(bytes) => bytes,
            Err(e) => {
                error!("Storage read for {} failed: {}", doc.storage_key, e);
                let failure = AnalysisError::StorageRead(e);
                self.store.mark_failed(id, &failure.to_string()).await?;
                return Err(failure);
            }
        };

        match run_analysis(
            &doc.content_type,
            &bytes,
            self.generator.as_ref(),
            self.config.max_prompt_chars,
        )
        .await
        {
            Ok(report) => {
                self.store.mark_analyzed(id, &report).await?;
                info!(
                    "Document {} analyzed: {} insights, confidence {}",
                    id, report.insights, report.confidence
                );
                Ok(AnalysisOutcome::Analyzed {
                    insights: report.insights,
                })
            }
            Err(failure) => {
                error!("Analysis of document {} failed: {}", id, failure);
                self.store.mark_failed(id, &failure.to_string()).await?;
                Err(failure.into())
            }
        }
    }
}

fn build_prompt(text: &str, max_chars: usize) -> String {
    let excerpt = truncate_chars(text, max_chars);
    format!(
        "You are a document analysis assistant for a metro rail organisation.\n\
         Analyze the document below and respond with a single JSON object, no prose, with these keys:\n\
         - \"summary\": a concise summary of the document (string)\n\
         - \"keyPoints\": the most important points (array of strings)\n\
         - \"actionItems\": concrete follow-ups (array of {{\"priority\": \"high\"|\"medium\"|\"low\", \"item\": string, \"department\": string}})\n\
         - \"alerts\": risks or notices (array of {{\"type\": \"warning\"|\"info\", \"message\": string}})\n\
         - \"confidence\": how confident you are in the analysis, 0-100 (number)\n\n\
         Document:\n{}",
        excerpt
    )
}

fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Models habitually wrap JSON in Markdown fences; take the fenced block when
/// present, the raw text otherwise.
fn strip_code_fences(text: &str) -> &str {
    if text.contains("```json") {
        text.split("```json")
            .nth(1)
            .and_then(|s| s.split("```").next())
            .unwrap_or(text)
            .trim()
    } else if text.contains("```") {
        text.split("```")
            .nth(1)
            .and_then(|s| s.split("```").next())
            .unwrap_or(text)
            .trim()
    } else {
        text.trim()
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawInsights {
    #[serde(default)]
    summary: String,
    #[serde(default)]
    key_points: Vec<String>,
    #[serde(default)]
    action_items: Vec<ActionItem>,
    #[serde(default)]
    alerts: Vec<Alert>,
    #[serde(default)]
    confidence: f64,
}

fn parse_report(raw: &str) -> Result<AnalysisReport, serde_json::Error> {
    let parsed: RawInsights = serde_json::from_str(strip_code_fences(raw))?;

    let insights =
        (parsed.key_points.len() + parsed.action_items.len() + parsed.alerts.len()) as i32;

    Ok(AnalysisReport {
        summary: parsed.summary,
        key_points: parsed.key_points,
        action_items: parsed.action_items,
        alerts: parsed.alerts,
        confidence: parsed.confidence.clamp(0.0, 100.0).round() as i32,
        insights,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AnalysisConfig;
    use crate::database::memory::MemoryStore;
    use crate::database::{DocumentRecord, DocumentStatus};
    use crate::services::generator::GeneratorError;
    use crate::storage::{LocalStorage, Storage};
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const MODEL_JSON: &str = r#"{"summary":"S","keyPoints":["a","b"],"actionItems":[],"alerts":[{"type":"warning","message":"m"}],"confidence":80}"#;

    struct FakeGenerator {
        reply: Option<String>,
        calls: AtomicUsize,
    }

    impl FakeGenerator {
        fn replying(reply: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: Some(reply.to_string()),
                calls: AtomicUsize::new(0),
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                reply: None,
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl TextGenerator for FakeGenerator {
        async fn generate(&self, _prompt: &str) -> Result<String, GeneratorError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.reply {
                Some(reply) => Ok(reply.clone()),
                None => Err(GeneratorError::Empty),
            }
        }
    }

    fn record(id: Uuid, content_type: &str, storage_key: &str, status: DocumentStatus) -> DocumentRecord {
        DocumentRecord {
            id,
            owner_id: "user-1".to_string(),
            title: "doc.txt".to_string(),
            content_type: content_type.to_string(),
            size_bytes: 1,
            storage_key: storage_key.to_string(),
            status,
            summary: None,
            key_points: None,
            action_items: None,
            alerts: None,
            confidence: None,
            insights: None,
            error: None,
            uploaded_at: Utc::now(),
        }
    }

    fn config() -> AnalysisConfig {
        AnalysisConfig {
            max_prompt_chars: 10_000,
            allow_reanalysis: false,
            queue_capacity: 16,
        }
    }

    struct Fixture {
        store: Arc<MemoryStore>,
        generator: Arc<FakeGenerator>,
        service: AnalysisService,
        _dir: tempfile::TempDir,
        storage: Arc<LocalStorage>,
    }

    fn fixture(generator: Arc<FakeGenerator>, cfg: AnalysisConfig) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryStore::new());
        let storage = Arc::new(LocalStorage::new(dir.path()));
        let service = AnalysisService::new(
            store.clone(),
            storage.clone(),
            generator.clone(),
            cfg,
        );
        Fixture {
            store,
            generator,
            service,
            _dir: dir,
            storage,
        }
    }

    async fn seed(fx: &Fixture, content_type: &str, body: &[u8], status: DocumentStatus) -> Uuid {
        let key = fx.storage.upload("user-1", "doc.txt", body).await.unwrap();
        let id = Uuid::new_v4();
        fx.store.seed_document(record(id, content_type, &key, status));
        id
    }

    #[tokio::test]
    async fn successful_run_writes_all_insight_fields() {
        let fx = fixture(FakeGenerator::replying(MODEL_JSON), config());
        let id = seed(&fx, "text/plain", b"metro extension proposal", DocumentStatus::Uploaded).await;

        let outcome = fx.service.analyze(id).await.unwrap();
        assert!(matches!(outcome, AnalysisOutcome::Analyzed { insights: 3 }));

        let doc = fx.store.document(id).unwrap();
        assert_eq!(doc.status, DocumentStatus::Analyzed);
        assert_eq!(doc.summary.as_deref(), Some("S"));
        assert_eq!(doc.key_points.as_deref(), Some(&["a".to_string(), "b".to_string()][..]));
        assert_eq!(doc.confidence, Some(80));
        assert_eq!(doc.insights, Some(3));
        assert_eq!(doc.error, None);
        assert_eq!(fx.generator.calls(), 1);
    }

    #[tokio::test]
    async fn unsupported_type_fails_without_model_call() {
        let fx = fixture(FakeGenerator::replying(MODEL_JSON), config());
        let id = seed(&fx, "image/png", b"\x89PNG", DocumentStatus::Uploaded).await;

        let err = fx.service.analyze(id).await.unwrap_err();
        assert!(matches!(err, AnalysisError::Pipeline(PipelineFailure::UnsupportedType)));

        let doc = fx.store.document(id).unwrap();
        assert_eq!(doc.status, DocumentStatus::Failed);
        assert_eq!(doc.error.as_deref(), Some("Unsupported file type"));
        assert_eq!(fx.generator.calls(), 0);
    }

    #[tokio::test]
    async fn empty_text_fails_without_model_call() {
        let fx = fixture(FakeGenerator::replying(MODEL_JSON), config());
        let id = seed(&fx, "text/plain", b"   \n  ", DocumentStatus::Uploaded).await;

        let err = fx.service.analyze(id).await.unwrap_err();
        assert!(matches!(err, AnalysisError::Pipeline(PipelineFailure::NoText)));

        let doc = fx.store.document(id).unwrap();
        assert_eq!(doc.status, DocumentStatus::Failed);
        assert_eq!(doc.error.as_deref(), Some("Could not extract text from document"));
        assert_eq!(fx.generator.calls(), 0);
    }

    #[tokio::test]
    async fn invalid_model_json_writes_no_partial_fields() {
        let fx = fixture(FakeGenerator::replying("I could not analyze this."), config());
        let id = seed(&fx, "text/plain", b"some content", DocumentStatus::Uploaded).await;

        let err = fx.service.analyze(id).await.unwrap_err();
        assert!(matches!(err, AnalysisError::Pipeline(PipelineFailure::Parse)));

        let doc = fx.store.document(id).unwrap();
        assert_eq!(doc.status, DocumentStatus::Failed);
        assert_eq!(doc.error.as_deref(), Some("AI analysis or data parsing failed"));
        assert_eq!(doc.summary, None);
        assert_eq!(doc.key_points, None);
        assert_eq!(doc.confidence, None);
    }

    #[tokio::test]
    async fn model_failure_is_terminal() {
        let fx = fixture(FakeGenerator::failing(), config());
        let id = seed(&fx, "text/plain", b"some content", DocumentStatus::Uploaded).await;

        let err = fx.service.analyze(id).await.unwrap_err();
        assert!(matches!(err, AnalysisError::Pipeline(PipelineFailure::Generation)));

        let doc = fx.store.document(id).unwrap();
        assert_eq!(doc.error.as_deref(), Some("AI analysis failed"));
        assert_eq!(fx.generator.calls(), 1);
    }

    #[tokio::test]
    async fn storage_read_failure_is_recorded() {
        let fx = fixture(FakeGenerator::replying(MODEL_JSON), config());
        let id = Uuid::new_v4();
        fx.store.seed_document(record(id, "text/plain", "user-1/gone.txt", DocumentStatus::Uploaded));

        let err = fx.service.analyze(id).await.unwrap_err();
        assert!(matches!(err, AnalysisError::StorageRead(_)));

        let doc = fx.store.document(id).unwrap();
        assert_eq!(doc.status, DocumentStatus::Failed);
        assert_eq!(doc.error.as_deref(), Some("Failed to read file from storage"));
        assert_eq!(fx.generator.calls(), 0);
    }

    #[tokio::test]
    async fn analyzed_document_is_skipped_unchanged() {
        let fx = fixture(FakeGenerator::replying(MODEL_JSON), config());
        let id = seed(&fx, "text/plain", b"content", DocumentStatus::Uploaded).await;

        fx.service.analyze(id).await.unwrap();
        let before = fx.store.document(id).unwrap();

        let outcome = fx.service.analyze(id).await.unwrap();
        assert!(matches!(outcome, AnalysisOutcome::Skipped));

        let after = fx.store.document(id).unwrap();
        assert_eq!(after.status, before.status);
        assert_eq!(after.summary, before.summary);
        assert_eq!(after.insights, before.insights);
        assert_eq!(fx.generator.calls(), 1);
    }

    #[tokio::test]
    async fn reanalysis_claims_analyzed_documents_when_allowed() {
        let mut cfg = config();
        cfg.allow_reanalysis = true;
        let fx = fixture(FakeGenerator::replying(MODEL_JSON), cfg);
        let id = seed(&fx, "text/plain", b"content", DocumentStatus::Analyzed).await;

        let outcome = fx.service.analyze(id).await.unwrap();
        assert!(matches!(outcome, AnalysisOutcome::Analyzed { .. }));
        assert_eq!(fx.generator.calls(), 1);
    }

    #[tokio::test]
    async fn unknown_document_is_not_found() {
        let fx = fixture(FakeGenerator::replying(MODEL_JSON), config());
        let err = fx.service.analyze(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, AnalysisError::NotFound(_)));
    }

    #[test]
    fn parse_report_handles_the_reference_payload() {
        let report = parse_report(MODEL_JSON).unwrap();
        assert_eq!(report.summary, "S");
        assert_eq!(report.key_points, vec!["a", "b"]);
        assert!(report.action_items.is_empty());
        assert_eq!(report.alerts.len(), 1);
        assert_eq!(report.insights, 3);
        assert_eq!(report.confidence, 80);
    }

    #[test]
    fn parse_report_strips_json_fences() {
        let fenced = format!("Here you go:\n```json\n{}\n```\nAnything else?", MODEL_JSON);
        let report = parse_report(&fenced).unwrap();
        assert_eq!(report.insights, 3);

        let bare = format!("```\n{}\n```", MODEL_JSON);
        assert_eq!(parse_report(&bare).unwrap().confidence, 80);
    }

    #[test]
    fn parse_report_defaults_missing_keys() {
        let report = parse_report(r#"{"summary":"only a summary"}"#).unwrap();
        assert_eq!(report.summary, "only a summary");
        assert!(report.key_points.is_empty());
        assert_eq!(report.insights, 0);
        assert_eq!(report.confidence, 0);
    }

    #[test]
    fn parse_report_clamps_confidence() {
        assert_eq!(parse_report(r#"{"confidence":150}"#).unwrap().confidence, 100);
        assert_eq!(parse_report(r#"{"confidence":-3}"#).unwrap().confidence, 0);
        assert_eq!(parse_report(r#"{"confidence":79.6}"#).unwrap().confidence, 80);
    }

    #[test]
    fn parse_report_rejects_non_json() {
        assert!(parse_report("the document looks fine").is_err());
    }

    #[test]
    fn prompt_is_truncated_on_char_boundaries() {
        let text = "ä".repeat(12_000);
        let prompt = build_prompt(&text, 10_000);
        assert_eq!(prompt.chars().filter(|&c| c == 'ä').count(), 10_000);

        let short = build_prompt("short text", 10_000);
        assert!(short.contains("short text"));
    }
}
