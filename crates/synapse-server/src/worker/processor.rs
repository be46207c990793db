use super::queue::DocumentQueue;
use crate::services::analysis::{AnalysisOutcome, AnalysisService};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// Drain the queue and run the pipeline once per document. Failures are
/// already recorded on the record by the service; nothing is retried here.
pub fn spawn_processor(
    service: Arc<AnalysisService>,
    queue: Arc<DocumentQueue>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!("Analysis worker started");

        loop {
            let Some(document_id) = queue.dequeue().await else {
                tokio::time::sleep(Duration::from_millis(500)).await;
                continue;
            };

            match service.analyze(document_id).await {
                Ok(AnalysisOutcome::Analyzed { insights }) => {
                    info!("Document {} processed ({} insights)", document_id, insights);
                }
                Ok(AnalysisOutcome::Skipped) => {
                    debug!("Document {} already settled, skipped", document_id);
                }
                Err(e) => {
                    error!("Failed to process document {}: {}", document_id, e);
                }
            }
        }
    })
}
