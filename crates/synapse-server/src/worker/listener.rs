use super::queue::DocumentQueue;
use crate::database::{DbPool, DOCUMENT_CREATED_CHANNEL};
use anyhow::Result;
use sqlx::postgres::PgListener;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Subscribe to `document_created` notifications and feed the queue.
/// Reconnects with a delay when the LISTEN connection drops.
pub fn spawn_listener(pool: DbPool, queue: Arc<DocumentQueue>) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            if let Err(e) = listen(&pool, &queue).await {
                error!("Document listener error: {}", e);
            } else {
                warn!("Notification stream ended, reconnecting");
            }
            tokio::time::sleep(Duration::from_secs(5)).await;
        }
    })
}

async fn listen(pool: &DbPool, queue: &DocumentQueue) -> Result<()> {
    let mut listener = PgListener::connect_with(pool.get_pool()).await?;
    listener.listen(DOCUMENT_CREATED_CHANNEL).await?;

    info!("Listening on channel: {}", DOCUMENT_CREATED_CHANNEL);

    loop {
        let notification = listener.recv().await?;
        match Uuid::parse_str(notification.payload()) {
            Ok(document_id) => {
                debug!("Received notification for document {}", document_id);
                queue.enqueue(document_id).await;
            }
            Err(e) => {
                error!(
                    "Failed to parse notification payload {:?}: {}",
                    notification.payload(),
                    e
                );
            }
        }
    }
}
