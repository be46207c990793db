use crate::config::ChatConfig;
use crate::database::{DynMessageStore, MessageOrigin, MessageRecord, NewMessage};
use crate::services::generator::TextGenerator;
use crate::utils::error::ApiError;
use std::sync::Arc;
use tracing::{error, info};

const ASSISTANT_SENDER_ID: &str = "assistant";

/// Relays messages in the assistant channel to the text-generation
/// collaborator; every other channel is plain persistence.
pub struct ChatService {
    store: DynMessageStore,
    generator: Arc<dyn TextGenerator>,
    config: ChatConfig,
}

impl ChatService {
    pub fn new(store: DynMessageStore, generator: Arc<dyn TextGenerator>, config: ChatConfig) -> Self {
        Self {
            store,
            generator,
            config,
        }
    }

    /// Persist the sender's message; in the assistant channel also call the
    /// model (stateless, no history) and persist its reply. The reply record
    /// is only written after a successful model call, so a failure leaves
    /// just the sender's message behind.
    pub async fn send_message(
        &self,
        sender_id: &str,
        sender_name: &str,
        channel: Option<String>,
        message: &str,
    ) -> Result<Option<String>, ApiError> {
        let message = message.trim();
        if message.is_empty() {
            return Err(ApiError::BadRequest(
                "message must be a non-empty string".to_string(),
            ));
        }

        let channel = channel.unwrap_or_else(|| self.config.assistant_channel.clone());

        self.store
            .append_message(NewMessage {
                channel: channel.clone(),
                sender_id: sender_id.to_string(),
                sender_name: sender_name.to_string(),
                content: message.to_string(),
                origin: MessageOrigin::User,
            })
            .await
            .map_err(|e| ApiError::DatabaseError(e.to_string()))?;

        if channel != self.config.assistant_channel {
            return Ok(None);
        }

        let reply = self.generator.generate(message).await.map_err(|e| {
            error!("Gemini failed in chat: {}", e);
            ApiError::LlmError(
                "Failed to get a response from the AI. Please try again later.".to_string(),
            )
        })?;

        self.store
            .append_message(NewMessage {
                channel,
                sender_id: ASSISTANT_SENDER_ID.to_string(),
                sender_name: self.config.assistant_name.clone(),
                content: reply.clone(),
                origin: MessageOrigin::Assistant,
            })
            .await
            .map_err(|e| ApiError::DatabaseError(e.to_string()))?;

        info!("Relayed message from {} ({} reply chars)", sender_id, reply.len());
        Ok(Some(reply))
    }

    pub async fn list_messages(&self, channel: &str) -> Result<Vec<MessageRecord>, ApiError> {
        self.store
            .list_messages(channel)
            .await
            .map_err(|e| ApiError::DatabaseError(e.to_string()))
    }
}
