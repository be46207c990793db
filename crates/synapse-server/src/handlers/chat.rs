use crate::auth::AuthUser;
use crate::database::MessageRecord;
use crate::services::ChatService;
use crate::utils::error::ApiError;
use axum::{
    extract::{Extension, Path},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    /// Target channel; defaults to the assistant channel.
    #[serde(default)]
    pub channel: Option<String>,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct SendMessageResponse {
    /// The assistant's reply; null for channels without one.
    pub response: Option<String>,
}

pub async fn send_message(
    Extension(user): Extension<AuthUser>,
    Extension(chat): Extension<Arc<ChatService>>,
    Json(request): Json<SendMessageRequest>,
) -> Result<Json<SendMessageResponse>, ApiError> {
    let response = chat
        .send_message(&user.id, &user.name, request.channel, &request.message)
        .await?;

    Ok(Json(SendMessageResponse { response }))
}

pub async fn list_messages(
    Extension(chat): Extension<Arc<ChatService>>,
    Path(channel): Path<String>,
) -> Result<Json<Vec<MessageRecord>>, ApiError> {
    let messages = chat.list_messages(&channel).await?;
    Ok(Json(messages))
}
