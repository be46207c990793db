use crate::auth::AuthUser;
use crate::database::{DocumentRecord, DynDocumentStore, NewDocument};
use crate::services::analysis::{AnalysisError, AnalysisService, PipelineFailure};
use crate::storage::DynStorage;
use crate::utils::error::ApiError;
use axum::{
    extract::{Extension, Multipart, Path},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Serialize)]
pub struct AnalyzeResponse {
    pub status: &'static str,
}

/// Accept a multipart upload, store the bytes and create the document record.
/// The insert notifies the analysis worker; the response carries the fresh
/// `uploaded` record for the client to track.
pub async fn upload_document(
    Extension(user): Extension<AuthUser>,
    Extension(store): Extension<DynDocumentStore>,
    Extension(storage): Extension<DynStorage>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<DocumentRecord>), ApiError> {
    let mut file: Option<(String, String, Vec<u8>)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Failed to read field: {}", e)))?
    {
        if field.name() == Some("file") {
            let filename = field
                .file_name()
                .filter(|name| !name.is_empty())
                .unwrap_or("document")
                .to_string();
            let declared = field.content_type().map(str::to_string);
            let bytes = field
                .bytes()
                .await
                .map_err(|e| ApiError::BadRequest(format!("Failed to read file: {}", e)))?
                .to_vec();

            let content_type = declared.unwrap_or_else(|| {
                mime_guess::from_path(&filename)
                    .first_or_octet_stream()
                    .to_string()
            });

            file = Some((filename, content_type, bytes));
        }
    }

    let (filename, content_type, bytes) =
        file.ok_or_else(|| ApiError::BadRequest("file field required".to_string()))?;

    info!(
        "Upload from {}: {} ({}, {} bytes)",
        user.id,
        filename,
        content_type,
        bytes.len()
    );

    let storage_key = storage
        .upload(&user.id, &filename, &bytes)
        .await
        .map_err(|e| ApiError::InternalError(format!("Failed to store file: {}", e)))?;

    let record = store
        .create_document(NewDocument {
            owner_id: user.id.clone(),
            title: filename,
            content_type,
            size_bytes: bytes.len() as i64,
            storage_key,
        })
        .await
        .map_err(|e| ApiError::DatabaseError(e.to_string()))?;

    Ok((StatusCode::CREATED, Json(record)))
}

pub async fn list_documents(
    Extension(user): Extension<AuthUser>,
    Extension(store): Extension<DynDocumentStore>,
) -> Result<Json<Vec<DocumentRecord>>, ApiError> {
    let documents = store
        .list_documents(&user.id)
        .await
        .map_err(|e| ApiError::DatabaseError(e.to_string()))?;

    Ok(Json(documents))
}

pub async fn get_document(
    Extension(user): Extension<AuthUser>,
    Extension(store): Extension<DynDocumentStore>,
    Path(id): Path<Uuid>,
) -> Result<Json<DocumentRecord>, ApiError> {
    let document = fetch_owned(&store, &user, id).await?;
    Ok(Json(document))
}

/// Explicit re-trigger of the analysis pipeline. Idempotent: a document
/// already in a terminal state short-circuits to success without touching
/// the record.
pub async fn analyze_document(
    Extension(user): Extension<AuthUser>,
    Extension(store): Extension<DynDocumentStore>,
    Extension(analysis): Extension<Arc<AnalysisService>>,
    Path(id): Path<Uuid>,
) -> Result<Json<AnalyzeResponse>, ApiError> {
    let document = fetch_owned(&store, &user, id).await?;
    if document.storage_key.is_empty() {
        return Err(ApiError::NotFound("Document has no stored file".to_string()));
    }

    match analysis.analyze(id).await {
        Ok(_) => Ok(Json(AnalyzeResponse { status: "success" })),
        Err(AnalysisError::NotFound(_)) => {
            Err(ApiError::NotFound("Document not found".to_string()))
        }
        Err(e @ AnalysisError::StorageRead(_)) => Err(ApiError::InternalError(e.to_string())),
        Err(AnalysisError::Pipeline(failure)) => match failure {
            PipelineFailure::Generation => Err(ApiError::LlmError(failure.to_string())),
            _ => Err(ApiError::InternalError(failure.to_string())),
        },
        Err(AnalysisError::Store(e)) => Err(ApiError::DatabaseError(e.to_string())),
    }
}

pub async fn archive_document(
    Extension(user): Extension<AuthUser>,
    Extension(store): Extension<DynDocumentStore>,
    Path(id): Path<Uuid>,
) -> Result<Json<DocumentRecord>, ApiError> {
    fetch_owned(&store, &user, id).await?;

    let archived = store
        .archive_document(id)
        .await
        .map_err(|e| ApiError::DatabaseError(e.to_string()))?
        .ok_or_else(|| ApiError::NotFound("Document not found".to_string()))?;

    Ok(Json(archived))
}

async fn fetch_owned(
    store: &DynDocumentStore,
    user: &AuthUser,
    id: Uuid,
) -> Result<DocumentRecord, ApiError> {
    let document = store
        .get_document(id)
        .await
        .map_err(|e| ApiError::DatabaseError(e.to_string()))?
        .ok_or_else(|| ApiError::NotFound("Document not found".to_string()))?;

    if document.owner_id != user.id {
        return Err(ApiError::Forbidden(
            "Document belongs to another user".to_string(),
        ));
    }

    Ok(document)
}
