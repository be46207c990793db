use crate::database::{DocumentStats, DynDocumentStore};
use crate::utils::error::ApiError;
use axum::{extract::Extension, Json};

/// Aggregate numbers for the dashboard: totals per status, insight counts
/// and uploads per day.
pub async fn analytics_overview(
    Extension(store): Extension<DynDocumentStore>,
) -> Result<Json<DocumentStats>, ApiError> {
    let stats = store
        .document_stats()
        .await
        .map_err(|e| ApiError::DatabaseError(e.to_string()))?;

    Ok(Json(stats))
}
