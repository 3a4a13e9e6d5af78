use crate::auth::RequireAdmin;
use crate::error::AppError;
use crate::models::BackupRecord;
use crate::services::content_selector::ContentSelection;
use crate::state::AppState;
use axum::body::Body;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use std::sync::Arc;
use tokio_util::io::ReaderStream;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/",
            get(list_backups).post(create_backup).delete(delete_backup),
        )
        .route("/{id}/download", get(download_backup))
}

async fn list_backups(
    _admin: RequireAdmin,
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<BackupRecord>>, AppError> {
    let records = state.backups.list().await?;
    Ok(Json(records))
}

async fn create_backup(
    _admin: RequireAdmin,
    State(state): State<Arc<AppState>>,
    body: Result<Option<Json<ContentSelection>>, JsonRejection>,
) -> Result<(StatusCode, Json<BackupRecord>), AppError> {
    // No body at all means every component.
    let selection = match body {
        Ok(Some(Json(selection))) => selection,
        Ok(None) => ContentSelection::default(),
        Err(rejection) => {
            return Err(AppError::BadRequest(format!(
                "Invalid backup selection: {}",
                rejection.body_text()
            )))
        }
    };
    let record = state.backups.create(selection).await?;
    Ok((StatusCode::CREATED, Json(record)))
}

#[derive(Deserialize)]
pub struct DeleteQuery {
    pub id: Option<String>,
}

async fn delete_backup(
    _admin: RequireAdmin,
    State(state): State<Arc<AppState>>,
    Query(query): Query<DeleteQuery>,
) -> Result<Json<serde_json::Value>, AppError> {
    let id = query
        .id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| AppError::BadRequest("Missing backup ID".into()))?;

    state.backups.delete(&id).await?;
    Ok(Json(serde_json::json!({ "message": "Backup deleted" })))
}

async fn download_backup(
    _admin: RequireAdmin,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let download = state.backups.open_download(&id).await?;

    let disposition = format!("attachment; filename=\"{}\"", download.filename);
    let body = Body::from_stream(ReaderStream::new(download.file));

    Ok((
        [
            (header::CONTENT_TYPE, "application/gzip".to_string()),
            (header::CONTENT_LENGTH, download.size.to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        body,
    ))
}
