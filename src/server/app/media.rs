use std::sync::Arc;

use axum::{
    Json,
    body::Body,
    extract::{Path, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use chrono::Utc;
use tokio_util::io::ReaderStream;
use tracing::warn;
use uuid::Uuid;

use crate::auth::RequireUser;
use crate::media::{MAX_MEDIA_BYTES, MediaStorage, MediaStorageError};
use crate::server::AppState;
use crate::server::response::{ApiError, ApiResponse, StoreOptionExt, StoreResultExt};
use crate::types::MediaObject;

async fn parse_media_upload(
    multipart: &mut axum::extract::Multipart,
) -> Result<(Vec<u8>, String), ApiError> {
    let mut content: Option<Vec<u8>> = None;
    let mut content_type = "application/octet-stream".to_string();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("Failed to read multipart: {e}")))?
    {
        if field.name() == Some("file") {
            if let Some(ct) = field.content_type() {
                content_type = ct.to_string();
            }
            let data = field
                .bytes()
                .await
                .map_err(|e| ApiError::bad_request(format!("Failed to read file: {e}")))?;
            if data.len() > MAX_MEDIA_BYTES {
                return Err(ApiError::payload_too_large(format!(
                    "File size ({} bytes) exceeds maximum allowed size ({MAX_MEDIA_BYTES} bytes)",
                    data.len()
                )));
            }
            content = Some(data.to_vec());
        }
    }

    let content = content.ok_or_else(|| ApiError::bad_request("File field is required"))?;
    Ok((content, content_type))
}

/// POST /media
///
/// Blobs are content-addressed, so re-uploading the same bytes hands
/// back the existing object instead of minting a duplicate.
pub async fn upload(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    mut multipart: axum::extract::Multipart,
) -> Result<Response, ApiError> {
    let store = state.store.as_ref();

    let (content, content_type) = parse_media_upload(&mut multipart).await?;
    if content.is_empty() {
        return Err(ApiError::bad_request("File cannot be empty"));
    }

    let storage = MediaStorage::new(&state.data_dir);
    let oid = storage
        .put(&content)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to store media: {e}")))?;

    if let Some(existing) = store
        .get_media_by_oid(&auth.user.id, &oid)
        .api_err("Failed to check media")?
    {
        return Ok(Json(ApiResponse::success(existing)).into_response());
    }

    let media = MediaObject {
        id: Uuid::new_v4().to_string(),
        owner_id: auth.user.id.clone(),
        oid,
        size: content.len() as i64,
        content_type,
        created_at: Utc::now(),
    };

    store.create_media_object(&media).map_err(ApiError::from)?;

    Ok((StatusCode::CREATED, Json(ApiResponse::success(media))).into_response())
}

/// GET /media/{id}
///
/// Media is readable by any authenticated user; visibility is enforced
/// on the loops and profiles that reference it, not the bytes.
pub async fn download(
    _auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let media = state
        .store
        .get_media_object(&id)
        .api_err("Failed to get media")?
        .or_not_found("Media not found")?;

    let storage = MediaStorage::new(&state.data_dir);
    let (reader, size) = match storage.get(&media.oid).await {
        Ok(result) => result,
        Err(MediaStorageError::NotFound) => {
            return Err(ApiError::not_found("Media blob missing"));
        }
        Err(e) => {
            warn!("media storage error: {e}");
            return Err(ApiError::internal("Storage error"));
        }
    };

    let stream = ReaderStream::new(reader);
    let body = Body::from_stream(stream);

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, media.content_type)
        .header(header::CONTENT_LENGTH, size)
        .header("X-Content-Type-Options", "nosniff")
        .body(body)
        .map_err(|_| ApiError::internal("Failed to build response"))
}

/// DELETE /media/{id}
///
/// Drops the owner's reference; the blob itself goes only once nothing
/// else points at it.
pub async fn delete(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let store = state.store.as_ref();

    let media = store
        .get_media_object(&id)
        .api_err("Failed to get media")?
        .or_not_found("Media not found")?;

    if media.owner_id != auth.user.id {
        return Err(ApiError::forbidden("Media belongs to another user"));
    }

    store.delete_media_object(&id).map_err(ApiError::from)?;

    let refs = store
        .count_media_refs(&media.oid)
        .api_err("Failed to count media references")?;
    if refs == 0 {
        let storage = MediaStorage::new(&state.data_dir);
        if let Err(e) = storage.delete(&media.oid).await {
            warn!("failed to remove media blob {}: {e}", media.oid);
        }
    }

    Ok::<_, ApiError>(StatusCode::NO_CONTENT)
}
