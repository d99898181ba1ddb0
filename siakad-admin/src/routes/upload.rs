use std::path::Path;
use std::sync::Arc;

use axum::extract::multipart::MultipartError;
use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use serde::Serialize;

use siakad_shared::errors::{AppError, AppResult, ErrorCode};
use siakad_shared::types::api::ApiResponse;
use siakad_shared::types::session::AuthUser;

use crate::services::upload_service;
use crate::AppState;

/// Multipart framing allowance on top of the image size limit.
pub const MULTIPART_OVERHEAD: usize = 64 * 1024;

#[derive(Debug, Serialize)]
pub struct UploadedAvatar {
    pub url: String,
}

fn multipart_error(err: MultipartError) -> AppError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::new(ErrorCode::ImageTooLarge, "Ukuran gambar terlalu besar")
    } else {
        AppError::new(ErrorCode::UploadFailed, format!("Upload gagal: {}", err.body_text()))
    }
}

// --- POST /api/upload/avatar ---

pub async fn upload_avatar(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    mut multipart: Multipart,
) -> AppResult<Json<ApiResponse<UploadedAvatar>>> {
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.file_name().is_none() {
            continue;
        }
        let content_type = field.content_type().unwrap_or_default().to_string();
        // Reject before buffering the body.
        upload_service::image_extension(&content_type)?;

        let bytes = field.bytes().await.map_err(multipart_error)?;
        let url = upload_service::save_avatar(
            Path::new(&state.config.avatar_dir),
            &content_type,
            &bytes,
            state.config.avatar_max_bytes,
            Utc::now().timestamp_millis(),
        )
        .await?;

        tracing::debug!(user_id = user.id, url = %url, "avatar stored");
        return Ok(Json(ApiResponse::ok(UploadedAvatar { url })));
    }

    Err(AppError::incomplete("File gambar wajib diunggah"))
}
