//! HTTP surface: upload, fetch and list images.

use crate::app::AppState;
use crate::compress;
use crate::mime::content_type_for_name;
use crate::{Error, Result};
use axum::{
    extract::{multipart::MultipartError, DefaultBodyLimit, Multipart, Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info};

/// Room for multipart boundaries and part headers on top of the file itself.
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;
const MAX_NAME_BYTES: usize = 1024;

pub fn router(state: AppState) -> Router {
    let body_limit = state
        .max_upload_bytes
        .saturating_add(MULTIPART_OVERHEAD_BYTES);

    Router::new()
        .route("/upload-image", post(upload_image))
        .route("/get-image/", get(missing_image_name))
        .route("/get-image/:image", get(get_image))
        .route("/list-images", get(list_images))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct ImageList {
    pub images: Vec<String>,
}

async fn upload_image(State(state): State<AppState>, mut multipart: Multipart) -> Result<String> {
    let (name, data) = read_file_field(&mut multipart, state.max_upload_bytes).await?;
    validate_object_name(&name)?;

    let original_bytes = data.len();
    let settings = state.compression;
    let result =
        tokio::task::spawn_blocking(move || compress::compress_with(&data, &settings)).await??;

    info!(
        name = %name,
        original_bytes,
        compressed_bytes = result.bytes.len(),
        quality = result.final_quality,
        attempts = result.attempts,
        format = result.format_label(),
        "Compressed upload"
    );

    state
        .store
        .put(&state.container, &name, &result.bytes, result.content_type())
        .await?;

    Ok(format!(
        "Image '{}' compressed and uploaded successfully.",
        name
    ))
}

async fn get_image(
    State(state): State<AppState>,
    Path(image): Path<String>,
) -> Result<impl IntoResponse> {
    if image.is_empty() {
        return Err(missing_name_error());
    }

    let bytes = state.store.get(&state.container, &image).await?;
    Ok(([(header::CONTENT_TYPE, content_type_for_name(&image))], bytes))
}

async fn missing_image_name() -> Error {
    missing_name_error()
}

async fn list_images(State(state): State<AppState>) -> Result<Json<ImageList>> {
    let images = state.store.list(&state.container).await?;
    Ok(Json(ImageList { images }))
}

fn missing_name_error() -> Error {
    Error::Validation("image name must not be empty".to_string())
}

/// Pull the `file` part out of the form, enforcing the size cap while reading.
async fn read_file_field(
    multipart: &mut Multipart,
    max_bytes: usize,
) -> Result<(String, Vec<u8>)> {
    while let Some(mut field) = multipart.next_field().await.map_err(invalid_multipart)? {
        if field.name() != Some("file") {
            continue;
        }

        let name = field
            .file_name()
            .map(str::to_string)
            .ok_or_else(|| Error::Validation("'file' field has no filename".to_string()))?;

        let mut data = Vec::new();
        while let Some(chunk) = field.chunk().await.map_err(invalid_multipart)? {
            if data.len() + chunk.len() > max_bytes {
                return Err(Error::Validation(format!(
                    "file exceeds the {} byte upload limit",
                    max_bytes
                )));
            }
            data.extend_from_slice(&chunk);
        }

        if data.is_empty() {
            return Err(Error::Validation("uploaded file is empty".to_string()));
        }
        return Ok((name, data));
    }

    Err(Error::Validation("missing 'file' field".to_string()))
}

fn invalid_multipart(err: MultipartError) -> Error {
    Error::Validation(format!("malformed multipart body: {}", err.body_text()))
}

/// Reject names that could address something other than a single flat object.
pub fn validate_object_name(name: &str) -> Result<()> {
    let reason = if name.is_empty() {
        Some("must not be empty")
    } else if name.len() > MAX_NAME_BYTES {
        Some("is too long")
    } else if name.contains(['/', '\\']) {
        Some("must not contain path separators")
    } else if name.starts_with('.') {
        Some("must not start with '.'")
    } else if name.chars().any(char::is_control) {
        Some("must not contain control characters")
    } else {
        None
    };

    match reason {
        Some(reason) => Err(Error::Validation(format!("image name {}", reason))),
        None => Ok(()),
    }
}

impl Error {
    pub fn status(&self) -> StatusCode {
        match self {
            Error::Decode(_) | Error::Validation(_) => StatusCode::BAD_REQUEST,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::Encode(_)
            | Error::StoreUnavailable(_)
            | Error::Config(_)
            | Error::Task(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(source = ?self, "Error handling request");
            (status, "Failed to process request.").into_response()
        } else {
            debug!(source = ?self, "Rejected request");
            (status, self.to_string()).into_response()
        }
    }
}
