use axum::extract::multipart::{Field, MultipartError};
use axum::extract::Multipart;
use axum::http::StatusCode;
use axum::response::Response;
use bytes::BytesMut;
use serde_json::json;

use super::model::{SaveGroundTruthPayload, UploadFile, UploadLimits, UploadRequest};
use super::service::{delete_image, get_image, save_ground_truth, upload_images};
use crate::error::Error;
use crate::files::FileStore;
use crate::respond;
use crate::store::Collection;

fn multipart_error(e: MultipartError) -> Error {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        Error::PayloadTooLarge(e.body_text())
    } else {
        Error::bad_request(format!("invalid multipart body: {}", e.body_text()))
    }
}

/// Read a file part chunk by chunk, bailing out as soon as it exceeds the limit.
async fn read_file(mut field: Field<'_>, original_name: String, limits: &UploadLimits) -> Result<UploadFile, Error> {
    let mut data = BytesMut::new();
    while let Some(chunk) = field.chunk().await.map_err(multipart_error)? {
        if data.len() + chunk.len() > limits.max_file_bytes {
            return Err(Error::PayloadTooLarge(format!(
                "file '{}' is larger than {} bytes",
                original_name, limits.max_file_bytes
            )));
        }
        data.extend_from_slice(&chunk);
    }
    Ok(UploadFile {
        original_name,
        data: data.freeze(),
    })
}

/// Collect the file parts and the optional `projectId` text field. Any part
/// carrying a filename is a file; other text fields are ignored.
pub async fn parse_upload_form(mut form: Multipart, limits: &UploadLimits) -> Result<UploadRequest, Error> {
    let mut request = UploadRequest::default();

    while let Some(field) = form.next_field().await.map_err(multipart_error)? {
        if let Some(original_name) = field.file_name().map(str::to_string) {
            request.files.push(read_file(field, original_name, limits).await?);
            continue;
        }

        if matches!(field.name(), Some("projectId" | "project_id")) {
            let value = field.text().await.map_err(multipart_error)?;
            request.project_id = Some(value);
        }
    }

    Ok(request)
}

/// HTTP Handler: POST /images/upload
pub async fn upload_images_handler(
    images: &dyn Collection,
    projects: &dyn Collection,
    files: &FileStore,
    limits: &UploadLimits,
    form: Multipart,
) -> Response {
    let request = match parse_upload_form(form, limits).await {
        Ok(request) => request,
        Err(e) => return respond::error(&e),
    };

    tracing::info!(
        "📥 upload: {} file(s), project={:?}",
        request.files.len(),
        request.project_id
    );

    match upload_images(images, projects, files, request, limits).await {
        Ok(uploaded) => respond::json(StatusCode::CREATED, &uploaded),
        Err(failure) if failure.uploaded.is_empty() => respond::error(&failure.error),
        Err(failure) => {
            tracing::error!(
                "❌ upload stopped after {} file(s): {}",
                failure.uploaded.len(),
                failure.error
            );
            respond::json(
                failure.error.status_code(),
                &json!({
                    "error": failure.error.status_code().canonical_reason().unwrap_or("Error"),
                    "message": failure.error.to_string(),
                    "uploaded": failure.uploaded,
                }),
            )
        }
    }
}

/// HTTP Handler: POST /images/save-groundtruth
pub async fn save_ground_truth_handler(images: &dyn Collection, body: &[u8]) -> Response {
    let payload: SaveGroundTruthPayload = match crate::parse_json(body) {
        Ok(payload) => payload,
        Err(e) => return respond::error(&e),
    };

    respond::result(StatusCode::OK, save_ground_truth(images, payload).await)
}

/// HTTP Handler: GET /images/{id}
pub async fn get_image_handler(images: &dyn Collection, image_id: &str) -> Response {
    respond::result(StatusCode::OK, get_image(images, image_id).await)
}

/// HTTP Handler: DELETE /images/{id}
pub async fn delete_image_handler(images: &dyn Collection, files: &FileStore, image_id: &str) -> Response {
    let result = delete_image(images, files, image_id)
        .await
        .map(|image| json!({"message": "Image deleted successfully", "id": image.id}));
    respond::result(StatusCode::OK, result)
}
