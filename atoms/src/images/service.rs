use image::ImageFormat;
use serde_json::{json, Map, Value};

use super::model::{GroundTruth, Image, SaveGroundTruthPayload, UploadFile, UploadLimits, UploadRequest};
use crate::error::{Error, Result};
use crate::files::{FileStore, FileStoreError};
use crate::projects::service::get_project;
use crate::store::{from_document, to_document, Collection, Document, Filter};

/// Field holding the back-reference to the owning project.
pub const PROJECT_ID_FIELD: &str = "projectId";

/// An upload that stopped part way. `uploaded` holds the images stored
/// before the failure; they are kept.
#[derive(Debug)]
pub struct UploadFailure {
    pub error: Error,
    pub uploaded: Vec<Image>,
}

impl From<Error> for UploadFailure {
    fn from(error: Error) -> Self {
        Self {
            error,
            uploaded: Vec::new(),
        }
    }
}

/// Formats accepted for upload: (extension, MIME type).
fn accepted_format(format: ImageFormat) -> Option<(&'static str, &'static str)> {
    match format {
        ImageFormat::Png => Some(("png", "image/png")),
        ImageFormat::Jpeg => Some(("jpg", "image/jpeg")),
        ImageFormat::Gif => Some(("gif", "image/gif")),
        ImageFormat::WebP => Some(("webp", "image/webp")),
        ImageFormat::Bmp => Some(("bmp", "image/bmp")),
        ImageFormat::Tiff => Some(("tiff", "image/tiff")),
        _ => None,
    }
}

/// Check one file against the upload limits and sniff its format from the bytes.
pub fn validate_upload(file: &UploadFile, limits: &UploadLimits) -> Result<(&'static str, &'static str)> {
    if file.data.is_empty() {
        return Err(Error::bad_request(format!("file '{}' is empty", file.original_name)));
    }
    if file.data.len() > limits.max_file_bytes {
        return Err(Error::PayloadTooLarge(format!(
            "file '{}' is larger than {} bytes",
            file.original_name, limits.max_file_bytes
        )));
    }

    image::guess_format(&file.data)
        .ok()
        .and_then(accepted_format)
        .ok_or_else(|| {
            Error::bad_request(format!(
                "file '{}' is not a supported image (png, jpeg, gif, webp, bmp, tiff)",
                file.original_name
            ))
        })
}

/// Store every file and record an image for each.
///
/// All files are validated (and the target project checked) before anything
/// is written. Past that point each file is independent: a failed write or
/// insert stops the loop, removes that file's bytes, and reports the images
/// already stored. If the target project is gone once the loop finishes,
/// everything stored is removed again and the upload is a 404.
pub async fn upload_images(
    images: &dyn Collection,
    projects: &dyn Collection,
    files: &FileStore,
    request: UploadRequest,
    limits: &UploadLimits,
) -> std::result::Result<Vec<Image>, UploadFailure> {
    if request.files.is_empty() {
        return Err(Error::bad_request("no files in upload").into());
    }

    let formats = request
        .files
        .iter()
        .map(|file| validate_upload(file, limits))
        .collect::<Result<Vec<_>>>()?;

    let project_id = match request.project_id.as_deref().map(str::trim) {
        Some("") | None => None,
        Some(project_id) => Some(get_project(projects, project_id).await?.id),
    };

    let mut uploaded = Vec::with_capacity(request.files.len());

    for (file, (extension, content_type)) in request.files.iter().zip(formats) {
        let stored = match files.save(&file.original_name, &file.data, extension).await {
            Ok(stored) => stored,
            Err(e) => {
                return Err(UploadFailure {
                    error: e.into(),
                    uploaded,
                })
            }
        };

        let image = Image {
            id: uuid::Uuid::new_v4().to_string(),
            filename: stored.filename.clone(),
            original_name: file.original_name.clone(),
            path: stored.url_path,
            content_type: content_type.to_string(),
            size: stored.size,
            ground_truth: None,
            ground_truth_updated_at: None,
            project_id: project_id.clone(),
            uploaded_at: crate::timestamp(),
        };

        let inserted = match to_document(&image) {
            Ok(doc) => images.insert_one(doc).await,
            Err(e) => Err(e),
        };

        if let Err(e) = inserted {
            if let Err(cleanup) = files.remove(&stored.filename).await {
                tracing::warn!("⚠️ could not remove {} after failed insert: {}", stored.filename, cleanup);
            }
            return Err(UploadFailure {
                error: e.into(),
                uploaded,
            });
        }

        tracing::info!(
            "✅ stored image {} ({} bytes) as {} project={:?}",
            image.id,
            image.size,
            image.filename,
            image.project_id
        );
        uploaded.push(image);
    }

    // The project may have been deleted while files were written. Its cascade
    // cannot see images inserted after its member lookup, so drop them here.
    if let Some(project_id) = &project_id {
        match projects.find_by_id(project_id).await {
            Ok(Some(_)) => {}
            Ok(None) => {
                tracing::warn!(
                    "⚠️ project {} was deleted during upload, discarding {} image(s)",
                    project_id,
                    uploaded.len()
                );
                discard_images(images, files, &uploaded).await;
                return Err(Error::not_found("project", project_id).into());
            }
            Err(e) => {
                return Err(UploadFailure {
                    error: e.into(),
                    uploaded,
                })
            }
        }
    }

    Ok(uploaded)
}

async fn discard_images(images: &dyn Collection, files: &FileStore, uploaded: &[Image]) {
    for image in uploaded {
        match delete_image(images, files, &image.id).await {
            Ok(_) | Err(Error::NotFound(_)) => {}
            Err(e) => tracing::warn!("⚠️ could not discard image {}: {}", image.id, e),
        }
    }
}

/// Get a specific image
pub async fn get_image(images: &dyn Collection, image_id: &str) -> Result<Image> {
    match images.find_by_id(image_id).await? {
        Some(doc) => Ok(from_document(doc)?),
        None => Err(Error::not_found("image", image_id)),
    }
}

/// Images whose back-reference points at `project_id`, in upload order
pub async fn load_images_for_project(images: &dyn Collection, project_id: &str) -> Result<Vec<Image>> {
    let mut found = images
        .find(&Filter::eq(PROJECT_ID_FIELD, project_id))
        .await?
        .into_iter()
        .map(from_document::<Image>)
        .collect::<std::result::Result<Vec<_>, _>>()?;

    found.sort_by(|a, b| a.uploaded_at.cmp(&b.uploaded_at).then_with(|| a.id.cmp(&b.id)));
    Ok(found)
}

/// Turn the request body into the ground-truth document to store.
pub fn resolve_ground_truth(payload: SaveGroundTruthPayload) -> Result<(String, GroundTruth)> {
    let image_id = payload
        .image_id
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
        .ok_or_else(|| Error::bad_request("imageId is required"))?;

    let ground_truth = match (payload.ground_truth, payload.annotations) {
        (Some(Value::Object(map)), _) => map,
        (Some(_), _) => return Err(Error::bad_request("groundTruth must be a JSON object")),
        (None, Some(annotations)) => {
            let mut map = Map::new();
            map.insert("annotations".to_string(), annotations);
            match payload.meta {
                Some(meta @ Value::Object(_)) => {
                    map.insert("meta".to_string(), meta);
                }
                Some(Value::Null) | None => {}
                Some(_) => return Err(Error::bad_request("meta must be a JSON object")),
            }
            map
        }
        (None, None) => return Err(Error::bad_request("groundTruth is required")),
    };

    Ok((image_id, ground_truth))
}

/// Replace an image's ground truth. Never creates an image.
pub async fn save_ground_truth(images: &dyn Collection, payload: SaveGroundTruthPayload) -> Result<Image> {
    let (image_id, ground_truth) = resolve_ground_truth(payload)?;

    let mut fields = Document::new();
    fields.insert("groundTruth".to_string(), Value::Object(ground_truth));
    fields.insert("groundTruthUpdatedAt".to_string(), json!(crate::timestamp()));

    if !images.update_by_id(&image_id, fields).await? {
        return Err(Error::not_found("image", &image_id));
    }

    tracing::info!("✅ saved ground truth for image {}", image_id);
    get_image(images, &image_id).await
}

/// Point an image at a project, or detach it with `None`.
pub async fn set_image_project(images: &dyn Collection, image_id: &str, project_id: Option<&str>) -> Result<()> {
    let mut fields = Document::new();
    fields.insert(PROJECT_ID_FIELD.to_string(), json!(project_id));

    if !images.update_by_id(image_id, fields).await? {
        return Err(Error::not_found("image", image_id));
    }
    Ok(())
}

/// Delete an image and its file. The file goes first: if it cannot be
/// removed the record stays, so the request can be retried.
pub async fn delete_image(images: &dyn Collection, files: &FileStore, image_id: &str) -> Result<Image> {
    let image = get_image(images, image_id).await?;

    match files.remove(&image.filename).await {
        Ok(()) => {}
        Err(FileStoreError::NotFound(_)) => {
            tracing::warn!("⚠️ file {} of image {} was already gone", image.filename, image.id);
        }
        Err(e) => return Err(e.into()),
    }

    if !images.delete_by_id(image_id).await? {
        return Err(Error::not_found("image", image_id));
    }

    tracing::info!("🗑️ deleted image {} ({})", image.id, image.filename);
    Ok(image)
}
