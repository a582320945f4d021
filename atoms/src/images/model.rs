use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Annotation payload attached to an image. Its shape belongs to the client.
pub type GroundTruth = Map<String, Value>;

/// Image domain model - an uploaded file plus its annotation data
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Image {
    pub id: String,
    /// Stored name, relative to the upload directory.
    pub filename: String,
    pub original_name: String,
    /// Public path, `/uploads/<filename>`.
    pub path: String,
    pub content_type: String,
    pub size: u64,
    #[serde(default)]
    pub ground_truth: Option<GroundTruth>,
    #[serde(default)]
    pub ground_truth_updated_at: Option<String>,
    #[serde(default)]
    pub project_id: Option<String>,
    pub uploaded_at: String,
}

/// One file part of an upload request, already read into memory.
#[derive(Debug, Clone)]
pub struct UploadFile {
    pub original_name: String,
    pub data: Bytes,
}

#[derive(Debug, Clone, Default)]
pub struct UploadRequest {
    pub project_id: Option<String>,
    pub files: Vec<UploadFile>,
}

#[derive(Debug, Clone, Copy)]
pub struct UploadLimits {
    pub max_file_bytes: usize,
}

impl Default for UploadLimits {
    fn default() -> Self {
        Self {
            max_file_bytes: 20 * 1024 * 1024,
        }
    }
}

/// Body of `POST /images/save-groundtruth`.
///
/// Accepts either `{imageId, groundTruth}` or the annotation client's native
/// `{image_id, annotations, meta, ...}`; unknown fields are ignored.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveGroundTruthPayload {
    #[serde(default, alias = "image_id")]
    pub image_id: Option<String>,
    #[serde(default, alias = "groundtruth")]
    pub ground_truth: Option<Value>,
    #[serde(default)]
    pub annotations: Option<Value>,
    #[serde(default)]
    pub meta: Option<Value>,
}
