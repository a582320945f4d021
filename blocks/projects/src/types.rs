use annotator_atoms::images::Image;
use annotator_atoms::projects::Project;
use serde::{Deserialize, Serialize};

// ========== PROJECT RESPONSES ==========
/// A project with its member images, as returned by `GET /projects/{id}`.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ProjectWithImages {
    #[serde(flatten)]
    pub project: Project,
    #[serde(default)]
    pub images: Vec<Image>,
}

/// A list entry of `GET /projects`.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProjectSummary {
    #[serde(flatten)]
    pub project: Project,
    pub image_count: usize,
}

// ========== MEMBERSHIP ==========
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignImagesPayload {
    #[serde(default, alias = "image_ids")]
    pub image_ids: Vec<String>,
}
