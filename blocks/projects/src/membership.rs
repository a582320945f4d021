use annotator_atoms::images::{self, Image};
use annotator_atoms::projects;
use annotator_atoms::respond;
use annotator_atoms::store::Collection;
use annotator_atoms::{Error, Result};
use axum::http::StatusCode;
use axum::response::Response;

use crate::projects::get_project_with_images;
use crate::types::{AssignImagesPayload, ProjectWithImages};

/// Attach existing images to a project. Every id is checked before the first
/// write, so an unknown id leaves all memberships untouched. Images already in
/// another project are moved.
pub async fn assign_images(
    projects: &dyn Collection,
    images: &dyn Collection,
    project_id: &str,
    payload: AssignImagesPayload,
) -> Result<ProjectWithImages> {
    let mut image_ids: Vec<String> = Vec::with_capacity(payload.image_ids.len());
    for id in payload.image_ids {
        let id = id.trim().to_string();
        if !id.is_empty() && !image_ids.contains(&id) {
            image_ids.push(id);
        }
    }
    if image_ids.is_empty() {
        return Err(Error::bad_request("imageIds must be a non-empty array of image ids"));
    }

    // STEP 1: Validate the project and every image
    projects::get_project(projects, project_id).await?;
    for id in &image_ids {
        images::get_image(images, id).await?;
    }

    // STEP 2: Point each image at the project
    for id in &image_ids {
        images::set_image_project(images, id, Some(project_id)).await?;
    }

    // The project may have been deleted while we were writing; undo rather
    // than leave images pointing at nothing.
    if projects.find_by_id(project_id).await?.is_none() {
        for id in &image_ids {
            if let Err(e) = images::set_image_project(images, id, None).await {
                tracing::warn!("⚠️ could not detach image {} from deleted project: {}", id, e);
            }
        }
        return Err(Error::not_found("project", project_id));
    }

    tracing::info!("🔗 assigned {} image(s) to project {}", image_ids.len(), project_id);
    get_project_with_images(projects, images, project_id).await
}

/// Remove one image from a project. The image and its file stay.
pub async fn detach_image(
    projects: &dyn Collection,
    images: &dyn Collection,
    project_id: &str,
    image_id: &str,
) -> Result<Image> {
    projects::get_project(projects, project_id).await?;
    let mut image = images::get_image(images, image_id).await?;

    if image.project_id.as_deref() != Some(project_id) {
        return Err(Error::NotFound(format!(
            "image '{image_id}' in project '{project_id}'"
        )));
    }

    images::set_image_project(images, image_id, None).await?;
    image.project_id = None;
    Ok(image)
}

/// HTTP handler: POST /projects/{id}/images
pub async fn assign_images_handler(
    projects: &dyn Collection,
    images: &dyn Collection,
    project_id: &str,
    body: &[u8],
) -> Response {
    let payload: AssignImagesPayload = match annotator_atoms::parse_json(body) {
        Ok(payload) => payload,
        Err(e) => return respond::error(&e),
    };

    respond::result(
        StatusCode::OK,
        assign_images(projects, images, project_id, payload).await,
    )
}

/// HTTP handler: DELETE /projects/{id}/images/{imageId}
pub async fn detach_image_handler(
    projects: &dyn Collection,
    images: &dyn Collection,
    project_id: &str,
    image_id: &str,
) -> Response {
    respond::result(
        StatusCode::OK,
        detach_image(projects, images, project_id, image_id).await,
    )
}
