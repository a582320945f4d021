use axum::http::StatusCode;
use axum::response::Response;

use super::model::{CreateProjectPayload, UpdateProjectPayload};
use super::service::{create_project, update_project};
use crate::respond;
use crate::store::Collection;

/// HTTP Handler: POST /projects
pub async fn create_project_handler(projects: &dyn Collection, body: &[u8]) -> Response {
    let payload: CreateProjectPayload = match crate::parse_json(body) {
        Ok(payload) => payload,
        Err(e) => return respond::error(&e),
    };

    respond::result(StatusCode::CREATED, create_project(projects, payload).await)
}

/// HTTP Handler: PUT /projects/{id}
pub async fn update_project_handler(projects: &dyn Collection, project_id: &str, body: &[u8]) -> Response {
    let payload: UpdateProjectPayload = match crate::parse_json(body) {
        Ok(payload) => payload,
        Err(e) => return respond::error(&e),
    };

    respond::result(StatusCode::OK, update_project(projects, project_id, payload).await)
}
