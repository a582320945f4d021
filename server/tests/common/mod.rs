//! Common test utilities and fixtures.

#![allow(dead_code)]

use std::sync::Arc;

use annotator_atoms::files::FileStore;
use annotator_atoms::images::UploadLimits;
use annotator_atoms::store::{Collection, MemoryCollection};
use annotator_server::create_router;
use annotator_shared::config::AllowedOrigins;
use annotator_shared::cors::cors_layer;
use annotator_shared::AppState;
use axum::http::StatusCode;
use axum::Router;
use axum_test::multipart::{MultipartForm, Part};
use axum_test::TestServer;
use serde_json::{json, Value};
use tempfile::TempDir;

pub const ALLOWED_ORIGIN: &str = "http://localhost:5173";

/// Smallest byte string the format sniffer recognises as PNG.
pub const PNG: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR\0\0\0\x01\0\0\0\x01";

pub const MAX_REQUEST_BYTES: usize = 8 * 1024 * 1024;

pub struct TestApp {
    pub server: TestServer,
    pub state: AppState,
    pub images: Arc<MemoryCollection>,
    pub projects: Arc<MemoryCollection>,
    uploads: TempDir,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_limits(UploadLimits::default()).await
    }

    pub async fn with_limits(limits: UploadLimits) -> Self {
        let uploads = tempfile::tempdir().expect("temp dir should be created");
        let files = FileStore::new(uploads.path())
            .await
            .expect("file store should open");
        let images = Arc::new(MemoryCollection::new("test.images"));
        let projects = Arc::new(MemoryCollection::new("test.projects"));
        let state = AppState::new(
            images.clone() as Arc<dyn Collection>,
            projects.clone() as Arc<dyn Collection>,
            files,
            limits,
        );
        let server = TestServer::new(router(state.clone())).expect("test server should build properly");
        Self {
            server,
            state,
            images,
            projects,
            uploads,
        }
    }

    pub fn uploads_dir(&self) -> &std::path::Path {
        self.uploads.path()
    }

    /// Number of files currently in the upload directory.
    pub fn stored_file_count(&self) -> usize {
        std::fs::read_dir(self.uploads.path())
            .expect("upload dir should be readable")
            .count()
    }

    pub async fn create_project(&self, name: &str) -> Value {
        let response = self
            .server
            .post("/projects")
            .json(&json!({ "name": name }))
            .await;
        response.assert_status(StatusCode::CREATED);
        response.json()
    }

    /// Upload `names` as PNG files and return the created image records.
    pub async fn upload(&self, names: &[&str], project_id: Option<&str>) -> Vec<Value> {
        let mut form = MultipartForm::new();
        for name in names {
            form = form.add_part("files", png_part(name));
        }
        if let Some(project_id) = project_id {
            form = form.add_text("projectId", project_id);
        }
        let response = self.server.post("/images/upload").multipart(form).await;
        response.assert_status(StatusCode::CREATED);
        response.json()
    }
}

pub fn router(state: AppState) -> Router {
    let origins: AllowedOrigins = ALLOWED_ORIGIN.parse().expect("origin should parse");
    let cors = cors_layer(&origins).expect("cors layer should build");
    create_router(state, cors, MAX_REQUEST_BYTES)
}

pub fn png_part(name: &str) -> Part {
    Part::bytes(PNG.to_vec())
        .file_name(name.to_string())
        .mime_type("image/png")
}

pub fn id_of(record: &Value) -> String {
    record["id"].as_str().expect("record should have an id").to_string()
}
