//! Route configuration.

use annotator_atoms::files::UPLOADS_URL_PREFIX;
use annotator_atoms::{images, projects, respond};
use annotator_shared::AppState;
use axum::extract::multipart::MultipartRejection;
use axum::extract::{DefaultBodyLimit, Multipart, Path, Request, State};
use axum::http::header::{HeaderValue, CONTENT_LENGTH, CONTENT_TYPE};
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{delete, get, post};
use axum::Router;
use bytes::Bytes;
use tower::{Layer, ServiceBuilder};
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::normalize_path::{NormalizePath, NormalizePathLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

/// Create the application router.
pub fn create_router(state: AppState, cors: CorsLayer, max_request_bytes: usize) -> Router {
    let uploads = ServiceBuilder::new()
        .layer(middleware::from_fn(hide_dot_files))
        .service(ServeDir::new(state.files.root()));

    Router::new()
        // Images
        .route("/images/upload", post(upload_images))
        .route("/images/save-groundtruth", post(save_ground_truth))
        .route("/images/{id}", get(get_image).delete(delete_image))
        // Projects
        .route("/projects", get(list_projects).post(create_project))
        .route(
            "/projects/{id}",
            get(get_project).put(update_project).delete(delete_project),
        )
        .route(
            "/projects/{id}/images",
            get(list_project_images).post(assign_images),
        )
        .route("/projects/{id}/images/{image_id}", delete(detach_image))
        // Stored files
        .nest_service(UPLOADS_URL_PREFIX, uploads)
        .fallback(not_found)
        // Body size is enforced once, for every extractor, by the limit layer.
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(max_request_bytes))
        .layer(middleware::map_response(json_error_bodies))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// The router as served: `/projects/` and `/projects` are the same route.
pub fn app(state: AppState, cors: CorsLayer, max_request_bytes: usize) -> NormalizePath<Router> {
    NormalizePathLayer::trim_trailing_slash().layer(create_router(state, cors, max_request_bytes))
}

async fn not_found() -> Response {
    respond::message(StatusCode::NOT_FOUND, "route not found")
}

/// Largest plain-text error body carried over into the JSON message.
const MAX_ERROR_TEXT: usize = 4 * 1024;

/// Give error responses built outside the handlers (body limit, static
/// files, extractor rejections, 405s) the same JSON body as the rest.
async fn json_error_bodies(response: Response) -> Response {
    let status = response.status();
    let is_json = response
        .headers()
        .get(CONTENT_TYPE)
        .is_some_and(|v| v.as_bytes().starts_with(b"application/json"));
    if is_json || !(status.is_client_error() || status.is_server_error()) {
        return response;
    }

    let (mut parts, body) = response.into_parts();
    let text = axum::body::to_bytes(body, MAX_ERROR_TEXT)
        .await
        .map(|bytes| String::from_utf8_lossy(&bytes).trim().to_string())
        .unwrap_or_default();
    let message = if text.is_empty() {
        status.canonical_reason().unwrap_or("error").to_lowercase()
    } else {
        text
    };

    let (_, body) = respond::message(status, &message).into_parts();
    parts.headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    parts.headers.remove(CONTENT_LENGTH);
    Response::from_parts(parts, body)
}

/// Names starting with a dot are in-flight writes, never stored images.
async fn hide_dot_files(request: Request, next: Next) -> Response {
    let hidden = request.uri().path().split('/').any(|segment| {
        segment.starts_with('.') || segment.get(..3).is_some_and(|s| s.eq_ignore_ascii_case("%2e"))
    });
    if hidden {
        return respond::message(StatusCode::NOT_FOUND, "file not found");
    }
    next.run(request).await
}

// ========== IMAGES ==========
async fn upload_images(
    State(state): State<AppState>,
    form: Result<Multipart, MultipartRejection>,
) -> Response {
    let form = match form {
        Ok(form) => form,
        Err(rejection) => {
            return respond::message(
                StatusCode::BAD_REQUEST,
                &format!("expected a multipart/form-data body: {}", rejection.body_text()),
            )
        }
    };
    images::upload_images_handler(
        state.images.as_ref(),
        state.projects.as_ref(),
        &state.files,
        &state.limits,
        form,
    )
    .await
}

async fn save_ground_truth(State(state): State<AppState>, body: Bytes) -> Response {
    images::save_ground_truth_handler(state.images.as_ref(), &body).await
}

async fn get_image(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    images::get_image_handler(state.images.as_ref(), &id).await
}

async fn delete_image(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    images::delete_image_handler(state.images.as_ref(), &state.files, &id).await
}

// ========== PROJECTS ==========
async fn list_projects(State(state): State<AppState>) -> Response {
    projects_block::list_projects_handler(state.projects.as_ref(), state.images.as_ref()).await
}

async fn create_project(State(state): State<AppState>, body: Bytes) -> Response {
    projects::create_project_handler(state.projects.as_ref(), &body).await
}

async fn get_project(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    projects_block::get_project_handler(state.projects.as_ref(), state.images.as_ref(), &id).await
}

async fn update_project(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Bytes,
) -> Response {
    projects::update_project_handler(state.projects.as_ref(), &id, &body).await
}

async fn delete_project(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    projects_block::delete_project_handler(
        state.projects.as_ref(),
        state.images.as_ref(),
        &state.files,
        &id,
    )
    .await
}

// ========== MEMBERSHIP ==========
async fn list_project_images(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    projects_block::list_project_images_handler(state.projects.as_ref(), state.images.as_ref(), &id)
        .await
}

async fn assign_images(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Bytes,
) -> Response {
    projects_block::assign_images_handler(state.projects.as_ref(), state.images.as_ref(), &id, &body)
        .await
}

async fn detach_image(
    State(state): State<AppState>,
    Path((id, image_id)): Path<(String, String)>,
) -> Response {
    projects_block::detach_image_handler(
        state.projects.as_ref(),
        state.images.as_ref(),
        &id,
        &image_id,
    )
    .await
}
