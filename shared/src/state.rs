use std::sync::Arc;

use annotator_atoms::files::FileStore;
use annotator_atoms::images::UploadLimits;
use annotator_atoms::store::Collection;

/// Everything a handler may touch, injected once at startup.
#[derive(Clone)]
pub struct AppState {
    pub images: Arc<dyn Collection>,
    pub projects: Arc<dyn Collection>,
    pub files: Arc<FileStore>,
    pub limits: UploadLimits,
}

impl AppState {
    pub fn new(
        images: Arc<dyn Collection>,
        projects: Arc<dyn Collection>,
        files: FileStore,
        limits: UploadLimits,
    ) -> Self {
        Self {
            images,
            projects,
            files: Arc::new(files),
            limits,
        }
    }
}
