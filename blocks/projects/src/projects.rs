use std::collections::HashMap;

use annotator_atoms::files::FileStore;
use annotator_atoms::images::{self, Image, PROJECT_ID_FIELD};
use annotator_atoms::projects;
use annotator_atoms::respond;
use annotator_atoms::store::{from_document, Collection, Filter};
use annotator_atoms::{Error, Result};
use axum::http::StatusCode;
use axum::response::Response;
use serde_json::json;

use crate::types::{ProjectSummary, ProjectWithImages};

/// Load a project and its images (Backend Join)
pub async fn get_project_with_images(
    projects: &dyn Collection,
    images: &dyn Collection,
    project_id: &str,
) -> Result<ProjectWithImages> {
    // 1. Fetch the project and its images in parallel
    let (project, members) = tokio::join!(
        projects::get_project(projects, project_id),
        images::load_images_for_project(images, project_id)
    );

    Ok(ProjectWithImages {
        project: project?,
        images: members?,
    })
}

/// All projects, oldest first, each with its image count
pub async fn list_project_summaries(
    projects: &dyn Collection,
    images: &dyn Collection,
) -> Result<Vec<ProjectSummary>> {
    let all_filter = Filter::all();
    let (all_projects, all_images) = tokio::join!(
        projects::list_projects(projects),
        images.find(&all_filter)
    );

    // Count images by project id
    let mut counts: HashMap<String, usize> = HashMap::new();
    for doc in all_images? {
        if let Some(project_id) = doc.get(PROJECT_ID_FIELD).and_then(|v| v.as_str()) {
            *counts.entry(project_id.to_string()).or_default() += 1;
        }
    }

    Ok(all_projects?
        .into_iter()
        .map(|project| ProjectSummary {
            image_count: counts.get(&project.id).copied().unwrap_or(0),
            project,
        })
        .collect())
}

/// Images of an existing project, in upload order
pub async fn list_project_images(
    projects: &dyn Collection,
    images: &dyn Collection,
    project_id: &str,
) -> Result<Vec<Image>> {
    Ok(get_project_with_images(projects, images, project_id).await?.images)
}

/// Delete a project together with its images and their files.
///
/// Images go first and the project record last: if anything fails midway
/// the project still exists, so no image is ever left pointing at a
/// project that is gone.
pub async fn delete_project(
    projects: &dyn Collection,
    images: &dyn Collection,
    files: &FileStore,
    project_id: &str,
) -> Result<usize> {
    // STEP 1: Make sure the project exists
    projects::get_project(projects, project_id).await?;

    // STEP 2: Delete member images (file, then record)
    let mut deleted = delete_member_images(images, files, project_id).await?;

    // STEP 3: Delete the project itself
    projects::delete_project_record(projects, project_id).await?;

    // STEP 4: Sweep images attached while steps 2-3 ran. Uploads and
    // assignments re-check the project after writing, so anything they
    // attached before the record went is visible here.
    deleted += delete_member_images(images, files, project_id).await?;

    tracing::info!("🗑️ deleted project {} and {} image(s)", project_id, deleted);
    Ok(deleted)
}

async fn delete_member_images(images: &dyn Collection, files: &FileStore, project_id: &str) -> Result<usize> {
    let members = images
        .find(&Filter::eq(PROJECT_ID_FIELD, project_id).consistent())
        .await?;
    let mut deleted = 0;
    for doc in members {
        let image: Image = from_document(doc)?;
        match images::delete_image(images, files, &image.id).await {
            Ok(_) => deleted += 1,
            // Deleted concurrently; nothing left to do for it.
            Err(Error::NotFound(_)) => {}
            Err(e) => return Err(e),
        }
    }
    Ok(deleted)
}

/// HTTP handler: GET /projects
pub async fn list_projects_handler(projects: &dyn Collection, images: &dyn Collection) -> Response {
    respond::result(StatusCode::OK, list_project_summaries(projects, images).await)
}

/// HTTP handler: GET /projects/{id}
pub async fn get_project_handler(
    projects: &dyn Collection,
    images: &dyn Collection,
    project_id: &str,
) -> Response {
    respond::result(
        StatusCode::OK,
        get_project_with_images(projects, images, project_id).await,
    )
}

/// HTTP handler: GET /projects/{id}/images
pub async fn list_project_images_handler(
    projects: &dyn Collection,
    images: &dyn Collection,
    project_id: &str,
) -> Response {
    respond::result(
        StatusCode::OK,
        list_project_images(projects, images, project_id).await,
    )
}

/// HTTP handler: DELETE /projects/{id}
pub async fn delete_project_handler(
    projects: &dyn Collection,
    images: &dyn Collection,
    files: &FileStore,
    project_id: &str,
) -> Response {
    let result = delete_project(projects, images, files, project_id)
        .await
        .map(|deleted| {
            json!({
                "message": "Project deleted successfully",
                "id": project_id,
                "deletedImages": deleted,
            })
        });
    respond::result(StatusCode::OK, result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::membership::assign_images;
    use crate::types::AssignImagesPayload;
    use annotator_atoms::images::{upload_images, UploadFile, UploadLimits, UploadRequest};
    use annotator_atoms::projects::{create_project, CreateProjectPayload};
    use annotator_atoms::store::{Document, MemoryCollection, StoreResult};
    use async_trait::async_trait;
    use bytes::Bytes;

    const PNG: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR";

    struct Fixture {
        projects: MemoryCollection,
        images: MemoryCollection,
        files: FileStore,
        _dir: tempfile::TempDir,
    }

    impl Fixture {
        async fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            Self {
                projects: MemoryCollection::new("projects"),
                images: MemoryCollection::new("images"),
                files: FileStore::new(dir.path()).await.unwrap(),
                _dir: dir,
            }
        }

        async fn project(&self, name: &str) -> String {
            let payload = CreateProjectPayload {
                name: Some(name.to_string()),
                description: None,
            };
            create_project(&self.projects, payload).await.unwrap().id
        }

        async fn upload(&self, project_id: Option<&str>, count: usize) -> Vec<Image> {
            let request = UploadRequest {
                project_id: project_id.map(str::to_string),
                files: (0..count)
                    .map(|i| UploadFile {
                        original_name: format!("page-{i}.png"),
                        data: Bytes::from_static(PNG),
                    })
                    .collect(),
            };
            upload_images(
                &self.images,
                &self.projects,
                &self.files,
                request,
                &UploadLimits::default(),
            )
            .await
            .unwrap()
        }
    }

    #[tokio::test]
    async fn new_project_has_no_images() {
        let fx = Fixture::new().await;
        let id = fx.project("empty").await;
        fx.upload(None, 2).await;

        let view = get_project_with_images(&fx.projects, &fx.images, &id).await.unwrap();
        assert_eq!(view.project.id, id);
        assert!(view.images.is_empty());
    }

    #[tokio::test]
    async fn unknown_project_is_not_found() {
        let fx = Fixture::new().await;
        assert!(matches!(
            get_project_with_images(&fx.projects, &fx.images, "nope").await,
            Err(Error::NotFound(_))
        ));
        assert!(matches!(
            delete_project(&fx.projects, &fx.images, &fx.files, "nope").await,
            Err(Error::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn summaries_count_member_images() {
        let fx = Fixture::new().await;
        let a = fx.project("a").await;
        let b = fx.project("b").await;
        fx.upload(Some(&a), 3).await;
        fx.upload(None, 1).await;

        let summaries = list_project_summaries(&fx.projects, &fx.images).await.unwrap();
        let counts: HashMap<_, _> = summaries
            .iter()
            .map(|s| (s.project.id.clone(), s.image_count))
            .collect();
        assert_eq!(counts[&a], 3);
        assert_eq!(counts[&b], 0);
    }

    #[tokio::test]
    async fn delete_cascades_to_images_and_files() {
        let fx = Fixture::new().await;
        let doomed = fx.project("doomed").await;
        let kept = fx.project("kept").await;
        let doomed_images = fx.upload(Some(&doomed), 2).await;
        let loose = fx.upload(None, 1).await;
        assign_images(
            &fx.projects,
            &fx.images,
            &kept,
            AssignImagesPayload {
                image_ids: vec![loose[0].id.clone()],
            },
        )
        .await
        .unwrap();

        let deleted = delete_project(&fx.projects, &fx.images, &fx.files, &doomed)
            .await
            .unwrap();
        assert_eq!(deleted, 2);

        // No image references a project that no longer exists.
        for doc in fx.images.find(&Filter::all()).await.unwrap() {
            let image: Image = from_document(doc).unwrap();
            if let Some(project_id) = image.project_id {
                assert!(fx.projects.find_by_id(&project_id).await.unwrap().is_some());
            }
        }
        for image in doomed_images {
            assert!(fx.files.read(&image.filename).await.is_err());
        }
        assert_eq!(fx.images.len().await, 1);
        assert!(fx.projects.find_by_id(&doomed).await.unwrap().is_none());
    }

    /// Projects collection that moves one more image into the project just
    /// before the project record is deleted.
    struct AttachBeforeDelete<'a> {
        projects: &'a MemoryCollection,
        images: &'a MemoryCollection,
        image_id: String,
    }

    #[async_trait]
    impl<'a> Collection for AttachBeforeDelete<'a> {
        fn name(&self) -> &str {
            self.projects.name()
        }

        async fn ping(&self) -> StoreResult<()> {
            self.projects.ping().await
        }

        async fn insert_one(&self, doc: Document) -> StoreResult<()> {
            self.projects.insert_one(doc).await
        }

        async fn find_by_id(&self, id: &str) -> StoreResult<Option<Document>> {
            self.projects.find_by_id(id).await
        }

        async fn find(&self, filter: &Filter) -> StoreResult<Vec<Document>> {
            self.projects.find(filter).await
        }

        async fn update_by_id(&self, id: &str, fields: Document) -> StoreResult<bool> {
            self.projects.update_by_id(id, fields).await
        }

        async fn delete_by_id(&self, id: &str) -> StoreResult<bool> {
            let mut fields = Document::new();
            fields.insert(PROJECT_ID_FIELD.to_string(), json!(id));
            self.images.update_by_id(&self.image_id, fields).await?;
            self.projects.delete_by_id(id).await
        }
    }

    #[tokio::test]
    async fn delete_sweeps_images_attached_midway() {
        let fx = Fixture::new().await;
        let doomed = fx.project("doomed").await;
        fx.upload(Some(&doomed), 1).await;
        let late = fx.upload(None, 1).await.remove(0);

        let projects = AttachBeforeDelete {
            projects: &fx.projects,
            images: &fx.images,
            image_id: late.id.clone(),
        };
        let deleted = delete_project(&projects, &fx.images, &fx.files, &doomed)
            .await
            .unwrap();

        assert_eq!(deleted, 2);
        assert!(fx.images.is_empty().await);
        assert!(fx.files.read(&late.filename).await.is_err());
    }
}
