use serde_json::{json, Value};

use super::model::{
    CreateProjectPayload, Project, UpdateProjectPayload, MAX_DESCRIPTION_LEN, MAX_NAME_LEN,
};
use crate::error::{Error, Result};
use crate::store::{from_document, to_document, Collection, Document, Filter};

fn validate_name(name: &str) -> Result<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(Error::bad_request("name must not be empty"));
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(Error::bad_request(format!(
            "name must be at most {MAX_NAME_LEN} characters"
        )));
    }
    Ok(name.to_string())
}

/// `None` for a blank description.
fn validate_description(description: &str) -> Result<Option<String>> {
    let description = description.trim();
    if description.chars().count() > MAX_DESCRIPTION_LEN {
        return Err(Error::bad_request(format!(
            "description must be at most {MAX_DESCRIPTION_LEN} characters"
        )));
    }
    Ok((!description.is_empty()).then(|| description.to_string()))
}

/// Create a new project
pub async fn create_project(projects: &dyn Collection, payload: CreateProjectPayload) -> Result<Project> {
    let name = match payload.name.as_deref() {
        Some(name) => validate_name(name)?,
        None => return Err(Error::bad_request("name is required")),
    };
    let description = match payload.description.as_deref() {
        Some(description) => validate_description(description)?,
        None => None,
    };

    let now = crate::timestamp();
    let project = Project {
        id: uuid::Uuid::new_v4().to_string(),
        name,
        description,
        created_at: now.clone(),
        updated_at: now,
    };

    projects.insert_one(to_document(&project)?).await?;
    tracing::info!("✅ created project {} ({})", project.id, project.name);

    Ok(project)
}

/// Get a specific project
pub async fn get_project(projects: &dyn Collection, project_id: &str) -> Result<Project> {
    match projects.find_by_id(project_id).await? {
        Some(doc) => Ok(from_document(doc)?),
        None => Err(Error::not_found("project", project_id)),
    }
}

/// All projects, oldest first
pub async fn list_projects(projects: &dyn Collection) -> Result<Vec<Project>> {
    let mut all = projects
        .find(&Filter::all())
        .await?
        .into_iter()
        .map(from_document::<Project>)
        .collect::<std::result::Result<Vec<_>, _>>()?;

    all.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
    Ok(all)
}

/// Update a project's descriptive fields. An empty payload leaves it untouched.
pub async fn update_project(
    projects: &dyn Collection,
    project_id: &str,
    payload: UpdateProjectPayload,
) -> Result<Project> {
    let mut fields = Document::new();

    if let Some(name) = payload.name.as_deref() {
        fields.insert("name".to_string(), json!(validate_name(name)?));
    }
    if let Some(description) = payload.description.as_deref() {
        let description = validate_description(description)?;
        fields.insert("description".to_string(), json!(description));
    }

    if fields.is_empty() {
        return get_project(projects, project_id).await;
    }

    fields.insert(
        "updatedAt".to_string(),
        Value::String(crate::timestamp()),
    );

    if !projects.update_by_id(project_id, fields).await? {
        return Err(Error::not_found("project", project_id));
    }

    get_project(projects, project_id).await
}

/// Delete the project record only. Member images are handled by the caller.
pub async fn delete_project_record(projects: &dyn Collection, project_id: &str) -> Result<()> {
    if !projects.delete_by_id(project_id).await? {
        return Err(Error::not_found("project", project_id));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryCollection;

    fn payload(name: Option<&str>, description: Option<&str>) -> CreateProjectPayload {
        CreateProjectPayload {
            name: name.map(str::to_string),
            description: description.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn create_trims_and_round_trips() {
        let projects = MemoryCollection::new("projects");
        let created = create_project(&projects, payload(Some("  Khmer OCR  "), Some("pages")))
            .await
            .unwrap();

        assert_eq!(created.name, "Khmer OCR");
        assert_eq!(get_project(&projects, &created.id).await.unwrap(), created);
    }

    #[tokio::test]
    async fn create_rejects_missing_or_blank_names() {
        let projects = MemoryCollection::new("projects");

        for bad in [payload(None, None), payload(Some("   "), None)] {
            let err = create_project(&projects, bad).await.unwrap_err();
            assert!(matches!(err, Error::BadRequest(_)));
        }
        let long = "x".repeat(MAX_NAME_LEN + 1);
        assert!(create_project(&projects, payload(Some(&long), None)).await.is_err());
        assert!(projects.is_empty().await);
    }

    #[tokio::test]
    async fn update_changes_only_given_fields() {
        let projects = MemoryCollection::new("projects");
        let created = create_project(&projects, payload(Some("a"), Some("first")))
            .await
            .unwrap();

        let renamed = update_project(
            &projects,
            &created.id,
            UpdateProjectPayload {
                name: Some("b".into()),
                description: None,
            },
        )
        .await
        .unwrap();
        assert_eq!(renamed.name, "b");
        assert_eq!(renamed.description.as_deref(), Some("first"));

        let cleared = update_project(
            &projects,
            &created.id,
            UpdateProjectPayload {
                name: None,
                description: Some(String::new()),
            },
        )
        .await
        .unwrap();
        assert_eq!(cleared.description, None);
    }

    #[tokio::test]
    async fn missing_projects_are_not_found() {
        let projects = MemoryCollection::new("projects");
        let update = UpdateProjectPayload {
            name: Some("x".into()),
            description: None,
        };

        assert!(matches!(
            update_project(&projects, "nope", update).await,
            Err(Error::NotFound(_))
        ));
        assert!(matches!(
            delete_project_record(&projects, "nope").await,
            Err(Error::NotFound(_))
        ));
        assert!(projects.is_empty().await);
    }

    #[tokio::test]
    async fn list_is_oldest_first() {
        let projects = MemoryCollection::new("projects");
        let first = create_project(&projects, payload(Some("one"), None)).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        let second = create_project(&projects, payload(Some("two"), None)).await.unwrap();

        let ids: Vec<_> = list_projects(&projects).await.unwrap().into_iter().map(|p| p.id).collect();
        assert_eq!(ids, [first.id, second.id]);
    }
}
