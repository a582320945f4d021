use std::sync::Arc;
use std::time::Duration;

use annotator_atoms::images::PROJECT_ID_FIELD;
use annotator_atoms::store::{Collection, DynamoCollection, MemoryCollection};
use anyhow::{Context, Result};
use aws_config::BehaviorVersion;
use aws_sdk_dynamodb::Client as DynamoClient;

use crate::config::{Config, DatabaseUri};

/// Upper bound for the startup connectivity check.
pub const PING_TIMEOUT: Duration = Duration::from_secs(10);

pub struct Collections {
    pub images: Arc<dyn Collection>,
    pub projects: Arc<dyn Collection>,
}

/// Build the image and project collections described by `config` and prove
/// both are reachable before the server accepts traffic.
pub async fn connect(config: &Config) -> Result<Collections> {
    let collections = match &config.database_uri {
        DatabaseUri::Memory => {
            tracing::warn!("⚠️ using in-memory collections; data is lost on restart");
            Collections {
                images: Arc::new(MemoryCollection::new(config.image_table())),
                projects: Arc::new(MemoryCollection::new(config.project_table())),
            }
        }
        uri => {
            let client = dynamo_client(uri).await;
            let mut images = DynamoCollection::new(client.clone(), config.image_table());
            if let Some(index) = &config.image_project_index {
                images = images.with_index(PROJECT_ID_FIELD, index.clone());
            }
            Collections {
                images: Arc::new(images),
                projects: Arc::new(DynamoCollection::new(client, config.project_table())),
            }
        }
    };

    ping(&collections, PING_TIMEOUT).await?;
    tracing::info!(
        "✅ connected to {} ({}, {})",
        config.database_uri,
        collections.images.name(),
        collections.projects.name()
    );
    Ok(collections)
}

async fn dynamo_client(uri: &DatabaseUri) -> DynamoClient {
    let mut loader = aws_config::defaults(BehaviorVersion::latest());
    if let DatabaseUri::Endpoint(url) = uri {
        loader = loader.endpoint_url(url);
    }
    let sdk_config = loader.load().await;
    DynamoClient::new(&sdk_config)
}

/// Ping both collections concurrently, failing if either errors or the pair
/// takes longer than `timeout`.
pub async fn ping(collections: &Collections, timeout: Duration) -> Result<()> {
    let both = async {
        tokio::try_join!(collections.images.ping(), collections.projects.ping())
    };
    tokio::time::timeout(timeout, both)
        .await
        .with_context(|| format!("database did not answer within {}s", timeout.as_secs()))?
        .context("database connectivity check failed")?;
    Ok(())
}
