use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use clap::Parser;

const MIB: usize = 1024 * 1024;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid database URI '{0}': expected http(s)://..., aws:// or memory://")]
    DatabaseUri(String),
    #[error("invalid port '{0}': expected a number such as 3000 or :3000")]
    Port(String),
    #[error("CORS_ORIGIN must list at least one origin")]
    NoOrigins,
    #[error("CORS_ORIGIN may not contain '*' because credentials are allowed")]
    WildcardOrigin,
    #[error("invalid CORS origin '{0}'")]
    Origin(String),
    #[error("{0} must not be blank")]
    Blank(&'static str),
    #[error("{0} must be greater than zero")]
    Zero(&'static str),
    #[error("IMAGE_COLLECTION and PROJECT_COLLECTION must differ")]
    SameCollection,
}

/// Where the document collections live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatabaseUri {
    /// A DynamoDB-compatible endpoint, e.g. `http://localhost:8000`.
    Endpoint(String),
    /// DynamoDB at the SDK's default endpoint for the configured region.
    Aws,
    /// In-process collections. Nothing survives a restart.
    Memory,
}

impl FromStr for DatabaseUri {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        match s {
            "memory://" => Ok(Self::Memory),
            "aws://" => Ok(Self::Aws),
            _ if (s.starts_with("http://") || s.starts_with("https://"))
                && s.split_once("://").is_some_and(|(_, rest)| !rest.is_empty()) =>
            {
                Ok(Self::Endpoint(s.trim_end_matches('/').to_string()))
            }
            _ => Err(ConfigError::DatabaseUri(s.to_string())),
        }
    }
}

impl fmt::Display for DatabaseUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Endpoint(url) => f.write_str(url),
            Self::Aws => f.write_str("aws://"),
            Self::Memory => f.write_str("memory://"),
        }
    }
}

/// Comma-separated list of exact origins allowed to make credentialed requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllowedOrigins(Vec<String>);

impl AllowedOrigins {
    pub fn as_slice(&self) -> &[String] {
        &self.0
    }
}

impl FromStr for AllowedOrigins {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut origins = Vec::new();
        for origin in s.split(',').map(str::trim).filter(|o| !o.is_empty()) {
            if origin == "*" {
                return Err(ConfigError::WildcardOrigin);
            }
            let valid = origin
                .split_once("://")
                .is_some_and(|(scheme, host)| !scheme.is_empty() && !host.is_empty() && !host.contains('/'));
            if !valid {
                return Err(ConfigError::Origin(origin.to_string()));
            }
            origins.push(origin.to_string());
        }
        if origins.is_empty() {
            return Err(ConfigError::NoOrigins);
        }
        Ok(Self(origins))
    }
}

/// Accepts `3000` as well as the `:3000` form.
pub fn parse_port(s: &str) -> Result<u16, ConfigError> {
    let digits = s.trim().trim_start_matches(':');
    match digits.parse::<u16>() {
        Ok(port) if port > 0 => Ok(port),
        _ => Err(ConfigError::Port(s.to_string())),
    }
}

/// Image annotation backend
#[derive(Parser, Debug, Clone)]
#[command(name = "annotator-server")]
#[command(version, about, long_about = None)]
pub struct Config {
    /// Document database: http(s):// endpoint, aws:// or memory://
    #[arg(long, env = "DATABASE_URI")]
    pub database_uri: DatabaseUri,

    /// Database name; tables are named `<database>.<collection>`
    #[arg(long, env = "DATABASE_NAME")]
    pub database_name: String,

    #[arg(long, env = "IMAGE_COLLECTION")]
    pub image_collection: String,

    #[arg(long, env = "PROJECT_COLLECTION")]
    pub project_collection: String,

    /// Global secondary index on `projectId` of the image table
    #[arg(long, env = "IMAGE_PROJECT_INDEX")]
    pub image_project_index: Option<String>,

    /// Comma-separated list of allowed origins
    #[arg(long, env = "CORS_ORIGIN")]
    pub cors_origin: AllowedOrigins,

    #[arg(long, env = "ADDRESS", default_value = "0.0.0.0")]
    pub address: String,

    /// Listening port, `3000` or `:3000`
    #[arg(long, env = "PORT", value_parser = parse_port)]
    pub port: u16,

    #[arg(long, env = "UPLOAD_DIR", default_value = "./uploads")]
    pub upload_dir: PathBuf,

    /// Per-file upload limit in bytes
    #[arg(long, env = "MAX_UPLOAD_BYTES", default_value_t = 20 * MIB)]
    pub max_upload_bytes: usize,

    /// Whole request body limit in bytes
    #[arg(long, env = "MAX_REQUEST_BYTES", default_value_t = 100 * MIB)]
    pub max_request_bytes: usize,
}

impl Config {
    /// Checks clap cannot express on its own.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("DATABASE_NAME", &self.database_name),
            ("IMAGE_COLLECTION", &self.image_collection),
            ("PROJECT_COLLECTION", &self.project_collection),
            ("ADDRESS", &self.address),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigError::Blank(name));
            }
        }
        if self.image_collection.trim() == self.project_collection.trim() {
            return Err(ConfigError::SameCollection);
        }
        if self.max_upload_bytes == 0 {
            return Err(ConfigError::Zero("MAX_UPLOAD_BYTES"));
        }
        if self.max_request_bytes == 0 {
            return Err(ConfigError::Zero("MAX_REQUEST_BYTES"));
        }
        Ok(())
    }

    pub fn table_name(&self, collection: &str) -> String {
        format!("{}.{}", self.database_name.trim(), collection.trim())
    }

    pub fn image_table(&self) -> String {
        self.table_name(&self.image_collection)
    }

    pub fn project_table(&self) -> String {
        self.table_name(&self.project_collection)
    }
}
