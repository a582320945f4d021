//! Local file store for uploaded images.

use std::path::{Component, Path, PathBuf};

use tokio::fs;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

/// URL prefix under which the upload directory is served.
pub const UPLOADS_URL_PREFIX: &str = "/uploads";

/// Longest stem kept from a client-supplied filename.
const MAX_STEM_LEN: usize = 64;

/// Prefix of in-flight writes. Stored names never start with a dot.
const TEMP_PREFIX: &str = ".tmp.";

#[derive(Debug, thiserror::Error)]
pub enum FileStoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid file name: {0}")]
    InvalidName(String),

    #[error("file not found: {0}")]
    NotFound(String),
}

pub type FileStoreResult<T> = std::result::Result<T, FileStoreError>;

/// A file written by [`FileStore::save`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFile {
    /// Name relative to the store root.
    pub filename: String,
    /// Public path, `/uploads/<filename>`.
    pub url_path: String,
    pub size: u64,
}

#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    /// Open the store, creating the root directory if needed. Temp files
    /// left by an interrupted write are removed.
    pub async fn new(root: impl AsRef<Path>) -> FileStoreResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).await?;
        let store = Self { root };
        store.sweep_temp_files().await?;
        Ok(store)
    }

    async fn sweep_temp_files(&self) -> FileStoreResult<usize> {
        let mut entries = fs::read_dir(&self.root).await?;
        let mut removed = 0;
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_name().to_string_lossy().starts_with(TEMP_PREFIX) {
                continue;
            }
            match fs::remove_file(entry.path()).await {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        if removed > 0 {
            tracing::info!("🧹 removed {} stale temp file(s) from {}", removed, self.root.display());
        }
        Ok(removed)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Persist `data` under a fresh unique name derived from `original_name`.
    ///
    /// The bytes go to a hidden temp sibling first and are renamed into place
    /// after an fsync, so readers never observe a partial file.
    pub async fn save(&self, original_name: &str, data: &[u8], extension: &str) -> FileStoreResult<StoredFile> {
        let filename = unique_filename(original_name, extension);
        let path = self.root.join(&filename);
        let temp_path = self.root.join(format!("{TEMP_PREFIX}{}", Uuid::new_v4()));

        let written = async {
            let mut file = fs::File::create(&temp_path).await?;
            file.write_all(data).await?;
            file.sync_all().await?;
            fs::rename(&temp_path, &path).await
        }
        .await;

        if let Err(e) = written {
            let _ = fs::remove_file(&temp_path).await;
            return Err(e.into());
        }

        Ok(StoredFile {
            url_path: url_path(&filename),
            filename,
            size: data.len() as u64,
        })
    }

    pub async fn read(&self, filename: &str) -> FileStoreResult<Vec<u8>> {
        let path = self.path_of(filename)?;
        fs::read(&path).await.map_err(|e| not_found_or_io(filename, e))
    }

    pub async fn remove(&self, filename: &str) -> FileStoreResult<()> {
        let path = self.path_of(filename)?;
        fs::remove_file(&path)
            .await
            .map_err(|e| not_found_or_io(filename, e))
    }

    /// Resolve a stored name. Only a single normal path component that is not
    /// a dot file is accepted.
    fn path_of(&self, filename: &str) -> FileStoreResult<PathBuf> {
        let mut components = Path::new(filename).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(_)), None) if !filename.starts_with('.') => {
                Ok(self.root.join(filename))
            }
            _ => Err(FileStoreError::InvalidName(filename.to_string())),
        }
    }
}

fn not_found_or_io(filename: &str, e: std::io::Error) -> FileStoreError {
    if e.kind() == std::io::ErrorKind::NotFound {
        FileStoreError::NotFound(filename.to_string())
    } else {
        FileStoreError::Io(e)
    }
}

pub fn url_path(filename: &str) -> String {
    format!("{UPLOADS_URL_PREFIX}/{filename}")
}

/// `<uuid>-<sanitized stem>.<extension>`, or `<uuid>.<extension>` when nothing
/// of the client name survives sanitizing.
pub fn unique_filename(original_name: &str, extension: &str) -> String {
    let id = Uuid::new_v4();
    let stem = sanitize_stem(original_name);
    let extension = sanitize_component(extension);
    let extension = if extension.is_empty() { "bin".to_string() } else { extension.to_ascii_lowercase() };

    if stem.is_empty() {
        format!("{id}.{extension}")
    } else {
        format!("{id}-{stem}.{extension}")
    }
}

/// Keep the last path segment's stem, reduced to `[A-Za-z0-9_-]`.
pub fn sanitize_stem(original_name: &str) -> String {
    let base = original_name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default();
    let stem = match base.rfind('.') {
        Some(0) | None => base,
        Some(dot) => &base[..dot],
    };
    sanitize_component(stem).chars().take(MAX_STEM_LEN).collect()
}

fn sanitize_component(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
            out.push(c);
        } else if !out.ends_with('_') && !out.is_empty() {
            out.push('_');
        }
    }
    out.trim_matches('_').to_string()
}
