//! Single-collection building blocks: the storage adapter, the file store and
//! the image/project services with their HTTP handlers.

pub mod error;
pub mod files;
pub mod images;
pub mod projects;
pub mod respond;
pub mod store;

use chrono::SecondsFormat;
use serde::de::DeserializeOwned;

pub use error::{Error, Result};

/// RFC 3339 UTC timestamp with fixed precision, so timestamps sort as strings.
pub fn timestamp() -> String {
    chrono::Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse a JSON request body, reporting malformed input as a 400.
pub fn parse_json<T: DeserializeOwned>(body: &[u8]) -> Result<T> {
    if body.is_empty() {
        return Err(Error::bad_request("request body is empty"));
    }
    serde_json::from_slice(body).map_err(|e| Error::bad_request(format!("invalid JSON body: {e}")))
}
