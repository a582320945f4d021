use std::time::Duration;

use axum::http::header::{ACCEPT, CONTENT_TYPE, ORIGIN};
use axum::http::{HeaderValue, Method};
use tower_http::cors::{AllowOrigin, CorsLayer};

use crate::config::{AllowedOrigins, ConfigError};

pub const PREFLIGHT_MAX_AGE: Duration = Duration::from_secs(12 * 60 * 60);

/// Credentialed CORS limited to the configured origins.
pub fn cors_layer(origins: &AllowedOrigins) -> Result<CorsLayer, ConfigError> {
    let origins = origins
        .as_slice()
        .iter()
        .map(|o| HeaderValue::from_str(o).map_err(|_| ConfigError::Origin(o.clone())))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([ORIGIN, CONTENT_TYPE, ACCEPT])
        .allow_credentials(true)
        .max_age(PREFLIGHT_MAX_AGE))
}
