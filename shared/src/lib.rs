//! Runtime wiring shared by the server binary and its tests: configuration,
//! application state, database connection and the CORS policy.

pub mod config;
pub mod cors;
pub mod db;
pub mod state;

pub use config::{Config, ConfigError, DatabaseUri};
pub use state::AppState;
