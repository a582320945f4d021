//! HTTP server for the image annotation backend.

pub mod routes;

pub use routes::{app, create_router};
