//! Project views and operations spanning both collections: joins of a
//! project with its images, cascade delete, and image membership.

pub mod membership;
pub mod projects;
pub mod types;

pub use membership::*;
pub use projects::*;
pub use types::{AssignImagesPayload, ProjectSummary, ProjectWithImages};
