pub mod handlers;
pub mod models;
pub mod repository;
pub mod upload;
pub mod validation;

pub use models::*;
pub use repository::{AssessmentRepository, PublishingInfo, RepositoryError};
