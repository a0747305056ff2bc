//! Database module - AppState and database operations
//!
//! - `assessment` - PostgreSQL implementation of [`AssessmentRepository`]

mod assessment;

pub use assessment::PgAssessmentRepository;

use std::sync::Arc;

use crate::assessment::repository::AssessmentRepository;
use crate::config::AppConfig;
use crate::report::convert::{DocumentConverter, LibreOfficeConverter};
use crate::report::service::ReportService;
use crate::report::storage::ProjectStorage;

#[derive(Clone)]
pub struct AppState {
    pub repository: Arc<dyn AssessmentRepository + Send + Sync>,
    pub reports: Arc<ReportService>,
    pub public_base_url: String,
}

impl AppState {
    /// Connect to PostgreSQL, apply migrations and wire the LibreOffice
    /// converter.
    pub async fn new_with_config(config: AppConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let database_url = config
            .database_url
            .clone()
            .ok_or("DATABASE_URL must be set")?;

        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(20)
            .min_connections(2)
            .acquire_timeout(std::time::Duration::from_secs(30))
            .idle_timeout(std::time::Duration::from_secs(900))
            .max_lifetime(std::time::Duration::from_secs(1800))
            .connect(&database_url)
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;
        log::info!("Database migrations applied");

        let repository = Arc::new(PgAssessmentRepository::new(pool));
        let converter = Arc::new(LibreOfficeConverter::new(
            config.converter_bin.clone(),
            config.converter_timeout,
        ));

        Ok(Self::new_with_repository_and_converter(
            &config, repository, converter,
        )?)
    }

    /// Build the state around explicit collaborators. Creates the storage
    /// roots when they are missing.
    pub fn new_with_repository_and_converter(
        config: &AppConfig,
        repository: Arc<dyn AssessmentRepository + Send + Sync>,
        converter: Arc<dyn DocumentConverter + Send + Sync>,
    ) -> std::io::Result<Self> {
        let storage = ProjectStorage::new(&config.templates_path, &config.projects_path);
        storage.ensure_roots()?;

        let reports = Arc::new(ReportService::new(repository.clone(), converter, storage));

        Ok(AppState {
            repository,
            reports,
            public_base_url: config.public_base_url.clone(),
        })
    }
}
