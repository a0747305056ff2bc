//! Schema store interface consumed by the report pipeline and the HTTP layer.

use async_trait::async_trait;

use super::models::{
    AssessmentFieldValue, AssessmentProject, AssessmentProjectDocument, AssessmentType,
    DocumentType, ProjectStatus,
};

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("{0} not found")]
    NotFound(String),
    #[error("{0} is still referenced and cannot be deleted")]
    InUse(String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("corrupt stored data: {0}")]
    Corrupt(String),
}

/// Publication details written in one update once a final artifact exists.
#[derive(Debug, Clone, PartialEq)]
pub struct PublishingInfo {
    pub public_access_id: String,
    pub final_doc_path: String,
    pub qr_code_data: String,
}

#[async_trait]
pub trait AssessmentRepository {
    /// Project owned by `assessor_id`; `None` when missing or owned by someone else.
    async fn get_project_by_id(
        &self,
        project_id: &str,
        assessor_id: &str,
    ) -> Result<Option<AssessmentProject>, RepositoryError>;

    /// Assessment type with its field definitions ordered by display order.
    async fn get_assessment_type_by_id(
        &self,
        type_id: &str,
    ) -> Result<Option<AssessmentType>, RepositoryError>;

    /// Documents of one kind in the order they were recorded.
    async fn get_documents_for_project(
        &self,
        project_id: &str,
        document_type: DocumentType,
    ) -> Result<Vec<AssessmentProjectDocument>, RepositoryError>;

    async fn add_document_record(
        &self,
        project_id: &str,
        document_type: DocumentType,
        original_file_name: &str,
        stored_path: &str,
    ) -> Result<AssessmentProjectDocument, RepositoryError>;

    /// Returns `false` when no project row was updated.
    async fn update_project_publishing_info(
        &self,
        project_id: &str,
        info: &PublishingInfo,
    ) -> Result<bool, RepositoryError>;

    async fn find_project_by_public_access_id(
        &self,
        public_access_id: &str,
    ) -> Result<Option<AssessmentProject>, RepositoryError>;

    /// Delete all field values of the project and insert `values` in their place.
    async fn replace_field_values(
        &self,
        project_id: &str,
        assessor_id: &str,
        values: &[AssessmentFieldValue],
    ) -> Result<bool, RepositoryError>;

    async fn update_project_status(
        &self,
        project_id: &str,
        assessor_id: &str,
        status: ProjectStatus,
    ) -> Result<bool, RepositoryError>;

    /// Fails with [`RepositoryError::InUse`] while any project references the type.
    async fn delete_assessment_type(&self, type_id: &str) -> Result<bool, RepositoryError>;
}
