//! Document generation and publishing pipeline.
//!
//! `ReportService` sequences the pipeline stages for one project at a time:
//! template filling for initial documents, storage of reviewed (modified)
//! documents, and publishing (convert, merge, QR stamp, persist).

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use uuid::Uuid;

use super::convert::{ConvertError, DocumentConverter};
use super::flatten::flatten_field_values;
use super::lock::ProjectLocks;
use super::merge::{merge_pdfs, PdfError};
use super::qr::stamp_qr_code;
use super::storage::{is_safe_file_name, output_file_name, ProjectStorage};
use super::template::{fill_template, TemplateError, TemplateFormat};
use crate::assessment::models::{
    AssessmentFieldValue, AssessmentProject, AssessmentProjectDocument, DocumentType,
    GeneratedDocument, IllegalTransition, ProjectStatus, PublishedDocumentInfo,
};
use crate::assessment::repository::{AssessmentRepository, PublishingInfo, RepositoryError};
use crate::assessment::validation::{validate_field_values, ValidationErrors};

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("{0} not found")]
    NotFound(String),
    #[error("project {0} has no modified documents to publish")]
    NoModifiedDocuments(String),
    #[error("document conversion failed: {0}")]
    ExternalProcess(#[from] ConvertError),
    #[error("PDF merge failed: {0}")]
    Merge(#[source] PdfError),
    #[error("QR stamping failed: {0}")]
    QrEmbed(#[source] PdfError),
    #[error("failed to persist results: {0}")]
    Persistence(#[from] RepositoryError),
    #[error("file operation failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("template filling failed: {0}")]
    Template(#[from] TemplateError),
    #[error("invalid field values: {0}")]
    Validation(#[from] ValidationErrors),
    #[error(transparent)]
    IllegalTransition(#[from] IllegalTransition),
    #[error("invalid file name '{0}'")]
    InvalidFileName(String),
}

/// Run blocking file work off the async executor.
/// Re-uploading under an existing name overwrites the stored file, so only
/// the newest record per stored path is published. Input is ordered by
/// version; the result is ordered by each file's latest upload.
fn latest_per_stored_file(documents: Vec<AssessmentProjectDocument>) -> Vec<AssessmentProjectDocument> {
    let mut seen = HashSet::new();
    let mut latest: Vec<_> = documents
        .into_iter()
        .rev()
        .filter(|document| seen.insert(document.stored_file_path.clone()))
        .collect();
    latest.reverse();
    latest
}

async fn blocking<T, F>(work: F) -> Result<T, ReportError>
where
    F: FnOnce() -> Result<T, ReportError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| ReportError::Io(std::io::Error::other(e)))?
}

pub struct ReportService {
    repository: Arc<dyn AssessmentRepository + Send + Sync>,
    converter: Arc<dyn DocumentConverter + Send + Sync>,
    storage: ProjectStorage,
    locks: ProjectLocks,
}

impl ReportService {
    pub fn new(
        repository: Arc<dyn AssessmentRepository + Send + Sync>,
        converter: Arc<dyn DocumentConverter + Send + Sync>,
        storage: ProjectStorage,
    ) -> Self {
        Self {
            repository,
            converter,
            storage,
            locks: ProjectLocks::new(),
        }
    }

    pub fn storage(&self) -> &ProjectStorage {
        &self.storage
    }

    async fn owned_project(
        &self,
        project_id: &str,
        assessor_id: &str,
    ) -> Result<AssessmentProject, ReportError> {
        self.repository
            .get_project_by_id(project_id, assessor_id)
            .await?
            .ok_or_else(|| ReportError::NotFound(format!("project {}", project_id)))
    }

    /// Fill every template of the project's assessment type into
    /// `{project}/initial/`.
    ///
    /// Templates are processed in their configured order. A template that is
    /// missing, has an unsupported format or fails to fill is skipped with a
    /// warning; the others are still generated.
    pub async fn generate_initial_documents(
        &self,
        project_id: &str,
        assessor_id: &str,
    ) -> Result<Vec<GeneratedDocument>, ReportError> {
        let _guard = self.locks.acquire(project_id).await;

        let project = self.owned_project(project_id, assessor_id).await?;
        let assessment_type = self
            .repository
            .get_assessment_type_by_id(&project.assessment_type_id)
            .await?
            .ok_or_else(|| {
                ReportError::NotFound(format!("assessment type {}", project.assessment_type_id))
            })?;

        let data = Arc::new(flatten_field_values(&project, &assessment_type));
        let output_dir = self.storage.project_dir(&project.id, DocumentType::Initial);
        tokio::fs::create_dir_all(&output_dir).await?;

        let mut generated = Vec::new();
        for template_name in &assessment_type.template_file_names {
            let template = self.storage.template_path(&assessment_type.id, template_name);
            if TemplateFormat::from_path(&template).is_none() {
                log::warn!("Skipping template {}: unsupported format", template_name);
                continue;
            }
            if !tokio::fs::try_exists(&template).await.unwrap_or(false) {
                log::warn!(
                    "Skipping template {}: not found at {}",
                    template_name,
                    template.display()
                );
                continue;
            }

            let file_name = output_file_name(&project.display_name, template_name);
            let output = output_dir.join(&file_name);

            let fill_data = data.clone();
            let result = blocking(move || {
                fill_template(&template, &output, &fill_data).map_err(ReportError::from)
            })
            .await;
            if let Err(e) = result {
                log::warn!("Skipping template {}: {}", template_name, e);
                continue;
            }

            let stored_path = self
                .storage
                .relative_path(&project.id, DocumentType::Initial, &file_name);
            self.repository
                .add_document_record(&project.id, DocumentType::Initial, &file_name, &stored_path)
                .await?;

            log::info!("Generated {} for project {}", file_name, project.id);
            generated.push(GeneratedDocument {
                download_path: format!("{}/{}", DocumentType::Initial.storage_folder(), file_name),
                file_name,
            });
        }

        Ok(generated)
    }

    /// Store a reviewed document under `{project}/modified/` and record it.
    pub async fn store_modified_document(
        &self,
        project_id: &str,
        assessor_id: &str,
        file_name: &str,
        contents: Vec<u8>,
    ) -> Result<AssessmentProjectDocument, ReportError> {
        let file_name = sanitize_filename::sanitize(file_name);
        if !is_safe_file_name(&file_name) {
            return Err(ReportError::InvalidFileName(file_name));
        }

        let _guard = self.locks.acquire(project_id).await;
        let project = self.owned_project(project_id, assessor_id).await?;

        let dir = self.storage.project_dir(&project.id, DocumentType::Modified);
        tokio::fs::create_dir_all(&dir).await?;
        tokio::fs::write(dir.join(&file_name), contents).await?;

        let stored_path = self
            .storage
            .relative_path(&project.id, DocumentType::Modified, &file_name);
        let record = self
            .repository
            .add_document_record(&project.id, DocumentType::Modified, &file_name, &stored_path)
            .await?;

        log::info!(
            "Stored modified document {} (v{}) for project {}",
            file_name,
            record.version_number,
            project.id
        );
        Ok(record)
    }

    /// Publish the project's modified documents as one QR-stamped PDF.
    ///
    /// All-or-nothing: on any failure the staging directory is removed and no
    /// publishing information is persisted. Republishing keeps the public
    /// access id of the first publication.
    pub async fn publish_assessment(
        &self,
        project_id: &str,
        assessor_id: &str,
        public_base_url: &str,
    ) -> Result<PublishedDocumentInfo, ReportError> {
        let _guard = self.locks.acquire(project_id).await;

        let project = self.owned_project(project_id, assessor_id).await?;
        let documents = latest_per_stored_file(
            self.repository
                .get_documents_for_project(&project.id, DocumentType::Modified)
                .await?,
        );
        if documents.is_empty() {
            return Err(ReportError::NoModifiedDocuments(project.id.clone()));
        }

        let public_access_id = project.publish_state().next_public_access_id(&project);
        let public_url = format!(
            "{}/{}",
            public_base_url.trim_end_matches('/'),
            public_access_id
        );

        let final_dir = self.storage.project_dir(&project.id, DocumentType::FinalPdf);
        let staging = final_dir.join(format!("staging-{}", Uuid::new_v4()));
        tokio::fs::create_dir_all(&staging).await?;

        let final_file_name = format!(
            "{}_report_{}.pdf",
            project.id,
            Utc::now().format("%Y%m%d%H%M%S%3f")
        );
        let final_path = final_dir.join(&final_file_name);

        let produced = self
            .produce_final_pdf(&documents, &staging, &final_path, &public_url)
            .await;
        if let Err(e) = tokio::fs::remove_dir_all(&staging).await {
            log::warn!("Failed to remove staging directory {}: {}", staging.display(), e);
        }
        if let Err(e) = produced {
            log::error!("Publishing project {} failed: {}", project.id, e);
            return Err(e);
        }

        let final_stored_path =
            self.storage
                .relative_path(&project.id, DocumentType::FinalPdf, &final_file_name);
        let info = PublishingInfo {
            public_access_id,
            final_doc_path: final_stored_path.clone(),
            qr_code_data: public_url.clone(),
        };

        let persisted = match self
            .repository
            .update_project_publishing_info(&project.id, &info)
            .await
        {
            Ok(true) => Ok(()),
            Ok(false) => Err(RepositoryError::NotFound(format!("project {}", project.id))),
            Err(e) => Err(e),
        };
        if let Err(e) = persisted {
            log::error!(
                "Publishing info for project {} could not be saved, discarding {}: {}",
                project.id,
                final_path.display(),
                e
            );
            if let Err(remove_err) = tokio::fs::remove_file(&final_path).await {
                log::warn!("Failed to remove {}: {}", final_path.display(), remove_err);
            }
            return Err(ReportError::Persistence(e));
        }

        if let Err(e) = self
            .repository
            .add_document_record(
                &project.id,
                DocumentType::FinalPdf,
                &final_file_name,
                &final_stored_path,
            )
            .await
        {
            log::error!(
                "Project {} published but its FINAL_PDF record was not added: {}",
                project.id,
                e
            );
        }

        log::info!("Published project {} at {}", project.id, public_url);
        Ok(PublishedDocumentInfo {
            public_url,
            final_file_name,
            final_stored_path,
        })
    }

    /// Convert, merge and stamp inside `staging`, then move the result to
    /// `final_path`. Leaves nothing outside `staging` on failure.
    async fn produce_final_pdf(
        &self,
        documents: &[AssessmentProjectDocument],
        staging: &Path,
        final_path: &Path,
        public_url: &str,
    ) -> Result<(), ReportError> {
        let mut pdfs: Vec<PathBuf> = Vec::with_capacity(documents.len());

        for (index, document) in documents.iter().enumerate() {
            let source = self
                .storage
                .absolute(&document.stored_file_path)
                .ok_or_else(|| {
                    ReportError::NotFound(format!("stored document {}", document.stored_file_path))
                })?;
            // One directory per document, so equal stems cannot collide.
            let out_dir = staging.join(index.to_string());
            tokio::fs::create_dir_all(&out_dir).await?;

            let pdf = self.converter.convert(&source, &out_dir).await?;
            pdfs.push(pdf);
        }

        let merged = staging.join("merged.pdf");
        {
            let merged = merged.clone();
            blocking(move || merge_pdfs(&pdfs, &merged).map_err(ReportError::Merge)).await?;
        }
        {
            let merged = merged.clone();
            let url = public_url.to_string();
            blocking(move || stamp_qr_code(&merged, &url).map_err(ReportError::QrEmbed)).await?;
        }

        tokio::fs::rename(&merged, final_path).await?;
        Ok(())
    }

    /// Apply the ACTIVE -> FINISHED transition.
    pub async fn finish_project(
        &self,
        project_id: &str,
        assessor_id: &str,
    ) -> Result<AssessmentProject, ReportError> {
        let _guard = self.locks.acquire(project_id).await;

        let mut project = self.owned_project(project_id, assessor_id).await?;
        let next = project.status.transition_to(ProjectStatus::Finished)?;
        if !self
            .repository
            .update_project_status(&project.id, assessor_id, next)
            .await?
        {
            return Err(ReportError::NotFound(format!("project {}", project.id)));
        }

        project.status = next;
        Ok(project)
    }

    /// Validate and replace all field values of a project.
    pub async fn replace_field_values(
        &self,
        project_id: &str,
        assessor_id: &str,
        values: &[AssessmentFieldValue],
    ) -> Result<(), ReportError> {
        let _guard = self.locks.acquire(project_id).await;

        let project = self.owned_project(project_id, assessor_id).await?;
        let assessment_type = self
            .repository
            .get_assessment_type_by_id(&project.assessment_type_id)
            .await?
            .ok_or_else(|| {
                ReportError::NotFound(format!("assessment type {}", project.assessment_type_id))
            })?;

        validate_field_values(&assessment_type, values)?;

        if !self
            .repository
            .replace_field_values(&project.id, assessor_id, values)
            .await?
        {
            return Err(ReportError::NotFound(format!("project {}", project.id)));
        }
        log::info!(
            "Replaced {} field value(s) of project {}",
            values.len(),
            project.id
        );
        Ok(())
    }

    /// File of one of the caller's project documents.
    pub async fn resolve_project_document(
        &self,
        project_id: &str,
        assessor_id: &str,
        document_type: DocumentType,
        file_name: &str,
    ) -> Result<PathBuf, ReportError> {
        if !is_safe_file_name(file_name) {
            return Err(ReportError::InvalidFileName(file_name.to_string()));
        }
        let project = self.owned_project(project_id, assessor_id).await?;
        let path = self.storage.project_dir(&project.id, document_type).join(file_name);
        if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
            return Err(ReportError::NotFound(format!("document {}", file_name)));
        }
        Ok(path)
    }

    /// Final artifact of the project published under `public_access_id`.
    pub async fn resolve_public_document(&self, public_access_id: &str) -> Result<PathBuf, ReportError> {
        let not_found = || ReportError::NotFound(format!("published document {}", public_access_id));

        let project = self
            .repository
            .find_project_by_public_access_id(public_access_id)
            .await?
            .ok_or_else(not_found)?;
        let path = project
            .document_storage_path
            .as_deref()
            .and_then(|relative| self.storage.absolute(relative))
            .ok_or_else(not_found)?;
        if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
            return Err(not_found());
        }
        Ok(path)
    }
}
