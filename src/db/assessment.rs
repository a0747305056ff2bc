//! PostgreSQL implementation of the assessment repository.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use moka::future::Cache;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::assessment::models::{
    AssessmentFieldValue, AssessmentProject, AssessmentProjectDocument, AssessmentType,
    DocumentType, FieldDataType, FieldDefinition, ProjectStatus,
};
use crate::assessment::repository::{AssessmentRepository, PublishingInfo, RepositoryError};

const PROJECT_COLUMNS: &str = "id, display_name, assessment_type_id, assessor_id, status, \
     creation_timestamp, last_modification_timestamp, public_access_id, \
     document_storage_path, qr_code_data";

const DOCUMENT_COLUMNS: &str = "id, project_id, document_type, original_file_name, \
     stored_file_path, upload_timestamp, version_number";

/// Postgres error code for foreign key violations.
const FOREIGN_KEY_VIOLATION: &str = "23503";

#[derive(sqlx::FromRow)]
struct ProjectRow {
    id: String,
    display_name: String,
    assessment_type_id: String,
    assessor_id: String,
    status: String,
    creation_timestamp: i64,
    last_modification_timestamp: i64,
    public_access_id: Option<String>,
    document_storage_path: Option<String>,
    qr_code_data: Option<String>,
}

#[derive(sqlx::FromRow)]
struct FieldValueRow {
    field_definition_id: String,
    single_value: Option<String>,
    multiple_values: Option<String>,
}

#[derive(sqlx::FromRow)]
struct TypeRow {
    id: String,
    name: String,
    description: Option<String>,
    template_file_names: Option<String>,
}

#[derive(sqlx::FromRow)]
struct DefinitionRow {
    id: String,
    assessment_type_id: String,
    field_key: String,
    label: String,
    field_type: String,
    options: Option<String>,
    is_required: bool,
    display_order: i32,
    section: Option<String>,
    default_text_if_empty: Option<String>,
}

#[derive(sqlx::FromRow)]
struct DocumentRow {
    id: String,
    project_id: String,
    document_type: String,
    original_file_name: String,
    stored_file_path: String,
    upload_timestamp: i64,
    version_number: i32,
}

fn from_millis(millis: i64) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::<Utc>::from_timestamp_millis(millis)
        .ok_or_else(|| RepositoryError::Corrupt(format!("timestamp {} out of range", millis)))
}

fn parse_list(column: &str, raw: Option<String>) -> Result<Option<Vec<String>>, RepositoryError> {
    raw.filter(|text| !text.trim().is_empty())
        .map(|text| {
            serde_json::from_str::<Vec<String>>(&text)
                .map_err(|e| RepositoryError::Corrupt(format!("{}: {}", column, e)))
        })
        .transpose()
}

fn encode_list(values: &[String]) -> Result<String, RepositoryError> {
    serde_json::to_string(values).map_err(|e| RepositoryError::Corrupt(e.to_string()))
}

impl TryFrom<DocumentRow> for AssessmentProjectDocument {
    type Error = RepositoryError;

    fn try_from(row: DocumentRow) -> Result<Self, Self::Error> {
        Ok(Self {
            document_type: row.document_type.parse().map_err(RepositoryError::Corrupt)?,
            upload_timestamp: from_millis(row.upload_timestamp)?,
            id: row.id,
            project_id: row.project_id,
            original_file_name: row.original_file_name,
            stored_file_path: row.stored_file_path,
            version_number: row.version_number,
        })
    }
}

impl TryFrom<DefinitionRow> for FieldDefinition {
    type Error = RepositoryError;

    fn try_from(row: DefinitionRow) -> Result<Self, Self::Error> {
        Ok(Self {
            field_type: row
                .field_type
                .parse::<FieldDataType>()
                .map_err(RepositoryError::Corrupt)?,
            options: parse_list("options", row.options)?,
            id: row.id,
            assessment_type_id: row.assessment_type_id,
            field_key: row.field_key,
            label: row.label,
            is_required: row.is_required,
            order: row.display_order,
            section: row.section,
            default_text_if_empty: row.default_text_if_empty,
        })
    }
}

pub struct PgAssessmentRepository {
    pool: PgPool,
    type_cache: Cache<String, AssessmentType>,
}

impl PgAssessmentRepository {
    pub fn new(pool: PgPool) -> Self {
        let type_cache = Cache::builder()
            .time_to_live(Duration::from_secs(10 * 60))
            .max_capacity(100)
            .build();
        Self { pool, type_cache }
    }

    async fn field_values(&self, project_id: &str) -> Result<Vec<AssessmentFieldValue>, RepositoryError> {
        let rows = sqlx::query_as::<_, FieldValueRow>(
            "SELECT field_definition_id, single_value, multiple_values \
             FROM assessment_field_values WHERE project_id = $1 ORDER BY id",
        )
        .bind(project_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                Ok(AssessmentFieldValue {
                    values: parse_list("multiple_values", row.multiple_values)?,
                    field_definition_id: row.field_definition_id,
                    value: row.single_value,
                })
            })
            .collect()
    }

    async fn into_project(&self, row: ProjectRow) -> Result<AssessmentProject, RepositoryError> {
        let field_values = self.field_values(&row.id).await?;
        Ok(AssessmentProject {
            status: row
                .status
                .parse::<ProjectStatus>()
                .map_err(RepositoryError::Corrupt)?,
            creation_timestamp: from_millis(row.creation_timestamp)?,
            last_modification_timestamp: from_millis(row.last_modification_timestamp)?,
            id: row.id,
            display_name: row.display_name,
            assessment_type_id: row.assessment_type_id,
            assessor_id: row.assessor_id,
            field_values,
            public_access_id: row.public_access_id,
            document_storage_path: row.document_storage_path,
            qr_code_data: row.qr_code_data,
        })
    }

    /// Bump the modification timestamp of an owned project inside `tx`.
    /// Returns `false` when the project does not exist or is not owned.
    async fn touch_owned(
        tx: &mut Transaction<'_, Postgres>,
        project_id: &str,
        assessor_id: &str,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            "UPDATE assessment_projects SET last_modification_timestamp = $3 \
             WHERE id = $1 AND assessor_id = $2",
        )
        .bind(project_id)
        .bind(assessor_id)
        .bind(Utc::now().timestamp_millis())
        .execute(&mut **tx)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl AssessmentRepository for PgAssessmentRepository {
    async fn get_project_by_id(
        &self,
        project_id: &str,
        assessor_id: &str,
    ) -> Result<Option<AssessmentProject>, RepositoryError> {
        let row = sqlx::query_as::<_, ProjectRow>(&format!(
            "SELECT {} FROM assessment_projects WHERE id = $1 AND assessor_id = $2",
            PROJECT_COLUMNS
        ))
        .bind(project_id)
        .bind(assessor_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(self.into_project(row).await?)),
            None => Ok(None),
        }
    }

    async fn get_assessment_type_by_id(
        &self,
        type_id: &str,
    ) -> Result<Option<AssessmentType>, RepositoryError> {
        if let Some(cached) = self.type_cache.get(type_id).await {
            log::debug!("Assessment type {} served from cache", type_id);
            return Ok(Some(cached));
        }

        let Some(row) = sqlx::query_as::<_, TypeRow>(
            "SELECT id, name, description, template_file_names \
             FROM assessment_types WHERE id = $1",
        )
        .bind(type_id)
        .fetch_optional(&self.pool)
        .await?
        else {
            return Ok(None);
        };

        let definitions = sqlx::query_as::<_, DefinitionRow>(
            "SELECT id, assessment_type_id, field_key, label, field_type, options, is_required, \
             display_order, section, default_text_if_empty \
             FROM assessment_field_definitions WHERE assessment_type_id = $1 \
             ORDER BY display_order, field_key",
        )
        .bind(type_id)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(FieldDefinition::try_from)
        .collect::<Result<Vec<_>, _>>()?;

        let assessment_type = AssessmentType {
            template_file_names: parse_list("template_file_names", row.template_file_names)?
                .unwrap_or_default(),
            id: row.id,
            name: row.name,
            description: row.description,
            field_definitions: definitions,
        };

        self.type_cache
            .insert(type_id.to_string(), assessment_type.clone())
            .await;
        Ok(Some(assessment_type))
    }

    async fn get_documents_for_project(
        &self,
        project_id: &str,
        document_type: DocumentType,
    ) -> Result<Vec<AssessmentProjectDocument>, RepositoryError> {
        sqlx::query_as::<_, DocumentRow>(&format!(
            "SELECT {} FROM assessment_project_documents \
             WHERE project_id = $1 AND document_type = $2 \
             ORDER BY version_number, upload_timestamp",
            DOCUMENT_COLUMNS
        ))
        .bind(project_id)
        .bind(document_type.as_str())
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(AssessmentProjectDocument::try_from)
        .collect()
    }

    async fn add_document_record(
        &self,
        project_id: &str,
        document_type: DocumentType,
        original_file_name: &str,
        stored_path: &str,
    ) -> Result<AssessmentProjectDocument, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let existing: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM assessment_project_documents \
             WHERE project_id = $1 AND document_type = $2",
        )
        .bind(project_id)
        .bind(document_type.as_str())
        .fetch_one(&mut *tx)
        .await?;

        let row = sqlx::query_as::<_, DocumentRow>(&format!(
            "INSERT INTO assessment_project_documents \
             (id, project_id, document_type, original_file_name, stored_file_path, \
              upload_timestamp, version_number) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING {}",
            DOCUMENT_COLUMNS
        ))
        .bind(Uuid::new_v4().to_string())
        .bind(project_id)
        .bind(document_type.as_str())
        .bind(original_file_name)
        .bind(stored_path)
        .bind(Utc::now().timestamp_millis())
        .bind(existing as i32 + 1)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        row.try_into()
    }

    async fn update_project_publishing_info(
        &self,
        project_id: &str,
        info: &PublishingInfo,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            "UPDATE assessment_projects SET public_access_id = $2, document_storage_path = $3, \
             qr_code_data = $4, last_modification_timestamp = $5 WHERE id = $1",
        )
        .bind(project_id)
        .bind(&info.public_access_id)
        .bind(&info.final_doc_path)
        .bind(&info.qr_code_data)
        .bind(Utc::now().timestamp_millis())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn find_project_by_public_access_id(
        &self,
        public_access_id: &str,
    ) -> Result<Option<AssessmentProject>, RepositoryError> {
        let row = sqlx::query_as::<_, ProjectRow>(&format!(
            "SELECT {} FROM assessment_projects WHERE public_access_id = $1",
            PROJECT_COLUMNS
        ))
        .bind(public_access_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(self.into_project(row).await?)),
            None => Ok(None),
        }
    }

    async fn replace_field_values(
        &self,
        project_id: &str,
        assessor_id: &str,
        values: &[AssessmentFieldValue],
    ) -> Result<bool, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        if !Self::touch_owned(&mut tx, project_id, assessor_id).await? {
            tx.rollback().await?;
            return Ok(false);
        }

        sqlx::query("DELETE FROM assessment_field_values WHERE project_id = $1")
            .bind(project_id)
            .execute(&mut *tx)
            .await?;

        for value in values {
            let multiple = value.values.as_deref().map(encode_list).transpose()?;
            sqlx::query(
                "INSERT INTO assessment_field_values \
                 (id, project_id, field_definition_id, single_value, multiple_values) \
                 VALUES ($1, $2, $3, $4, $5)",
            )
            .bind(Uuid::new_v4().to_string())
            .bind(project_id)
            .bind(&value.field_definition_id)
            .bind(&value.value)
            .bind(multiple)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(true)
    }

    async fn update_project_status(
        &self,
        project_id: &str,
        assessor_id: &str,
        status: ProjectStatus,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            "UPDATE assessment_projects SET status = $3, last_modification_timestamp = $4 \
             WHERE id = $1 AND assessor_id = $2",
        )
        .bind(project_id)
        .bind(assessor_id)
        .bind(status.as_str())
        .bind(Utc::now().timestamp_millis())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_assessment_type(&self, type_id: &str) -> Result<bool, RepositoryError> {
        let in_use: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM assessment_projects WHERE assessment_type_id = $1",
        )
        .bind(type_id)
        .fetch_one(&self.pool)
        .await?;
        if in_use > 0 {
            return Err(RepositoryError::InUse(format!("assessment type {}", type_id)));
        }

        let result = sqlx::query("DELETE FROM assessment_types WHERE id = $1")
            .bind(type_id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                let referenced = matches!(
                    &e,
                    sqlx::Error::Database(db) if db.code().as_deref() == Some(FOREIGN_KEY_VIOLATION)
                );
                if referenced {
                    RepositoryError::InUse(format!("assessment type {}", type_id))
                } else {
                    RepositoryError::Database(e)
                }
            })?;

        self.type_cache.invalidate(type_id).await;
        Ok(result.rows_affected() > 0)
    }
}
