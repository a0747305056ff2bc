use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use utoipa::ToSchema;

/// Data type of a single form field.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, ToSchema, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FieldDataType {
    Text,
    TextArea,
    Number,
    Date,
    Boolean,
    EnumSingle,
    EnumMulti,
}

impl FieldDataType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldDataType::Text => "TEXT",
            FieldDataType::TextArea => "TEXT_AREA",
            FieldDataType::Number => "NUMBER",
            FieldDataType::Date => "DATE",
            FieldDataType::Boolean => "BOOLEAN",
            FieldDataType::EnumSingle => "ENUM_SINGLE",
            FieldDataType::EnumMulti => "ENUM_MULTI",
        }
    }

    /// ENUM_MULTI is the only type stored in `values`; everything else uses `value`.
    pub fn is_multi_valued(&self) -> bool {
        matches!(self, FieldDataType::EnumMulti)
    }

    pub fn has_options(&self) -> bool {
        matches!(self, FieldDataType::EnumSingle | FieldDataType::EnumMulti)
    }
}

impl FromStr for FieldDataType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "TEXT" => Ok(FieldDataType::Text),
            "TEXT_AREA" => Ok(FieldDataType::TextArea),
            "NUMBER" => Ok(FieldDataType::Number),
            "DATE" => Ok(FieldDataType::Date),
            "BOOLEAN" => Ok(FieldDataType::Boolean),
            "ENUM_SINGLE" => Ok(FieldDataType::EnumSingle),
            "ENUM_MULTI" => Ok(FieldDataType::EnumMulti),
            other => Err(format!("unknown field type '{}'", other)),
        }
    }
}

/// One field of an assessment type's form.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq)]
pub struct FieldDefinition {
    pub id: String,
    pub assessment_type_id: String,
    /// Placeholder token used in templates as `{{field_key}}`.
    #[schema(example = "client_name")]
    pub field_key: String,
    pub label: String,
    pub field_type: FieldDataType,
    pub options: Option<Vec<String>>,
    #[serde(default)]
    pub is_required: bool,
    #[serde(default)]
    pub order: i32,
    pub section: Option<String>,
    /// Substituted when the project carries no value for this field.
    pub default_text_if_empty: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq)]
pub struct AssessmentType {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    /// Template files in generation order, stored under `{templates}/{id}/`.
    #[serde(default)]
    pub template_file_names: Vec<String>,
    #[serde(default)]
    pub field_definitions: Vec<FieldDefinition>,
}

/// Lifecycle of a project. The only legal move is ACTIVE -> FINISHED.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProjectStatus {
    Active,
    Finished,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("illegal project status transition {from} -> {to}")]
pub struct IllegalTransition {
    pub from: ProjectStatus,
    pub to: ProjectStatus,
}

impl ProjectStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProjectStatus::Active => "ACTIVE",
            ProjectStatus::Finished => "FINISHED",
        }
    }

    pub fn can_transition_to(&self, next: ProjectStatus) -> bool {
        matches!(
            (self, next),
            (ProjectStatus::Active, ProjectStatus::Finished)
        )
    }

    /// Validate a status change and return the new status.
    pub fn transition_to(&self, next: ProjectStatus) -> Result<ProjectStatus, IllegalTransition> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(IllegalTransition { from: *self, to: next })
        }
    }
}

impl fmt::Display for ProjectStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProjectStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ACTIVE" => Ok(ProjectStatus::Active),
            "FINISHED" => Ok(ProjectStatus::Finished),
            other => Err(format!("unknown project status '{}'", other)),
        }
    }
}

/// A project's answer to one field definition.
///
/// Single-valued field types fill `value`, ENUM_MULTI fills `values`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct AssessmentFieldValue {
    pub field_definition_id: String,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub values: Option<Vec<String>>,
}

impl AssessmentFieldValue {
    pub fn single(field_definition_id: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            field_definition_id: field_definition_id.into(),
            value: Some(value.into()),
            values: None,
        }
    }

    pub fn multi(field_definition_id: impl Into<String>, values: Vec<String>) -> Self {
        Self {
            field_definition_id: field_definition_id.into(),
            value: None,
            values: Some(values),
        }
    }

    /// Text shown in templates: `value` followed by `values` joined with ", ".
    pub fn display_text(&self) -> String {
        let mut text = self.value.clone().unwrap_or_default();
        if let Some(values) = &self.values {
            text.push_str(&values.join(", "));
        }
        text
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq)]
pub struct AssessmentProject {
    pub id: String,
    pub display_name: String,
    pub assessment_type_id: String,
    pub assessor_id: String,
    pub status: ProjectStatus,
    pub creation_timestamp: DateTime<Utc>,
    pub last_modification_timestamp: DateTime<Utc>,
    #[serde(default)]
    pub field_values: Vec<AssessmentFieldValue>,
    pub public_access_id: Option<String>,
    pub document_storage_path: Option<String>,
    pub qr_code_data: Option<String>,
}

impl AssessmentProject {
    pub fn publish_state(&self) -> PublishState {
        PublishState::of(self)
    }
}

/// Publication state derived from the persisted `public_access_id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishState {
    NotPublished,
    Published { public_access_id: String },
}

impl PublishState {
    pub fn of(project: &AssessmentProject) -> Self {
        match project.public_access_id.as_deref() {
            Some(id) if !id.is_empty() => PublishState::Published {
                public_access_id: id.to_string(),
            },
            _ => PublishState::NotPublished,
        }
    }

    /// Public id to use for the next publication of `project`.
    ///
    /// First publication derives it from the project id; republishing keeps
    /// the persisted id so existing links stay valid.
    pub fn next_public_access_id(&self, project: &AssessmentProject) -> String {
        match self {
            PublishState::NotPublished => project.id.clone(),
            PublishState::Published { public_access_id } => public_access_id.clone(),
        }
    }
}

/// Kind of artifact recorded in a project's document log.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, ToSchema, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DocumentType {
    Initial,
    Modified,
    FinalPdf,
}

impl DocumentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentType::Initial => "INITIAL",
            DocumentType::Modified => "MODIFIED",
            DocumentType::FinalPdf => "FINAL_PDF",
        }
    }

    /// Subdirectory of `{projects}/{project_id}` holding this kind of artifact.
    pub fn storage_folder(&self) -> &'static str {
        match self {
            DocumentType::Initial => "initial",
            DocumentType::Modified => "modified",
            DocumentType::FinalPdf => "final",
        }
    }

    pub fn from_storage_folder(folder: &str) -> Option<Self> {
        match folder {
            "initial" => Some(DocumentType::Initial),
            "modified" => Some(DocumentType::Modified),
            "final" => Some(DocumentType::FinalPdf),
            _ => None,
        }
    }
}

impl fmt::Display for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocumentType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "INITIAL" => Ok(DocumentType::Initial),
            "MODIFIED" => Ok(DocumentType::Modified),
            "FINAL_PDF" => Ok(DocumentType::FinalPdf),
            other => Err(format!("unknown document type '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq)]
pub struct AssessmentProjectDocument {
    pub id: String,
    pub project_id: String,
    pub document_type: DocumentType,
    pub original_file_name: String,
    /// Relative to the projects storage root.
    pub stored_file_path: String,
    pub upload_timestamp: DateTime<Utc>,
    pub version_number: i32,
}

/// A document produced by initial generation.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq)]
pub struct GeneratedDocument {
    #[schema(example = "Client_A_intake.docx")]
    pub file_name: String,
    #[schema(example = "initial/Client_A_intake.docx")]
    pub download_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq)]
pub struct PublishedDocumentInfo {
    #[schema(example = "https://example.com/public/docs/3f1c2f7a")]
    pub public_url: String,
    pub final_file_name: String,
    pub final_stored_path: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ReplaceFieldValuesRequest {
    pub field_values: Vec<AssessmentFieldValue>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UploadedDocumentsResponse {
    pub uploaded_files: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn project(public_access_id: Option<&str>) -> AssessmentProject {
        AssessmentProject {
            id: "p-1".to_string(),
            display_name: "Client A".to_string(),
            assessment_type_id: "type-1".to_string(),
            assessor_id: "assessor-1".to_string(),
            status: ProjectStatus::Active,
            creation_timestamp: Utc::now(),
            last_modification_timestamp: Utc::now(),
            field_values: Vec::new(),
            public_access_id: public_access_id.map(str::to_string),
            document_storage_path: None,
            qr_code_data: None,
        }
    }

    #[test]
    fn test_status_only_moves_forward() {
        assert_eq!(
            ProjectStatus::Active.transition_to(ProjectStatus::Finished),
            Ok(ProjectStatus::Finished)
        );
        assert!(ProjectStatus::Finished
            .transition_to(ProjectStatus::Active)
            .is_err());
        assert!(ProjectStatus::Active
            .transition_to(ProjectStatus::Active)
            .is_err());
        assert!(ProjectStatus::Finished
            .transition_to(ProjectStatus::Finished)
            .is_err());
    }

    #[test]
    fn test_first_publish_uses_project_id() {
        let p = project(None);
        let state = p.publish_state();
        assert_eq!(state, PublishState::NotPublished);
        assert_eq!(state.next_public_access_id(&p), "p-1");
    }

    #[test]
    fn test_republish_keeps_persisted_id() {
        let p = project(Some("legacy-id"));
        let state = p.publish_state();
        assert_eq!(
            state,
            PublishState::Published {
                public_access_id: "legacy-id".to_string()
            }
        );
        assert_eq!(state.next_public_access_id(&p), "legacy-id");
    }

    #[test]
    fn test_display_text_joins_values() {
        assert_eq!(AssessmentFieldValue::single("f", "yes").display_text(), "yes");
        let multi = AssessmentFieldValue::multi("f", vec!["a".into(), "b".into()]);
        assert_eq!(multi.display_text(), "a, b");
    }

    #[test]
    fn test_enum_wire_names() {
        let json = serde_json::to_string(&FieldDataType::EnumMulti).unwrap();
        assert_eq!(json, "\"ENUM_MULTI\"");
        assert_eq!(
            "TEXT_AREA".parse::<FieldDataType>().unwrap(),
            FieldDataType::TextArea
        );
        assert_eq!(
            serde_json::to_string(&DocumentType::FinalPdf).unwrap(),
            "\"FINAL_PDF\""
        );
        assert_eq!(DocumentType::from_storage_folder("modified"), Some(DocumentType::Modified));
    }
}
