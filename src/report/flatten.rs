//! Turns a project's field values into the key -> text map used by templates.

use std::collections::{BTreeMap, HashMap};

use crate::assessment::models::{AssessmentFieldValue, AssessmentProject, AssessmentType};

/// Placeholder key -> replacement text. Ordered so iteration is reproducible.
pub type SubstitutionMap = BTreeMap<String, String>;

pub const KEY_PROJECT_DISPLAY_NAME: &str = "project_display_name";
pub const KEY_ASSESSMENT_TYPE_ID: &str = "assessment_type_id";
pub const KEY_ASSESSMENT_TYPE_NAME: &str = "assessment_type_name";
pub const KEY_ASSESSOR_ID: &str = "assessor_id";
pub const KEY_STATUS: &str = "status";
pub const KEY_CREATION_TIMESTAMP: &str = "creation_timestamp";
pub const KEY_LAST_MODIFICATION_TIMESTAMP: &str = "last_modification_timestamp";
pub const KEY_PUBLIC_ACCESS_ID: &str = "public_access_id";
pub const KEY_DOCUMENT_STORAGE_PATH: &str = "document_storage_path";
pub const KEY_QR_CODE_DATA: &str = "qr_code_data";

/// Build the substitution map for `project`.
///
/// Every field definition of the type gets an entry: the submitted text when
/// it is not blank, otherwise the definition's default text (or ""). Project
/// metadata is added under fixed keys and takes precedence over a field
/// definition that happens to use the same key.
pub fn flatten_field_values(
    project: &AssessmentProject,
    assessment_type: &AssessmentType,
) -> SubstitutionMap {
    let values_by_definition: HashMap<&str, &AssessmentFieldValue> = project
        .field_values
        .iter()
        .map(|value| (value.field_definition_id.as_str(), value))
        .collect();

    let mut data = SubstitutionMap::new();

    for definition in &assessment_type.field_definitions {
        let display = values_by_definition
            .get(definition.id.as_str())
            .map(|value| value.display_text())
            .unwrap_or_default();

        let text = if display.trim().is_empty() {
            definition.default_text_if_empty.clone().unwrap_or_default()
        } else {
            display
        };
        data.insert(definition.field_key.clone(), text);
    }

    let metadata = [
        (KEY_PROJECT_DISPLAY_NAME, project.display_name.clone()),
        (KEY_ASSESSMENT_TYPE_ID, project.assessment_type_id.clone()),
        (KEY_ASSESSMENT_TYPE_NAME, assessment_type.name.clone()),
        (KEY_ASSESSOR_ID, project.assessor_id.clone()),
        (KEY_STATUS, project.status.to_string()),
        (KEY_CREATION_TIMESTAMP, project.creation_timestamp.to_rfc3339()),
        (
            KEY_LAST_MODIFICATION_TIMESTAMP,
            project.last_modification_timestamp.to_rfc3339(),
        ),
        (
            KEY_PUBLIC_ACCESS_ID,
            project.public_access_id.clone().unwrap_or_default(),
        ),
        (
            KEY_DOCUMENT_STORAGE_PATH,
            project.document_storage_path.clone().unwrap_or_default(),
        ),
        (KEY_QR_CODE_DATA, project.qr_code_data.clone().unwrap_or_default()),
    ];
    for (key, value) in metadata {
        data.insert(key.to_string(), value);
    }

    data
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assessment::models::{FieldDataType, FieldDefinition, ProjectStatus};
    use chrono::{TimeZone, Utc};

    fn definition(id: &str, key: &str, default: Option<&str>) -> FieldDefinition {
        FieldDefinition {
            id: id.to_string(),
            assessment_type_id: "type-1".to_string(),
            field_key: key.to_string(),
            label: key.to_string(),
            field_type: FieldDataType::Text,
            options: None,
            is_required: false,
            order: 0,
            section: None,
            default_text_if_empty: default.map(str::to_string),
        }
    }

    fn fixture() -> (AssessmentProject, AssessmentType) {
        let ty = AssessmentType {
            id: "type-1".to_string(),
            name: "Intake".to_string(),
            description: None,
            template_file_names: vec!["intake.docx".to_string()],
            field_definitions: vec![
                definition("d1", "client", None),
                definition("d2", "notes", Some("N/A")),
                definition("d3", "tags", Some("none")),
                definition("d4", "blank", None),
            ],
        };
        let created = Utc.with_ymd_and_hms(2024, 3, 1, 9, 30, 0).unwrap();
        let project = AssessmentProject {
            id: "p-1".to_string(),
            display_name: "Client A".to_string(),
            assessment_type_id: "type-1".to_string(),
            assessor_id: "assessor-7".to_string(),
            status: ProjectStatus::Active,
            creation_timestamp: created,
            last_modification_timestamp: created,
            field_values: vec![
                AssessmentFieldValue::single("d1", "Acme Ltd"),
                AssessmentFieldValue::single("d2", "   "),
                AssessmentFieldValue::multi("d3", vec!["a".into(), "b".into()]),
            ],
            public_access_id: None,
            document_storage_path: None,
            qr_code_data: None,
        };
        (project, ty)
    }

    #[test]
    fn test_values_and_defaults() {
        let (project, ty) = fixture();
        let data = flatten_field_values(&project, &ty);

        assert_eq!(data["client"], "Acme Ltd");
        assert_eq!(data["notes"], "N/A");
        assert_eq!(data["tags"], "a, b");
        assert_eq!(data["blank"], "");
    }

    #[test]
    fn test_missing_value_uses_default_text() {
        let (mut project, ty) = fixture();
        project.field_values.clear();
        let data = flatten_field_values(&project, &ty);
        assert_eq!(data["notes"], "N/A");
        assert_eq!(data["tags"], "none");
    }

    #[test]
    fn test_metadata_keys() {
        let (project, ty) = fixture();
        let data = flatten_field_values(&project, &ty);

        assert_eq!(data[KEY_PROJECT_DISPLAY_NAME], "Client A");
        assert_eq!(data[KEY_ASSESSMENT_TYPE_NAME], "Intake");
        assert_eq!(data[KEY_ASSESSOR_ID], "assessor-7");
        assert_eq!(data[KEY_STATUS], "ACTIVE");
        assert_eq!(data[KEY_CREATION_TIMESTAMP], "2024-03-01T09:30:00+00:00");
        assert_eq!(data[KEY_PUBLIC_ACCESS_ID], "");
        assert_eq!(data.len(), 4 + 10);
    }

    #[test]
    fn test_flattening_is_deterministic() {
        let (project, ty) = fixture();
        let first = flatten_field_values(&project, &ty);
        let second = flatten_field_values(&project, &ty);
        assert_eq!(first, second);
        assert_eq!(
            first.keys().collect::<Vec<_>>(),
            second.keys().collect::<Vec<_>>()
        );
    }
}
