//! Validation of submitted field values against an assessment type.
//!
//! Errors are collected rather than returned on the first failure so the
//! caller gets the full list in one response.

use std::collections::{HashMap, HashSet};
use std::fmt;

use super::models::{AssessmentFieldValue, AssessmentType, FieldDataType, FieldDefinition};

/// Validation error with a short, user-facing message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// The field that failed validation
    pub field: String,
    pub message: String,
    pub suggestion: Option<String>,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
            suggestion: None,
        }
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    pub fn unknown_field(field_definition_id: &str, type_id: &str) -> Self {
        Self::new(
            field_definition_id,
            format!("field does not belong to assessment type '{}'", type_id),
        )
    }

    pub fn duplicate_field(field_key: &str) -> Self {
        Self::new(field_key, "field was submitted more than once")
    }

    pub fn wrong_shape(field_key: &str, field_type: FieldDataType) -> Self {
        let expected = if field_type.is_multi_valued() {
            "a list in `values`"
        } else {
            "a single `value`"
        };
        Self::new(
            field_key,
            format!("{} fields take {}", field_type.as_str(), expected),
        )
    }

    pub fn not_an_option(field_key: &str, value: &str, options: &[String]) -> Self {
        Self::new(field_key, format!("'{}' is not an allowed option", value))
            .with_suggestion(format!("Choose one of: {}", options.join(", ")))
    }

    pub fn not_a_number(field_key: &str, value: &str) -> Self {
        Self::new(field_key, format!("'{}' is not a number", value))
    }

    pub fn not_a_boolean(field_key: &str, value: &str) -> Self {
        Self::new(field_key, format!("'{}' is not a boolean", value))
            .with_suggestion("Use true or false")
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.field, self.message)?;
        if let Some(ref suggestion) = self.suggestion {
            write!(f, ". {}", suggestion)?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

#[derive(Debug, Default)]
pub struct ValidationErrors {
    errors: Vec<ValidationError>,
}

impl ValidationErrors {
    pub fn new() -> Self {
        Self { errors: Vec::new() }
    }

    pub fn add(&mut self, error: ValidationError) {
        self.errors.push(error);
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn errors(&self) -> &[ValidationError] {
        &self.errors
    }

    pub fn to_message(&self) -> String {
        self.errors
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ")
    }

    pub fn into_result(self) -> Result<(), ValidationErrors> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} validation error(s): {}", self.len(), self.to_message())
    }
}

impl std::error::Error for ValidationErrors {}

/// Check a replacement set of field values against `assessment_type`.
///
/// The set may be partial or empty: drafts are saved before every field is
/// answered, and omitted fields fall back to their default text when filled.
pub fn validate_field_values(
    assessment_type: &AssessmentType,
    values: &[AssessmentFieldValue],
) -> Result<(), ValidationErrors> {
    let mut errors = ValidationErrors::new();
    let definitions: HashMap<&str, &FieldDefinition> = assessment_type
        .field_definitions
        .iter()
        .map(|d| (d.id.as_str(), d))
        .collect();

    let mut seen = HashSet::new();
    for value in values {
        let Some(definition) = definitions.get(value.field_definition_id.as_str()) else {
            errors.add(ValidationError::unknown_field(
                &value.field_definition_id,
                &assessment_type.id,
            ));
            continue;
        };
        if !seen.insert(definition.id.as_str()) {
            errors.add(ValidationError::duplicate_field(&definition.field_key));
            continue;
        }
        validate_value(definition, value, &mut errors);
    }

    errors.into_result()
}

fn validate_value(
    definition: &FieldDefinition,
    value: &AssessmentFieldValue,
    errors: &mut ValidationErrors,
) {
    let key = definition.field_key.as_str();
    let field_type = definition.field_type;

    let shape_ok = if field_type.is_multi_valued() {
        value.value.is_none()
    } else {
        value.values.is_none()
    };
    if !shape_ok {
        errors.add(ValidationError::wrong_shape(key, field_type));
        return;
    }

    let options = definition.options.as_deref().unwrap_or_default();
    match field_type {
        FieldDataType::EnumMulti => {
            for item in value.values.iter().flatten() {
                if !options.is_empty() && !options.contains(item) {
                    errors.add(ValidationError::not_an_option(key, item, options));
                }
            }
        }
        FieldDataType::EnumSingle => {
            if let Some(item) = value.value.as_deref().filter(|v| !v.is_empty()) {
                if !options.is_empty() && !options.iter().any(|o| o == item) {
                    errors.add(ValidationError::not_an_option(key, item, options));
                }
            }
        }
        FieldDataType::Number => {
            if let Some(raw) = value.value.as_deref().map(str::trim).filter(|v| !v.is_empty()) {
                if raw.parse::<f64>().is_err() {
                    errors.add(ValidationError::not_a_number(key, raw));
                }
            }
        }
        FieldDataType::Boolean => {
            if let Some(raw) = value.value.as_deref().map(str::trim).filter(|v| !v.is_empty()) {
                if !matches!(raw.to_ascii_lowercase().as_str(), "true" | "false") {
                    errors.add(ValidationError::not_a_boolean(key, raw));
                }
            }
        }
        FieldDataType::Text | FieldDataType::TextArea | FieldDataType::Date => {}
    }
}
