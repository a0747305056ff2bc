//! On-disk layout for templates and project artifacts.
//!
//! Templates live at `{template_root}/{assessment_type_id}/{file}` and project
//! artifacts at `{project_root}/{project_id}/{initial|modified|final}/{file}`.
//! Stored paths recorded in the database are relative to `project_root`.

use std::fs;
use std::path::{Component, Path, PathBuf};

use crate::assessment::models::DocumentType;

#[derive(Debug, Clone)]
pub struct ProjectStorage {
    template_root: PathBuf,
    project_root: PathBuf,
}

impl ProjectStorage {
    pub fn new(template_root: impl Into<PathBuf>, project_root: impl Into<PathBuf>) -> Self {
        Self {
            template_root: template_root.into(),
            project_root: project_root.into(),
        }
    }

    /// Create both roots if they do not exist yet.
    pub fn ensure_roots(&self) -> std::io::Result<()> {
        fs::create_dir_all(&self.template_root)?;
        fs::create_dir_all(&self.project_root)
    }

    /// Location of one template file of an assessment type.
    pub fn template_path(&self, assessment_type_id: &str, template_file_name: &str) -> PathBuf {
        self.template_root
            .join(assessment_type_id)
            .join(template_file_name)
    }

    pub fn project_dir(&self, project_id: &str, document_type: DocumentType) -> PathBuf {
        self.project_root
            .join(project_id)
            .join(document_type.storage_folder())
    }

    /// Path relative to the project root, as stored in document records.
    pub fn relative_path(&self, project_id: &str, document_type: DocumentType, file_name: &str) -> String {
        format!(
            "{}/{}/{}",
            project_id,
            document_type.storage_folder(),
            file_name
        )
    }

    /// Resolve a stored relative path under the project root.
    ///
    /// Returns `None` for absolute paths or paths with `..` or other
    /// non-plain components.
    pub fn absolute(&self, relative: &str) -> Option<PathBuf> {
        let relative = Path::new(relative);
        if relative.as_os_str().is_empty() {
            return None;
        }
        if !relative
            .components()
            .all(|component| matches!(component, Component::Normal(_)))
        {
            return None;
        }
        Some(self.project_root.join(relative))
    }
}

/// Output name of a filled template: the project name reduced to
/// `[A-Za-z0-9.-]` followed by `_` and the template file name.
pub fn output_file_name(display_name: &str, template_file_name: &str) -> String {
    let safe: String = display_name
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || ch == '.' || ch == '-' {
                ch
            } else {
                '_'
            }
        })
        .collect();
    format!("{}_{}", safe, template_file_name)
}

/// A plain file name: non-empty, no separators, not `.` or `..`.
pub fn is_safe_file_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\', '\0'])
}
