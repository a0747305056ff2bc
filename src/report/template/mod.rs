//! Template filling for office packages.
//!
//! - `runs` - placeholder scanning and run-style preservation
//! - `package` - zip part rewriting
//! - `docx` - WordprocessingML paragraphs
//! - `xlsx` - SpreadsheetML shared and inline strings

pub mod docx;
pub mod package;
pub mod runs;
pub mod xlsx;

use std::path::Path;

use thiserror::Error;

pub use docx::DocxFiller;
pub use runs::{substitute_runs, substitute_text, StyledRun};
pub use xlsx::XlsxFiller;

use crate::report::flatten::SubstitutionMap;

/// Errors that can occur while filling a template.
#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("unsupported template format: {0}")]
    UnsupportedFormat(String),
    #[error("template I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid office package: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("malformed XML: {0}")]
    Xml(#[from] quick_xml::Error),
    #[error("part {0} is not valid UTF-8")]
    Encoding(String),
    #[error("package is missing required part {0}")]
    MissingPart(String),
    #[error("part {0} ends inside an open element")]
    Truncated(String),
}

/// Template formats, chosen by file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateFormat {
    WordDocument,
    Spreadsheet,
}

impl TemplateFormat {
    pub fn from_path(path: &Path) -> Option<Self> {
        let extension = path.extension()?.to_str()?.to_ascii_lowercase();
        match extension.as_str() {
            "docx" => Some(Self::WordDocument),
            "xlsx" => Some(Self::Spreadsheet),
            _ => None,
        }
    }

    fn filler(self) -> &'static dyn TemplateFiller {
        match self {
            Self::WordDocument => &DocxFiller,
            Self::Spreadsheet => &XlsxFiller,
        }
    }
}

/// A filler reads a template package and writes a filled copy.
pub trait TemplateFiller: Sync {
    fn fill(&self, source: &Path, target: &Path, data: &SubstitutionMap) -> Result<(), TemplateError>;
}

/// Fill `template` into `output`, dispatching on the template's extension.
///
/// The template itself is never modified. Unsupported extensions are
/// rejected before anything is written.
pub fn fill_template(template: &Path, output: &Path, data: &SubstitutionMap) -> Result<(), TemplateError> {
    let format = TemplateFormat::from_path(template)
        .ok_or_else(|| TemplateError::UnsupportedFormat(template.display().to_string()))?;
    format.filler().fill(template, output, data)
}
