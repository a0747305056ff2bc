//! Report pipeline - from field values to a published, QR-stamped PDF.
//!
//! - `flatten` - field values to a placeholder substitution map
//! - `template` - filling docx/xlsx templates
//! - `convert` - office documents to PDF via an external converter
//! - `merge` - combining PDFs
//! - `qr` - stamping the public link as a QR code
//! - `storage` - on-disk layout of templates and project artifacts
//! - `lock` - per-project serialisation
//! - `service` - the orchestrating `ReportService`

pub mod convert;
pub mod flatten;
pub mod lock;
pub mod merge;
pub mod qr;
pub mod service;
pub mod storage;
pub mod template;

pub use convert::{ConvertError, DocumentConverter, LibreOfficeConverter};
pub use flatten::{flatten_field_values, SubstitutionMap};
pub use merge::{merge_pdfs, PdfError};
pub use qr::stamp_qr_code;
pub use service::{ReportError, ReportService};
pub use storage::ProjectStorage;
pub use template::{fill_template, TemplateError};
