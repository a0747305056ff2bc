#![allow(dead_code)]

use std::collections::HashMap;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};
use tokio::sync::Mutex;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

use baholash_server::assessment::models::{
    AssessmentFieldValue, AssessmentProject, AssessmentProjectDocument, AssessmentType,
    DocumentType, FieldDataType, FieldDefinition, ProjectStatus,
};
use baholash_server::assessment::repository::{
    AssessmentRepository, PublishingInfo, RepositoryError,
};
use baholash_server::config::AppConfig;
use baholash_server::report::convert::{pdf_output_path, ConvertError, DocumentConverter};
use baholash_server::report::{ProjectStorage, ReportService};
use baholash_server::AppState;

pub const ASSESSOR: &str = "assessor-1";
pub const TYPE_ID: &str = "intake";
pub const PROJECT_ID: &str = "project-1";
pub const BASE_URL: &str = "https://reports.example.com/public/docs";

#[derive(Default)]
struct RepositoryState {
    types: HashMap<String, AssessmentType>,
    projects: HashMap<String, AssessmentProject>,
    documents: Vec<AssessmentProjectDocument>,
}

/// In-memory [`AssessmentRepository`] with switchable failure of the
/// publishing-info update.
#[derive(Default)]
pub struct InMemoryRepository {
    state: Mutex<RepositoryState>,
    fail_publishing_update: AtomicBool,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_type(&self, assessment_type: AssessmentType) {
        let mut state = self.state.lock().await;
        state
            .types
            .insert(assessment_type.id.clone(), assessment_type);
    }

    pub async fn insert_project(&self, project: AssessmentProject) {
        let mut state = self.state.lock().await;
        state.projects.insert(project.id.clone(), project);
    }

    pub async fn project(&self, project_id: &str) -> Option<AssessmentProject> {
        self.state.lock().await.projects.get(project_id).cloned()
    }

    pub async fn documents(
        &self,
        project_id: &str,
        document_type: DocumentType,
    ) -> Vec<AssessmentProjectDocument> {
        self.state
            .lock()
            .await
            .documents
            .iter()
            .filter(|d| d.project_id == project_id && d.document_type == document_type)
            .cloned()
            .collect()
    }

    pub fn fail_publishing_updates(&self, fail: bool) {
        self.fail_publishing_update.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl AssessmentRepository for InMemoryRepository {
    async fn get_project_by_id(
        &self,
        project_id: &str,
        assessor_id: &str,
    ) -> Result<Option<AssessmentProject>, RepositoryError> {
        let state = self.state.lock().await;
        Ok(state
            .projects
            .get(project_id)
            .filter(|p| p.assessor_id == assessor_id)
            .cloned())
    }

    async fn get_assessment_type_by_id(
        &self,
        type_id: &str,
    ) -> Result<Option<AssessmentType>, RepositoryError> {
        Ok(self.state.lock().await.types.get(type_id).cloned())
    }

    async fn get_documents_for_project(
        &self,
        project_id: &str,
        document_type: DocumentType,
    ) -> Result<Vec<AssessmentProjectDocument>, RepositoryError> {
        Ok(self.documents(project_id, document_type).await)
    }

    async fn add_document_record(
        &self,
        project_id: &str,
        document_type: DocumentType,
        original_file_name: &str,
        stored_path: &str,
    ) -> Result<AssessmentProjectDocument, RepositoryError> {
        let mut state = self.state.lock().await;
        let existing = state
            .documents
            .iter()
            .filter(|d| d.project_id == project_id && d.document_type == document_type)
            .count();
        let record = AssessmentProjectDocument {
            id: uuid::Uuid::new_v4().to_string(),
            project_id: project_id.to_string(),
            document_type,
            original_file_name: original_file_name.to_string(),
            stored_file_path: stored_path.to_string(),
            upload_timestamp: Utc::now(),
            version_number: existing as i32 + 1,
        };
        state.documents.push(record.clone());
        Ok(record)
    }

    async fn update_project_publishing_info(
        &self,
        project_id: &str,
        info: &PublishingInfo,
    ) -> Result<bool, RepositoryError> {
        if self.fail_publishing_update.load(Ordering::SeqCst) {
            return Err(RepositoryError::Corrupt("simulated write failure".to_string()));
        }
        let mut state = self.state.lock().await;
        match state.projects.get_mut(project_id) {
            Some(project) => {
                project.public_access_id = Some(info.public_access_id.clone());
                project.document_storage_path = Some(info.final_doc_path.clone());
                project.qr_code_data = Some(info.qr_code_data.clone());
                project.last_modification_timestamp = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn find_project_by_public_access_id(
        &self,
        public_access_id: &str,
    ) -> Result<Option<AssessmentProject>, RepositoryError> {
        let state = self.state.lock().await;
        Ok(state
            .projects
            .values()
            .find(|p| p.public_access_id.as_deref() == Some(public_access_id))
            .cloned())
    }

    async fn replace_field_values(
        &self,
        project_id: &str,
        assessor_id: &str,
        values: &[AssessmentFieldValue],
    ) -> Result<bool, RepositoryError> {
        let mut state = self.state.lock().await;
        match state
            .projects
            .get_mut(project_id)
            .filter(|p| p.assessor_id == assessor_id)
        {
            Some(project) => {
                project.field_values = values.to_vec();
                project.last_modification_timestamp = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn update_project_status(
        &self,
        project_id: &str,
        assessor_id: &str,
        status: ProjectStatus,
    ) -> Result<bool, RepositoryError> {
        let mut state = self.state.lock().await;
        match state
            .projects
            .get_mut(project_id)
            .filter(|p| p.assessor_id == assessor_id)
        {
            Some(project) => {
                project.status = status;
                project.last_modification_timestamp = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_assessment_type(&self, type_id: &str) -> Result<bool, RepositoryError> {
        let mut state = self.state.lock().await;
        if state
            .projects
            .values()
            .any(|p| p.assessment_type_id == type_id)
        {
            return Err(RepositoryError::InUse(format!("assessment type {}", type_id)));
        }
        Ok(state.types.remove(type_id).is_some())
    }
}

/// Converter that writes a one-page PDF naming the source file, or fails on
/// the configured call (1-based).
#[derive(Default)]
pub struct FakeConverter {
    calls: AtomicUsize,
    fail_on_call: Option<usize>,
}

impl FakeConverter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_on(call: usize) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            fail_on_call: Some(call),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DocumentConverter for FakeConverter {
    async fn convert(&self, source: &Path, out_dir: &Path) -> Result<PathBuf, ConvertError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if !source.exists() {
            return Err(ConvertError::SourceMissing(source.to_path_buf()));
        }
        if self.fail_on_call == Some(call) {
            return Err(ConvertError::ExitStatus {
                code: Some(1),
                stderr: "simulated conversion failure".to_string(),
            });
        }

        let output = pdf_output_path(source, out_dir);
        let label = source
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        write_pdf(&output, &[label.as_str()]);
        Ok(output)
    }
}

/// Write a PDF with one page per label; each page shows its label.
pub fn write_pdf(path: &Path, labels: &[&str]) {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });

    let mut kids: Vec<Object> = Vec::new();
    for label in labels {
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 18.into()]),
                Operation::new("Td", vec![72.into(), 720.into()]),
                Operation::new("Tj", vec![Object::string_literal(*label)]),
                Operation::new("ET", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => resources_id,
            "MediaBox" => Object::Array(vec![0.into(), 0.into(), 612.into(), 792.into()]),
        });
        kids.push(page_id.into());
    }

    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => labels.len() as i64,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc.save(path).unwrap();
}

/// Decoded content of every page, in page order.
pub fn page_contents(path: &Path) -> Vec<String> {
    let doc = Document::load(path).unwrap();
    doc.get_pages()
        .into_values()
        .map(|id| String::from_utf8_lossy(&doc.get_page_content(id).unwrap()).into_owned())
        .collect()
}

/// Write a zip package with the given `(part name, contents)` entries.
pub fn write_package(path: &Path, parts: &[(&str, &str)]) {
    let file = File::create(path).unwrap();
    let mut writer = ZipWriter::new(file);
    for (name, contents) in parts {
        writer
            .start_file(*name, SimpleFileOptions::default())
            .unwrap();
        writer.write_all(contents.as_bytes()).unwrap();
    }
    writer.finish().unwrap();
}

const DOCX_CONTENT_TYPES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="xml" ContentType="application/xml"/><Override PartName="/word/document.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/></Types>"#;

/// Minimal docx whose body holds the given paragraphs' text, one run each.
pub fn write_docx(path: &Path, paragraphs: &[&str]) {
    let body: String = paragraphs
        .iter()
        .map(|text| format!(r#"<w:p><w:r><w:t xml:space="preserve">{}</w:t></w:r></w:p>"#, text))
        .collect();
    let document = format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body>{}</w:body></w:document>"#,
        body
    );
    write_package(
        path,
        &[
            ("[Content_Types].xml", DOCX_CONTENT_TYPES),
            ("word/document.xml", document.as_str()),
        ],
    );
}

/// Docx with a body and a header part given as raw XML.
pub fn write_docx_parts(path: &Path, document_xml: &str, header_xml: &str) {
    write_package(
        path,
        &[
            ("[Content_Types].xml", DOCX_CONTENT_TYPES),
            ("word/document.xml", document_xml),
            ("word/header1.xml", header_xml),
        ],
    );
}

/// Minimal xlsx with one shared-string cell and one inline-string cell.
pub fn write_xlsx(path: &Path, shared: &[&str], inline: &str) {
    let items: String = shared
        .iter()
        .map(|text| format!("<si><t>{}</t></si>", text))
        .collect();
    let shared_strings = format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><sst xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" count="{n}" uniqueCount="{n}">{items}</sst>"#,
        n = shared.len(),
        items = items
    );
    let sheet = format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData><row r="1"><c r="A1" t="s"><v>0</v></c><c r="B1" t="inlineStr"><is><t>{}</t></is></c></row></sheetData></worksheet>"#,
        inline
    );
    write_package(
        path,
        &[
            (
                "xl/workbook.xml",
                r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheets><sheet name="Sheet1" sheetId="1"/></sheets></workbook>"#,
            ),
            ("xl/sharedStrings.xml", shared_strings.as_str()),
            ("xl/worksheets/sheet1.xml", sheet.as_str()),
        ],
    );
}

/// Contents of one package part as text.
pub fn read_part_text(path: &Path, part: &str) -> String {
    let bytes = baholash_server::report::template::package::read_part(path, part)
        .unwrap()
        .unwrap();
    String::from_utf8(bytes).unwrap()
}

pub fn field(id: &str, key: &str, field_type: FieldDataType, order: i32) -> FieldDefinition {
    FieldDefinition {
        id: id.to_string(),
        assessment_type_id: TYPE_ID.to_string(),
        field_key: key.to_string(),
        label: key.replace('_', " "),
        field_type,
        options: None,
        is_required: false,
        order,
        section: None,
        default_text_if_empty: None,
    }
}

/// The `intake` type: client_name, visit_date, services (multi) and notes
/// (defaulting to "None").
pub fn intake_type(templates: &[&str]) -> AssessmentType {
    let mut services = field("f-services", "services", FieldDataType::EnumMulti, 3);
    services.options = Some(vec![
        "Housing".to_string(),
        "Meals".to_string(),
        "Transport".to_string(),
    ]);
    let mut notes = field("f-notes", "notes", FieldDataType::TextArea, 4);
    notes.default_text_if_empty = Some("None".to_string());
    let mut client = field("f-client", "client_name", FieldDataType::Text, 1);
    client.is_required = true;

    AssessmentType {
        id: TYPE_ID.to_string(),
        name: "Client intake".to_string(),
        description: None,
        template_file_names: templates.iter().map(|t| t.to_string()).collect(),
        field_definitions: vec![
            client,
            field("f-date", "visit_date", FieldDataType::Date, 2),
            services,
            notes,
        ],
    }
}

pub fn project(id: &str, display_name: &str) -> AssessmentProject {
    let now = Utc::now();
    AssessmentProject {
        id: id.to_string(),
        display_name: display_name.to_string(),
        assessment_type_id: TYPE_ID.to_string(),
        assessor_id: ASSESSOR.to_string(),
        status: ProjectStatus::Active,
        creation_timestamp: now,
        last_modification_timestamp: now,
        field_values: vec![
            AssessmentFieldValue::single("f-client", "Acme & Sons"),
            AssessmentFieldValue::single("f-date", "2024-03-01"),
            AssessmentFieldValue::multi(
                "f-services",
                vec!["Housing".to_string(), "Meals".to_string()],
            ),
        ],
        public_access_id: None,
        document_storage_path: None,
        qr_code_data: None,
    }
}

/// A service over temporary template and project roots.
pub struct Harness {
    pub dir: tempfile::TempDir,
    pub repository: Arc<InMemoryRepository>,
    pub converter: Arc<FakeConverter>,
    pub service: ReportService,
}

impl Harness {
    pub async fn new(converter: FakeConverter) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let repository = Arc::new(InMemoryRepository::new());
        let converter = Arc::new(converter);
        let storage = ProjectStorage::new(dir.path().join("templates"), dir.path().join("projects"));
        storage.ensure_roots().unwrap();
        let service = ReportService::new(repository.clone(), converter.clone(), storage);
        Self {
            dir,
            repository,
            converter,
            service,
        }
    }

    pub fn templates_dir(&self) -> PathBuf {
        let dir = self.dir.path().join("templates").join(TYPE_ID);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    pub fn project_dir(&self, project_id: &str, document_type: DocumentType) -> PathBuf {
        self.service.storage().project_dir(project_id, document_type)
    }

    /// Store modified documents for `project_id` through the service.
    pub async fn upload_modified(&self, project_id: &str, names: &[&str]) {
        for name in names {
            self.service
                .store_modified_document(project_id, ASSESSOR, name, format!("contents of {}", name).into_bytes())
                .await
                .unwrap();
        }
    }
}

/// Files directly inside `dir`, sorted; empty when `dir` does not exist.
pub fn list_files(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = match std::fs::read_dir(dir) {
        Ok(entries) => entries
            .filter_map(Result::ok)
            .map(|entry| entry.file_name().to_string_lossy().into_owned())
            .collect(),
        Err(_) => Vec::new(),
    };
    names.sort();
    names
}

/// Application state over temporary storage roots, for handler tests.
pub fn app_state(
    dir: &Path,
    repository: Arc<InMemoryRepository>,
    converter: Arc<FakeConverter>,
) -> AppState {
    let config = AppConfig {
        templates_path: dir.join("templates"),
        projects_path: dir.join("projects"),
        public_base_url: BASE_URL.to_string(),
        ..AppConfig::default()
    };
    AppState::new_with_repository_and_converter(&config, repository, converter).unwrap()
}
