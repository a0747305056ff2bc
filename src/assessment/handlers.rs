use actix_files::NamedFile;
use actix_multipart::Multipart;
use actix_web::{web, HttpRequest, HttpResponse, Responder};
use log::{error, info, warn};

use super::models::{
    AssessmentProject, DocumentType, GeneratedDocument, PublishedDocumentInfo,
    ReplaceFieldValuesRequest, UploadedDocumentsResponse,
};
use super::upload::{parse_document_uploads, UploadDocumentsForm};
use super::repository::RepositoryError;
use crate::auth::validate_request_token;
use crate::report::ReportError;
use crate::{AppState, ErrorResponse};

/// Map a pipeline failure onto an HTTP response without leaking internals.
pub fn report_error_response(err: &ReportError) -> HttpResponse {
    match err {
        ReportError::NotFound(what) => {
            HttpResponse::NotFound().json(ErrorResponse::not_found(&format!("{} not found", what)))
        }
        ReportError::NoModifiedDocuments(_) | ReportError::IllegalTransition(_) => {
            HttpResponse::Conflict().json(ErrorResponse::new("Conflict", &err.to_string()))
        }
        ReportError::Validation(errors) => {
            HttpResponse::BadRequest().json(ErrorResponse::bad_request(&errors.to_message()))
        }
        ReportError::InvalidFileName(_) => {
            HttpResponse::BadRequest().json(ErrorResponse::bad_request(&err.to_string()))
        }
        _ => {
            error!("Document pipeline failure: {}", err);
            HttpResponse::InternalServerError()
                .json(ErrorResponse::internal_error("Document processing failed"))
        }
    }
}

async fn serve_file(req: &HttpRequest, path: std::path::PathBuf) -> HttpResponse {
    match NamedFile::open_async(&path).await {
        Ok(file) => file.into_response(req),
        Err(e) => {
            error!("Failed to open {}: {}", path.display(), e);
            HttpResponse::NotFound().json(ErrorResponse::not_found("Document not found"))
        }
    }
}

#[utoipa::path(
    context_path = "/api",
    tag = "Assessment Documents",
    post,
    path = "/assessments/{id}/generate-initial-documents",
    security(("bearer_auth" = [])),
    params(
        ("id" = String, Path, description = "Project ID")
    ),
    responses(
        (status = 200, description = "Documents generated from the type's templates", body = [GeneratedDocument]),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Project or assessment type not found", body = ErrorResponse)
    )
)]
pub async fn generate_initial_documents(
    req: HttpRequest,
    path: web::Path<String>,
    state: web::Data<AppState>,
) -> impl Responder {
    let claims = match validate_request_token(&req) {
        Ok(c) => c,
        Err(e) => return e.error_response(),
    };
    let project_id = path.into_inner();
    info!("Generating initial documents for project {}", project_id);

    match state
        .reports
        .generate_initial_documents(&project_id, claims.assessor_id())
        .await
    {
        Ok(documents) => HttpResponse::Ok().json(documents),
        Err(e) => report_error_response(&e),
    }
}

#[utoipa::path(
    context_path = "/api",
    tag = "Assessment Documents",
    post,
    path = "/assessments/{id}/upload-modified",
    security(("bearer_auth" = [])),
    params(
        ("id" = String, Path, description = "Project ID")
    ),
    request_body(content = inline(UploadDocumentsForm), content_type = "multipart/form-data"),
    responses(
        (status = 201, description = "Modified documents stored", body = UploadedDocumentsResponse),
        (status = 400, description = "No file in the upload", body = ErrorResponse),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Project not found", body = ErrorResponse)
    )
)]
pub async fn upload_modified_documents(
    req: HttpRequest,
    path: web::Path<String>,
    payload: Multipart,
    state: web::Data<AppState>,
) -> impl Responder {
    let claims = match validate_request_token(&req) {
        Ok(c) => c,
        Err(e) => return e.error_response(),
    };
    let project_id = path.into_inner();

    let files = match parse_document_uploads(payload).await {
        Ok(files) => files,
        Err(e) => {
            warn!("Rejected upload for project {}: {}", project_id, e);
            return HttpResponse::from(e);
        }
    };

    let mut uploaded_files = Vec::with_capacity(files.len());
    for file in files {
        match state
            .reports
            .store_modified_document(&project_id, claims.assessor_id(), &file.file_name, file.contents)
            .await
        {
            Ok(record) => uploaded_files.push(record.original_file_name),
            Err(e) => return report_error_response(&e),
        }
    }

    info!(
        "Stored {} modified document(s) for project {}",
        uploaded_files.len(),
        project_id
    );
    HttpResponse::Created().json(UploadedDocumentsResponse { uploaded_files })
}

#[utoipa::path(
    context_path = "/api",
    tag = "Assessment Documents",
    post,
    path = "/assessments/{id}/publish",
    security(("bearer_auth" = [])),
    params(
        ("id" = String, Path, description = "Project ID")
    ),
    responses(
        (status = 200, description = "Project published", body = PublishedDocumentInfo),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Project not found", body = ErrorResponse),
        (status = 409, description = "No modified documents to publish", body = ErrorResponse),
        (status = 500, description = "Conversion, merge or persistence failed", body = ErrorResponse)
    )
)]
pub async fn publish_assessment(
    req: HttpRequest,
    path: web::Path<String>,
    state: web::Data<AppState>,
) -> impl Responder {
    let claims = match validate_request_token(&req) {
        Ok(c) => c,
        Err(e) => return e.error_response(),
    };
    let project_id = path.into_inner();
    info!("Publishing project {}", project_id);

    match state
        .reports
        .publish_assessment(&project_id, claims.assessor_id(), &state.public_base_url)
        .await
    {
        Ok(published) => HttpResponse::Ok().json(published),
        Err(e) => report_error_response(&e),
    }
}

#[utoipa::path(
    context_path = "/api",
    tag = "Assessment Projects",
    put,
    path = "/assessments/{id}/field-values",
    security(("bearer_auth" = [])),
    params(
        ("id" = String, Path, description = "Project ID")
    ),
    request_body = ReplaceFieldValuesRequest,
    responses(
        (status = 204, description = "Field values replaced"),
        (status = 400, description = "Values do not match the field definitions", body = ErrorResponse),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Project not found", body = ErrorResponse)
    )
)]
pub async fn replace_field_values(
    req: HttpRequest,
    path: web::Path<String>,
    body: web::Json<ReplaceFieldValuesRequest>,
    state: web::Data<AppState>,
) -> impl Responder {
    let claims = match validate_request_token(&req) {
        Ok(c) => c,
        Err(e) => return e.error_response(),
    };
    let project_id = path.into_inner();

    match state
        .reports
        .replace_field_values(&project_id, claims.assessor_id(), &body.field_values)
        .await
    {
        Ok(()) => HttpResponse::NoContent().finish(),
        Err(e) => report_error_response(&e),
    }
}

#[utoipa::path(
    context_path = "/api",
    tag = "Assessment Projects",
    post,
    path = "/assessments/{id}/finish",
    security(("bearer_auth" = [])),
    params(
        ("id" = String, Path, description = "Project ID")
    ),
    responses(
        (status = 200, description = "Project finished", body = AssessmentProject),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Project not found", body = ErrorResponse),
        (status = 409, description = "Project is already finished", body = ErrorResponse)
    )
)]
pub async fn finish_project(
    req: HttpRequest,
    path: web::Path<String>,
    state: web::Data<AppState>,
) -> impl Responder {
    let claims = match validate_request_token(&req) {
        Ok(c) => c,
        Err(e) => return e.error_response(),
    };
    let project_id = path.into_inner();

    match state
        .reports
        .finish_project(&project_id, claims.assessor_id())
        .await
    {
        Ok(project) => {
            info!("Project {} finished", project.id);
            HttpResponse::Ok().json(project)
        }
        Err(e) => report_error_response(&e),
    }
}

#[utoipa::path(
    context_path = "/api",
    tag = "Assessment Documents",
    get,
    path = "/assessments/{id}/documents/{folder}/{file_name}",
    security(("bearer_auth" = [])),
    params(
        ("id" = String, Path, description = "Project ID"),
        ("folder" = String, Path, description = "One of initial, modified, final"),
        ("file_name" = String, Path, description = "Stored file name")
    ),
    responses(
        (status = 200, description = "Document contents"),
        (status = 400, description = "Invalid folder or file name", body = ErrorResponse),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Document not found", body = ErrorResponse)
    )
)]
pub async fn download_project_document(
    req: HttpRequest,
    path: web::Path<(String, String, String)>,
    state: web::Data<AppState>,
) -> impl Responder {
    let claims = match validate_request_token(&req) {
        Ok(c) => c,
        Err(e) => return e.error_response(),
    };
    let (project_id, folder, file_name) = path.into_inner();

    let Some(document_type) = DocumentType::from_storage_folder(&folder) else {
        return HttpResponse::BadRequest().json(ErrorResponse::bad_request(&format!(
            "Unknown document folder '{}'",
            folder
        )));
    };

    match state
        .reports
        .resolve_project_document(&project_id, claims.assessor_id(), document_type, &file_name)
        .await
    {
        Ok(file) => serve_file(&req, file).await,
        Err(e) => report_error_response(&e),
    }
}

#[utoipa::path(
    tag = "Public Documents",
    get,
    path = "/public/docs/{public_access_id}",
    params(
        ("public_access_id" = String, Path, description = "Public access id of a published project")
    ),
    responses(
        (status = 200, description = "Published PDF", content_type = "application/pdf"),
        (status = 404, description = "No published document", body = ErrorResponse)
    )
)]
pub async fn get_public_document(
    req: HttpRequest,
    path: web::Path<String>,
    state: web::Data<AppState>,
) -> impl Responder {
    let public_access_id = path.into_inner();
    info!("Serving public document {}", public_access_id);

    match state.reports.resolve_public_document(&public_access_id).await {
        Ok(file) => serve_file(&req, file).await,
        Err(e) => report_error_response(&e),
    }
}

#[utoipa::path(
    context_path = "/api",
    tag = "Assessment Types",
    delete,
    path = "/assessment-types/{id}",
    security(("bearer_auth" = [])),
    params(
        ("id" = String, Path, description = "Assessment type ID")
    ),
    responses(
        (status = 204, description = "Assessment type deleted"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Caller is not an admin", body = ErrorResponse),
        (status = 404, description = "Assessment type not found", body = ErrorResponse),
        (status = 409, description = "Assessment type is still used by projects", body = ErrorResponse)
    )
)]
pub async fn delete_assessment_type(
    req: HttpRequest,
    path: web::Path<String>,
    state: web::Data<AppState>,
) -> impl Responder {
    let claims = match validate_request_token(&req) {
        Ok(c) => c,
        Err(e) => return e.error_response(),
    };
    if !claims.is_admin() {
        return HttpResponse::Forbidden()
            .json(ErrorResponse::new("Forbidden", "Admin role required"));
    }
    let type_id = path.into_inner();

    match state.repository.delete_assessment_type(&type_id).await {
        Ok(true) => {
            info!("Assessment type {} deleted by {}", type_id, claims.assessor_id());
            HttpResponse::NoContent().finish()
        }
        Ok(false) => HttpResponse::NotFound().json(ErrorResponse::not_found(&format!(
            "Assessment type {} not found",
            type_id
        ))),
        Err(e @ RepositoryError::InUse(_)) => {
            HttpResponse::Conflict().json(ErrorResponse::new("Conflict", &e.to_string()))
        }
        Err(e) => {
            error!("Failed to delete assessment type {}: {}", type_id, e);
            HttpResponse::InternalServerError()
                .json(ErrorResponse::internal_error("Failed to delete assessment type"))
        }
    }
}

/// Routes under `/api`.
pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::resource("/assessments/{id}/generate-initial-documents")
            .route(web::post().to(generate_initial_documents)),
    )
    .service(
        web::resource("/assessments/{id}/upload-modified")
            .route(web::post().to(upload_modified_documents)),
    )
    .service(web::resource("/assessments/{id}/publish").route(web::post().to(publish_assessment)))
    .service(
        web::resource("/assessments/{id}/field-values").route(web::put().to(replace_field_values)),
    )
    .service(web::resource("/assessments/{id}/finish").route(web::post().to(finish_project)))
    .service(
        web::resource("/assessments/{id}/documents/{folder}/{file_name}")
            .route(web::get().to(download_project_document)),
    )
    .service(
        web::resource("/assessment-types/{id}").route(web::delete().to(delete_assessment_type)),
    );
}

/// Unauthenticated routes at the root.
pub fn public_config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::resource("/public/docs/{public_access_id}").route(web::get().to(get_public_document)),
    );
}
