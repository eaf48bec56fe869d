use actix_multipart::form::{MultipartForm, tempfile::TempFile};
use actix_web::{
    HttpResponse, delete, get, post,
    web::{self, Data, Path, Query, ServiceConfig, scope},
};
use actix_web_validator::Json;
use tracing::{error, info};

use super::dto::{CompanyFilter, ImportPayload, ImportRequest};
use super::service::JobService;
use crate::api::error::ServiceError;

/// Upper bound on records per upload, matching the JSON import limit
const MAX_UPLOAD_RECORDS: usize = 5000;

#[derive(MultipartForm)]
pub struct UploadForm {
    file: TempFile,
}

#[post("/import")]
async fn import_jobs(
    service: Data<JobService>,
    request: Json<ImportRequest>,
) -> Result<HttpResponse, ServiceError> {
    let response = service.import(request.into_inner().records).await?;
    Ok(HttpResponse::Ok().json(response))
}

/// Multipart upload of a JSON file: `{"records": [...]}` or a bare array
#[post("/import/upload")]
async fn upload_jobs(
    service: Data<JobService>,
    MultipartForm(form): MultipartForm<UploadForm>,
) -> Result<HttpResponse, ServiceError> {
    info!(
        "Received upload {:?} ({} bytes)",
        form.file.file_name, form.file.size
    );

    let contents = web::block(move || std::fs::read_to_string(form.file.file.path()))
        .await
        .map_err(|e| {
            error!("Upload read task failed: {}", e);
            ServiceError::ValidationError("could not read uploaded file".to_string())
        })?
        .map_err(|e| ServiceError::ValidationError(format!("uploaded file is not UTF-8 text: {}", e)))?;

    let records = serde_json::from_str::<ImportPayload>(&contents)
        .map_err(|e| ServiceError::ValidationError(format!("invalid JSON in upload: {}", e)))?
        .into_records();

    if records.is_empty() || records.len() > MAX_UPLOAD_RECORDS {
        return Err(ServiceError::ValidationError(format!(
            "Between 1 and {} records per import",
            MAX_UPLOAD_RECORDS
        )));
    }

    let response = service.import(records).await?;
    Ok(HttpResponse::Ok().json(response))
}

#[get("")]
async fn list_jobs(
    service: Data<JobService>,
    filter: Query<CompanyFilter>,
) -> Result<HttpResponse, ServiceError> {
    let listed = service.list(filter.company.as_deref()).await?;
    Ok(HttpResponse::Ok().json(listed))
}

#[get("/duplicates")]
async fn audit_duplicates(service: Data<JobService>) -> Result<HttpResponse, ServiceError> {
    let report = service.audit().await?;
    Ok(HttpResponse::Ok().json(report))
}

#[post("/clean-duplicates")]
async fn clean_duplicates(service: Data<JobService>) -> Result<HttpResponse, ServiceError> {
    let cleaned = service.clean_duplicates().await?;
    Ok(HttpResponse::Ok().json(cleaned))
}

#[delete("/clear-all")]
async fn clear_jobs(
    service: Data<JobService>,
    filter: Query<CompanyFilter>,
) -> Result<HttpResponse, ServiceError> {
    let cleared = service.clear(filter.company.as_deref()).await?;
    Ok(HttpResponse::Ok().json(cleared))
}

#[delete("/{id}")]
async fn delete_job(
    service: Data<JobService>,
    id: Path<String>,
) -> Result<HttpResponse, ServiceError> {
    let deleted = service.delete(&id).await?;
    Ok(HttpResponse::Ok().json(deleted))
}

pub fn jobs_config(config: &mut ServiceConfig) {
    // clear-all is registered ahead of the /{id} catch-all
    config.service(
        scope("jobs")
            .service(import_jobs)
            .service(upload_jobs)
            .service(list_jobs)
            .service(audit_duplicates)
            .service(clean_duplicates)
            .service(clear_jobs)
            .service(delete_job),
    );
}
