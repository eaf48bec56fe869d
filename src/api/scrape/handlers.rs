use actix_web::{
    HttpResponse, delete, get, post,
    web::{Data, Query, ServiceConfig},
};
use actix_web_validator::{Json, Query as ValidatedQuery};

use super::dto::{CompanyQuery, StartScrapeParams, StartScrapeRequest, StartScrapeResponse};
use super::service::ScrapeService;
use crate::api::error::ServiceError;

/// 202 when a run was started, 409 when one is already active,
/// 200 with records for `?wait=true`
#[post("/scrape")]
async fn start_scrape(
    service: Data<ScrapeService>,
    params: Query<StartScrapeParams>,
    request: Json<StartScrapeRequest>,
) -> Result<HttpResponse, ServiceError> {
    let response = service.start(&request, params.wait).await?;

    Ok(match response {
        StartScrapeResponse::Started { .. } => HttpResponse::Accepted().json(response),
        StartScrapeResponse::AlreadyActive { .. } => HttpResponse::Conflict().json(response),
        StartScrapeResponse::Completed { .. } => HttpResponse::Ok().json(response),
    })
}

#[get("/scrape-status")]
async fn scrape_status(
    service: Data<ScrapeService>,
    query: ValidatedQuery<CompanyQuery>,
) -> Result<HttpResponse, ServiceError> {
    let status = service.status(&query.company).await?;
    Ok(HttpResponse::Ok().json(status))
}

#[delete("/scrape-status")]
async fn clear_scrape_status(
    service: Data<ScrapeService>,
    query: ValidatedQuery<CompanyQuery>,
) -> Result<HttpResponse, ServiceError> {
    let cleared = service.clear(&query.company).await?;
    Ok(HttpResponse::Ok().json(cleared))
}

#[get("/summary")]
async fn summary(
    service: Data<ScrapeService>,
    query: ValidatedQuery<CompanyQuery>,
) -> Result<HttpResponse, ServiceError> {
    let summary = service.summary(&query.company).await?;
    Ok(HttpResponse::Ok().json(summary))
}

pub fn scrape_config(config: &mut ServiceConfig) {
    config
        .service(start_scrape)
        .service(scrape_status)
        .service(clear_scrape_status)
        .service(summary);
}
