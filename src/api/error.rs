use actix_web::{HttpResponse, ResponseError};
use std::fmt;
use tracing::{error, warn};

use crate::api::validation::ErrorResponse;
use crate::registry::RegistryError;
use crate::store::StoreError;

/// Service-level errors
#[derive(Debug)]
pub enum ServiceError {
    /// Run registry operation failed
    RegistryError(RegistryError),

    /// Result store operation failed
    StoreError(StoreError),

    /// Request could not be acted on
    ValidationError(String),

    /// Synchronous scrape finished as failed
    WorkerFailure(String),

    /// Record not found
    NotFound(String),
}

impl fmt::Display for ServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceError::RegistryError(e) => write!(f, "Registry error: {}", e),
            ServiceError::StoreError(e) => write!(f, "Store error: {}", e),
            ServiceError::ValidationError(msg) => write!(f, "Validation error: {}", msg),
            ServiceError::WorkerFailure(msg) => write!(f, "Scrape failed: {}", msg),
            ServiceError::NotFound(id) => write!(f, "Job record not found: {}", id),
        }
    }
}

impl std::error::Error for ServiceError {}

impl From<RegistryError> for ServiceError {
    fn from(err: RegistryError) -> Self {
        ServiceError::RegistryError(err)
    }
}

impl From<StoreError> for ServiceError {
    fn from(err: StoreError) -> Self {
        ServiceError::StoreError(err)
    }
}

impl ResponseError for ServiceError {
    fn error_response(&self) -> HttpResponse {
        match self {
            ServiceError::RegistryError(e) => {
                error!("Registry error: {}", e);
                HttpResponse::InternalServerError().json(ErrorResponse {
                    error: "Failed to process request".to_string(),
                    fields: serde_json::json!({"message": "Run registry error occurred"}),
                })
            }
            ServiceError::StoreError(e) => {
                error!("Store error: {}", e);
                HttpResponse::InternalServerError().json(ErrorResponse {
                    error: "Failed to process request".to_string(),
                    fields: serde_json::json!({"message": "Database error occurred"}),
                })
            }
            ServiceError::ValidationError(msg) => {
                warn!("Validation error: {}", msg);
                HttpResponse::BadRequest().json(ErrorResponse {
                    error: "Validation failed".to_string(),
                    fields: serde_json::json!({"message": msg}),
                })
            }
            ServiceError::WorkerFailure(msg) => {
                warn!("Synchronous scrape failed: {}", msg);
                HttpResponse::BadGateway().json(ErrorResponse {
                    error: "Scrape failed".to_string(),
                    fields: serde_json::json!({"message": msg, "retryable": true}),
                })
            }
            ServiceError::NotFound(id) => {
                warn!("Job record not found: {}", id);
                HttpResponse::NotFound().json(ErrorResponse {
                    error: "Not found".to_string(),
                    fields: serde_json::json!({"message": format!("Job record with id {} not found", id)}),
                })
            }
        }
    }
}
