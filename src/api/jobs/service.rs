use std::sync::Arc;

use tracing::{info, warn};
use validator::Validate;

use super::dto::{DeleteResponse, ImportRecord, ImportResponse, ListResponse, RecordError};
use crate::api::error::ServiceError;
use crate::clock::Clock;
use crate::dedup::{AuditReport, CleanResult, DuplicateAuditor};
use crate::domain::normalize_company;
use crate::store::{ResultStore, StoreError};

/// Job record service: imports, listing and duplicate maintenance
pub struct JobService {
    store: Arc<dyn ResultStore>,
    auditor: DuplicateAuditor,
    clock: Arc<dyn Clock>,
}

impl JobService {
    /// Create a new JobService instance
    pub fn new(store: Arc<dyn ResultStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            auditor: DuplicateAuditor::new(store.clone()),
            store,
            clock,
        }
    }

    /// Bulk import records from a request body or uploaded file
    ///
    /// # Business Logic
    /// - Validates each record individually
    /// - Collects validation errors with record titles
    /// - Imports only valid records; known identities are skipped, not updated
    /// - Returns summary with inserted/skipped counts and errors
    ///
    /// # Returns
    /// - `Ok(ImportResponse)` - Records processed (may have partial errors)
    /// - `Err(ServiceError)` - Complete failure
    pub async fn import(&self, records: Vec<ImportRecord>) -> Result<ImportResponse, ServiceError> {
        info!("Service: Processing import of {} records", records.len());

        let now = self.clock.now();
        let mut valid = Vec::new();
        let mut errors = Vec::new();

        for record in records {
            let mut messages: Vec<String> = match record.validate() {
                Ok(()) => Vec::new(),
                Err(validation_errors) => validation_errors
                    .field_errors()
                    .values()
                    .flat_map(|errors| {
                        errors.iter().map(|e| {
                            e.message
                                .as_ref()
                                .map(|m| m.to_string())
                                .unwrap_or_else(|| "Validation error".to_string())
                        })
                    })
                    .collect(),
            };
            if messages.is_empty() && record.title.trim().is_empty() {
                messages.push("Title must not be blank".to_string());
            }
            if messages.is_empty() && normalize_company(&record.company).is_empty() {
                messages.push("Company must contain letters or digits".to_string());
            }

            if messages.is_empty() {
                valid.push(record.into_record(now));
            } else {
                warn!("Service: Validation failed for record: {}", record.title);
                errors.push(RecordError {
                    title: record.title,
                    errors: messages,
                });
            }
        }

        let result = if valid.is_empty() {
            warn!("Service: No valid records to import");
            Default::default()
        } else {
            info!("Service: Importing {} valid records", valid.len());
            self.store.import(valid).await?
        };

        if errors.is_empty() {
            info!(
                "Service: Import completed: {} inserted, {} skipped",
                result.inserted, result.skipped
            );
        } else {
            warn!("Service: Import completed with {} validation errors", errors.len());
        }

        Ok(ImportResponse {
            message: format!(
                "Import completed. {} inserted, {} skipped, {} rejected",
                result.inserted,
                result.skipped,
                errors.len()
            ),
            inserted: result.inserted,
            skipped: result.skipped,
            errors,
        })
    }

    pub async fn list(&self, company: Option<&str>) -> Result<ListResponse, ServiceError> {
        let company_key = company.map(normalize_company);
        let records = self.store.list(company_key.as_deref()).await?;
        Ok(ListResponse {
            count: records.len(),
            records,
        })
    }

    pub async fn delete(&self, id: &str) -> Result<DeleteResponse, ServiceError> {
        if !self.store.delete(id).await? {
            return Err(ServiceError::NotFound(id.to_string()));
        }
        info!("Service: Deleted job record {}", id);
        Ok(DeleteResponse {
            message: format!("Job record {} deleted", id),
            removed: 1,
        })
    }

    /// Remove every record, or one company's
    pub async fn clear(&self, company: Option<&str>) -> Result<DeleteResponse, ServiceError> {
        let company_key = company.map(normalize_company);
        let removed = self.store.clear(company_key.as_deref()).await?;
        warn!("Service: Cleared {} job records (company={:?})", removed, company_key);
        Ok(DeleteResponse {
            message: format!("{} job records deleted", removed),
            removed,
        })
    }

    pub async fn audit(&self) -> Result<AuditReport, ServiceError> {
        Ok(self.auditor.audit().await?)
    }

    pub async fn clean_duplicates(&self) -> Result<CleanResult, ServiceError> {
        Ok(self.auditor.clean().await?)
    }

    /// Backend connectivity for health probes
    pub async fn ping(&self) -> Result<(), StoreError> {
        self.store.ping().await
    }
}
