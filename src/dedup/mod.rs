//! Duplicate auditor and cleaner
//!
//! Groups stored records by `(company, normalized title)`. Cleaning keeps the
//! earliest-scraped member of each group (lowest id on ties) and deletes the rest.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::domain::{normalize_company, normalize_title, JobRecord};
use crate::store::{ResultStore, StoreError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DuplicateGroup {
    pub normalized_title: String,
    pub count: usize,
    /// Retention order: the first member survives a clean
    pub member_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompanyAudit {
    pub company_key: String,
    pub total_count: usize,
    pub unique_count: usize,
    pub duplicate_groups: Vec<DuplicateGroup>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditReport {
    pub total_records: usize,
    pub duplicate_records: usize,
    pub companies: Vec<CompanyAudit>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanResult {
    pub removed_count: u64,
}

/// Build the audit report for a set of records
pub fn audit_records(records: &[JobRecord]) -> AuditReport {
    let mut companies: BTreeMap<String, BTreeMap<String, Vec<&JobRecord>>> = BTreeMap::new();
    for record in records {
        companies
            .entry(normalize_company(&record.company))
            .or_default()
            .entry(normalize_title(&record.title))
            .or_default()
            .push(record);
    }

    let mut report = AuditReport {
        total_records: records.len(),
        ..AuditReport::default()
    };

    for (company_key, titles) in companies {
        let total_count = titles.values().map(Vec::len).sum();
        let unique_count = titles.len();

        let duplicate_groups: Vec<DuplicateGroup> = titles
            .into_iter()
            .filter(|(_, members)| members.len() > 1)
            .map(|(normalized_title, mut members)| {
                members.sort_by(|a, b| {
                    a.scraped_at
                        .cmp(&b.scraped_at)
                        .then_with(|| a.id.cmp(&b.id))
                });
                DuplicateGroup {
                    normalized_title,
                    count: members.len(),
                    member_ids: members.iter().map(|r| r.id.clone()).collect(),
                }
            })
            .collect();

        report.duplicate_records += duplicate_groups.iter().map(|g| g.count - 1).sum::<usize>();
        report.companies.push(CompanyAudit {
            company_key,
            total_count,
            unique_count,
            duplicate_groups,
        });
    }

    report
}

/// Ids a clean would remove: every group member but the first
pub fn removable_ids(report: &AuditReport) -> Vec<String> {
    report
        .companies
        .iter()
        .flat_map(|c| &c.duplicate_groups)
        .flat_map(|g| g.member_ids.iter().skip(1).cloned())
        .collect()
}

pub struct DuplicateAuditor {
    store: Arc<dyn ResultStore>,
}

impl DuplicateAuditor {
    pub fn new(store: Arc<dyn ResultStore>) -> Self {
        Self { store }
    }

    /// Read-only scan of the whole store
    pub async fn audit(&self) -> Result<AuditReport, StoreError> {
        let records = self.store.list(None).await?;
        Ok(audit_records(&records))
    }

    /// Collapse every duplicate group to its retained member
    pub async fn clean(&self) -> Result<CleanResult, StoreError> {
        let report = self.audit().await?;
        let doomed = removable_ids(&report);
        if doomed.is_empty() {
            return Ok(CleanResult::default());
        }

        let removed_count = self.store.delete_many(&doomed).await?;
        info!(
            removed = removed_count,
            groups = report.companies.iter().map(|c| c.duplicate_groups.len()).sum::<usize>(),
            "Duplicate records removed"
        );
        Ok(CleanResult { removed_count })
    }
}
