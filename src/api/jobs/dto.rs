use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::domain::{parse_salary_range, JobRecord};

/// Skills arrive either as a list or as one comma-separated string
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum SkillsField {
    List(Vec<String>),
    Text(String),
}

impl SkillsField {
    pub fn into_vec(self) -> Vec<String> {
        match self {
            SkillsField::List(skills) => skills,
            SkillsField::Text(raw) => raw.split(',').map(str::to_string).collect(),
        }
    }
}

/// One record of an import payload, as loose as scrapers produce them
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct ImportRecord {
    #[validate(length(min = 1, max = 200, message = "Company must be between 1 and 200 characters"))]
    pub company: String,

    #[validate(length(min = 1, max = 300, message = "Title must be between 1 and 300 characters"))]
    pub title: String,

    #[serde(default)]
    #[validate(length(max = 200, message = "Location must be at most 200 characters"))]
    pub location: Option<String>,

    #[serde(default)]
    pub department: Option<String>,

    /// Free-form range such as `"$120k - $150k"`
    #[serde(default)]
    pub salary: Option<String>,

    #[serde(default)]
    #[validate(range(min = 0, message = "salary_min must not be negative"))]
    pub salary_min: Option<i32>,

    #[serde(default)]
    #[validate(range(min = 0, message = "salary_max must not be negative"))]
    pub salary_max: Option<i32>,

    #[serde(default)]
    pub skills: Option<SkillsField>,

    #[serde(default, alias = "url")]
    pub source_url: Option<String>,

    #[serde(default)]
    pub scraped_at: Option<DateTime<Utc>>,
}

impl ImportRecord {
    /// Normalize into a stored record; explicit bounds win over `salary`
    pub fn into_record(self, now: DateTime<Utc>) -> JobRecord {
        let (parsed_min, parsed_max) = self
            .salary
            .as_deref()
            .map(parse_salary_range)
            .unwrap_or((None, None));

        let mut record = JobRecord::new(
            self.company.trim(),
            self.title.trim(),
            self.location.as_deref().map(str::trim).unwrap_or_default(),
            self.source_url.unwrap_or_default(),
            self.scraped_at.unwrap_or(now),
        )
        .with_salary(self.salary_min.or(parsed_min), self.salary_max.or(parsed_max));

        if let Some(department) = self.department.filter(|d| !d.trim().is_empty()) {
            record = record.with_department(department.trim());
        }
        if let Some(skills) = self.skills {
            record = record.with_skills(skills.into_vec());
        }
        record
    }
}

/// Body of `POST /jobs/import`
#[derive(Debug, Deserialize, Serialize, Validate)]
pub struct ImportRequest {
    #[validate(length(min = 1, max = 5000, message = "Between 1 and 5000 records per import"))]
    pub records: Vec<ImportRecord>,
}

/// Uploaded files may hold `{"records": [...]}` or a bare array
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum ImportPayload {
    Wrapped(ImportRequest),
    Bare(Vec<ImportRecord>),
}

impl ImportPayload {
    pub fn into_records(self) -> Vec<ImportRecord> {
        match self {
            ImportPayload::Wrapped(request) => request.records,
            ImportPayload::Bare(records) => records,
        }
    }
}

/// Error details for a rejected record
#[derive(Debug, Serialize, Deserialize)]
pub struct RecordError {
    pub title: String,
    pub errors: Vec<String>,
}

/// Response for bulk import
#[derive(Debug, Serialize, Deserialize)]
pub struct ImportResponse {
    pub message: String,
    pub inserted: usize,
    pub skipped: usize,
    pub errors: Vec<RecordError>,
}

/// Optional `?company=` filter
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct CompanyFilter {
    #[serde(default)]
    pub company: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ListResponse {
    pub count: usize,
    pub records: Vec<JobRecord>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DeleteResponse {
    pub message: String,
    pub removed: u64,
}
