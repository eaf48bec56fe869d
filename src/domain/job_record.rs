use std::collections::BTreeSet;
use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::identity::{identity_key, normalize_company};

/// A normalized job posting as held by the result store
///
/// Salaries are expressed in thousands of USD.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: String,
    pub company: String,
    pub title: String,
    pub location: String,
    pub department: String,
    pub salary_min: Option<i32>,
    pub salary_max: Option<i32>,
    pub skills: BTreeSet<String>,
    pub source_url: String,
    pub scraped_at: DateTime<Utc>,
}

impl JobRecord {
    /// Build a record with a server-assigned id derived from its identity key
    pub fn new(
        company: impl Into<String>,
        title: impl Into<String>,
        location: impl Into<String>,
        source_url: impl Into<String>,
        scraped_at: DateTime<Utc>,
    ) -> Self {
        let company = company.into().trim().to_string();
        let title = title.into().trim().to_string();
        let location = location.into().trim().to_string();
        let id = identity_key(&company, &title, &location)[..32].to_string();

        Self {
            id,
            company,
            title,
            location,
            department: String::new(),
            salary_min: None,
            salary_max: None,
            skills: BTreeSet::new(),
            source_url: source_url.into(),
            scraped_at,
        }
    }

    pub fn with_department(mut self, department: impl Into<String>) -> Self {
        self.department = department.into().trim().to_string();
        self
    }

    /// Set the salary range, swapping the bounds if they arrive inverted
    pub fn with_salary(mut self, min: Option<i32>, max: Option<i32>) -> Self {
        let (min, max) = match (min, max) {
            (Some(lo), Some(hi)) if lo > hi => (Some(hi), Some(lo)),
            other => other,
        };
        self.salary_min = min;
        self.salary_max = max;
        self
    }

    pub fn with_skills<I, S>(mut self, skills: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.skills = skills
            .into_iter()
            .map(|s| s.as_ref().trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        self
    }

    /// Registry key of the owning company
    pub fn company_key(&self) -> String {
        normalize_company(&self.company)
    }

    /// Uniqueness key enforced by the result store on import
    pub fn identity_key(&self) -> String {
        identity_key(&self.company, &self.title, &self.location)
    }

    pub fn has_salary(&self) -> bool {
        self.salary_min.is_some() || self.salary_max.is_some()
    }
}

fn salary_regex() -> &'static Regex {
    static SALARY_RE: OnceLock<Regex> = OnceLock::new();
    SALARY_RE.get_or_init(|| {
        Regex::new(r"(?i)\$?\s*(\d[\d,]*(?:\.\d+)?)\s*(k)?").expect("salary regex is valid")
    })
}

/// Parse a free-form salary string into a (min, max) range in thousands of USD
///
/// Accepts `"$150K - $200K"`, `"$180,000"`, `"150000-200000 USD"` and similar.
/// Plain numbers under 1000 are taken as already being in thousands.
pub fn parse_salary_range(raw: &str) -> (Option<i32>, Option<i32>) {
    let amounts: Vec<i32> = salary_regex()
        .captures_iter(raw)
        .filter_map(|caps| {
            let digits = caps.get(1)?.as_str().replace(',', "");
            let value: f64 = digits.parse().ok()?;
            let thousands = if caps.get(2).is_some() || value < 1000.0 {
                value
            } else {
                value / 1000.0
            };
            (thousands > 0.0).then(|| thousands.round() as i32)
        })
        .take(2)
        .collect();

    match amounts.as_slice() {
        [] => (None, None),
        [only] => (Some(*only), Some(*only)),
        [a, b, ..] => (Some(*a.min(b)), Some(*a.max(b))),
    }
}
