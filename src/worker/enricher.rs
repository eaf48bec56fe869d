use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use super::ExtractError;
use crate::domain::JobRecord;

/// Salary and skills inferred for one posting
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Enrichment {
    #[serde(default)]
    pub salary_min: Option<i32>,
    #[serde(default)]
    pub salary_max: Option<i32>,
    #[serde(default)]
    pub skills: Vec<String>,
}

impl Enrichment {
    /// Fill gaps in `record`; values already present are kept
    pub fn apply(self, record: JobRecord) -> JobRecord {
        let mut record = if record.has_salary() {
            record
        } else {
            let (min, max) = (self.salary_min, self.salary_max);
            record.with_salary(min, max)
        };
        record.skills.extend(
            self.skills
                .into_iter()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty()),
        );
        record
    }
}

/// External inference call that normalizes salary and skills
#[async_trait]
pub trait Enricher: Send + Sync {
    async fn enrich(&self, record: &JobRecord) -> Result<Enrichment, ExtractError>;
}

#[derive(Debug, Deserialize)]
struct ChatCompletion {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

const SYSTEM_PROMPT: &str = "You normalize job postings. Reply with a JSON object \
    {\"salary_min\": int|null, \"salary_max\": int|null, \"skills\": [string]} where \
    salaries are annual base pay in thousands of USD. Use null when unknown.";

/// Enricher backed by an OpenAI-compatible chat completions endpoint
pub struct OpenAiEnricher {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl OpenAiEnricher {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ExtractError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ExtractError::Enrichment(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
        })
    }
}

#[async_trait]
impl Enricher for OpenAiEnricher {
    async fn enrich(&self, record: &JobRecord) -> Result<Enrichment, ExtractError> {
        let posting = format!(
            "Company: {}\nTitle: {}\nLocation: {}\nDepartment: {}",
            record.company, record.title, record.location, record.department
        );

        let body = json!({
            "model": self.model,
            "temperature": 0,
            "response_format": {"type": "json_object"},
            "messages": [
                {"role": "system", "content": SYSTEM_PROMPT},
                {"role": "user", "content": posting},
            ],
        });

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ExtractError::Enrichment(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ExtractError::Enrichment(format!(
                "inference endpoint returned HTTP {}",
                status
            )));
        }

        let completion: ChatCompletion = response
            .json()
            .await
            .map_err(|e| ExtractError::Enrichment(format!("invalid completion: {}", e)))?;

        let content = completion
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| ExtractError::Enrichment("empty completion".to_string()))?;

        debug!(title = %record.title, "Received enrichment");

        serde_json::from_str(&content)
            .map_err(|e| ExtractError::Enrichment(format!("unparseable enrichment: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_apply_fills_missing_salary() {
        let record = JobRecord::new("Acme", "Engineer", "Remote", "", Utc::now());
        let enriched = Enrichment {
            salary_min: Some(150),
            salary_max: Some(210),
            skills: vec!["Rust".to_string(), " ".to_string()],
        }
        .apply(record);

        assert_eq!(enriched.salary_min, Some(150));
        assert_eq!(enriched.salary_max, Some(210));
        assert_eq!(enriched.skills.len(), 1);
    }

    #[test]
    fn test_apply_keeps_scraped_salary() {
        let record = JobRecord::new("Acme", "Engineer", "Remote", "", Utc::now())
            .with_salary(Some(300), Some(400))
            .with_skills(["Go"]);
        let enriched = Enrichment {
            salary_min: Some(100),
            salary_max: Some(120),
            skills: vec!["Rust".to_string()],
        }
        .apply(record);

        assert_eq!(enriched.salary_min, Some(300));
        assert!(enriched.skills.contains("Go"));
        assert!(enriched.skills.contains("Rust"));
    }

    #[test]
    fn test_enrichment_parses_partial_json() {
        let parsed: Enrichment = serde_json::from_str(r#"{"skills": ["SQL"]}"#).unwrap();
        assert_eq!(parsed.salary_min, None);
        assert_eq!(parsed.skills, vec!["SQL".to_string()]);
    }
}
