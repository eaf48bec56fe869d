use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;

use super::ClientError;
use crate::api::scrape::dto::{
    RunStatusResponse, StartScrapeRequest, StartScrapeResponse, SummaryResponse,
};
use crate::domain::JobRecord;

/// How the server answered a start request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartReply {
    /// Run accepted; poll for completion
    Started,
    /// Another client already started this run; poll for completion
    AlreadyActive,
    /// Legacy synchronous reply carrying the results
    Completed(Vec<JobRecord>),
}

/// Server endpoints the client run controller talks to
#[async_trait]
pub trait ScrapeApi: Send + Sync {
    async fn start(&self, company_key: &str, source_url: &str) -> Result<StartReply, ClientError>;
    async fn status(&self, company_key: &str) -> Result<RunStatusResponse, ClientError>;
    async fn summary(&self, company_key: &str) -> Result<SummaryResponse, ClientError>;
    async fn clear(&self, company_key: &str) -> Result<(), ClientError>;
}

/// [`ScrapeApi`] over HTTP
pub struct HttpScrapeApi {
    client: reqwest::Client,
    base_url: String,
}

impl HttpScrapeApi {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ClientError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(network)?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn read_json<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ClientError> {
        let status = response.status();
        if !status.is_success() {
            return Err(ClientError::Network(format!("server returned HTTP {}", status)));
        }
        response.json().await.map_err(network)
    }
}

fn network(err: reqwest::Error) -> ClientError {
    ClientError::Network(err.to_string())
}

#[async_trait]
impl ScrapeApi for HttpScrapeApi {
    async fn start(&self, company_key: &str, source_url: &str) -> Result<StartReply, ClientError> {
        let request = StartScrapeRequest {
            source_url: source_url.to_string(),
            company: Some(company_key.to_string()),
        };

        let response = self
            .client
            .post(self.url("/scrape"))
            .json(&request)
            .send()
            .await
            .map_err(network)?;

        let status = response.status();
        if !status.is_success() && status != StatusCode::CONFLICT {
            return Err(ClientError::Network(format!("server returned HTTP {}", status)));
        }

        match response.json::<StartScrapeResponse>().await.map_err(network)? {
            StartScrapeResponse::Started { .. } => Ok(StartReply::Started),
            StartScrapeResponse::AlreadyActive { .. } => Ok(StartReply::AlreadyActive),
            StartScrapeResponse::Completed { records, .. } => Ok(StartReply::Completed(records)),
        }
    }

    async fn status(&self, company_key: &str) -> Result<RunStatusResponse, ClientError> {
        let response = self
            .client
            .get(self.url("/scrape-status"))
            .query(&[("company", company_key)])
            .send()
            .await
            .map_err(network)?;
        Self::read_json(response).await
    }

    async fn summary(&self, company_key: &str) -> Result<SummaryResponse, ClientError> {
        let response = self
            .client
            .get(self.url("/summary"))
            .query(&[("company", company_key)])
            .send()
            .await
            .map_err(network)?;
        Self::read_json(response).await
    }

    async fn clear(&self, company_key: &str) -> Result<(), ClientError> {
        let response = self
            .client
            .delete(self.url("/scrape-status"))
            .query(&[("company", company_key)])
            .send()
            .await
            .map_err(network)?;

        let status = response.status();
        if !status.is_success() {
            return Err(ClientError::Network(format!("server returned HTTP {}", status)));
        }
        Ok(())
    }
}
