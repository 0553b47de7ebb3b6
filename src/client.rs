//! HTTP client for a running Backtrack server.
//!
//! Used by the `status` command. When an API key is configured it is sent as
//! a bearer token.

use reqwest::{Client, StatusCode};
use serde::{de::DeserializeOwned, Deserialize};
use thiserror::Error;
use uuid::Uuid;

use crate::models::{Project, VelocityChart};

/// Default URL for a local server.
pub const DEFAULT_URL: &str = "http://127.0.0.1:3000";

/// HTTP client errors.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unauthorized: API key required or invalid")]
    Unauthorized,

    #[error("Server error ({0}): {1}")]
    Server(StatusCode, String),
}

/// Body of `GET /health`.
#[derive(Debug, Clone, Deserialize)]
pub struct HealthStatus {
    pub status: String,
}

#[derive(Debug, Clone)]
pub struct BacktrackClient {
    base_url: String,
    api_key: Option<String>,
    client: Client,
}

impl BacktrackClient {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            client: Client::new(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn get(&self, path: &str) -> reqwest::RequestBuilder {
        let mut req = self.client.get(format!("{}{}", self.base_url, path));
        if let Some(ref key) = self.api_key {
            req = req.bearer_auth(key);
        }
        req
    }

    async fn fetch<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        let response = self.get(path).send().await?;
        match response.status() {
            status if status.is_success() => Ok(response.json().await?),
            StatusCode::NOT_FOUND => Err(ClientError::NotFound(response.text().await?)),
            StatusCode::UNAUTHORIZED => Err(ClientError::Unauthorized),
            status => Err(ClientError::Server(status, response.text().await?)),
        }
    }

    pub async fn health(&self) -> Result<HealthStatus, ClientError> {
        self.fetch("/health").await
    }

    pub async fn list_projects(&self) -> Result<Vec<Project>, ClientError> {
        self.fetch("/projects").await
    }

    pub async fn velocity_chart(&self, project_id: Uuid) -> Result<VelocityChart, ClientError> {
        self.fetch(&format!("/projects/{}/velocitychart", project_id))
            .await
    }
}
