//! Session directory client
//!
//! Stateless create/join/exists requests. Every call issues exactly one HTTP
//! request and hands the raw status and body back; interpreting them is up
//! to the caller.

use crate::error::DirectoryError;
use crate::routes::{self, DirectoryRoute};
use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use std::sync::Arc;
use tracing::debug;
use url::Url;

/// Raw directory response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryResponse {
    pub status: StatusCode,
    pub body: String,
}

/// Executes one HTTP request for the directory
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn execute(&self, method: Method, url: Url) -> Result<DirectoryResponse, DirectoryError>;
}

/// [`HttpTransport`] backed by a shared `reqwest::Client`
#[derive(Debug, Clone, Default)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn execute(&self, method: Method, url: Url) -> Result<DirectoryResponse, DirectoryError> {
        let response = self.client.request(method, url).send().await?;
        let status = response.status();
        let body = response.text().await?;
        Ok(DirectoryResponse { status, body })
    }
}

/// Client for the session directory at one origin
#[derive(Clone)]
pub struct SessionDirectory {
    origin: Url,
    http: Arc<dyn HttpTransport>,
}

impl std::fmt::Debug for SessionDirectory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionDirectory")
            .field("origin", &self.origin.as_str())
            .finish_non_exhaustive()
    }
}

impl SessionDirectory {
    /// Directory at the origin of `base_url`, using reqwest
    pub fn new(base_url: &Url) -> Result<Self, DirectoryError> {
        Self::with_transport(base_url, Arc::new(ReqwestTransport::default()))
    }

    pub fn with_transport(
        base_url: &Url,
        http: Arc<dyn HttpTransport>,
    ) -> Result<Self, DirectoryError> {
        Ok(Self {
            origin: routes::origin(base_url)?,
            http,
        })
    }

    pub fn origin(&self) -> &Url {
        &self.origin
    }

    /// `PUT /sessions/{session_name}`
    pub async fn create(
        &self,
        session_name: &str,
        password: Option<&str>,
    ) -> Result<DirectoryResponse, DirectoryError> {
        self.request(DirectoryRoute::CreateSession, session_name, password)
            .await
    }

    /// `PATCH /sessions/{session_name}`
    pub async fn join(
        &self,
        session_name: &str,
        password: Option<&str>,
    ) -> Result<DirectoryResponse, DirectoryError> {
        self.request(DirectoryRoute::JoinSession, session_name, password)
            .await
    }

    /// `GET /sessions/{session_name}`
    pub async fn exists(&self, session_name: &str) -> Result<DirectoryResponse, DirectoryError> {
        self.request(DirectoryRoute::SessionExists, session_name, None)
            .await
    }

    async fn request(
        &self,
        route: DirectoryRoute,
        session_name: &str,
        password: Option<&str>,
    ) -> Result<DirectoryResponse, DirectoryError> {
        let url = route.url(&self.origin, session_name, password)?;
        let method = route.method();
        debug!(%method, path = url.path(), "directory request");
        let response = self.http.execute(method, url).await?;
        debug!(status = %response.status, "directory response");
        Ok(response)
    }
}
