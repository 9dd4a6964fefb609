//! Authenticated transport.
//!
//! Every request to the job API goes through one send path that attaches the
//! current bearer credential and inspects the response exactly once before
//! the caller sees it. Authorization failures (401/403) are handled centrally:
//! forced logout plus a single redirect to the login entry point.

use crate::model::{ClientConfig, FormatCatalog, Job, JobSubmission};
use crate::session::SessionStore;
use anyhow::Context;
use bytes::Bytes;
use reqwest::{RequestBuilder, Response, StatusCode};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum ApiError {
    /// 401/403 — the session was already torn down by the transport.
    #[error("session expired; log in again")]
    AuthExpired,
    /// Any other 4xx; the server's body is surfaced verbatim.
    #[error("request rejected ({status}): {message}")]
    Validation { status: StatusCode, message: String },
    #[error("server error ({status})")]
    Server { status: StatusCode },
    #[error("network failure: {0}")]
    Network(#[from] reqwest::Error),
}

/// Where "redirect to login" lands is a host concern; the transport only
/// needs to know whether we are already there.
pub trait Navigator: Send + Sync {
    fn at_login(&self) -> bool;
    fn to_login(&self);
}

/// Terminal rendition of the login redirect: tell the user once.
#[derive(Default)]
pub struct TerminalNavigator {
    at_login: AtomicBool,
}

impl Navigator for TerminalNavigator {
    fn at_login(&self) -> bool {
        self.at_login.load(Ordering::Relaxed)
    }

    fn to_login(&self) {
        if !self.at_login.swap(true, Ordering::Relaxed) {
            eprintln!("Session expired. Run `clipit login` to continue.");
        }
    }
}

pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    session: Arc<SessionStore>,
    navigator: Arc<dyn Navigator>,
}

impl ApiClient {
    pub fn new(
        cfg: &ClientConfig,
        session: Arc<SessionStore>,
        navigator: Arc<dyn Navigator>,
    ) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(cfg.user_agent.clone())
            .timeout(cfg.request_timeout)
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            http,
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            session,
            navigator,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// The single outbound/inbound pipeline. Attaches the credential if one
    /// is present (never blocks or fails the request itself), then runs the
    /// authorization check before the caller's own error handling.
    async fn send(&self, req: RequestBuilder) -> Result<Response, ApiError> {
        let req = match self.session.token() {
            Some(token) => req.bearer_auth(token),
            None => req,
        };
        let resp = req.send().await?;
        self.intercept(resp).await
    }

    async fn intercept(&self, resp: Response) -> Result<Response, ApiError> {
        let status = resp.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            warn!(%status, "authorization rejected; ending session");
            self.session.logout();
            if !self.navigator.at_login() {
                self.navigator.to_login();
            }
            return Err(ApiError::AuthExpired);
        }
        if status.is_client_error() {
            let message = resp.text().await.unwrap_or_default();
            return Err(ApiError::Validation { status, message });
        }
        if status.is_server_error() {
            return Err(ApiError::Server { status });
        }
        Ok(resp)
    }

    /// POST /auth/login — exchanges credentials for a raw token string.
    pub async fn login(&self, username: &str, password: &str) -> Result<String, ApiError> {
        let body = serde_json::json!({ "username": username, "password": password });
        let resp = self.send(self.http.post(self.url("/auth/login")).json(&body)).await?;
        Ok(resp.text().await?)
    }

    /// POST /auth/register — returns the server's confirmation message.
    pub async fn register(
        &self,
        username: &str,
        email: &str,
        password: &str,
    ) -> Result<String, ApiError> {
        let body = serde_json::json!({
            "username": username,
            "email": email,
            "password": password,
        });
        let resp = self
            .send(self.http.post(self.url("/auth/register")).json(&body))
            .await?;
        Ok(resp.text().await?)
    }

    /// GET /jobs — the full job collection, in server order (oldest first).
    pub async fn list_jobs(&self) -> Result<Vec<Job>, ApiError> {
        let resp = self.send(self.http.get(self.url("/jobs"))).await?;
        Ok(resp.json().await?)
    }

    /// GET /jobs/formats?url= — formats offered for one media URL.
    pub async fn formats(&self, url: &str) -> Result<FormatCatalog, ApiError> {
        let resp = self
            .send(self.http.get(self.url("/jobs/formats")).query(&[("url", url)]))
            .await?;
        Ok(resp.json().await?)
    }

    /// POST /jobs/start-job — returns the new job's external id.
    pub async fn start_job(&self, submission: &JobSubmission) -> Result<String, ApiError> {
        let resp = self
            .send(self.http.post(self.url("/jobs/start-job")).json(submission))
            .await?;
        Ok(resp.text().await?)
    }

    /// GET /jobs/download/{externalId} — the binary artifact payload.
    pub async fn download_artifact(&self, external_id: &str) -> Result<Bytes, ApiError> {
        let resp = self
            .send(self.http.get(self.url(&format!("/jobs/download/{external_id}"))))
            .await?;
        Ok(resp.bytes().await?)
    }
}
