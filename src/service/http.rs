use super::{ParseRequest, ParsingService};
use crate::error::TransportError;
use crate::model::{ServiceResponse, WorkflowConfig};
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::StatusCode;

/// Multipart HTTP client for the `/api/ocr-parse` endpoint.
pub struct HttpParsingService {
    http: reqwest::Client,
    url: String,
    auth_token: Option<String>,
}

impl HttpParsingService {
    pub fn new(cfg: &WorkflowConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(cfg.user_agent.clone())
            .timeout(cfg.request_timeout)
            .build()
            .context("build HTTP client")?;
        Ok(Self {
            http,
            url: cfg.parse_url(),
            auth_token: cfg.auth_token.clone(),
        })
    }
}

#[async_trait]
impl ParsingService for HttpParsingService {
    async fn parse(&self, request: &ParseRequest) -> Result<ServiceResponse, TransportError> {
        let artifact = &request.artifact;
        let part = Part::stream_with_length(artifact.bytes.clone(), artifact.len())
            .file_name(artifact.name.clone())
            .mime_str(&artifact.media_type)?;
        let form = Form::new().part("file", part);

        let mut req = self.http.post(&self.url).multipart(form);
        if let Some(token) = self.auth_token.as_deref() {
            req = req.bearer_auth(token);
        }

        let resp = req.send().await?;
        let status = resp.status();
        let body = resp.text().await?;
        tracing::debug!(%status, body_len = body.len(), "parse response received");
        decode_envelope(status, &body)
    }
}

/// Decode the response body as an envelope. The body is tried even on error
/// statuses since the service may report failures as JSON with a 4xx/5xx.
pub(crate) fn decode_envelope(
    status: StatusCode,
    body: &str,
) -> Result<ServiceResponse, TransportError> {
    match serde_json::from_str::<ServiceResponse>(body) {
        Ok(env) if env.success && env.results.is_none() => Err(TransportError::Malformed(
            "success envelope without results".into(),
        )),
        Ok(env) => Ok(env),
        Err(_) if !status.is_success() => Err(TransportError::Status(status.as_u16())),
        Err(e) => Err(TransportError::Malformed(e.to_string())),
    }
}
