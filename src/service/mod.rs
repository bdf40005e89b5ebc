mod http;
#[cfg(test)]
pub(crate) mod test_server;

pub use http::HttpParsingService;

use crate::error::TransportError;
use crate::model::{Artifact, ServiceResponse};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// One submit cycle's outbound request. `ticket` identifies the cycle so a
/// superseded request's settlement can be told apart from the current one.
#[derive(Debug, Clone)]
pub struct ParseRequest {
    pub ticket: u64,
    pub artifact: Artifact,
}

/// Remote OCR/parsing service.
#[async_trait]
pub trait ParsingService: Send + Sync {
    async fn parse(&self, request: &ParseRequest) -> Result<ServiceResponse, TransportError>;
}

/// Issue a request, bounded by `timeout` regardless of the service implementation.
pub async fn run_request(
    service: Arc<dyn ParsingService>,
    request: ParseRequest,
    timeout: Duration,
) -> Result<ServiceResponse, TransportError> {
    tracing::debug!(
        ticket = request.ticket,
        name = %request.artifact.name,
        bytes = request.artifact.len(),
        "issuing parse request"
    );
    match tokio::time::timeout(timeout, service.parse(&request)).await {
        Ok(res) => res,
        Err(_) => {
            tracing::warn!(ticket = request.ticket, ?timeout, "parse request timed out");
            Err(TransportError::Timeout)
        }
    }
}
