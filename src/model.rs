use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::time::Duration;

/// Action tag the host expects on a lab-results handoff payload.
pub const SAVE_ACTION: &str = "save_lab_results";

#[derive(Debug, Clone, Serialize)]
pub struct WorkflowConfig {
    pub service_url: String,
    pub endpoint: String,
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
    pub max_artifact_bytes: u64,
    pub accepted_media_types: Vec<String>,
    #[serde(skip_serializing)]
    pub auth_token: Option<String>,
    pub user_agent: String,
}

impl WorkflowConfig {
    /// Full URL of the parse endpoint.
    pub fn parse_url(&self) -> String {
        format!(
            "{}/{}",
            self.service_url.trim_end_matches('/'),
            self.endpoint.trim_start_matches('/')
        )
    }
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            service_url: "http://localhost:8081".into(),
            endpoint: "/api/ocr-parse".into(),
            request_timeout: Duration::from_secs(30),
            max_artifact_bytes: 20 * 1024 * 1024,
            accepted_media_types: default_media_types(),
            auth_token: None,
            user_agent: format!("labscan/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

pub fn default_media_types() -> Vec<String> {
    [
        "application/pdf",
        "image/png",
        "image/jpeg",
        "image/tiff",
        "image/bmp",
        "image/webp",
        "image/gif",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

/// A user-selected document, held in memory until it is submitted.
#[derive(Debug, Clone, PartialEq)]
pub struct Artifact {
    pub name: String,
    pub media_type: String,
    pub bytes: Bytes,
}

impl Artifact {
    pub fn new(name: impl Into<String>, media_type: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            media_type: media_type.into(),
            bytes: bytes.into(),
        }
    }

    /// Read a file from disk, guessing its media type from the extension.
    pub fn from_path(path: &Path) -> std::io::Result<Self> {
        let bytes = std::fs::read(path)?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());
        Ok(Self::new(name, guess_media_type(path), bytes))
    }

    pub fn len(&self) -> u64 {
        self.bytes.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

pub fn guess_media_type(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match ext.as_deref() {
        Some("pdf") => "application/pdf",
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("tif") | Some("tiff") => "image/tiff",
        Some("bmp") => "image/bmp",
        Some("webp") => "image/webp",
        Some("gif") => "image/gif",
        _ => "application/octet-stream",
    }
}

/// Measured value of a record; the service sends either a number or free text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RecordValue {
    Number(f64),
    Text(String),
}

impl fmt::Display for RecordValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordValue::Number(n) => write!(f, "{}", n),
            RecordValue::Text(s) => f.write_str(s),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabRecord {
    pub name: String,
    pub value: RecordValue,
    #[serde(default)]
    pub unit: String,
    #[serde(default)]
    pub interpretation: String,
}

/// Response envelope returned by the parse endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub results: Option<Vec<LabRecord>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[cfg(test)]
impl ServiceResponse {
    pub fn ok(results: Vec<LabRecord>) -> Self {
        Self {
            success: true,
            results: Some(results),
            error: None,
        }
    }

    pub fn failed(error: Option<String>) -> Self {
        Self {
            success: false,
            results: None,
            error,
        }
    }
}

/// Payload handed to the host on save.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandoffPayload {
    pub action: String,
    pub results: Vec<LabRecord>,
}

impl HandoffPayload {
    pub fn save(results: Vec<LabRecord>) -> Self {
        Self {
            action: SAVE_ACTION.to_string(),
            results,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowState {
    Idle,
    FileSelected,
    Submitting,
    ResultsShown,
    ErrorShown,
    Closed,
}

/// What the user currently sees. Error and results are mutually exclusive.
#[derive(Debug, Clone, PartialEq)]
pub enum View {
    Hidden,
    Error(String),
    Results(Vec<LabRecord>),
}

#[derive(Debug, Clone)]
pub enum WorkflowEvent {
    StateChanged {
        state: WorkflowState,
    },
    ErrorShown {
        message: String,
    },
    ResultsShown {
        records: Vec<LabRecord>,
        received_utc: String,
    },
    Info(InfoEvent),
    HandedOff {
        records: usize,
    },
}

/// Structured notices emitted by the controller and rendered by the CLI.
#[derive(Debug, Clone)]
pub enum InfoEvent {
    Message(String),
    ArtifactSelected {
        name: String,
        media_type: String,
        bytes: u64,
    },
    Submitting {
        name: String,
    },
    StillProcessing {
        elapsed_secs: u64,
    },
    RequestSuperseded,
    Rejected {
        reason: String,
    },
}

impl InfoEvent {
    pub fn to_message(&self) -> String {
        match self {
            InfoEvent::Message(msg) => msg.clone(),
            InfoEvent::ArtifactSelected {
                name,
                media_type,
                bytes,
            } => format!("Selected {} ({}, {} bytes)", name, media_type, bytes),
            InfoEvent::Submitting { name } => format!("Submitting {}…", name),
            InfoEvent::StillProcessing { elapsed_secs } => {
                format!("Still processing… ({}s)", elapsed_secs)
            }
            InfoEvent::RequestSuperseded => {
                "New file selected, previous request discarded".to_string()
            }
            InfoEvent::Rejected { reason } => reason.clone(),
        }
    }
}
