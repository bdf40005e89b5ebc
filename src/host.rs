//! Host platform integration.
//!
//! The host owns lifecycle signalling, durable storage of handed-off data and
//! dismissal of the view. Every call is one-way: nothing here waits for an
//! acknowledgement.

use crate::cli::OutputLine;
use std::io::Write;
use std::path::PathBuf;
use tokio::sync::mpsc;

pub trait HostBridge: Send + Sync {
    /// Signal that the session is initialized.
    fn ready(&self);
    /// Request full-height presentation.
    fn expand(&self);
    /// Hand an opaque payload to the host.
    fn send_data(&self, payload: String);
    /// Dismiss the session view.
    fn close(&self);
}

/// Where `ConsoleBridge` delivers handoff payloads.
pub enum HandoffTarget {
    /// Append one line per payload to a file.
    File(PathBuf),
    /// Route through the CLI's output writer, which owns stdout for the session.
    Stdout(mpsc::UnboundedSender<OutputLine>),
}

/// Bridge used by the CLI: the payload goes to a file or to stdout.
pub struct ConsoleBridge {
    target: HandoffTarget,
}

impl ConsoleBridge {
    pub fn new(target: HandoffTarget) -> Self {
        Self { target }
    }

    fn write_payload(&self, payload: String) -> std::io::Result<()> {
        match &self.target {
            HandoffTarget::File(p) => {
                let mut f = std::fs::OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(p)?;
                writeln!(f, "{}", payload)
            }
            HandoffTarget::Stdout(tx) => tx.send(OutputLine::Stdout(payload)).map_err(|_| {
                std::io::Error::new(std::io::ErrorKind::BrokenPipe, "output writer closed")
            }),
        }
    }
}

impl HostBridge for ConsoleBridge {
    fn ready(&self) {
        tracing::debug!("host: ready");
    }

    fn expand(&self) {
        tracing::debug!("host: expand");
    }

    fn send_data(&self, payload: String) {
        // Fire-and-forget: a failed write is logged, not reported back.
        let bytes = payload.len();
        match self.write_payload(payload) {
            Ok(()) => tracing::info!(bytes, "handoff payload delivered to host"),
            Err(e) => tracing::error!(error = %e, "failed to deliver handoff payload"),
        }
    }

    fn close(&self) {
        tracing::info!("host: close requested");
    }
}
