//! Session controller.
//!
//! Drives the workflow state machine from UI commands, owns the single
//! in-flight parse request, and emits events for presentation layers.

use super::workflow::WorkflowController;
use crate::error::{TransportError, WorkflowError};
use crate::host::HostBridge;
use crate::model::{Artifact, InfoEvent, ServiceResponse, View, WorkflowConfig, WorkflowEvent};
use crate::service::{self, ParseRequest, ParsingService};
use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tokio::time::{Duration, Instant};

/// How often a long-running request reports that it is still pending.
const PROGRESS_INTERVAL: Duration = Duration::from_secs(5);

/// Commands emitted by UI layers.
#[derive(Debug, Clone)]
pub(crate) enum UiCommand {
    Select(Artifact),
    Submit,
    Handoff,
    Quit,
}

/// Internal handle for the in-flight parse request.
struct RequestCtx {
    ticket: u64,
    started: Instant,
    handle: Option<tokio::task::JoinHandle<Result<ServiceResponse, TransportError>>>,
}

impl RequestCtx {
    fn abort(mut self) {
        if let Some(h) = self.handle.take() {
            h.abort();
        }
    }
}

fn start_request(
    service: &Arc<dyn ParsingService>,
    request: ParseRequest,
    timeout: Duration,
) -> RequestCtx {
    let ticket = request.ticket;
    let service = service.clone();
    let handle = tokio::spawn(async move { service::run_request(service, request, timeout).await });
    RequestCtx {
        ticket,
        started: Instant::now(),
        handle: Some(handle),
    }
}

fn now_utc() -> String {
    time::OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_else(|_| "now".into())
}

fn emit_view(event_tx: &UnboundedSender<WorkflowEvent>, view: &View) {
    let ev = match view {
        View::Hidden => return,
        View::Error(message) => WorkflowEvent::ErrorShown {
            message: message.clone(),
        },
        View::Results(records) => WorkflowEvent::ResultsShown {
            records: records.clone(),
            received_utc: now_utc(),
        },
    };
    let _ = event_tx.send(ev);
}

fn emit_info(event_tx: &UnboundedSender<WorkflowEvent>, info: InfoEvent) {
    let _ = event_tx.send(WorkflowEvent::Info(info));
}

/// Run one session until handoff, `Quit`, or the command channel closes.
pub(crate) async fn run_controller(
    cfg: &WorkflowConfig,
    service: Arc<dyn ParsingService>,
    bridge: Arc<dyn HostBridge>,
    event_tx: UnboundedSender<WorkflowEvent>,
    mut cmd_rx: UnboundedReceiver<UiCommand>,
) -> Result<()> {
    bridge.ready();
    bridge.expand();

    let mut wf = WorkflowController::new(cfg);
    let mut request: Option<RequestCtx> = None;
    let mut last_state = wf.state();
    let mut watchdog = tokio::time::interval(PROGRESS_INTERVAL);

    let res = loop {
        tokio::select! {
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(UiCommand::Select(artifact)) => {
                        let info = InfoEvent::ArtifactSelected {
                            name: artifact.name.clone(),
                            media_type: artifact.media_type.clone(),
                            bytes: artifact.len(),
                        };
                        match wf.select(artifact) {
                            Ok(superseded) => {
                                emit_info(&event_tx, info);
                                if superseded.is_some() {
                                    if let Some(ctx) = request.take() {
                                        ctx.abort();
                                    }
                                    emit_info(&event_tx, InfoEvent::RequestSuperseded);
                                }
                            }
                            Err(e) => emit_info(&event_tx, InfoEvent::Rejected { reason: e.to_string() }),
                        }
                    }
                    Some(UiCommand::Submit) => {
                        match wf.begin_submit() {
                            Ok(req) => {
                                emit_info(&event_tx, InfoEvent::Submitting { name: req.artifact.name.clone() });
                                request = Some(start_request(&service, req, cfg.request_timeout));
                            }
                            // The submit trigger is disabled while a request is pending.
                            Err(e @ (WorkflowError::SubmitInProgress | WorkflowError::Closed)) => {
                                tracing::debug!(error = %e, "submit ignored");
                                emit_info(&event_tx, InfoEvent::Rejected { reason: e.to_string() });
                            }
                            Err(e) => {
                                tracing::info!(error = %e, "submit rejected");
                                emit_view(&event_tx, wf.view());
                            }
                        }
                    }
                    Some(UiCommand::Handoff) => {
                        match wf.handoff() {
                            Ok(payload) => {
                                let records = payload.results.len();
                                let json = serde_json::to_string(&payload)
                                    .context("serialize handoff payload")?;
                                bridge.send_data(json);
                                bridge.close();
                                let _ = event_tx.send(WorkflowEvent::HandedOff { records });
                                let _ = event_tx.send(WorkflowEvent::StateChanged { state: wf.state() });
                                break Ok(());
                            }
                            Err(e) => {
                                tracing::info!(error = %e, "handoff rejected");
                                emit_info(&event_tx, InfoEvent::Rejected { reason: e.to_string() });
                            }
                        }
                    }
                    Some(UiCommand::Quit) | None => {
                        if let Some(ctx) = request.take() {
                            ctx.abort();
                            emit_info(&event_tx, InfoEvent::Message("Pending request cancelled".into()));
                        }
                        break Ok(());
                    }
                }
            }
            // Do not take the JoinHandle before this branch wins; otherwise it can be dropped
            // if another select branch is chosen, and we'll never observe completion.
            maybe_done = async {
                if let Some(ctx) = &mut request {
                    if let Some(h) = ctx.handle.as_mut() {
                        return Some(h.await);
                    }
                }
                futures::future::pending().await
            } => {
                if let Some(join_res) = maybe_done {
                    if let Some(ctx) = request.take() {
                        let outcome = match join_res {
                            Ok(outcome) => outcome,
                            Err(e) => Err(TransportError::Request(format!("request task failed: {e}"))),
                        };
                        if let Some(view) = wf.settle(ctx.ticket, outcome) {
                            emit_view(&event_tx, view);
                        }
                    }
                }
            }
            _ = watchdog.tick() => {
                if let Some(ctx) = &request {
                    let elapsed = ctx.started.elapsed();
                    if elapsed >= PROGRESS_INTERVAL {
                        emit_info(&event_tx, InfoEvent::StillProcessing { elapsed_secs: elapsed.as_secs() });
                    }
                }
            }
        }

        if wf.state() != last_state {
            last_state = wf.state();
            tracing::debug!(state = ?last_state, "workflow state changed");
            let _ = event_tx.send(WorkflowEvent::StateChanged { state: last_state });
        }
    };

    res
}
