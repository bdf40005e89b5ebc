//! Session state machine.
//!
//! Pure and synchronous: each operation is a transition on the session state.
//! The async driver in `controller` feeds it commands and request settlements.

use crate::error::{TransportError, WorkflowError};
use crate::model::{Artifact, HandoffPayload, LabRecord, ServiceResponse, View, WorkflowConfig, WorkflowState};
use crate::service::ParseRequest;

/// Client-side checks applied at submit time.
#[derive(Debug, Clone)]
struct ArtifactPolicy {
    max_bytes: u64,
    accepted: Vec<String>,
}

impl ArtifactPolicy {
    fn check(&self, artifact: &Artifact) -> Result<(), WorkflowError> {
        if artifact.is_empty() {
            return Err(WorkflowError::ArtifactRejected {
                reason: format!("{} is empty", artifact.name),
            });
        }
        if artifact.len() > self.max_bytes {
            return Err(WorkflowError::ArtifactRejected {
                reason: format!(
                    "{} is too large: {} bytes (max: {})",
                    artifact.name,
                    artifact.len(),
                    self.max_bytes
                ),
            });
        }
        if !self
            .accepted
            .iter()
            .any(|t| t.eq_ignore_ascii_case(&artifact.media_type))
        {
            return Err(WorkflowError::ArtifactRejected {
                reason: format!("unsupported file type: {}", artifact.media_type),
            });
        }
        Ok(())
    }
}

pub struct WorkflowController {
    policy: ArtifactPolicy,
    state: WorkflowState,
    artifact: Option<Artifact>,
    last_result: Option<Vec<LabRecord>>,
    view: View,
    in_flight: Option<u64>,
    next_ticket: u64,
}

impl WorkflowController {
    pub fn new(cfg: &WorkflowConfig) -> Self {
        Self {
            policy: ArtifactPolicy {
                max_bytes: cfg.max_artifact_bytes,
                accepted: cfg.accepted_media_types.clone(),
            },
            state: WorkflowState::Idle,
            artifact: None,
            last_result: None,
            view: View::Hidden,
            in_flight: None,
            next_ticket: 1,
        }
    }

    pub fn state(&self) -> WorkflowState {
        self.state
    }

    pub fn view(&self) -> &View {
        &self.view
    }

    #[cfg(test)]
    pub fn last_result(&self) -> Option<&[LabRecord]> {
        self.last_result.as_deref()
    }

    /// Ticket of the request currently awaiting settlement.
    #[cfg(test)]
    pub fn in_flight(&self) -> Option<u64> {
        self.in_flight
    }

    /// Replace the held artifact. Returns the ticket of an in-flight request
    /// that this selection superseded; its settlement will be ignored.
    pub fn select(&mut self, artifact: Artifact) -> Result<Option<u64>, WorkflowError> {
        self.ensure_open()?;
        let superseded = self.in_flight.take();
        tracing::debug!(
            name = %artifact.name,
            media_type = %artifact.media_type,
            superseded = ?superseded,
            "artifact selected"
        );
        self.artifact = Some(artifact);
        self.state = WorkflowState::FileSelected;
        Ok(superseded)
    }

    /// First half of a submit: clear the views, validate, and hand out the
    /// request to issue. Validation failures are shown in the error view.
    pub fn begin_submit(&mut self) -> Result<ParseRequest, WorkflowError> {
        self.ensure_open()?;
        if self.state == WorkflowState::Submitting {
            return Err(WorkflowError::SubmitInProgress);
        }

        self.view = View::Hidden;
        let Some(artifact) = self.artifact.clone() else {
            return Err(self.fail(WorkflowError::NoArtifactSelected));
        };
        if let Err(e) = self.policy.check(&artifact) {
            return Err(self.fail(e));
        }

        let ticket = self.next_ticket;
        self.next_ticket += 1;
        self.in_flight = Some(ticket);
        self.state = WorkflowState::Submitting;
        Ok(ParseRequest { ticket, artifact })
    }

    /// Second half of a submit. Returns the resulting view, or `None` when the
    /// ticket is not the request currently in flight.
    pub fn settle(
        &mut self,
        ticket: u64,
        outcome: Result<ServiceResponse, TransportError>,
    ) -> Option<&View> {
        if self.in_flight != Some(ticket) {
            tracing::debug!(ticket, current = ?self.in_flight, "ignoring stale settlement");
            return None;
        }
        self.in_flight = None;

        let result = match outcome {
            Err(e) => Err(WorkflowError::from_transport(e)),
            Ok(env) if !env.success => Err(WorkflowError::from_envelope(env.error)),
            Ok(env) => env.results.ok_or_else(|| {
                WorkflowError::from_transport(TransportError::Malformed(
                    "success envelope without results".into(),
                ))
            }),
        };

        match result {
            Ok(records) => {
                tracing::info!(ticket, records = records.len(), "parse succeeded");
                self.last_result = Some(records.clone());
                self.view = View::Results(records);
                self.state = WorkflowState::ResultsShown;
            }
            Err(e) => {
                match &e {
                    WorkflowError::Transport(source) => {
                        tracing::warn!(ticket, error = %source, "parse request failed")
                    }
                    other => tracing::warn!(ticket, error = %other, "parse failed"),
                }
                self.fail(e);
            }
        }
        Some(&self.view)
    }

    /// Build the handoff payload from the last successful result and close the
    /// session. The result stays saveable after a later selection or failure.
    pub fn handoff(&mut self) -> Result<HandoffPayload, WorkflowError> {
        self.ensure_open()?;
        if self.state == WorkflowState::Submitting {
            return Err(WorkflowError::SubmitInProgress);
        }
        let results = self.last_result.take().ok_or(WorkflowError::NothingToSave)?;
        self.state = WorkflowState::Closed;
        Ok(HandoffPayload::save(results))
    }

    fn ensure_open(&self) -> Result<(), WorkflowError> {
        if self.state == WorkflowState::Closed {
            Err(WorkflowError::Closed)
        } else {
            Ok(())
        }
    }

    fn fail(&mut self, e: WorkflowError) -> WorkflowError {
        self.view = View::Error(e.to_string());
        self.state = WorkflowState::ErrorShown;
        e
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::RecordValue;

    fn glucose() -> LabRecord {
        LabRecord {
            name: "Glucose".into(),
            value: RecordValue::Number(5.4),
            unit: "mmol/L".into(),
            interpretation: "normal".into(),
        }
    }

    fn pdf() -> Artifact {
        Artifact::new("a.pdf", "application/pdf", b"%PDF".to_vec())
    }

    fn controller() -> WorkflowController {
        WorkflowController::new(&WorkflowConfig::default())
    }

    #[test]
    fn test_submit_without_artifact_shows_validation_error() {
        let mut wf = controller();
        let err = wf.begin_submit().unwrap_err();
        assert!(matches!(err, WorkflowError::NoArtifactSelected));
        assert_eq!(wf.state(), WorkflowState::ErrorShown);
        assert_eq!(wf.view(), &View::Error("no file selected".into()));
        assert_eq!(wf.in_flight(), None);
    }

    #[test]
    fn test_successful_cycle() {
        let mut wf = controller();
        assert_eq!(wf.select(pdf()).unwrap(), None);
        assert_eq!(wf.state(), WorkflowState::FileSelected);

        let req = wf.begin_submit().unwrap();
        assert_eq!(wf.state(), WorkflowState::Submitting);
        assert_eq!(wf.view(), &View::Hidden);
        assert_eq!(req.artifact.name, "a.pdf");

        let view = wf
            .settle(req.ticket, Ok(ServiceResponse::ok(vec![glucose()])))
            .unwrap();
        assert_eq!(view, &View::Results(vec![glucose()]));
        assert_eq!(wf.state(), WorkflowState::ResultsShown);
        assert_eq!(wf.last_result(), Some(&[glucose()][..]));
    }

    #[test]
    fn test_service_error_message_and_fallback() {
        let mut wf = controller();
        wf.select(pdf()).unwrap();
        let req = wf.begin_submit().unwrap();
        wf.settle(req.ticket, Ok(ServiceResponse::failed(Some("blurry image".into()))));
        assert_eq!(wf.view(), &View::Error("blurry image".into()));

        let req = wf.begin_submit().unwrap();
        wf.settle(req.ticket, Ok(ServiceResponse::failed(None)));
        assert_eq!(wf.view(), &View::Error("processing error".into()));
        assert_eq!(wf.state(), WorkflowState::ErrorShown);
    }

    #[test]
    fn test_transport_failure_hides_results() {
        let mut wf = controller();
        wf.select(pdf()).unwrap();
        let req = wf.begin_submit().unwrap();
        wf.settle(req.ticket, Ok(ServiceResponse::ok(vec![glucose()])));

        let req = wf.begin_submit().unwrap();
        assert_eq!(wf.view(), &View::Hidden);
        wf.settle(req.ticket, Err(TransportError::Connect("refused".into())));
        assert_eq!(
            wf.view(),
            &View::Error("could not reach the parsing service".into())
        );
        // Previous successful result is kept but not shown.
        assert!(wf.last_result().is_some());
    }

    #[test]
    fn test_timeout_reports_unavailable() {
        let mut wf = controller();
        wf.select(pdf()).unwrap();
        let req = wf.begin_submit().unwrap();
        wf.settle(req.ticket, Err(TransportError::Timeout));
        assert_eq!(wf.view(), &View::Error("parsing service unavailable".into()));
    }

    #[test]
    fn test_second_submit_rejected_while_in_flight() {
        let mut wf = controller();
        wf.select(pdf()).unwrap();
        let req = wf.begin_submit().unwrap();
        let err = wf.begin_submit().unwrap_err();
        assert!(matches!(err, WorkflowError::SubmitInProgress));
        assert_eq!(wf.state(), WorkflowState::Submitting);
        assert_eq!(wf.view(), &View::Hidden);
        assert_eq!(wf.in_flight(), Some(req.ticket));
    }

    #[test]
    fn test_selection_supersedes_in_flight_request() {
        let mut wf = controller();
        wf.select(pdf()).unwrap();
        let first = wf.begin_submit().unwrap();

        let b = Artifact::new("b.png", "image/png", vec![1u8, 2, 3]);
        assert_eq!(wf.select(b.clone()).unwrap(), Some(first.ticket));
        assert_eq!(wf.state(), WorkflowState::FileSelected);

        assert!(wf
            .settle(first.ticket, Ok(ServiceResponse::ok(vec![glucose()])))
            .is_none());
        assert_eq!(wf.view(), &View::Hidden);
        assert!(wf.last_result().is_none());

        let second = wf.begin_submit().unwrap();
        assert_ne!(second.ticket, first.ticket);
        assert_eq!(second.artifact, b);
    }

    #[test]
    fn test_policy_rejects_without_request() {
        let cfg = WorkflowConfig {
            max_artifact_bytes: 2,
            ..Default::default()
        };
        let mut wf = WorkflowController::new(&cfg);

        wf.select(Artifact::new("big.pdf", "application/pdf", vec![0u8; 3])).unwrap();
        assert!(matches!(
            wf.begin_submit().unwrap_err(),
            WorkflowError::ArtifactRejected { .. }
        ));
        assert_eq!(wf.state(), WorkflowState::ErrorShown);

        wf.select(Artifact::new("notes.txt", "text/plain", vec![0u8])).unwrap();
        let err = wf.begin_submit().unwrap_err();
        assert_eq!(err.to_string(), "unsupported file type: text/plain");

        wf.select(Artifact::new("empty.png", "image/png", Vec::new())).unwrap();
        assert_eq!(wf.begin_submit().unwrap_err().to_string(), "empty.png is empty");
        assert_eq!(wf.in_flight(), None);
    }

    #[test]
    fn test_handoff_after_success() {
        let mut wf = controller();
        wf.select(pdf()).unwrap();
        let req = wf.begin_submit().unwrap();
        wf.settle(req.ticket, Ok(ServiceResponse::ok(vec![glucose()])));

        let payload = wf.handoff().unwrap();
        assert_eq!(payload.action, "save_lab_results");
        assert_eq!(payload.results, vec![glucose()]);
        assert_eq!(wf.state(), WorkflowState::Closed);

        assert!(matches!(wf.handoff().unwrap_err(), WorkflowError::Closed));
        assert!(matches!(wf.select(pdf()).unwrap_err(), WorkflowError::Closed));
        assert!(matches!(wf.begin_submit().unwrap_err(), WorkflowError::Closed));
    }

    #[test]
    fn test_handoff_without_result_is_rejected() {
        let mut wf = controller();
        assert!(matches!(wf.handoff().unwrap_err(), WorkflowError::NothingToSave));

        wf.select(pdf()).unwrap();
        let req = wf.begin_submit().unwrap();
        assert!(matches!(
            wf.handoff().unwrap_err(),
            WorkflowError::SubmitInProgress
        ));
        wf.settle(req.ticket, Ok(ServiceResponse::failed(None)));
        assert!(matches!(wf.handoff().unwrap_err(), WorkflowError::NothingToSave));
        assert_eq!(wf.state(), WorkflowState::ErrorShown);
    }

    #[test]
    fn test_handoff_after_new_selection_saves_last_result() {
        let mut wf = controller();
        wf.select(pdf()).unwrap();
        let req = wf.begin_submit().unwrap();
        wf.settle(req.ticket, Ok(ServiceResponse::ok(vec![glucose()])));

        wf.select(Artifact::new("b.pdf", "application/pdf", b"%PDF".to_vec()))
            .unwrap();
        assert_eq!(wf.state(), WorkflowState::FileSelected);
        assert_eq!(wf.view(), &View::Results(vec![glucose()]));

        let payload = wf.handoff().unwrap();
        assert_eq!(payload.results, vec![glucose()]);
        assert_eq!(wf.state(), WorkflowState::Closed);
    }

    #[test]
    fn test_handoff_after_failure_saves_last_result() {
        let mut wf = controller();
        wf.select(pdf()).unwrap();
        let req = wf.begin_submit().unwrap();
        wf.settle(req.ticket, Ok(ServiceResponse::ok(vec![glucose()])));
        let req = wf.begin_submit().unwrap();
        wf.settle(req.ticket, Ok(ServiceResponse::failed(None)));
        assert_eq!(wf.state(), WorkflowState::ErrorShown);

        assert_eq!(wf.handoff().unwrap().results, vec![glucose()]);
    }
}
