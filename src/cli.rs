use crate::host::{ConsoleBridge, HandoffTarget, HostBridge};
use crate::model::{Artifact, WorkflowConfig, WorkflowEvent};
use crate::orchestrator::{self, UiCommand};
use crate::service::{HttpParsingService, ParsingService};
use anyhow::{Context, Result};
use clap::Parser;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncBufReadExt;
use tokio::sync::mpsc;

/// Output line routing for stdout/stderr writer.
pub(crate) enum OutputLine {
    Stdout(String),
    Stderr(String),
}

/// Spawn a blocking writer for stdout/stderr to avoid blocking async tasks.
/// The writer holds both locks until every sender is dropped, so all output
/// for the session, handoff payload included, must go through the channel.
fn spawn_output_writer() -> (
    mpsc::UnboundedSender<OutputLine>,
    tokio::task::JoinHandle<()>,
) {
    let (tx, mut rx) = mpsc::unbounded_channel::<OutputLine>();
    let handle = tokio::task::spawn_blocking(move || {
        let stdout = std::io::stdout();
        let stderr = std::io::stderr();
        let mut out = std::io::LineWriter::new(stdout.lock());
        let mut err = std::io::LineWriter::new(stderr.lock());

        while let Some(line) = rx.blocking_recv() {
            match line {
                OutputLine::Stdout(msg) => {
                    let _ = writeln!(out, "{}", msg);
                }
                OutputLine::Stderr(msg) => {
                    let _ = writeln!(err, "{}", msg);
                }
            }
        }

        let _ = out.flush();
        let _ = err.flush();
    });
    (tx, handle)
}

#[derive(Debug, Parser, Clone)]
#[command(
    name = "labscan",
    version,
    about = "Submit a lab report to the OCR parsing service and hand the results to the host"
)]
pub struct Cli {
    /// Document to parse (PDF or image). Without it an interactive session starts.
    pub file: Option<PathBuf>,

    /// Base URL of the parsing service
    #[arg(long, env = "LABSCAN_SERVICE_URL", default_value = "http://localhost:8081")]
    pub service_url: String,

    /// Path of the parse endpoint
    #[arg(long, default_value = "/api/ocr-parse")]
    pub endpoint: String,

    /// Bearer token sent with each request
    #[arg(long, env = "LABSCAN_AUTH_TOKEN", hide_env_values = true)]
    pub auth_token: Option<String>,

    /// Give up on the service after this long
    #[arg(long, env = "LABSCAN_TIMEOUT", default_value = "30s")]
    pub timeout: humantime::Duration,

    /// Largest accepted document, in bytes
    #[arg(long, default_value_t = 20 * 1024 * 1024)]
    pub max_bytes: u64,

    /// Print results as JSON instead of text
    #[arg(long)]
    pub json: bool,

    /// Hand the parsed results to the host after a successful parse
    #[arg(long)]
    pub save: bool,

    /// Write the handoff payload to this file instead of stdout
    #[arg(long)]
    pub handoff_out: Option<PathBuf>,

    /// Export parsed results as JSON
    #[arg(long)]
    pub export_json: Option<PathBuf>,

    /// Suppress progress messages; only results and errors are printed
    #[arg(long)]
    pub silent: bool,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

pub async fn run(args: Cli) -> Result<()> {
    match args.file.clone() {
        Some(path) => run_once(args, &path).await,
        None => {
            if args.save {
                return Err(anyhow::anyhow!(
                    "--save needs a FILE. In an interactive session use the `save` command."
                ));
            }
            run_interactive(args).await
        }
    }
}

/// Build a `WorkflowConfig` from CLI arguments.
pub fn build_config(args: &Cli) -> WorkflowConfig {
    WorkflowConfig {
        service_url: args.service_url.clone(),
        endpoint: args.endpoint.clone(),
        request_timeout: Duration::from(args.timeout),
        max_artifact_bytes: args.max_bytes,
        auth_token: args.auth_token.clone(),
        ..Default::default()
    }
}

struct Session {
    cmd_tx: mpsc::UnboundedSender<UiCommand>,
    evt_rx: mpsc::UnboundedReceiver<WorkflowEvent>,
    handle: tokio::task::JoinHandle<Result<()>>,
}

fn start_session(args: &Cli, out_tx: &mpsc::UnboundedSender<OutputLine>) -> Result<Session> {
    let cfg = build_config(args);
    tracing::debug!(url = %cfg.parse_url(), timeout = ?cfg.request_timeout, "starting session");
    let service: Arc<dyn ParsingService> = Arc::new(HttpParsingService::new(&cfg)?);
    let target = match args.handoff_out.clone() {
        Some(path) => HandoffTarget::File(path),
        None => HandoffTarget::Stdout(out_tx.clone()),
    };
    let bridge: Arc<dyn HostBridge> = Arc::new(ConsoleBridge::new(target));
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<UiCommand>();
    let (evt_tx, evt_rx) = mpsc::unbounded_channel::<WorkflowEvent>();
    let handle = tokio::spawn(async move {
        orchestrator::run_controller(&cfg, service, bridge, evt_tx, cmd_rx).await
    });
    Ok(Session {
        cmd_tx,
        evt_rx,
        handle,
    })
}

/// Print the shown results and any export messages.
fn present_results(
    args: &Cli,
    out_tx: &mpsc::UnboundedSender<OutputLine>,
    records: &[crate::model::LabRecord],
    received_utc: &str,
) {
    let processed = orchestrator::process_results(
        args.export_json.as_deref(),
        args.json,
        records,
        received_utc,
    );
    for line in processed.lines {
        let _ = out_tx.send(OutputLine::Stdout(line));
    }
    for msg in processed.export_messages {
        let _ = out_tx.send(OutputLine::Stderr(msg));
    }
}

/// Parse one file: select, submit, print, and optionally hand off.
async fn run_once(args: Cli, path: &Path) -> Result<()> {
    let artifact =
        Artifact::from_path(path).with_context(|| format!("read {}", path.display()))?;
    let (out_tx, out_handle) = spawn_output_writer();
    let Session {
        cmd_tx,
        mut evt_rx,
        handle,
    } = start_session(&args, &out_tx)?;

    let _ = cmd_tx.send(UiCommand::Select(artifact));
    let _ = cmd_tx.send(UiCommand::Submit);

    let mut failure: Option<String> = None;
    while let Some(ev) = evt_rx.recv().await {
        match ev {
            WorkflowEvent::ResultsShown {
                records,
                received_utc,
            } => {
                present_results(&args, &out_tx, &records, &received_utc);
                let next = if args.save {
                    UiCommand::Handoff
                } else {
                    UiCommand::Quit
                };
                let _ = cmd_tx.send(next);
            }
            WorkflowEvent::ErrorShown { message } => {
                failure = Some(message);
                let _ = cmd_tx.send(UiCommand::Quit);
            }
            WorkflowEvent::Info(info) => {
                if !args.silent {
                    let _ = out_tx.send(OutputLine::Stderr(info.to_message()));
                }
            }
            WorkflowEvent::HandedOff { records } => {
                if !args.silent {
                    let _ = out_tx.send(OutputLine::Stderr(format!(
                        "Handed {} record{} to the host",
                        records,
                        if records == 1 { "" } else { "s" }
                    )));
                }
            }
            WorkflowEvent::StateChanged { state } => {
                tracing::trace!(?state, "state");
            }
        }
    }

    let res = handle.await.context("controller task failed")?;
    drop(out_tx);
    let _ = out_handle.await;
    res?;

    match failure {
        Some(message) => Err(anyhow::anyhow!(message)),
        None => Ok(()),
    }
}

/// Commands accepted by the interactive session.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum ReplCommand {
    Open(PathBuf),
    Submit,
    Save,
    Help,
    Quit,
}

/// Parse one input line. Blank lines yield `Ok(None)`.
pub(crate) fn parse_command(line: &str) -> Result<Option<ReplCommand>, String> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((w, r)) => (w, r.trim()),
        None => (line, ""),
    };
    let cmd = match word.to_ascii_lowercase().as_str() {
        "open" | "o" => {
            if rest.is_empty() {
                return Err("usage: open <path>".to_string());
            }
            ReplCommand::Open(PathBuf::from(rest))
        }
        "submit" | "s" => ReplCommand::Submit,
        "save" => ReplCommand::Save,
        "help" | "h" | "?" => ReplCommand::Help,
        "quit" | "q" | "exit" => ReplCommand::Quit,
        other => return Err(format!("unknown command: {other} (try `help`)")),
    };
    Ok(Some(cmd))
}

const HELP_LINES: &[&str] = &[
    "Commands:",
    "  open <path>   Select a document",
    "  submit        Send the selected document for parsing",
    "  save          Hand the last parsed results to the host and close",
    "  help          Show this help",
    "  quit          Leave without saving",
];

/// Line-driven session: commands from stdin, events to stdout/stderr.
async fn run_interactive(args: Cli) -> Result<()> {
    let (out_tx, out_handle) = spawn_output_writer();
    let Session {
        cmd_tx,
        mut evt_rx,
        handle,
    } = start_session(&args, &out_tx)?;
    for line in HELP_LINES {
        let _ = out_tx.send(OutputLine::Stderr(line.to_string()));
    }

    let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    loop {
        tokio::select! {
            line = lines.next_line(), if stdin_open => {
                let line = match line.context("read stdin")? {
                    Some(l) => l,
                    None => {
                        stdin_open = false;
                        let _ = cmd_tx.send(UiCommand::Quit);
                        continue;
                    }
                };
                match parse_command(&line) {
                    Ok(None) => {}
                    Ok(Some(ReplCommand::Open(path))) => match Artifact::from_path(&path) {
                        Ok(artifact) => {
                            let _ = cmd_tx.send(UiCommand::Select(artifact));
                        }
                        Err(e) => {
                            let _ = out_tx.send(OutputLine::Stderr(format!(
                                "Cannot open {}: {e}",
                                path.display()
                            )));
                        }
                    },
                    Ok(Some(ReplCommand::Submit)) => {
                        let _ = cmd_tx.send(UiCommand::Submit);
                    }
                    Ok(Some(ReplCommand::Save)) => {
                        let _ = cmd_tx.send(UiCommand::Handoff);
                    }
                    Ok(Some(ReplCommand::Help)) => {
                        for line in HELP_LINES {
                            let _ = out_tx.send(OutputLine::Stderr(line.to_string()));
                        }
                    }
                    Ok(Some(ReplCommand::Quit)) => {
                        let _ = cmd_tx.send(UiCommand::Quit);
                    }
                    Err(msg) => {
                        let _ = out_tx.send(OutputLine::Stderr(msg));
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                let _ = cmd_tx.send(UiCommand::Quit);
            }
            ev = evt_rx.recv() => {
                let Some(ev) = ev else { break };
                match ev {
                    WorkflowEvent::ResultsShown { records, received_utc } => {
                        present_results(&args, &out_tx, &records, &received_utc);
                        let _ = out_tx.send(OutputLine::Stderr(
                            "Type `save` to hand these results to the host.".to_string(),
                        ));
                    }
                    WorkflowEvent::ErrorShown { message } => {
                        let _ = out_tx.send(OutputLine::Stderr(format!("Error: {message}")));
                    }
                    WorkflowEvent::Info(info) => {
                        if !args.silent {
                            let _ = out_tx.send(OutputLine::Stderr(info.to_message()));
                        }
                    }
                    WorkflowEvent::HandedOff { records } => {
                        let _ = out_tx.send(OutputLine::Stderr(format!(
                            "Handed {records} record(s) to the host. Closing."
                        )));
                    }
                    WorkflowEvent::StateChanged { state } => {
                        tracing::trace!(?state, "state");
                    }
                }
            }
        }
    }

    let res = handle.await.context("controller task failed")?;
    drop(out_tx);
    let _ = out_handle.await;
    res
}
