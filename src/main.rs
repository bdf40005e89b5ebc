mod cli;
mod error;
mod host;
mod model;
mod orchestrator;
mod service;
mod text_summary;

use clap::Parser;

/// Log to stderr so stdout stays clean for results and handoff payloads.
fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "labscan=warn",
        1 => "labscan=debug",
        _ => "labscan=trace",
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default)),
        )
        .init();
}

#[tokio::main]
async fn main() {
    let args = cli::Cli::parse();
    init_tracing(args.verbose);
    let is_silent = args.silent;

    // Exit explicitly: a pending stdin read would otherwise keep the runtime alive.
    match cli::run(args).await {
        Ok(()) => std::process::exit(0),
        Err(e) => {
            if is_silent {
                eprintln!("Error: {}", e);
            } else {
                eprintln!("Error: {:?}", e);
            }
            std::process::exit(1);
        }
    }
}
