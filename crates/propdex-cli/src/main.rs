mod cli;
mod commands;

use std::process::ExitCode;

use clap::Parser;
use propdex_core::PropdexError;
use tracing_subscriber::EnvFilter;

use crate::cli::Cli;

fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();
    let operation = cli.command.operation();
    match commands::run_from_root(&cli.root, cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            report_error(&err, operation);
            ExitCode::FAILURE
        }
    }
}

// Logs go to stderr so stdout stays machine-readable JSON.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("propdex_core=info,propdex=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn report_error(err: &anyhow::Error, operation: &str) {
    eprintln!("error: {err:#}");
    let Some(core) = err.chain().find_map(|cause| cause.downcast_ref::<PropdexError>()) else {
        return;
    };
    let uri = match core {
        PropdexError::NotFound(uri) | PropdexError::InvalidUri(uri) => Some(uri.clone()),
        PropdexError::RepairFailed { uri, .. } | PropdexError::Unmappable { uri, .. } => {
            Some(uri.clone())
        }
        _ => None,
    };
    match serde_json::to_string(&core.to_payload(operation, uri)) {
        Ok(payload) => eprintln!("{payload}"),
        Err(encode_err) => eprintln!("failed to encode error payload: {encode_err}"),
    }
}
