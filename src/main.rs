// SPDX-License-Identifier: Apache-2.0

//! CLI entry point for `sqlgate`.
//!
//! Exit status: 0 when the request is admitted, 1 when it is denied, 2 on a
//! configuration or startup error.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use sqlgate_lib::gate::{AdmissionGate, ConfigWatcher, GateConfig};
use sqlgate_lib::observability;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};

#[derive(Parser)]
#[command(
    name = "sqlgate",
    version,
    about = "Admit or deny SQL before it reaches the database"
)]
struct Cli {
    /// SQL text to check; read from stdin when omitted
    sql: Option<String>,

    /// JSON rule table and gate settings
    #[arg(long, env = "SQLGATE_CONFIG")]
    config: Option<PathBuf>,

    /// Label recorded with every audit record
    #[arg(long, default_value = "cli")]
    context: String,

    /// JSON-lines audit log (overrides the config file)
    #[arg(long)]
    audit: Option<PathBuf>,

    /// Directory for the gate's own logs
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// Treat each stdin line as one request and keep the rule table in
    /// sync with the config file
    #[arg(long)]
    stream: bool,

    /// Pretty-print the outcome
    #[arg(long)]
    pretty: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    observability::init_tracing(cli.log_dir.as_deref());

    let mut config = match &cli.config {
        Some(path) => match GateConfig::load(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Error: {e}");
                return ExitCode::from(2);
            }
        },
        None => {
            let mut config = GateConfig::default();
            config.apply_env_overrides(|key| std::env::var(key).ok());
            config
        }
    };
    if let Some(audit) = &cli.audit {
        config.audit_path = Some(audit.clone());
    }

    let gate = match AdmissionGate::from_config(&config).await {
        Ok(gate) => gate,
        Err(e) => {
            eprintln!("Error: {e}");
            return ExitCode::from(2);
        }
    };

    if cli.stream {
        return run_stream(&cli, &gate).await;
    }

    let outcome = match &cli.sql {
        Some(sql) => gate.admit(sql, &cli.context).await,
        None => {
            let mut input = Vec::new();
            if let Err(e) = tokio::io::stdin().read_to_end(&mut input).await {
                eprintln!("Error reading stdin: {e}");
                return ExitCode::from(2);
            }
            gate.admit_bytes(&input, &cli.context).await
        }
    };

    print_outcome(&outcome, cli.pretty);
    if outcome.is_allowed() {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(1)
    }
}

/// One request per line until EOF. Exits 1 if any request was denied.
async fn run_stream(cli: &Cli, gate: &AdmissionGate) -> ExitCode {
    let _watcher = match &cli.config {
        Some(path) => match ConfigWatcher::spawn(path, gate.policy().clone()) {
            Ok(watcher) => Some(watcher),
            Err(e) => {
                eprintln!("Error: {e}");
                return ExitCode::from(2);
            }
        },
        None => None,
    };

    let mut reader = BufReader::new(tokio::io::stdin());
    let mut line = Vec::new();
    let mut any_denied = false;

    loop {
        line.clear();
        match reader.read_until(b'\n', &mut line).await {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) => {
                eprintln!("Error reading stdin: {e}");
                return ExitCode::from(2);
            }
        }
        while matches!(line.last(), Some(b'\n' | b'\r')) {
            line.pop();
        }
        if line.is_empty() {
            continue;
        }

        let outcome = gate.admit_bytes(&line, &cli.context).await;
        any_denied |= !outcome.is_allowed();
        print_outcome(&outcome, cli.pretty);
    }

    if any_denied {
        ExitCode::from(1)
    } else {
        ExitCode::SUCCESS
    }
}

fn print_outcome(outcome: &sqlgate_lib::AdmissionOutcome, pretty: bool) {
    let json = if pretty {
        serde_json::to_string_pretty(outcome)
    } else {
        serde_json::to_string(outcome)
    };
    match json {
        Ok(json) => println!("{json}"),
        Err(e) => eprintln!("Error serializing outcome: {e}"),
    }
}
