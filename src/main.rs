//! bleedscan - concurrent Heartbleed scanner.

use anyhow::{Context, Result};
use bleedscan::cli::Args;
use bleedscan::config::ScanSettings;
use bleedscan::error::ScanError;
use bleedscan::output::{create_sink, print_error};
use bleedscan::scanner::run_scan;
use bleedscan::tls::RawHeartbeatTls;
use clap::Parser;
use std::io;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::fs::File;
use tokio::io::{AsyncBufRead, BufReader};
use tracing_subscriber::EnvFilter;

type Input = Box<dyn AsyncBufRead + Unpin + Send>;

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            print_error(&format!("{e:#}"));
            let code = e
                .downcast_ref::<ScanError>()
                .map_or(1, ScanError::exit_code);
            ExitCode::from(u8::try_from(code).unwrap_or(1))
        }
    }
}

async fn run(args: Args) -> Result<()> {
    let settings = ScanSettings::load(args.config.as_deref())?.merge(args.overrides());
    init_tracing(settings.verbose);
    settings.validate()?;

    let mut inputs: Vec<Input> = Vec::with_capacity(args.inputs.len().max(1));
    if args.inputs.is_empty() {
        inputs.push(Box::new(BufReader::new(tokio::io::stdin())));
    } else {
        for path in &args.inputs {
            let file = File::open(path)
                .await
                .with_context(|| format!("cannot open {}", path.display()))?;
            inputs.push(Box::new(BufReader::new(file)));
        }
    }

    let sink = create_sink(settings.format, settings.header, io::stdout())?;
    run_scan(
        &settings.scan_config(),
        inputs,
        Arc::new(RawHeartbeatTls::new()),
        sink,
    )
    .await?;

    Ok(())
}

/// Diagnostics go to stderr so they never mix with records on stdout.
fn init_tracing(verbose: bool) {
    let default = if verbose { "warn,bleedscan=info" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}
