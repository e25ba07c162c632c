use anyhow::Result;
use clap::Parser;
use locflow::cli::Cli;
use std::env;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    cli.execute()
}

/// Logs go to stderr so JSON output on stdout stays parseable.
fn init_tracing() {
    let filter = EnvFilter::try_from_env("LOCFLOW_LOG").unwrap_or_else(|_| EnvFilter::new("locflow=info,warn"));
    let format = env::var("LOCFLOW_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());

    let registry = tracing_subscriber::registry().with(filter);
    match format.as_str() {
        "json" => registry
            .with(fmt::layer().json().with_ansi(false).with_writer(std::io::stderr))
            .init(),
        _ => registry
            .with(fmt::layer().compact().with_writer(std::io::stderr))
            .init(),
    }
}
