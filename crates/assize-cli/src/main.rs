mod cli;
mod templates;

use assize_core::config::EngineSettings;
use clap::Parser;
use cli::commands::exit_codes;
use tracing_subscriber::{fmt, EnvFilter};

fn init_logging(log_level: &str) {
    let filter = EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = fmt()
        .with_env_filter(filter)
        .json()
        .with_timer(fmt::time::UtcTime::rfc_3339())
        .with_target(true)
        .with_current_span(false)
        .with_span_list(false)
        .with_writer(std::io::stderr)
        .try_init();
}

#[tokio::main(flavor = "multi_thread")]
async fn main() {
    let cli = cli::args::Cli::parse();
    let settings = EngineSettings::from_env();
    init_logging(&settings.log_level);
    tracing::debug!(event = "cli_start", version = env!("CARGO_PKG_VERSION"));

    let code = match cli::commands::dispatch(cli, settings).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("fatal: {e:?}");
            exit_codes::CONFIG_ERROR
        }
    };
    std::process::exit(code);
}
