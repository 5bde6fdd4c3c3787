use anyhow::Result;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use tracing::info;

/// Drive a key grid showing live Home Assistant state
#[derive(Parser, Debug)]
#[command(name = "keydeck", version)]
struct Args {
    /// Path to the layout YAML file
    layout: PathBuf,

    /// Log level to use (RUST_LOG takes precedence)
    #[arg(long, value_enum, ignore_case = true, default_value_t = LogLevel::Info)]
    loglevel: LogLevel,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
    Critical,
}

impl LogLevel {
    fn directive(self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warning => "warn",
            LogLevel::Error | LogLevel::Critical => "error",
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize tracing subscriber (stderr, stdout belongs to the terminal frontend)
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("keydeck={}", args.loglevel.directive()).into()),
        )
        .init();

    info!("keydeck starting...");

    let layout = keydeck::config::load_config(&args.layout)?;
    keydeck::app::run(layout).await
}
