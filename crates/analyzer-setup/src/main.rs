use analyzer_setup::dependency::{ReadinessPolicy, ServiceRole, SetupConfig, SetupError};
use analyzer_setup::{LifecycleController, shutdown_signal};
use anyhow::{Context, Result};
use clap::Parser;
use dotenvy::dotenv;
use opentelemetry::global;
use opentelemetry::trace::TracerProvider;
use opentelemetry_sdk::Resource;
use opentelemetry_sdk::trace as sdktrace;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info, subscriber};
use tracing_subscriber::{EnvFilter, Registry, prelude::*};

/// Checks runtimes, installs dependencies and runs the Chroma and application servers.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Directory of the application server (holds its package.json).
    #[arg(long)]
    app_dir: Option<PathBuf>,

    /// Host the Chroma server binds to.
    #[arg(long)]
    db_host: Option<String>,

    /// Port the Chroma server binds to.
    #[arg(long)]
    db_port: Option<u16>,

    /// Port the application server is expected to listen on.
    #[arg(long)]
    app_port: Option<u16>,

    /// How to wait for Chroma before starting the application server: `probe` or `settle`.
    #[arg(long)]
    readiness: Option<ReadinessPolicy>,

    /// Skip the npm and pip installation steps.
    #[arg(long)]
    skip_install: bool,
}

impl Cli {
    /// Apply flags over `config` (flags win over environment variables) and validate
    fn into_config(self, mut config: SetupConfig) -> Result<SetupConfig, SetupError> {
        if let Some(dir) = self.app_dir {
            config.app_server_dir = dir;
        }
        if let Some(host) = self.db_host {
            config.db_host = host;
        }
        if let Some(port) = self.db_port {
            config.db_port = port;
        }
        if let Some(port) = self.app_port {
            config.app_server_port = port;
        }
        if let Some(policy) = self.readiness {
            config.readiness = policy;
        }
        if self.skip_install {
            config.skip_install = true;
        }

        config.validate()?;
        Ok(config)
    }
}

/// Initializes the OpenTelemetry pipeline for tracing.
fn init_tracing() -> Result<sdktrace::SdkTracerProvider> {
    let provider = sdktrace::SdkTracerProvider::builder()
        .with_resource(
            Resource::builder()
                .with_service_name("analyzer-setup")
                .build(),
        )
        .build();
    let tracer = provider.tracer("analyzer-setup");
    global::set_tracer_provider(provider.clone());

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,analyzer_setup=debug"));

    let subscriber = Registry::default()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_opentelemetry::layer().with_tracer(tracer));

    subscriber::set_global_default(subscriber)
        .context("Failed to set global default tracing subscriber")?;

    Ok(provider)
}

async fn run(cli: Cli) -> Result<u8> {
    let config = cli.into_config(SetupConfig::from_env())?;

    info!(
        app_server_dir = %config.app_server_dir.display(),
        database = %config.address(ServiceRole::Database),
        readiness = ?config.readiness,
        "--- Analyzer Setup ---"
    );

    let mut controller = LifecycleController::from_config(config);
    let code = controller.run(shutdown_signal()).await;

    info!(state = ?controller.state(), exit_code = code, "Setup finished");
    Ok(code)
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Load environment variables from a .env file in the current directory.
    dotenv().ok();

    let tracer_provider = init_tracing()?;

    let outcome = run(Cli::parse()).await;
    if let Err(e) = &outcome {
        error!(error = %e, "Setup aborted");
    }

    // flush spans on every path, including configuration errors
    tracer_provider.shutdown()?;
    outcome.map(ExitCode::from)
}
