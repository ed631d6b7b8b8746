use std::sync::Arc;

use anyhow::Context;
use clap::Parser;

use netdesk_api::app;
use netdesk_api::cli::{self, Cli, Command};
use netdesk_core::SystemClock;
use netdesk_infra::AppConfig;
use netdesk_observability::LogFormat;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    // Config parsing logs, so the subscriber goes first.
    let development = std::env::var("APP_ENV").is_ok_and(|v| v.trim() == "development");
    netdesk_observability::init(if development {
        LogFormat::Pretty
    } else {
        LogFormat::Json
    });

    let config = AppConfig::from_env().context("invalid configuration")?;

    let services = Arc::new(
        app::build_services(&config, Arc::new(SystemClock))
            .await
            .context("failed to start services")?,
    );

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => {
            let listener = tokio::net::TcpListener::bind(config.bind_addr)
                .await
                .with_context(|| format!("failed to bind {}", config.bind_addr))?;
            tracing::info!("listening on {}", listener.local_addr()?);
            axum::serve(listener, app::router(services)).await?;
        }
        command => cli::execute_command(command, &services).await?,
    }
    Ok(())
}
