//! AutoML REST - Main Entry Point

use clap::Parser;
use automl_rest::cli::{cmd_predict, cmd_runs, cmd_serve, cmd_train, Cli, Commands};
use automl_rest::server::{run_server, ServerConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "automl_rest=info,tower_http=info".into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Serve { port, host, cors_origin, backend }) => {
            cmd_serve(&host, port, cors_origin, &backend).await?;
        }
        Some(Commands::Train { data, target, max_runtime_secs, sort_metric, backend }) => {
            cmd_train(&data, &target, max_runtime_secs, sort_metric, &backend).await?;
        }
        Some(Commands::Predict { data, model_id, output, backend }) => {
            cmd_predict(&data, model_id, output.as_deref(), &backend).await?;
        }
        Some(Commands::Runs { run, limit, backend }) => {
            cmd_runs(run, limit, &backend).await?;
        }
        None => {
            // Default: serve with the environment configuration
            run_server(ServerConfig::default()).await?;
        }
    }

    Ok(())
}
