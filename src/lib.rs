pub mod api;
pub mod cli;
pub mod config;
pub mod db;
pub mod entities;
pub mod hashing;
pub mod models;
pub mod services;
pub mod state;

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

pub use config::Config;
use db::Store;
use models::Role;
use services::{RateLimiter, RegistrationService, SeaOrmRegistrationService};

pub async fn run() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = Config::load()?;
    config.validate()?;

    let prometheus_handle = if config.observability.metrics_enabled {
        use metrics_exporter_prometheus::PrometheusBuilder;
        let builder = PrometheusBuilder::new();
        let handle = builder
            .install_recorder()
            .context("Failed to install Prometheus recorder")?;
        Some(handle)
    } else {
        None
    };

    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.general.log_level));

    let fmt_layer = tracing_subscriber::fmt::layer();

    let registry = tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer);

    if config.observability.loki_enabled {
        let url = url::Url::parse(&config.observability.loki_url).context("Invalid Loki URL")?;

        let mut builder = tracing_loki::builder();
        for (key, value) in &config.observability.loki_labels {
            builder = builder.label(key, value)?;
        }

        let (layer, task) = builder.build_url(url)?;

        tokio::spawn(task);

        registry.with(layer).init();
        info!(
            "Loki logging initialized at {}",
            config.observability.loki_url
        );
    } else {
        registry.init();
    }

    let cli = cli::Cli::parse();

    match cli.command.unwrap_or(cli::Commands::Serve) {
        cli::Commands::Serve => run_server(config, prometheus_handle).await,

        cli::Commands::CreateUser {
            username,
            display_name,
            password,
            privileged,
        } => cmd_create_user(&config, &username, display_name.as_deref(), &password, privileged)
            .await,

        cli::Commands::Init => {
            Config::create_default_if_missing()?;
            println!("✓ Config file created. Edit config.toml and run again.");
            Ok(())
        }
    }
}

async fn run_server(
    config: Config,
    prometheus_handle: Option<metrics_exporter_prometheus::PrometheusHandle>,
) -> anyhow::Result<()> {
    info!("rosterd v{} starting...", env!("CARGO_PKG_VERSION"));

    let port = config.server.port;
    let state = api::create_app_state_from_config(config, prometheus_handle).await?;
    let app = api::router(state).await;

    let addr = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    let server_handle = tokio::spawn(async move {
        info!("🌐 Web server running at http://0.0.0.0:{port}");
        if let Err(e) = axum::serve(
            listener,
            app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
        )
        .await
        {
            error!("Web server error: {e}");
        }
    });

    info!("Press Ctrl+C to stop.");

    match signal::ctrl_c().await {
        Ok(()) => {
            info!("Shutdown signal received");
        }
        Err(e) => {
            error!("Error listening for shutdown: {e}");
        }
    }

    server_handle.abort();
    info!("Server stopped");

    Ok(())
}

async fn cmd_create_user(
    config: &Config,
    username: &str,
    display_name: Option<&str>,
    password: &str,
    privileged: bool,
) -> anyhow::Result<()> {
    let store = Store::with_pool_options(
        &config.general.database_path,
        config.general.max_db_connections,
        config.general.min_db_connections,
    )
    .await?;

    let limiter = Arc::new(RateLimiter::new(&config.rate_limit));
    let registration = SeaOrmRegistrationService::new(store, limiter, config);

    let role = if privileged {
        Role::Privileged
    } else {
        Role::Standard
    };

    match registration
        .create_account(username, display_name.unwrap_or(username), password, role)
        .await
    {
        Ok(account) => {
            println!("✓ Created {} account: {}", account.role, account.username);
            Ok(())
        }
        Err(e) => {
            println!("Failed to create account: {e}");
            Ok(())
        }
    }
}
