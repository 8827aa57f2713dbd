use actix_web::web;
use anyhow::Context;
use dotenv::dotenv;
use promwatch::UserRegistry;
use std::sync::Arc;
use teloxide::Bot;
use tokio::task;
use tracing_subscriber::EnvFilter;

mod bots;
mod config;
mod http_server;
mod observability;
mod services;
mod utils;
mod webhooks;

use crate::{
    bots::commands::CommandDispatcher,
    bots::monitoring_bot::run_bot,
    config::{AppConfig, LogFormat},
    http_server::run_http_server,
    services::notifier::{Notifier, TelegramNotifier},
    services::prometheus::PrometheusClient,
    webhooks::alertmanager::AlertDispatcher,
};

fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    match config.log_format {
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init(),
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    let config = match AppConfig::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error:\n{}", e);
            std::process::exit(1);
        }
    };

    init_tracing(&config);
    tracing::info!(
        prometheus = %config.prometheus_url,
        port = config.webhook_port,
        "Starting promwatch"
    );

    let registry = Arc::new(UserRegistry::load(
        config.authorized_users.iter().copied(),
        config.user_store_path.clone(),
    ));
    if registry.list_users().is_empty() {
        tracing::warn!("No authorized users configured, every command will be denied");
    }

    let prometheus = PrometheusClient::new(config.prometheus_url.clone(), config.prometheus_timeout);
    let bot = Bot::new(config.bot_token.clone());

    let notifier: Arc<dyn Notifier> = Arc::new(TelegramNotifier::new(bot.clone()));
    let alerts = web::Data::new(AlertDispatcher::new(
        Arc::clone(&registry),
        notifier,
        config.aggregation_window,
    ));
    let commands = Arc::new(CommandDispatcher::new(
        registry,
        prometheus,
        config.grafana_url.clone(),
    ));

    task::spawn(run_bot(bot, commands));
    run_http_server(config.webhook_port, config.webhook_path.clone(), alerts)
        .await
        .context("HTTP server error")?;

    tracing::info!("Shutting down");
    Ok(())
}
