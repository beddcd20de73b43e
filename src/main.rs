use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use sqlx::PgPool;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use approvals_backend::api;
use approvals_backend::app_state::AppState;
use approvals_backend::config::Config;
use approvals_backend::db::pool::{get_db_pool, run_migrations};
use approvals_backend::db::queries::PgRequestStore;
use approvals_backend::directory::cache::CachedDirectory;
use approvals_backend::directory::http::HttpDirectoryClient;
use approvals_backend::lifecycle::{EngineSettings, LifecycleEngine};
use approvals_backend::notify::{Delivery, LogMailer, MailNotifier, SmtpMailer};
use approvals_backend::service::Desk;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Arc::new(Config::from_env()?);

    std::fs::create_dir_all(&config.log_dir).context("Failed to create log directory")?;
    let file_appender = tracing_appender::rolling::daily(&config.log_dir, "approvals.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn")))
        .with(fmt::layer().with_target(true))
        .with(fmt::layer().with_ansi(false).with_writer(non_blocking))
        .init();

    let pool = get_db_pool(&config).await.context("Failed to connect to the database")?;
    run_migrations(&pool).await.context("Failed to run migrations")?;

    let directory_url = config
        .directory_url
        .as_deref()
        .context("DIRECTORY_URL must be set")?;
    let directory = CachedDirectory::new(
        HttpDirectoryClient::new(directory_url, config.directory_token.clone(), config.directory_timeout)?,
        config.directory_cache_ttl,
        config.directory_cache_capacity,
    );

    let delivery = match &config.smtp {
        Some(smtp) => Delivery::Smtp(SmtpMailer::new(smtp)?),
        None => {
            warn!("SMTP_HOST not set; notifications are written to the log");
            Delivery::Log(LogMailer)
        }
    };
    let notifier = MailNotifier::new(delivery, config.admin_email.clone());

    let engine = LifecycleEngine::new(
        PgRequestStore::new(pool.clone()),
        directory,
        notifier,
        EngineSettings::from_config(&config),
    );
    let state = AppState::new(Arc::new(Desk::new(engine)), config.clone());
    let app = api::router(state);

    let listener = TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_addr))?;
    info!(addr = %config.bind_addr, "server listening");

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal(pool))
        .await
        .context("Server encountered an error")?;

    info!("shutdown complete");
    Ok(())
}

async fn shutdown_signal(pool: PgPool) {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            warn!(error = %err, "failed to listen for Ctrl+C");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => warn!(error = %err, "failed to listen for SIGTERM"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received Ctrl+C, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }

    info!("closing database pool");
    pool.close().await;
}
