use anyhow::{Context, Result};
use clap::Parser;
use hospital_records::auth::Passwords;
use hospital_records::config::Config;
use hospital_records::db::Database;
use hospital_records::token::TokenService;
use hospital_records::web::{build_router, AppState};
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = Config::parse();
    tracing::info!("Starting hospital records server");

    tracing::info!("Opening database {}", config.database_url);
    let db = Database::open(&config.database_url)?;
    db.migrate()?;
    db.seed_patients()?;

    let passwords = Passwords::new(config.bcrypt_cost)?;
    match &config.admin_password {
        Some(password) => {
            db.seed_admin(password, &passwords)?;
        }
        None => tracing::warn!("ADMIN_PASSWORD not set, skipping admin account seed"),
    }

    let state = AppState::new(
        Arc::new(db),
        TokenService::new(&config.jwt_secret),
        passwords,
    );
    let app = build_router(state, config.request_timeout());

    let addr = config.listen_addr();
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, stopping...");
}
