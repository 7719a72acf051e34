use crate::config::Config;
use crate::data::memory::MemoryStore;
use crate::data::pg::PgStore;
use crate::data::store::FacilityStore;
use crate::state::AppState;
use crate::utils::fmt_duration;
use crate::web::create_router;
use anyhow::Context;
use sqlx::ConnectOptions;
use sqlx::PgPool;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use std::net::SocketAddr;
use std::process::ExitCode;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info, warn};

const POOL_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(4);
const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(120);
const SLOW_STATEMENT: Duration = Duration::from_secs(1);

/// Store, shared state and server configuration for one process.
pub struct App {
    config: Config,
    db_pool: Option<PgPool>,
    app_state: AppState,
}

impl App {
    /// Connect the store (running migrations when backed by Postgres) and build shared state.
    pub async fn new(config: Config) -> Result<Self, anyhow::Error> {
        let (store, db_pool) = match config.database_url.as_deref() {
            Some(url) => {
                let pool = Self::connect(url, config.db_max_connections).await?;
                let store: Arc<dyn FacilityStore> = Arc::new(PgStore::new(pool.clone()));
                (store, Some(pool))
            }
            None => {
                warn!("DATABASE_URL is not set; using the in-memory store, data will not persist");
                let store: Arc<dyn FacilityStore> = Arc::new(MemoryStore::new());
                (store, None)
            }
        };

        let app_state = AppState::new(
            store,
            config.dashboard_cache_ttl,
            config.api_token.clone(),
        );

        info!(
            store = app_state.catalog.store_kind(),
            cache_ttl = fmt_duration(config.dashboard_cache_ttl),
            auth = app_state.api_token.is_some(),
            "application state ready"
        );

        Ok(App {
            config,
            db_pool,
            app_state,
        })
    }

    async fn connect(url: &str, max_connections: u32) -> Result<PgPool, anyhow::Error> {
        let connect_options = PgConnectOptions::from_str(url)
            .context("invalid DATABASE_URL")?
            .log_statements(tracing::log::LevelFilter::Trace)
            .log_slow_statements(tracing::log::LevelFilter::Warn, SLOW_STATEMENT);

        let pool = PgPoolOptions::new()
            .min_connections(0)
            .max_connections(max_connections)
            .acquire_timeout(POOL_ACQUIRE_TIMEOUT)
            .acquire_slow_threshold(POOL_ACQUIRE_TIMEOUT / 8)
            .idle_timeout(POOL_IDLE_TIMEOUT)
            .connect_with(connect_options)
            .await
            .context("could not connect to Postgres")?;
        info!(
            max_connections,
            acquire_timeout = fmt_duration(POOL_ACQUIRE_TIMEOUT),
            idle_timeout = fmt_duration(POOL_IDLE_TIMEOUT),
            "connected to Postgres"
        );

        let migrator = sqlx::migrate!("./migrations");
        migrator
            .run(&pool)
            .await
            .context("schema migration failed")?;
        info!(migrations = migrator.iter().count(), "schema is up to date");

        Ok(pool)
    }

    /// Serve until a shutdown signal, then drain for at most the configured shutdown timeout.
    pub async fn run(self) -> ExitCode {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.config.port));
        let listener = match TcpListener::bind(addr).await {
            Ok(listener) => listener,
            Err(e) => {
                error!(error = %e, %addr, "failed to bind listener");
                return ExitCode::FAILURE;
            }
        };
        info!(%addr, "web server listening");

        let sweeper = self.app_state.spawn_cache_sweeper();
        let router = create_router(self.app_state.clone());
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        let mut server = tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx.changed().await;
                })
                .await
        });

        let exit = tokio::select! {
            result = &mut server => {
                error!(?result, "web server stopped unexpectedly");
                ExitCode::FAILURE
            }
            _ = shutdown_signal() => {
                info!(
                    timeout = fmt_duration(self.config.shutdown_timeout),
                    "shutdown requested, draining connections"
                );
                let _ = shutdown_tx.send(true);
                match tokio::time::timeout(self.config.shutdown_timeout, &mut server).await {
                    Ok(Ok(Ok(()))) => {
                        info!("web server stopped gracefully");
                        ExitCode::SUCCESS
                    }
                    Ok(result) => {
                        error!(?result, "web server failed during shutdown");
                        ExitCode::FAILURE
                    }
                    Err(_) => {
                        warn!("graceful shutdown timed out, aborting open connections");
                        server.abort();
                        ExitCode::FAILURE
                    }
                }
            }
        };

        sweeper.abort();
        if let Some(pool) = self.db_pool {
            pool.close().await;
        }
        exit
    }
}

/// Resolves on Ctrl-C, or SIGTERM on Unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for Ctrl-C");
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
                error!(error = %e, "failed to listen for SIGTERM");
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
}
