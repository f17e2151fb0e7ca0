mod config;

use std::fs;
use std::path::Path;
use std::sync::Arc;

use axum::Router;
use config::AppConfig;
use reviewbot_api::AppState;
use reviewbot_db::{create_pool, run_migrations};
use reviewbot_forge::{GithubAdapter, GithubAppAuth, GitlabAdapter, InstallationTokenManager};
use reviewbot_pipeline::{run_scheduler_loop, Services, TokenStore};
use tokio::sync::watch;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    // Install the sqlite/postgres drivers behind sqlx::Any
    sqlx::any::install_default_drivers();

    // Load configuration
    let config = match AppConfig::load() {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    info!("Configuration loaded successfully");

    // Create database connection pool
    let db_pool = match create_pool(&config.database.url, config.database.max_connections).await {
        Ok(pool) => {
            info!("Database connection pool created: {}", config.database.url);
            pool
        }
        Err(e) => {
            error!("Failed to create database pool: {}", e);
            std::process::exit(1);
        }
    };

    // Run the schema migration
    if let Err(e) = run_migrations(&db_pool).await {
        error!("Failed to run database migrations: {}", e);
        std::process::exit(1);
    }
    info!("Database migrations completed successfully");

    // Eagerly load the predefined skills catalog
    let skills = match reviewbot_core::SkillsCatalog::load(Path::new(&config.sandbox.skills_root)) {
        Ok(catalog) => catalog,
        Err(e) => {
            error!("Failed to load skills catalog: {}", e);
            std::process::exit(1);
        }
    };
    info!(
        skills_root = %config.sandbox.skills_root,
        empty = skills.is_empty(),
        "skills catalog loaded"
    );

    // GitHub App identity is optional: without it, reviews post with the
    // connecting user's own token instead of a bot installation token.
    let github_installation_tokens = match (&config.github.app_id, &config.github.private_key_path) {
        (Some(app_id), Some(private_key_path)) => match fs::read_to_string(private_key_path) {
            Ok(private_key) => {
                let auth = GithubAppAuth::new(*app_id, private_key);
                info!(app_id, "GitHub App identity configured");
                Some(Arc::new(InstallationTokenManager::new(auth)))
            }
            Err(e) => {
                error!(
                    "Failed to read GitHub App private key from {}: {}",
                    private_key_path, e
                );
                std::process::exit(1);
            }
        },
        _ => {
            info!("no GitHub App identity configured; reviews post with the connecting user's token");
            None
        }
    };

    let token_store = TokenStore::new(
        db_pool.clone(),
        reqwest::Client::new(),
        config.github.oauth_config(),
        config.gitlab.oauth_config(),
    );

    let services = Arc::new(Services::new(
        db_pool.clone(),
        token_store,
        config.sandbox.to_pipeline_config(),
        skills,
        Arc::new(GithubAdapter::new()),
        Arc::new(GitlabAdapter::new()),
        github_installation_tokens,
        config.gitlab.bot_token.clone(),
    ));

    let gitlab_adapter = Arc::new(GitlabAdapter::new());

    let app_state = AppState::new(
        db_pool,
        services.clone(),
        gitlab_adapter,
        config.github.webhook_secret.clone(),
        config.webhook_base_url.clone(),
    );

    let app: Router = reviewbot_api::router(app_state).layer(tower_http::trace::TraceLayer::new_for_http());

    // Scheduler loop runs as a background task; a shutdown signal tells it
    // to finish the current iteration and stop, never preempt mid-job.
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let scheduler_services = services.clone();
    let scheduler_handle = tokio::spawn(async move {
        run_scheduler_loop(&scheduler_services, shutdown_rx).await;
    });

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind to {}: {}", addr, e);
            std::process::exit(1);
        }
    };

    info!("Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    let _ = shutdown_tx.send(true);
    if let Err(e) = scheduler_handle.await {
        error!("scheduler task panicked during shutdown: {}", e);
    }

    info!("server shutdown complete");
}

/// Wait for SIGTERM or Ctrl+C for graceful shutdown.
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("received SIGINT, initiating graceful shutdown");
        },
        _ = terminate => {
            info!("received SIGTERM, initiating graceful shutdown");
        },
    }
}
