use std::net::SocketAddr;
use std::sync::Arc;

use tokio::signal;

use identity_service::{
    build_router,
    config::{AppConfig, Environment},
    db,
    middleware::create_ip_rate_limiter,
    services::{seed, AdminService, AuthService, JwtService, RedisTokenStore, TokenStore},
    AppState,
};

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    dotenvy::dotenv().ok();

    // Load configuration - fail fast if invalid
    let config = AppConfig::from_env()?;
    init_tracing(&config);

    tracing::info!(
        service = %config.service_name,
        environment = ?config.environment,
        "Starting identity service"
    );

    let pool = db::create_pool(&config.database).await?;
    db::run_migrations(&pool).await?;

    if config.auto_sync_authz {
        seed::sync_catalog(&pool).await?;
    }

    let store: Arc<dyn TokenStore> = Arc::new(RedisTokenStore::new(&config.redis).await?);
    let jwt = JwtService::new(&config.jwt);

    let auth = AuthService::new(
        pool.clone(),
        store.clone(),
        jwt.clone(),
        config.jwt.refresh_token_expiry_days,
    );
    let admin = AdminService::new(pool.clone());

    let auth_rate_limiter = if config.rate_limit.enabled {
        create_ip_rate_limiter(
            config.rate_limit.auth_attempts,
            config.rate_limit.auth_window_seconds,
        )
    } else {
        None
    };

    let port = config.port;
    let state = AppState {
        config,
        pool,
        store,
        jwt,
        auth,
        admin,
        auth_rate_limiter,
    };

    let app = build_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!(address = %addr, "Listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!("Service shutdown complete");
    Ok(())
}

fn init_tracing(config: &AppConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level));

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if config.environment == Environment::Prod {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn shutdown_signal() {
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
            tracing::info!("Received SIGINT, starting graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        },
    }
}
