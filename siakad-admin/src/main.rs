use std::net::SocketAddr;
use std::sync::Arc;

use siakad_admin::config::AppConfig;
use siakad_admin::routes::rate_limit::LoginRateLimit;
use siakad_admin::services::rate_limiter::{
    MemoryRateLimiter, RateLimitStore, RedisRateLimiter, SlidingWindow,
};
use siakad_admin::{build_router, AppState};
use siakad_shared::clients::db::create_pool;
use siakad_shared::clients::redis::RedisClient;
use siakad_shared::types::session::SESSION_SECRET_ENV;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    siakad_shared::middleware::init_tracing("siakad-admin");

    let config = AppConfig::load()?;
    let port = config.port;

    // Session extractors read the secret from the environment.
    std::env::set_var(SESSION_SECRET_ENV, &config.session_secret);

    let db = create_pool(&config.database_url, config.db_pool_size)?;

    let policy = SlidingWindow::new(config.login_rate_limit, config.login_rate_window_secs);
    let store: Arc<dyn RateLimitStore> = match &config.redis_url {
        Some(url) => {
            let redis = RedisClient::connect(url).await?;
            redis.ping().await?;
            Arc::new(RedisRateLimiter::new(redis, policy, "siakad:ratelimit"))
        }
        None => {
            tracing::warn!("SIAKAD__REDIS_URL not set, login rate limit is per process");
            Arc::new(MemoryRateLimiter::new(policy))
        }
    };

    let login_limiter = LoginRateLimit::new(store, config.trust_proxy_headers);
    let metrics_handle = siakad_shared::middleware::init_metrics()?;

    let state = Arc::new(AppState {
        db,
        config,
        login_limiter,
        metrics_handle: Some(metrics_handle),
    });

    let app = build_router(state)?;

    let addr = format!("0.0.0.0:{port}");
    tracing::info!(addr = %addr, "siakad-admin starting");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;

    Ok(())
}
