//! Scholaris - multi-tenant school management server

use anyhow::Result;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use scholaris::{
    api::{self, AppState},
    cache::create_cache,
    config::Config,
    db::{
        self,
        migrations,
        repositories::{SqlxSchoolRepository, SqlxSessionRepository, SqlxSuperAdminRepository},
    },
    services::{AuthService, LoginRateLimiter, PlatformService},
    site::SiteRenderer,
    tenancy::TenantRouter,
};

/// How often expired sessions and stale rate-limit entries are purged
const CLEANUP_INTERVAL: Duration = Duration::from_secs(300);

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "scholaris=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Scholaris...");

    let config_path = std::env::var("SCHOLARIS_CONFIG").unwrap_or_else(|_| "config.yml".to_string());
    let config = Config::load_with_env(Path::new(&config_path))?;
    tracing::info!("Configuration loaded from {}", config_path);

    // Platform database
    let platform = db::create_pool(&config.database).await?;
    tracing::info!("Platform database connected: {:?}", config.database.driver);

    let applied = migrations::run_migrations(&platform, migrations::PLATFORM_MIGRATIONS).await?;
    tracing::info!("Platform migrations completed ({} applied)", applied);

    let cache = create_cache(&config.cache);
    let router = Arc::new(TenantRouter::new(platform.clone(), &config.tenancy));
    let limiter = Arc::new(LoginRateLimiter::new());
    let sessions = SqlxSessionRepository::boxed(platform.clone());
    let super_admins = SqlxSuperAdminRepository::boxed(platform.clone());

    let auth = Arc::new(AuthService::new(
        router.clone(),
        super_admins.clone(),
        sessions.clone(),
        limiter.clone(),
        config.auth.session_days,
    ));
    let platform_service = Arc::new(PlatformService::new(
        SqlxSchoolRepository::boxed(platform.clone()),
        super_admins,
        sessions,
        router.clone(),
    ));

    if auth.bootstrap(&config.auth).await? {
        tracing::info!("Bootstrap super-admin created");
    }

    let site = Arc::new(SiteRenderer::new()?);
    tracing::info!("Site templates loaded: {}", site.template_names().len());

    let state = AppState {
        platform,
        router,
        auth: auth.clone(),
        platform_service,
        cache,
        site,
        session_days: config.auth.session_days.max(1),
    };

    {
        let auth = auth.clone();
        let limiter = limiter.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(CLEANUP_INTERVAL);
            loop {
                interval.tick().await;
                match auth.cleanup_expired_sessions().await {
                    Ok(0) => {}
                    Ok(removed) => tracing::debug!("Removed {} expired sessions", removed),
                    Err(e) => tracing::warn!("Session cleanup failed: {}", e),
                }
                limiter.cleanup().await;
            }
        });
    }

    let app = api::build_router(state, &config.server.cors_origin);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on http://{}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
