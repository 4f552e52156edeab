use anyhow::Context;
use lawnbud_access::api::{self, app_state::AppState};
use lawnbud_access::config::config::{AppConfig, CounterBackend, TelemetryBackend};
use lawnbud_access::config::loader::ConfigLoader;
use lawnbud_access::observability::{
    AppMetrics, HealthCheckResult, ObservabilityState, create_observability_router, init_tracing,
};
use lawnbud_access::security::{
    AccessControl, BruteForceConfig, CounterStore, InMemoryCounterStore, InMemoryFailureStore,
    InMemoryIdentityProvider, JwtVerifier, RateLimiter, RedisCounterStore, RoleResolver,
    SecurityMonitor, TelemetrySink,
    telemetry::{LogTelemetrySink, WebhookTelemetrySink},
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ConfigLoader::load().context("加载配置失败")?;
    let _log_guard = init_tracing(&config.logging);

    ConfigLoader::validate(&config).context("配置校验失败")?;
    info!(
        app = %config.app_name,
        environment = %config.environment,
        "Configuration loaded successfully"
    );

    let metrics = Arc::new(AppMetrics::default());
    let observability_state = Arc::new(ObservabilityState::new(
        env!("CARGO_PKG_VERSION").to_string(),
        metrics.clone(),
    ));

    let counter_store = build_counter_store(&config, &observability_state).await?;
    info!(backend = counter_store.backend_name(), "Counter store initialized");

    let limiter = RateLimiter::new(counter_store, config.rate_limit.tiers)
        .with_policy(config.rate_limit.failure_policy)
        .with_store_timeout(Duration::from_millis(config.rate_limit.store_timeout_ms))
        .with_metrics(metrics.clone());

    let provider = Arc::new(InMemoryIdentityProvider::with_roles(
        config.identity.role_assignments.clone(),
    ));
    let resolver = RoleResolver::new(provider)
        .with_lookup_timeout(Duration::from_millis(config.identity.role_lookup_timeout_ms))
        .with_metrics(metrics.clone());
    info!(
        assignments = config.identity.role_assignments.len(),
        "Role resolver initialized"
    );

    let sink = build_telemetry_sink(&config)?;
    let mut monitor = SecurityMonitor::new(
        Arc::new(InMemoryFailureStore::new()),
        sink,
        BruteForceConfig::from(&config.brute_force),
    )
    .with_metrics(metrics.clone());
    if config.brute_force.detached_telemetry {
        monitor = monitor.with_detached_telemetry();
    }
    let monitor = Arc::new(monitor);
    spawn_tracker_eviction(
        monitor.clone(),
        Duration::from_secs(config.brute_force.eviction_interval_secs.max(1)),
    );
    info!(
        threshold = config.brute_force.threshold,
        window_secs = config.brute_force.window_secs,
        "Security monitor initialized"
    );

    let app_state = AppState::new(
        AccessControl::new(Arc::new(resolver), Arc::new(limiter)),
        monitor,
        JwtVerifier::from_settings(&config.identity),
        metrics,
    );

    let router = create_observability_router(observability_state)
        .merge(api::create_router(app_state))
        .layer(TraceLayer::new_for_http());
    info!("API router created with observability endpoints");

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("无法绑定地址 {}", addr))?;
    info!("Server listening on {}", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

/// 按配置创建计数存储
async fn build_counter_store(
    config: &AppConfig,
    observability: &ObservabilityState,
) -> anyhow::Result<Arc<dyn CounterStore>> {
    let settings = &config.rate_limit;

    match settings.backend {
        CounterBackend::Redis => {
            let url = settings
                .redis_url
                .as_deref()
                .context("rate_limit.redis_url 未配置")?;

            let started = Instant::now();
            let store = RedisCounterStore::connect(url, settings.key_prefix.clone()).await?;
            observability
                .add_health_check(HealthCheckResult {
                    name: "redis".to_string(),
                    healthy: true,
                    message: "connected".to_string(),
                    latency_ms: started.elapsed().as_millis() as u64,
                })
                .await;
            Ok(Arc::new(store))
        }
        CounterBackend::Memory => {
            let store = Arc::new(
                InMemoryCounterStore::new().with_key_prefix(settings.key_prefix.clone()),
            );
            spawn_counter_purge(store.clone());
            Ok(store)
        }
    }
}

/// 按配置创建遥测输出
fn build_telemetry_sink(config: &AppConfig) -> anyhow::Result<Arc<dyn TelemetrySink>> {
    match config.telemetry.backend {
        TelemetryBackend::Log => Ok(Arc::new(LogTelemetrySink)),
        TelemetryBackend::Webhook => {
            let url = config
                .telemetry
                .webhook_url
                .clone()
                .context("telemetry.webhook_url 未配置")?;
            let timeout = Duration::from_millis(config.brute_force.telemetry_timeout_ms);
            Ok(Arc::new(WebhookTelemetrySink::new(url, timeout)?))
        }
    }
}

/// 定期清理过期的登录失败记录
fn spawn_tracker_eviction(monitor: Arc<SecurityMonitor>, every: Duration) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        loop {
            interval.tick().await;
            monitor.evict_expired().await;
        }
    });
}

/// 定期清理上一小时的内存计数器
fn spawn_counter_purge(store: Arc<InMemoryCounterStore>) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(300));
        loop {
            interval.tick().await;
            let purged = store.purge_stale();
            if purged > 0 {
                info!(purged, "Purged stale rate limit counters");
            }
        }
    });
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
