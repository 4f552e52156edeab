//! 可观测性模块
//!
//! 提供访问控制指标、结构化日志和健康检查。

use axum::{Json, Router, response::IntoResponse, routing::get};

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Mutex;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::config::LoggingConfig;

// ===== Simple Metrics =====

/// 访问控制指标
#[derive(Debug, Default)]
pub struct AppMetrics {
    pub http_requests_total: AtomicU64,
    pub rate_limit_checks_total: AtomicU64,
    pub rate_limit_denied_total: AtomicU64,
    pub rate_limit_store_failures_total: AtomicU64,
    pub role_lookup_failures_total: AtomicU64,
    pub login_failures_total: AtomicU64,
    pub brute_force_events_total: AtomicU64,
    pub telemetry_failures_total: AtomicU64,
}

impl AppMetrics {
    /// 记录 HTTP 请求
    pub fn record_http_request(&self) {
        self.http_requests_total.fetch_add(1, Ordering::Relaxed);
    }

    /// 记录限流检查结果
    pub fn record_rate_limit_check(&self, allowed: bool) {
        self.rate_limit_checks_total.fetch_add(1, Ordering::Relaxed);
        if !allowed {
            self.rate_limit_denied_total.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// 记录计数存储故障
    pub fn record_store_failure(&self) {
        self.rate_limit_store_failures_total
            .fetch_add(1, Ordering::Relaxed);
    }

    /// 记录角色查询失败
    pub fn record_role_lookup_failure(&self) {
        self.role_lookup_failures_total
            .fetch_add(1, Ordering::Relaxed);
    }

    /// 记录登录失败
    pub fn record_login_failure(&self) {
        self.login_failures_total.fetch_add(1, Ordering::Relaxed);
    }

    /// 记录暴力破解事件
    pub fn record_brute_force_event(&self) {
        self.brute_force_events_total.fetch_add(1, Ordering::Relaxed);
    }

    /// 记录遥测写入失败
    pub fn record_telemetry_failure(&self) {
        self.telemetry_failures_total.fetch_add(1, Ordering::Relaxed);
    }

    /// 生成 Prometheus 格式指标
    pub fn gather(&self) -> String {
        let counters: [(&str, &str, &AtomicU64); 8] = [
            (
                "http_requests_total",
                "Total HTTP requests",
                &self.http_requests_total,
            ),
            (
                "rate_limit_checks_total",
                "Rate limit checks performed",
                &self.rate_limit_checks_total,
            ),
            (
                "rate_limit_denied_total",
                "Rate limit checks that denied the request",
                &self.rate_limit_denied_total,
            ),
            (
                "rate_limit_store_failures_total",
                "Counter store failures handled by the failure policy",
                &self.rate_limit_store_failures_total,
            ),
            (
                "role_lookup_failures_total",
                "Role lookups that fell back to the lowest role",
                &self.role_lookup_failures_total,
            ),
            (
                "login_failures_total",
                "Failed logins reported to the security monitor",
                &self.login_failures_total,
            ),
            (
                "brute_force_events_total",
                "Brute force security events emitted",
                &self.brute_force_events_total,
            ),
            (
                "telemetry_failures_total",
                "Telemetry appends that failed and were dropped",
                &self.telemetry_failures_total,
            ),
        ];

        let mut out = String::new();
        for (name, help, value) in counters {
            out.push_str(&format!(
                "# HELP {name} {help}\n# TYPE {name} counter\n{name} {}\n",
                value.load(Ordering::Relaxed)
            ));
        }
        out
    }
}

// ===== Health Check =====

/// 健康检查状态
#[derive(Debug, Serialize)]
pub struct HealthStatus {
    pub status: String,
    pub timestamp: String,
    pub version: String,
    pub uptime_seconds: f64,
    pub checks: Vec<HealthCheck>,
}

/// 单个健康检查项
#[derive(Debug, Serialize)]
pub struct HealthCheck {
    pub name: String,
    pub status: String,
    pub message: Option<String>,
    pub latency_ms: Option<u64>,
}

/// 健康检查结果
#[derive(Clone)]
pub struct HealthCheckResult {
    pub name: String,
    pub healthy: bool,
    pub message: String,
    pub latency_ms: u64,
}

/// 可观测性状态
#[derive(Clone)]
pub struct ObservabilityState {
    pub metrics: Arc<AppMetrics>,
    pub health_checks: Arc<Mutex<Vec<HealthCheckResult>>>,
    pub start_time: DateTime<Utc>,
    pub version: String,
}

impl ObservabilityState {
    pub fn new(version: String, metrics: Arc<AppMetrics>) -> Self {
        Self {
            metrics,
            health_checks: Arc::new(Mutex::new(Vec::new())),
            start_time: Utc::now(),
            version,
        }
    }

    /// 添加健康检查结果
    pub async fn add_health_check(&self, result: HealthCheckResult) {
        let mut checks = self.health_checks.lock().await;
        checks.retain(|c| c.name != result.name);
        checks.push(result);
        if checks.len() > 10 {
            checks.remove(0);
        }
    }

    /// 获取应用正常运行时间
    pub fn uptime_seconds(&self) -> f64 {
        (Utc::now() - self.start_time).num_seconds() as f64
    }
}

// ===== Health Check Handlers =====

/// 获取完整健康状态
pub async fn health_check(
    state: axum::extract::State<Arc<ObservabilityState>>,
) -> impl IntoResponse {
    let checks = state.health_checks.lock().await;
    let all_healthy = checks.iter().all(|c| c.healthy);

    let health_status = HealthStatus {
        status: if all_healthy {
            "healthy".to_string()
        } else {
            "degraded".to_string()
        },
        timestamp: Utc::now().to_rfc3339(),
        version: state.version.clone(),
        uptime_seconds: state.uptime_seconds(),
        checks: checks
            .iter()
            .map(|c| HealthCheck {
                name: c.name.clone(),
                status: if c.healthy {
                    "healthy".to_string()
                } else {
                    "unhealthy".to_string()
                },
                message: Some(c.message.clone()),
                latency_ms: Some(c.latency_ms),
            })
            .collect(),
    };

    // 依赖故障时核心仍按降级策略工作，因此保持 200
    (axum::http::StatusCode::OK, Json(health_status))
}

/// 简单存活检查
pub async fn liveness() -> impl IntoResponse {
    "OK"
}

/// 就绪检查
pub async fn readiness(state: axum::extract::State<Arc<ObservabilityState>>) -> impl IntoResponse {
    let checks = state.health_checks.lock().await;
    let all_healthy = checks.iter().all(|c| c.healthy);

    if all_healthy {
        (axum::http::StatusCode::OK, "Ready")
    } else {
        (axum::http::StatusCode::SERVICE_UNAVAILABLE, "Not Ready")
    }
}

/// Prometheus 指标端点
pub async fn metrics(state: axum::extract::State<Arc<ObservabilityState>>) -> impl IntoResponse {
    let output = state.metrics.gather();
    (axum::http::StatusCode::OK, output)
}

/// 版本信息端点
pub async fn version(state: axum::extract::State<Arc<ObservabilityState>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "version": state.version,
        "uptime_seconds": state.uptime_seconds(),
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

/// 创建可观测性路由
pub fn create_observability_router(state: Arc<ObservabilityState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/health/live", get(liveness))
        .route("/health/ready", get(readiness))
        .route("/metrics", get(metrics))
        .route("/version", get(version))
        .with_state(state)
}

// ===== Structured Logging =====

/// 初始化结构化日志
///
/// `RUST_LOG` 优先于配置中的级别。配置了 `log_dir` 时额外按天滚动写入文件，
/// 返回的 guard 必须在进程生命周期内持有。
pub fn init_tracing(config: &LoggingConfig) -> Option<WorkerGuard> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.as_str()));

    let (file_writer, guard) = match &config.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "lawnbud-access.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(writer), Some(guard))
        }
        None => (None, None),
    };

    if config.structured {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().json().with_target(true))
            .with(file_writer.map(|w| fmt::layer().json().with_ansi(false).with_writer(w)))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_target(true).with_line_number(true))
            .with(file_writer.map(|w| fmt::layer().json().with_ansi(false).with_writer(w)))
            .init();
    }

    guard
}

// ===== Request Metrics Middleware =====

/// 记录请求指标的中间件
pub async fn metrics_middleware(
    axum::extract::State(metrics): axum::extract::State<Arc<AppMetrics>>,
    req: axum::extract::Request,
    next: axum::middleware::Next,
) -> axum::response::Response {
    metrics.record_http_request();
    next.run(req).await
}
