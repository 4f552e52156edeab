use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

use crate::security::rate_limit::{FailurePolicy, RateLimitTiers};
use crate::security::role::Role;

/// 服务器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// 服务地址
    pub host: String,
    /// 服务端口
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8080,
        }
    }
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// 日志级别
    pub level: String,
    /// 结构化日志格式
    pub structured: bool,
    /// 日志文件目录（按天滚动）
    pub log_dir: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            structured: false,
            log_dir: None,
        }
    }
}

/// 计数存储后端
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CounterBackend {
    #[default]
    Memory,
    Redis,
}

/// 限流配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitSettings {
    /// 各角色每小时配额
    pub tiers: RateLimitTiers,
    /// 计数存储故障时的策略
    pub failure_policy: FailurePolicy,
    /// 计数存储调用超时（毫秒）
    pub store_timeout_ms: u64,
    /// 计数存储后端
    pub backend: CounterBackend,
    /// Redis 地址
    pub redis_url: Option<String>,
    /// 计数键前缀
    pub key_prefix: String,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            tiers: RateLimitTiers::default(),
            failure_policy: FailurePolicy::FailOpen,
            store_timeout_ms: 2000,
            backend: CounterBackend::Memory,
            redis_url: None,
            key_prefix: "rate_limit".into(),
        }
    }
}

/// 暴力破解检测配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BruteForceSettings {
    /// 窗口内触发告警的失败次数
    pub threshold: u32,
    /// 滚动窗口长度（秒）
    pub window_secs: u64,
    /// 跟踪记录保留时间（秒）
    pub tracker_ttl_secs: u64,
    /// 过期清理间隔（秒）
    pub eviction_interval_secs: u64,
    /// 错误信息最大长度
    pub error_max_len: usize,
    /// 遥测写入超时（毫秒）
    pub telemetry_timeout_ms: u64,
    /// 遥测在后台任务中发送，不阻塞请求
    pub detached_telemetry: bool,
}

impl Default for BruteForceSettings {
    fn default() -> Self {
        Self {
            threshold: 3,
            window_secs: 300,
            tracker_ttl_secs: 600,
            eviction_interval_secs: 60,
            error_max_len: 100,
            telemetry_timeout_ms: 2000,
            detached_telemetry: true,
        }
    }
}

/// 身份配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentitySettings {
    /// JWT 密钥
    pub jwt_secret: String,
    /// JWT 签发者
    pub jwt_issuer: String,
    /// JWT 受众
    pub jwt_audience: String,
    /// JWT 有效期（秒，仅用于开发环境签发）
    pub jwt_expiry_seconds: u64,
    /// 角色查询超时（毫秒）
    pub role_lookup_timeout_ms: u64,
    /// 用户角色表 user_id -> role
    pub role_assignments: HashMap<String, Role>,
}

impl Default for IdentitySettings {
    fn default() -> Self {
        Self {
            jwt_secret: String::new(),
            jwt_issuer: "lawnbud".into(),
            jwt_audience: "lawnbud-api".into(),
            jwt_expiry_seconds: 3600,
            role_lookup_timeout_ms: 2000,
            role_assignments: HashMap::new(),
        }
    }
}

/// 遥测后端
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TelemetryBackend {
    #[default]
    Log,
    Webhook,
}

/// 遥测配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetrySettings {
    pub backend: TelemetryBackend,
    /// Webhook 地址
    pub webhook_url: Option<String>,
}

/// 应用配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// 服务器配置
    pub server: ServerConfig,
    /// 日志配置
    pub logging: LoggingConfig,
    /// 限流配置
    pub rate_limit: RateLimitSettings,
    /// 暴力破解检测配置
    pub brute_force: BruteForceSettings,
    /// 身份配置
    pub identity: IdentitySettings,
    /// 遥测配置
    pub telemetry: TelemetrySettings,
    /// 应用名称
    pub app_name: String,
    /// 环境
    pub environment: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::development()
    }
}

/// 开发环境内置 JWT 密钥，生产环境禁止使用
pub const DEVELOPMENT_JWT_SECRET: &str = "dev-secret-change-in-production-min-32-chars";

impl AppConfig {
    /// 是否为生产环境
    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }

    /// 创建开发环境配置
    pub fn development() -> Self {
        Self {
            server: ServerConfig::default(),
            logging: LoggingConfig {
                level: "debug".into(),
                structured: false,
                log_dir: None,
            },
            rate_limit: RateLimitSettings::default(),
            brute_force: BruteForceSettings::default(),
            identity: IdentitySettings {
                jwt_secret: DEVELOPMENT_JWT_SECRET.into(),
                ..IdentitySettings::default()
            },
            telemetry: TelemetrySettings::default(),
            app_name: "lawnbud-access".into(),
            environment: "development".into(),
        }
    }

    /// 创建生产环境配置
    pub fn production() -> Self {
        let mut config = Self::development();
        config.environment = "production".into();
        config.logging.level = "info".into();
        config.logging.structured = true;
        config.logging.log_dir = Some(PathBuf::from("./logs"));
        config.rate_limit.backend = CounterBackend::Redis;
        config.rate_limit.redis_url = Some("redis://localhost:6379".into());
        config.identity.jwt_secret = String::new();
        config
    }
}
