use crate::config::config::{AppConfig, CounterBackend, DEVELOPMENT_JWT_SECRET, TelemetryBackend};
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use std::path::{Path, PathBuf};

/// 环境变量前缀
pub const ENV_PREFIX: &str = "LAWNBUD_";

/// 配置加载器
pub struct ConfigLoader;

impl ConfigLoader {
    /// 从默认路径加载配置
    ///
    /// 优先级（低到高）：
    /// 1. 内置开发默认值
    /// 2. ./config.toml
    /// 3. LAWNBUD_ 前缀环境变量（层级用 `__` 分隔）
    pub fn load() -> Result<AppConfig, figment::Error> {
        Self::load_from(default_config_path())
    }

    /// 从指定路径加载配置
    pub fn load_from(path: impl AsRef<Path>) -> Result<AppConfig, figment::Error> {
        Self::figment(path.as_ref()).extract()
    }

    fn figment(path: &Path) -> Figment {
        Figment::from(Serialized::defaults(AppConfig::development()))
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// 验证配置
    pub fn validate(config: &AppConfig) -> Result<(), ConfigValidationError> {
        if config.server.port == 0 {
            return Err(ConfigValidationError::InvalidPort);
        }

        let tiers = &config.rate_limit.tiers;
        if tiers.user == 0 || tiers.premium == 0 || tiers.admin == 0 {
            return Err(ConfigValidationError::ZeroTier);
        }
        if !tiers.is_monotonic() {
            return Err(ConfigValidationError::NonMonotonicTiers);
        }

        if config.rate_limit.backend == CounterBackend::Redis
            && config.rate_limit.redis_url.as_deref().unwrap_or("").is_empty()
        {
            return Err(ConfigValidationError::MissingRedisUrl);
        }

        if config.brute_force.threshold == 0 {
            return Err(ConfigValidationError::InvalidThreshold);
        }
        if config.brute_force.window_secs == 0 {
            return Err(ConfigValidationError::InvalidWindow);
        }

        if config.telemetry.backend == TelemetryBackend::Webhook
            && config.telemetry.webhook_url.as_deref().unwrap_or("").is_empty()
        {
            return Err(ConfigValidationError::MissingWebhookUrl);
        }

        if config.identity.jwt_secret.len() < 32 {
            return Err(ConfigValidationError::WeakJwtSecret);
        }
        if config.is_production() && config.identity.jwt_secret == DEVELOPMENT_JWT_SECRET {
            return Err(ConfigValidationError::DevelopmentJwtSecret);
        }

        Ok(())
    }
}

/// 配置验证错误
#[derive(thiserror::Error, Debug, PartialEq)]
pub enum ConfigValidationError {
    #[error("服务端口无效，必须大于 0")]
    InvalidPort,

    #[error("限流配额必须大于 0")]
    ZeroTier,

    #[error("限流配额必须满足 user <= premium <= admin")]
    NonMonotonicTiers,

    #[error("redis 后端需要配置 rate_limit.redis_url")]
    MissingRedisUrl,

    #[error("暴力破解阈值必须大于 0")]
    InvalidThreshold,

    #[error("暴力破解窗口必须大于 0")]
    InvalidWindow,

    #[error("webhook 遥测需要配置 telemetry.webhook_url")]
    MissingWebhookUrl,

    #[error("JWT 密钥长度至少 32 个字符")]
    WeakJwtSecret,

    #[error("生产环境不能使用开发环境的 JWT 密钥")]
    DevelopmentJwtSecret,
}

/// 获取默认配置文件路径
pub fn default_config_path() -> PathBuf {
    std::env::var(format!("{}CONFIG", ENV_PREFIX))
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security::role::Role;
    use figment::Jail;

    #[test]
    fn test_development_config_is_valid() {
        assert_eq!(ConfigLoader::validate(&AppConfig::development()), Ok(()));
    }

    #[test]
    fn test_rejects_inverted_tiers() {
        let mut config = AppConfig::development();
        config.rate_limit.tiers.premium = 50;
        assert_eq!(
            ConfigLoader::validate(&config),
            Err(ConfigValidationError::NonMonotonicTiers)
        );
    }

    #[test]
    fn test_rejects_redis_without_url() {
        let mut config = AppConfig::development();
        config.rate_limit.backend = CounterBackend::Redis;
        assert_eq!(
            ConfigLoader::validate(&config),
            Err(ConfigValidationError::MissingRedisUrl)
        );
    }

    #[test]
    fn test_production_rejects_development_secret() {
        let mut config = AppConfig::development();
        config.environment = "production".into();
        assert_eq!(
            ConfigLoader::validate(&config),
            Err(ConfigValidationError::DevelopmentJwtSecret)
        );

        config.identity.jwt_secret = "a-real-production-secret-of-40-chars!!".into();
        assert_eq!(ConfigLoader::validate(&config), Ok(()));
    }

    #[test]
    fn test_env_selected_production_needs_own_secret() {
        Jail::expect_with(|jail| {
            jail.set_env("LAWNBUD_ENVIRONMENT", "production");

            let config = ConfigLoader::load_from("missing.toml")?;
            assert!(config.is_production());
            assert_eq!(
                ConfigLoader::validate(&config),
                Err(ConfigValidationError::DevelopmentJwtSecret)
            );
            Ok(())
        });
    }

    #[test]
    fn test_toml_and_env_layering() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "lawnbud.toml",
                r#"
                environment = "staging"

                [rate_limit]
                failure_policy = "fail_closed"

                [rate_limit.tiers]
                user = 50

                [identity.role_assignments]
                "user-1" = "admin"
                "#,
            )?;
            jail.set_env("LAWNBUD_BRUTE_FORCE__THRESHOLD", "5");

            let config = ConfigLoader::load_from("lawnbud.toml")?;
            assert_eq!(config.environment, "staging");
            assert_eq!(config.rate_limit.tiers.user, 50);
            assert_eq!(config.rate_limit.tiers.premium, 1000);
            assert_eq!(
                config.rate_limit.failure_policy,
                crate::security::rate_limit::FailurePolicy::FailClosed
            );
            assert_eq!(config.brute_force.threshold, 5);
            assert_eq!(
                config.identity.role_assignments.get("user-1"),
                Some(&Role::Admin)
            );
            Ok(())
        });
    }
}
