//! Access gate for privileged operations: resolve the role, check it against
//! the required role, then consume quota.

use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

use crate::error::{AppError, Result};
use crate::security::identity::Identity;
use crate::security::rate_limit::{RateLimitDecision, RateLimitInfo, RateLimiter};
use crate::security::resolver::{RoleResolution, RoleResolver};
use crate::security::role::{Role, has_permission};

/// Permission granted for one privileged call
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccessGrant {
    pub role: Role,
    pub remaining: u64,
    /// Set when the role defaulted because lookup failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role_error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AccessControl {
    resolver: Arc<RoleResolver>,
    limiter: Arc<RateLimiter>,
}

impl AccessControl {
    pub fn new(resolver: Arc<RoleResolver>, limiter: Arc<RateLimiter>) -> Self {
        Self { resolver, limiter }
    }

    pub fn resolver(&self) -> &Arc<RoleResolver> {
        &self.resolver
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    pub async fn resolve_role(&self, identity: Option<&Identity>) -> RoleResolution {
        self.resolver.resolve_role(identity).await
    }

    /// Gate a side-effecting call on `endpoint`.
    ///
    /// Role insufficiency is checked before quota so a forbidden call does
    /// not consume quota.
    pub async fn authorize(
        &self,
        identity: Option<&Identity>,
        endpoint: &str,
        required_role: Role,
    ) -> Result<AccessGrant> {
        let resolution = self.resolver.resolve_role(identity).await;

        if !has_permission(resolution.role, required_role) {
            debug!(
                endpoint,
                role = %resolution.role,
                required = %required_role,
                "Insufficient role"
            );
            return Err(AppError::Authorization(format!(
                "{} requires the {} role",
                endpoint, required_role
            )));
        }

        let RateLimitDecision { remaining, .. } = self
            .limiter
            .enforce_limit(identity, endpoint, resolution.role)
            .await?;

        Ok(AccessGrant {
            role: resolution.role,
            remaining,
            role_error: resolution.error,
        })
    }

    /// Quota check using the server-side role
    pub async fn check_limit(
        &self,
        identity: Option<&Identity>,
        endpoint: &str,
    ) -> (RoleResolution, RateLimitDecision) {
        let resolution = self.resolver.resolve_role(identity).await;
        let decision = self
            .limiter
            .check_limit(identity, endpoint, resolution.role)
            .await;
        (resolution, decision)
    }

    pub async fn limit_info(&self, identity: Option<&Identity>, endpoint: &str) -> RateLimitInfo {
        let resolution = self.resolver.resolve_role(identity).await;
        self.limiter
            .get_limit_info(identity, endpoint, resolution.role)
            .await
    }
}
