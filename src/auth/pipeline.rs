//! Request-time decision sequence.
//!
//! Gates run in a fixed order and the first failing gate ends evaluation:
//!
//! 1. applicability (header or `api_key` query parameter present)
//! 2. blacklist, whitelist
//! 3. allowed paths
//! 4. credential extraction, header before query
//! 5. lookup by SHA-256 of the presented key
//! 6. enabled, blocked, expired
//! 7. usage window
//! 8. owner exists and is active
//!
//! Network and path checks never touch storage. Every denial after step 5 also
//! counts as a failure for that key, which can block it.

use super::{
    policy::{NetworkPolicy, NetworkVerdict, PathPolicy},
    request::ApiKeyRequest,
};
use crate::{
    clock::Clock,
    config::{Settings, Timeframe, API_KEY_QUERY_PARAM},
    keys::{models::ApiKeyRecord, store::KeyStore},
    notify::{self, NotificationKind, Notifier},
    principal::{Principal, PrincipalDirectory},
    rate_limit::RateLimitCounter,
    vault::CryptoVault,
    Error, Result,
};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

pub const AUDIT_TARGET: &str = "sentinel::audit";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, thiserror::Error)]
#[serde(rename_all = "snake_case")]
pub enum DenyReason {
    #[error("client IP is blacklisted")]
    IpBlacklisted,
    #[error("client IP is not whitelisted")]
    IpNotWhitelisted,
    #[error("path is not allowed")]
    PathNotAllowed,
    #[error("no credential presented")]
    NoCredential,
    #[error("unknown API key")]
    InvalidKey,
    #[error("API key is disabled")]
    KeyDisabled,
    #[error("API key is blocked")]
    KeyBlocked,
    #[error("API key has expired")]
    KeyExpired,
    #[error("rate limit exceeded")]
    RateLimited,
    /// This request pushed the key over the failure limit.
    #[error("API key blocked after repeated failures")]
    Blocked,
    #[error("owner is missing or inactive")]
    OwnerInactive,
    /// A collaborator failed; the request is refused.
    #[error("authentication backend unavailable")]
    Unavailable,
}

impl DenyReason {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::IpBlacklisted => "ip_blacklisted",
            Self::IpNotWhitelisted => "ip_not_whitelisted",
            Self::PathNotAllowed => "path_not_allowed",
            Self::NoCredential => "no_credential",
            Self::InvalidKey => "invalid_key",
            Self::KeyDisabled => "key_disabled",
            Self::KeyBlocked => "key_blocked",
            Self::KeyExpired => "key_expired",
            Self::RateLimited => "rate_limited",
            Self::Blocked => "blocked",
            Self::OwnerInactive => "owner_inactive",
            Self::Unavailable => "unavailable",
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Throttle {
    failure_limit: u32,
    failure_window: Timeframe,
    rate_limit: u32,
    rate_window: Timeframe,
}

pub struct AuthenticationPipeline {
    header: String,
    network: NetworkPolicy,
    paths: PathPolicy,
    throttle: Throttle,
    keys: Arc<dyn KeyStore>,
    principals: Arc<dyn PrincipalDirectory>,
    counter: Arc<RateLimitCounter>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
}

fn unavailable(stage: &'static str, err: &Error) -> DenyReason {
    error!(stage, "Authentication collaborator failed: {err}");
    DenyReason::Unavailable
}

impl AuthenticationPipeline {
    /// # Errors
    /// Returns `Error::InvalidConfig` if the network or path lists do not parse.
    pub fn new(
        settings: &Settings,
        keys: Arc<dyn KeyStore>,
        principals: Arc<dyn PrincipalDirectory>,
        counter: Arc<RateLimitCounter>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        Ok(Self {
            header: settings.custom_auth_header.trim().to_string(),
            network: NetworkPolicy::from_settings(settings)?,
            paths: PathPolicy::new(&settings.allowed_paths)?,
            throttle: Throttle {
                failure_limit: settings.failure_limit,
                failure_window: settings.failure_limit_time,
                rate_limit: settings.max_rate_limit,
                rate_window: settings.max_rate_limit_time,
            },
            keys,
            principals,
            counter,
            notifier,
            clock,
        })
    }

    #[must_use]
    pub fn header_name(&self) -> &str {
        &self.header
    }

    /// False means this method does not apply and other authentication may be tried.
    #[must_use]
    pub fn applies(&self, request: &ApiKeyRequest) -> bool {
        request.has_header(&self.header) || request.query_param(API_KEY_QUERY_PARAM).is_some()
    }

    /// A present header wins over the query parameter, even when it is empty.
    fn credential<'a>(&self, request: &'a ApiKeyRequest) -> Option<&'a str> {
        let value = if request.has_header(&self.header) {
            request.header(&self.header)
        } else {
            request.query_param(API_KEY_QUERY_PARAM).map(str::trim)
        };
        value.filter(|value| !value.is_empty())
    }

    /// Run every gate. Denials are audited; the caller should only expose a
    /// uniform refusal.
    ///
    /// # Errors
    /// Returns the `DenyReason` of the first failing gate.
    pub async fn authenticate(
        &self,
        request: &ApiKeyRequest,
    ) -> std::result::Result<Principal, DenyReason> {
        let client_ip = request
            .client_ip
            .map_or_else(|| "unknown".to_string(), |ip| ip.to_string());
        info!(path = %request.path, %client_ip, "API request received");

        let mut key_id = None;
        match self.evaluate(request, &mut key_id).await {
            Ok(principal) => {
                info!(
                    owner_id = %principal.id,
                    key_id = %key_id.map(|id: Uuid| id.to_string()).unwrap_or_default(),
                    "API key authenticated"
                );
                Ok(principal)
            }
            Err(reason) => {
                warn!(
                    target: AUDIT_TARGET,
                    %client_ip,
                    path = %request.path,
                    reason = reason.as_str(),
                    key_id = %key_id.map(|id: Uuid| id.to_string()).unwrap_or_default(),
                    "API key authentication denied"
                );
                Err(reason)
            }
        }
    }

    async fn evaluate(
        &self,
        request: &ApiKeyRequest,
        key_id: &mut Option<Uuid>,
    ) -> std::result::Result<Principal, DenyReason> {
        match self.network.check(request.client_ip) {
            NetworkVerdict::Allowed => {}
            NetworkVerdict::Blacklisted => return Err(DenyReason::IpBlacklisted),
            NetworkVerdict::NotWhitelisted => return Err(DenyReason::IpNotWhitelisted),
        }

        if !self.paths.allows(&request.path) {
            return Err(DenyReason::PathNotAllowed);
        }

        let raw = self.credential(request).ok_or(DenyReason::NoCredential)?;
        let hashed = CryptoVault::hash(raw);

        let record = self
            .keys
            .find_by_hash(&hashed)
            .await
            .map_err(|err| unavailable("lookup", &err))?
            .ok_or(DenyReason::InvalidKey)?;
        *key_id = Some(record.id);

        let now = self.clock.now();
        if !record.enabled {
            return Err(self.fail(&record, DenyReason::KeyDisabled).await);
        }
        if record.blocked {
            return Err(self.fail(&record, DenyReason::KeyBlocked).await);
        }
        if record.is_expired(now) {
            return Err(self.fail(&record, DenyReason::KeyExpired).await);
        }

        let window = self.throttle.rate_window;
        let limited = self
            .counter
            .record_and_check_usage(record.id, window.as_duration(), self.throttle.rate_limit)
            .await
            .map_err(|err| unavailable("usage", &err))?;
        if limited {
            self.notify_rate_limited(&record, window).await;
            return Err(self.fail(&record, DenyReason::RateLimited).await);
        }

        let principal = self
            .principals
            .load(record.owner_id)
            .await
            .map_err(|err| unavailable("principal", &err))?;
        let Some(principal) = principal.filter(Principal::is_active) else {
            return Err(self.fail(&record, DenyReason::OwnerInactive).await);
        };

        if let Err(err) = self.counter.reset_failure_window(record.id).await {
            error!(key_id = %record.id, "Failed to reset failure window: {err}");
        }

        Ok(principal)
    }

    /// Count a failure for an identified key and return the reason to report.
    async fn fail(&self, record: &ApiKeyRecord, reason: DenyReason) -> DenyReason {
        let blocked = self
            .counter
            .record_failure_and_check_block(
                record.id,
                self.throttle.failure_window.as_duration(),
                self.throttle.failure_limit,
            )
            .await;

        match blocked {
            Ok(true) if !record.blocked => {
                notify::dispatch(
                    self.notifier.as_ref(),
                    NotificationKind::Blocked,
                    record.owner_id,
                    json!({"key_id": record.id, "label": record.label}),
                );
                DenyReason::Blocked
            }
            Ok(_) => reason,
            Err(err) => {
                error!(key_id = %record.id, "Failed to record authentication failure: {err}");
                reason
            }
        }
    }

    async fn notify_rate_limited(&self, record: &ApiKeyRecord, window: Timeframe) {
        match self
            .counter
            .first_rate_limit_in_window(record.id, window.as_duration())
            .await
        {
            Ok(true) => notify::dispatch(
                self.notifier.as_ref(),
                NotificationKind::RateLimited,
                record.owner_id,
                json!({
                    "key_id": record.id,
                    "label": record.label,
                    "window": window.label(),
                }),
            ),
            Ok(false) => {}
            Err(err) => error!(key_id = %record.id, "Failed to track rate limit notice: {err}"),
        }
    }
}
