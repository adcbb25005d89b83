//! Typed settings for the API key layer.
//!
//! Settings are read from an optional JSON file; every field has a default so an
//! empty object (or no file at all) yields a working, permissive configuration.

use crate::{Error, Result};
use axum::http::HeaderName;
use chrono::{DateTime, Duration, Months, Utc};
use secrecy::SecretString;
use serde::{Deserialize, Deserializer, Serialize};
use std::{fmt, fs, net::IpAddr, path::Path, str::FromStr};

pub const DEFAULT_AUTH_HEADER: &str = "X-API-KEY";
pub const API_KEY_QUERY_PARAM: &str = "api_key";

/// Lookback windows accepted by the rate limit and failure settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Timeframe {
    #[default]
    #[serde(rename = "1h")]
    OneHour,
    #[serde(rename = "2h")]
    TwoHours,
    #[serde(rename = "3h")]
    ThreeHours,
    #[serde(rename = "6h")]
    SixHours,
    #[serde(rename = "1d")]
    OneDay,
    #[serde(rename = "7d")]
    SevenDays,
    #[serde(rename = "30d")]
    ThirtyDays,
}

impl Timeframe {
    pub const ALL: [Self; 7] = [
        Self::OneHour,
        Self::TwoHours,
        Self::ThreeHours,
        Self::SixHours,
        Self::OneDay,
        Self::SevenDays,
        Self::ThirtyDays,
    ];

    #[must_use]
    pub const fn seconds(self) -> i64 {
        match self {
            Self::OneHour => 3_600,
            Self::TwoHours => 2 * 3_600,
            Self::ThreeHours => 3 * 3_600,
            Self::SixHours => 6 * 3_600,
            Self::OneDay => 86_400,
            Self::SevenDays => 7 * 86_400,
            Self::ThirtyDays => 30 * 86_400,
        }
    }

    #[must_use]
    pub const fn as_duration(self) -> Duration {
        Duration::seconds(self.seconds())
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::OneHour => "1h",
            Self::TwoHours => "2h",
            Self::ThreeHours => "3h",
            Self::SixHours => "6h",
            Self::OneDay => "1d",
            Self::SevenDays => "7d",
            Self::ThirtyDays => "30d",
        }
    }

    /// Human readable name, e.g. "6 hours".
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::OneHour => "1 hour",
            Self::TwoHours => "2 hours",
            Self::ThreeHours => "3 hours",
            Self::SixHours => "6 hours",
            Self::OneDay => "1 day",
            Self::SevenDays => "7 days",
            Self::ThirtyDays => "30 days",
        }
    }
}

impl FromStr for Timeframe {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|timeframe| timeframe.as_str() == value)
            .ok_or_else(|| Error::InvalidConfig(format!("unknown timeframe: {value}")))
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where the master secret is expected to come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EncryptionMode {
    /// External secret if present, otherwise the configuration-stored one.
    #[default]
    Config,
    /// External secret only (`SENTINEL_ENCRYPTION_KEY`).
    Env,
}

impl EncryptionMode {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Config => "config",
            Self::Env => "env",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DurationUnit {
    Hours,
    Days,
    Weeks,
    Months,
    #[default]
    Years,
}

impl DurationUnit {
    /// `from + amount * unit`, or `None` on overflow.
    #[must_use]
    pub fn add_to(self, from: DateTime<Utc>, amount: u32) -> Option<DateTime<Utc>> {
        let amount_i64 = i64::from(amount);
        match self {
            Self::Hours => from.checked_add_signed(Duration::try_hours(amount_i64)?),
            Self::Days => from.checked_add_signed(Duration::try_days(amount_i64)?),
            Self::Weeks => from.checked_add_signed(Duration::try_weeks(amount_i64)?),
            Self::Months => from.checked_add_months(Months::new(amount)),
            Self::Years => from.checked_add_months(Months::new(amount.checked_mul(12)?)),
        }
    }
}

/// Automatic key issuance for principals holding one of `roles`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AutoGenerate {
    pub enabled: bool,
    pub roles: Vec<String>,
    /// Zero means issued keys never expire.
    pub duration: u32,
    pub unit: DurationUnit,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub whitelist_ips: Vec<String>,
    pub blacklist_ips: Vec<String>,
    pub custom_auth_header: String,
    /// Glob patterns (`*` wildcard, anchored). Empty allows every path.
    pub allowed_paths: Vec<String>,
    /// Zero disables failure blocking.
    pub failure_limit: u32,
    pub failure_limit_time: Timeframe,
    /// Zero disables usage rate limiting.
    pub max_rate_limit: u32,
    pub max_rate_limit_time: Timeframe,
    pub encryption_mode: EncryptionMode,
    #[serde(deserialize_with = "deserialize_secret")]
    pub encryption_key: Option<SecretString>,
    /// Take the client IP from `X-Forwarded-For` / `X-Real-IP`.
    pub trust_forwarded_for: bool,
    pub auto_generate: AutoGenerate,
    /// How long expired keys are kept before the cleanup deletes them.
    pub expired_key_retention: Timeframe,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            whitelist_ips: Vec::new(),
            blacklist_ips: Vec::new(),
            custom_auth_header: DEFAULT_AUTH_HEADER.to_string(),
            allowed_paths: Vec::new(),
            failure_limit: 0,
            failure_limit_time: Timeframe::OneHour,
            max_rate_limit: 0,
            max_rate_limit_time: Timeframe::OneHour,
            encryption_mode: EncryptionMode::Config,
            encryption_key: None,
            trust_forwarded_for: false,
            auto_generate: AutoGenerate::default(),
            expired_key_retention: Timeframe::ThirtyDays,
        }
    }
}

impl Settings {
    /// Load and validate settings from a JSON file.
    ///
    /// # Errors
    /// Returns `Error::InvalidConfig` if the file cannot be read, parsed or validated.
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path).map_err(|e| {
            Error::InvalidConfig(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_json(&raw)
    }

    /// # Errors
    /// Returns `Error::InvalidConfig` if the document is malformed or fails validation.
    pub fn from_json(raw: &str) -> Result<Self> {
        let settings: Self =
            serde_json::from_str(raw).map_err(|e| Error::InvalidConfig(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    /// # Errors
    /// Returns `Error::InvalidConfig` naming the first offending option.
    pub fn validate(&self) -> Result<()> {
        if self.custom_auth_header.trim().is_empty() {
            return Err(Error::InvalidConfig(
                "custom_auth_header must not be empty".to_string(),
            ));
        }
        HeaderName::from_bytes(self.custom_auth_header.trim().as_bytes()).map_err(|_| {
            Error::InvalidConfig(format!(
                "custom_auth_header is not a valid header name: {}",
                self.custom_auth_header
            ))
        })?;

        for (option, list) in [
            ("whitelist_ips", &self.whitelist_ips),
            ("blacklist_ips", &self.blacklist_ips),
        ] {
            for ip in list {
                ip.trim().parse::<IpAddr>().map_err(|_| {
                    Error::InvalidConfig(format!("{option} contains an invalid IP: {ip}"))
                })?;
            }
        }

        if self.allowed_paths.iter().any(|p| p.trim().is_empty()) {
            return Err(Error::InvalidConfig(
                "allowed_paths must not contain empty patterns".to_string(),
            ));
        }

        Ok(())
    }
}

fn deserialize_secret<'de, D>(
    deserializer: D,
) -> std::result::Result<Option<SecretString>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?
        .filter(|value| !value.is_empty())
        .map(SecretString::from))
}
