use chrono::{DateTime, Utc};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use sqlx::{postgres::PgRow, FromRow, Row};
use utoipa::ToSchema;
use uuid::Uuid;

/// One API key per owner. Only derived values of the raw key are stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ApiKeyRecord {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub label: String,
    /// SHA-256 hex of the raw key.
    #[serde(skip_serializing)]
    pub hashed_key: String,
    /// `base64(IV || ciphertext)` under the master secret.
    #[serde(skip_serializing)]
    pub encrypted_payload: String,
    pub enabled: bool,
    pub blocked: bool,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ApiKeyRecord {
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires_at| expires_at <= now)
    }
}

impl<'r> FromRow<'r, PgRow> for ApiKeyRecord {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            owner_id: row.try_get("owner_id")?,
            label: row.try_get("label")?,
            hashed_key: row.try_get("hashed_key")?,
            encrypted_payload: row.try_get("encrypted_payload")?,
            enabled: row.try_get("enabled")?,
            blocked: row.try_get("blocked")?,
            expires_at: row.try_get("expires_at")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

/// Result of issuing a key: the stored record plus the raw key, which is only
/// available at this point (or later through `reveal`).
#[derive(Debug)]
pub struct IssuedKey {
    pub record: ApiKeyRecord,
    pub raw_key: SecretString,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn record(expires_at: Option<DateTime<Utc>>) -> ApiKeyRecord {
        let now = Utc::now();
        ApiKeyRecord {
            id: Uuid::new_v4(),
            owner_id: Uuid::new_v4(),
            label: "Key-ABCDEF".to_string(),
            hashed_key: "hash".to_string(),
            encrypted_payload: "payload".to_string(),
            enabled: true,
            blocked: false,
            expires_at,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn expiry_is_absolute() {
        let now = Utc::now();
        assert!(!record(None).is_expired(now));
        assert!(!record(Some(now + Duration::seconds(1))).is_expired(now));
        assert!(record(Some(now)).is_expired(now));
        assert!(record(Some(now - Duration::days(1))).is_expired(now));
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn key_material_is_not_serialized() {
        let json = serde_json::to_value(record(None)).unwrap();
        assert!(json.get("hashed_key").is_none());
        assert!(json.get("encrypted_payload").is_none());
        assert_eq!(json["label"], "Key-ABCDEF");
    }
}
