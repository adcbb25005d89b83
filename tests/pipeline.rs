//! End-to-end behavior of the authentication gates with in-memory collaborators.

mod common;

use anyhow::{Context, Result};
use chrono::Duration;
use common::{request_from, Harness};
use secrecy::ExposeSecret;
use sentinel::{
    auth::{ApiKeyRequest, DenyReason},
    clock::Clock,
    config::{Settings, Timeframe},
    keys::KeyStore,
    notify::NotificationKind,
    vault::CryptoVault,
};

const CLIENT: [u8; 4] = [203, 0, 113, 7];
const PATH: &str = "/api/sentinel-key";

async fn key_id(harness: &Harness, raw: &str) -> Result<uuid::Uuid> {
    let record = harness
        .keys
        .find_by_hash(&CryptoVault::hash(raw))
        .await?
        .context("record for raw key")?;
    Ok(record.id)
}

#[tokio::test]
async fn requests_without_credentials_do_not_apply() -> Result<()> {
    let harness = Harness::new(&Settings::default())?;
    let bare = ApiKeyRequest::new(PATH).with_client_ip([127, 0, 0, 1].into());
    assert!(!harness.pipeline.applies(&bare));
    assert!(harness
        .pipeline
        .applies(&ApiKeyRequest::new(PATH).with_query("api_key=abc")));
    Ok(())
}

#[tokio::test]
async fn blacklisted_ip_is_denied_even_with_a_valid_key() -> Result<()> {
    let settings = Settings {
        blacklist_ips: vec!["1.2.3.4".to_string()],
        ..Settings::default()
    };
    let harness = Harness::new(&settings)?;
    let (_, key) = harness.enroll("alice").await?;

    let denied = harness
        .pipeline
        .authenticate(&request_from([1, 2, 3, 4], PATH, &key))
        .await;
    assert_eq!(denied, Err(DenyReason::IpBlacklisted));

    let allowed = harness
        .pipeline
        .authenticate(&request_from(CLIENT, PATH, &key))
        .await;
    assert_eq!(allowed.map(|p| p.display_name), Ok("alice".to_string()));
    Ok(())
}

#[tokio::test]
async fn whitelist_rejects_every_other_ip() -> Result<()> {
    let settings = Settings {
        whitelist_ips: vec!["9.9.9.9".to_string()],
        ..Settings::default()
    };
    let harness = Harness::new(&settings)?;
    let (owner, key) = harness.enroll("bob").await?;

    assert_eq!(
        harness
            .pipeline
            .authenticate(&request_from(CLIENT, PATH, &key))
            .await,
        Err(DenyReason::IpNotWhitelisted)
    );
    assert_eq!(
        harness
            .pipeline
            .authenticate(&request_from([9, 9, 9, 9], PATH, &key))
            .await
            .map(|p| p.id),
        Ok(owner)
    );
    Ok(())
}

#[tokio::test]
async fn allowed_paths_are_glob_matched() -> Result<()> {
    let settings = Settings {
        allowed_paths: vec!["/api/*".to_string()],
        ..Settings::default()
    };
    let harness = Harness::new(&settings)?;
    let (owner, key) = harness.enroll("carol").await?;

    assert_eq!(
        harness
            .pipeline
            .authenticate(&request_from(CLIENT, "/other", &key))
            .await,
        Err(DenyReason::PathNotAllowed)
    );
    assert_eq!(
        harness
            .pipeline
            .authenticate(&request_from(CLIENT, "/api/widgets", &key))
            .await
            .map(|p| p.id),
        Ok(owner)
    );
    Ok(())
}

#[tokio::test]
async fn failure_limit_blocks_the_key() -> Result<()> {
    let settings = Settings {
        failure_limit: 3,
        failure_limit_time: Timeframe::OneHour,
        ..Settings::default()
    };
    let harness = Harness::new(&settings)?;
    let (_, key) = harness.enroll("dave").await?;
    let id = key_id(&harness, &key).await?;
    let request = request_from(CLIENT, PATH, &key);

    harness.service.set_enabled(id, false).await?;
    let mut reasons = Vec::new();
    for _ in 0..3 {
        if let Err(reason) = harness.pipeline.authenticate(&request).await {
            reasons.push(reason);
        }
    }
    assert_eq!(
        reasons,
        vec![
            DenyReason::KeyDisabled,
            DenyReason::KeyDisabled,
            DenyReason::Blocked
        ]
    );
    assert!(harness.service.status_of(id).await?);
    assert_eq!(harness.outbox.count(NotificationKind::Blocked), 1);

    // Re-enabling does not lift the block.
    harness.service.set_enabled(id, true).await?;
    assert_eq!(
        harness.pipeline.authenticate(&request).await,
        Err(DenyReason::KeyBlocked)
    );

    // Unblocking restores access.
    assert!(harness.service.toggle_block(id).await?);
    assert!(harness.pipeline.authenticate(&request).await.is_ok());
    Ok(())
}

#[tokio::test]
async fn success_resets_the_failure_window() -> Result<()> {
    let settings = Settings {
        failure_limit: 3,
        ..Settings::default()
    };
    let harness = Harness::new(&settings)?;
    let (_, key) = harness.enroll("erin").await?;
    let id = key_id(&harness, &key).await?;
    let request = request_from(CLIENT, PATH, &key);

    for _ in 0..2 {
        harness.service.set_enabled(id, false).await?;
        for _ in 0..2 {
            assert_eq!(
                harness.pipeline.authenticate(&request).await,
                Err(DenyReason::KeyDisabled)
            );
        }
        harness.service.set_enabled(id, true).await?;
        assert!(harness.pipeline.authenticate(&request).await.is_ok());
    }

    assert!(!harness.service.status_of(id).await?);
    assert_eq!(harness.outbox.count(NotificationKind::Blocked), 0);
    Ok(())
}

#[tokio::test]
async fn sixth_request_in_the_window_is_rate_limited() -> Result<()> {
    let settings = Settings {
        max_rate_limit: 5,
        max_rate_limit_time: Timeframe::OneHour,
        ..Settings::default()
    };
    let harness = Harness::new(&settings)?;
    let (_, key) = harness.enroll("frank").await?;
    let request = request_from(CLIENT, PATH, &key);

    for attempt in 1..=5 {
        assert!(
            harness.pipeline.authenticate(&request).await.is_ok(),
            "attempt {attempt} should pass"
        );
        harness.clock.advance(Duration::minutes(1));
    }
    assert_eq!(
        harness.pipeline.authenticate(&request).await,
        Err(DenyReason::RateLimited)
    );
    assert_eq!(
        harness.pipeline.authenticate(&request).await,
        Err(DenyReason::RateLimited)
    );
    assert_eq!(harness.outbox.count(NotificationKind::RateLimited), 1);

    // The oldest timestamps leave the trailing window.
    harness.clock.advance(Duration::hours(1));
    assert!(harness.pipeline.authenticate(&request).await.is_ok());
    Ok(())
}

#[tokio::test]
async fn expired_key_is_denied() -> Result<()> {
    let harness = Harness::new(&Settings::default())?;
    let (owner, _) = harness.enroll("grace").await?;
    let expires_at = harness.clock.now() + Duration::hours(2);
    let issued = harness.service.generate(owner, Some(expires_at)).await?;
    let key = issued.raw_key.expose_secret().to_string();
    let request = request_from(CLIENT, PATH, &key);

    assert!(harness.pipeline.authenticate(&request).await.is_ok());
    harness.clock.advance(Duration::hours(2));
    assert_eq!(
        harness.pipeline.authenticate(&request).await,
        Err(DenyReason::KeyExpired)
    );
    Ok(())
}

#[tokio::test]
async fn revoked_key_no_longer_authenticates() -> Result<()> {
    let harness = Harness::new(&Settings::default())?;
    let (owner, key) = harness.enroll("heidi").await?;
    assert!(harness.service.revoke(owner).await?);
    assert_eq!(
        harness
            .pipeline
            .authenticate(&request_from(CLIENT, PATH, &key))
            .await,
        Err(DenyReason::InvalidKey)
    );
    Ok(())
}
