//! Automatic key issuance, called explicitly when a principal is created or logs in.

use super::service::KeyLifecycleService;
use crate::{clock::Clock, config::AutoGenerate, principal::Principal};
use std::sync::Arc;
use tracing::{error, info, warn};

pub struct AutoGenerator {
    service: Arc<KeyLifecycleService>,
    policy: AutoGenerate,
    clock: Arc<dyn Clock>,
}

impl AutoGenerator {
    #[must_use]
    pub fn new(
        service: Arc<KeyLifecycleService>,
        policy: AutoGenerate,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            service,
            policy,
            clock,
        }
    }

    fn eligible(&self, principal: &Principal) -> bool {
        self.policy.enabled && principal.is_active() && principal.has_any_role(&self.policy.roles)
    }

    /// Returns true if a key was issued.
    pub async fn on_principal_created(&self, principal: &Principal) -> bool {
        self.issue_if_missing(principal, "principal_created").await
    }

    /// Returns true if a key was issued.
    pub async fn on_login(&self, principal: &Principal) -> bool {
        self.issue_if_missing(principal, "login").await
    }

    async fn issue_if_missing(&self, principal: &Principal, trigger: &'static str) -> bool {
        if !self.eligible(principal) {
            return false;
        }

        match self.service.has_key(principal.id).await {
            Ok(true) => return false,
            Ok(false) => {}
            Err(err) => {
                error!(owner_id = %principal.id, trigger, "Failed to look up existing key: {err}");
                return false;
            }
        }

        let expires_at = if self.policy.duration == 0 {
            None
        } else {
            let Some(at) = self
                .policy
                .unit
                .add_to(self.clock.now(), self.policy.duration)
            else {
                warn!(owner_id = %principal.id, "Auto-generated key expiry overflows, skipping");
                return false;
            };
            Some(at)
        };

        match self.service.generate(principal.id, expires_at).await {
            Ok(issued) => {
                info!(
                    owner_id = %principal.id,
                    key_id = %issued.record.id,
                    trigger,
                    "Auto-generated API key"
                );
                true
            }
            Err(err) => {
                error!(owner_id = %principal.id, trigger, "Failed to auto-generate API key: {err}");
                false
            }
        }
    }
}
