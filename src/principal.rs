use crate::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// The account an API key authenticates as.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Principal {
    pub id: Uuid,
    pub display_name: String,
    pub active: bool,
    pub roles: Vec<String>,
}

impl Principal {
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active
    }

    #[must_use]
    pub fn has_any_role(&self, roles: &[String]) -> bool {
        self.roles.iter().any(|role| roles.contains(role))
    }
}

#[async_trait]
pub trait PrincipalDirectory: Send + Sync {
    async fn load(&self, owner_id: Uuid) -> Result<Option<Principal>>;
}
