//! Profile store contract.

use async_trait::async_trait;

use crate::auth::role::Role;
use crate::errors::Result;
use crate::types::UserId;

/// Contract with the profile store, which persists one role per user.
///
/// The role is written exactly once, by the signup flow. Nothing else in
/// the system mutates it.
#[async_trait]
pub trait ProfileApi: Send + Sync {
    /// Look up the role recorded for a user. `Ok(None)` means no profile
    /// record exists; errors mean the store could not be consulted. Callers
    /// treat both the same way for authorization purposes, as no role.
    async fn role_of(&self, user_id: UserId) -> Result<Option<Role>>;

    /// Record the role chosen at signup. Fails if the user already has a
    /// profile record; there is no role-change flow.
    async fn assign_role(&self, user_id: UserId, role: Role) -> Result<()>;
}
