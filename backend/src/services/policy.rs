//! Policy resolution: turns a (user, provider) pair into the request-scoped
//! snapshot the gateway enforces.
//!
//! Resolution happens once per invocation. The snapshot is passed through the
//! rest of the request and never re-read, so a concurrent admin edit affects
//! the next invocation, not one already in flight.

use chrono::Utc;

use crate::error::GatewayError;
use crate::models::policy::ConnectionLease;
use crate::models::provider::Provider;
use crate::models::user::UserRole;
use crate::store::Store;
use crate::types::UserId;

#[derive(Debug, Clone)]
/// One resolved policy decision, anchored at resolution time.
pub struct ResolvedPolicy {
    pub role: UserRole,
    pub provider: Provider,
    pub allowed: bool,
    pub auto_disconnect: bool,
    pub duration_hours: i32,
    /// Lease a successful action would grant, anchored at resolution time.
    pub lease: ConnectionLease,
}

impl ResolvedPolicy {
    /// The fail-closed snapshot used when no policy row exists. Identical in
    /// effect to an explicit `allowed = false` row; callers cannot tell the
    /// two apart.
    fn denied(role: UserRole, provider: Provider) -> Self {
        ResolvedPolicy {
            role,
            provider,
            allowed: false,
            auto_disconnect: false,
            duration_hours: 0,
            lease: ConnectionLease::Ephemeral,
        }
    }
}

/// Resolves the policy snapshot for one gateway invocation.
///
/// A missing user is an identity failure; a missing policy row denies. The
/// global ephemeral switch is folded into `auto_disconnect` here so the
/// gateway never has to consult settings itself.
pub async fn resolve_policy(
    store: &dyn Store,
    user_id: UserId,
    provider: Provider,
) -> Result<ResolvedPolicy, GatewayError> {
    let user = store
        .get_user(user_id)
        .await?
        .ok_or(GatewayError::Identity)?;

    let Some(policy) = store.get_policy(user.role, provider).await? else {
        return Ok(ResolvedPolicy::denied(user.role, provider));
    };

    let settings = store.get_settings().await?;
    let now = Utc::now();

    Ok(ResolvedPolicy {
        role: user.role,
        provider,
        allowed: policy.allowed,
        auto_disconnect: policy.auto_disconnect || settings.global_ephemeral,
        duration_hours: policy.connection_duration_hours,
        lease: policy.lease(now),
    })
}
