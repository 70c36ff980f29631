use std::time::Duration;

use crate::error::GatewayError;
use crate::models::provider::Provider;

pub mod gateway;
pub mod oauth;
pub mod policy;

pub use gateway::{ActionOutcome, ActionRequest, Gateway};
pub use oauth::{AuthorizationOutcome, AuthorizationStart, OauthMediator};
pub use policy::{resolve_policy, ResolvedPolicy};

/// Bounds every provider call. An unresponsive provider becomes a
/// gateway-assigned 504 instead of an indefinite hang.
pub(crate) async fn with_provider_timeout<T, F>(
    provider: Provider,
    limit: Duration,
    call: F,
) -> Result<T, GatewayError>
where
    F: std::future::Future<Output = Result<T, GatewayError>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(GatewayError::Provider {
            provider,
            status: 504,
            body: format!("no response within {}s", limit.as_secs()),
        }),
    }
}
