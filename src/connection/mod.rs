//! Connection profiles, credentials and the connection check.

pub mod profile;
pub mod secret;

pub use profile::{ConnectionProfile, ProfileRecord};
pub use secret::{SealingKey, Secret};

use crate::error::ConnectionError;
use crate::orchestrator::api::OrchestrationApi;
use tracing::info;

/// Check a profile and try to authenticate with it.
///
/// All missing fields are reported at once, so a settings form can mark
/// every one of them.
pub async fn test_connection(
    api: &dyn OrchestrationApi,
    profile: &ConnectionProfile,
) -> Result<(), ConnectionError> {
    let missing = profile.missing_fields();
    if !missing.is_empty() {
        return Err(ConnectionError::Incomplete { fields: missing });
    }
    profile.validate()?;
    api.check_connection().await?;
    info!(url = %profile.url, project = %profile.project, user = %profile.user, "connection ok");
    Ok(())
}
