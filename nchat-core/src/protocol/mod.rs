//! The contract every backend implements.
//!
//! Mirrors the shape of a capability-tagged async provider: a handful of
//! lifecycle methods plus a single fire-and-forget request sink, with all
//! inbound data arriving later through the registered [`ServiceHandler`].

mod feature;
mod request;
mod service;

pub use feature::{FeatureSet, ProtocolFeature};
pub use request::{DownloadFileAction, Request};
pub use service::{ProfileService, Service};

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::ids::UserId;

/// Errors a backend may report back from a lifecycle call.
///
/// Transient per-request failures are not represented here: they surface as
/// `success=false` fields on the corresponding [`Service`] variant instead
/// (see `SPEC_FULL.md` §7), so this enum only covers operations that fail
/// before any request/response cycle can begin.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("backend setup failed: {0}")]
    SetupFailed(String),

    #[error("backend failed to load profile '{0}'")]
    LoadFailed(String),

    #[error("login failed: {0}")]
    LoginFailed(String),

    #[error("protocol ui control is already held by another profile")]
    UiControlDenied,
}

/// Callback a [`Protocol`] implementation uses to deliver [`Service`]
/// notifications to the Model. Backends call this from their own worker
/// threads/tasks; the Model acquires its lock internally when applying each
/// notification.
pub type ServiceHandler = Arc<dyn Fn(ProfileService) + Send + Sync>;

/// Capability-tagged contract every concrete network backend honors.
#[async_trait]
pub trait Protocol: Send + Sync {
    /// This backend's `ProfileId` string, e.g. `"telegram_12345"`.
    fn profile_id(&self) -> &str;

    /// Human-readable account name, may be empty before login.
    fn profile_display_name(&self) -> String;

    fn has_feature(&self, feature: ProtocolFeature) -> bool;

    fn self_id(&self) -> UserId;

    /// # Errors
    ///
    /// Returns [`ProtocolError::SetupFailed`] if the guided setup flow fails
    /// or is cancelled by the user.
    async fn setup_profile(&mut self, profiles_dir: &Path) -> Result<String, ProtocolError>;

    /// # Errors
    ///
    /// Returns [`ProtocolError::LoadFailed`] if the on-disk session for
    /// `profile_id` cannot be opened.
    async fn load_profile(&mut self, dir: &Path, profile_id: &str) -> Result<(), ProtocolError>;

    async fn close_profile(&mut self);

    /// # Errors
    ///
    /// Returns [`ProtocolError::LoginFailed`] if authentication fails.
    async fn login(&mut self) -> Result<(), ProtocolError>;

    async fn logout(&mut self);

    /// Dispatches a request asynchronously; the backend is free to queue,
    /// batch or reorder requests except that `MarkMessageRead` and
    /// `SendMessage` on the same chat must retain issuance order. Results
    /// arrive later as a [`Service`] passed to the registered handler.
    async fn send_request(&self, request: Request);

    /// Registers the callback used to deliver inbound [`Service`] messages.
    /// Must be called before [`Protocol::login`].
    fn set_message_handler(&mut self, handler: ServiceHandler);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn protocol_error_messages_are_stable() {
        let err = ProtocolError::UiControlDenied;
        assert_eq!(
            err.to_string(),
            "protocol ui control is already held by another profile"
        );
    }
}
