//! Application state shared across request handlers.

use broker_engine::ServiceBroker;

/// Basic-auth credentials the platform must present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct BasicCredentials {
    pub(crate) user: String,
    pub(crate) password: String,
}

impl BasicCredentials {
    /// `None` when no user is configured, which disables auth.
    pub(crate) fn from_config(user: &str, password: &str) -> Option<Self> {
        if user.is_empty() {
            return None;
        }
        Some(Self {
            user: user.to_string(),
            password: password.to_string(),
        })
    }
}

pub(crate) struct AppState {
    pub(crate) broker: ServiceBroker,
    pub(crate) credentials: Option<BasicCredentials>,
}
