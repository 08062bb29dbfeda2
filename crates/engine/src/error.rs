use broker_core::{CatalogError, DeciderError, ParseError, VarContextError};
use broker_storage::StorageError;

use crate::broker::LastOperation;
use crate::credstore::CredStoreError;
use crate::provider::ProviderError;

/// Every error a lifecycle handler can return.
///
/// The `Display` text is the OSB `description`; [`BrokerError::error_key`]
/// is the OSB `error` code where the protocol defines one.
#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    #[error("User supplied parameters must be in the form of a valid JSON map.")]
    InvalidUserInput,

    #[error("bad request")]
    BadRequest,

    /// A parameter was rejected before reaching the provider.
    #[error("{0}")]
    InvalidParameters(String),

    #[error("no app GUID or credential client ID were provided in the binding request")]
    NoAppGuidOrCredentialClient,

    #[error("attempt to update parameter that may result in service instance re-creation and data loss")]
    NonUpdatableParameter,

    #[error("not found")]
    NotFound,

    #[error("instance already exists")]
    InstanceAlreadyExists,

    #[error("binding already exists")]
    BindingAlreadyExists,

    #[error("instance does not exist")]
    InstanceDoesNotExist,

    #[error("binding does not exist")]
    BindingDoesNotExist,

    #[error("This service plan requires client support for asynchronous service operations.")]
    AsyncRequired,

    #[error("ConcurrencyError")]
    ConcurrencyError,

    #[error(transparent)]
    Decider(#[from] DeciderError),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Variables(#[from] VarContextError),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// The operation finished but cleaning up after it failed.
    #[error("{message}")]
    Cleanup {
        operation: LastOperation,
        message: String,
    },

    /// Storage, secret store or upgrade-gate failure, already prefixed.
    #[error("{0}")]
    Internal(String),
}

impl BrokerError {
    pub fn status_code(&self) -> u16 {
        match self {
            BrokerError::InvalidUserInput
            | BrokerError::BadRequest
            | BrokerError::InvalidParameters(_)
            | BrokerError::NonUpdatableParameter
            | BrokerError::Catalog(_)
            | BrokerError::Variables(_) => 400,
            BrokerError::NotFound => 404,
            BrokerError::InstanceAlreadyExists | BrokerError::BindingAlreadyExists => 409,
            BrokerError::InstanceDoesNotExist | BrokerError::BindingDoesNotExist => 410,
            BrokerError::AsyncRequired
            | BrokerError::ConcurrencyError
            | BrokerError::NoAppGuidOrCredentialClient
            | BrokerError::Decider(_) => 422,
            BrokerError::Provider(_) | BrokerError::Cleanup { .. } | BrokerError::Internal(_) => {
                500
            }
        }
    }

    /// The machine-readable OSB error code, if any.
    pub fn error_key(&self) -> Option<&'static str> {
        match self {
            BrokerError::AsyncRequired => Some("AsyncRequired"),
            BrokerError::ConcurrencyError => Some("ConcurrencyError"),
            BrokerError::Decider(DeciderError::UpgradeBeforeUpdate) => None,
            BrokerError::Decider(_) => Some("MaintenanceInfoConflict"),
            BrokerError::InvalidUserInput => Some("parsing-user-request"),
            BrokerError::NonUpdatableParameter => Some("prohibited"),
            BrokerError::NotFound => Some("not-found"),
            BrokerError::BadRequest => Some("bad-request"),
            BrokerError::NoAppGuidOrCredentialClient => Some("no-app-guid-or-credential-client-id"),
            _ => None,
        }
    }

    pub(crate) fn internal(context: &str, err: impl std::fmt::Display) -> Self {
        BrokerError::Internal(format!("{context}: {err}"))
    }
}

impl From<ParseError> for BrokerError {
    fn from(err: ParseError) -> Self {
        if err.is_invalid_user_input() {
            BrokerError::InvalidUserInput
        } else if matches!(err, ParseError::NoAppGuidOrCredentialClient) {
            BrokerError::NoAppGuidOrCredentialClient
        } else {
            BrokerError::InvalidParameters(err.to_string())
        }
    }
}

impl From<CredStoreError> for BrokerError {
    fn from(err: CredStoreError) -> Self {
        BrokerError::Internal(err.to_string())
    }
}

impl From<StorageError> for BrokerError {
    fn from(err: StorageError) -> Self {
        BrokerError::Internal(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_follow_osb() {
        assert_eq!(BrokerError::InvalidUserInput.status_code(), 400);
        assert_eq!(BrokerError::NonUpdatableParameter.status_code(), 400);
        assert_eq!(BrokerError::NotFound.status_code(), 404);
        assert_eq!(BrokerError::InstanceAlreadyExists.status_code(), 409);
        assert_eq!(BrokerError::InstanceDoesNotExist.status_code(), 410);
        assert_eq!(BrokerError::AsyncRequired.status_code(), 422);
        assert_eq!(
            BrokerError::Decider(DeciderError::UpgradeBeforeUpdate).status_code(),
            422
        );
        assert_eq!(BrokerError::Internal("boom".into()).status_code(), 500);
    }

    #[test]
    fn parse_errors_split_on_user_input() {
        let err: BrokerError = ParseError::Parameters("bad".into()).into();
        assert!(matches!(err, BrokerError::InvalidUserInput));
        let err: BrokerError = ParseError::NoAppGuidOrCredentialClient.into();
        assert_eq!(err.status_code(), 422);
        assert_eq!(err.error_key(), Some("no-app-guid-or-credential-client-id"));
        let err: BrokerError = ParseError::Context("bad".into()).into();
        assert!(matches!(err, BrokerError::InvalidUserInput));
    }

    #[test]
    fn fixed_messages() {
        assert_eq!(
            BrokerError::InvalidUserInput.to_string(),
            "User supplied parameters must be in the form of a valid JSON map."
        );
        assert_eq!(BrokerError::ConcurrencyError.to_string(), "ConcurrencyError");
        assert_eq!(BrokerError::ConcurrencyError.error_key(), Some("ConcurrencyError"));
    }
}
