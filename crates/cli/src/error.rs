use broker_engine::CredStoreError;
use broker_storage::StorageError;

use crate::catalog::CatalogLoadError;
use crate::config::ConfigError;

/// Failures that stop the binary before or while serving.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Catalog(#[from] CatalogLoadError),

    #[error("startup recovery failed: {0}")]
    Storage(#[from] StorageError),

    #[error("credential store: {0}")]
    CredStore(#[from] CredStoreError),

    #[error("invalid listen address: {0}")]
    InvalidAddress(String),

    #[error("--tls-cert and --tls-key must both be provided")]
    IncompleteTls,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("failed to render catalog: {0}")]
    Json(#[from] serde_json::Error),
}
