pub mod conformance;
mod error;
mod memory;
mod record;
mod traits;

pub use error::StorageError;
pub use memory::InMemoryStorage;
pub use record::{
    BindRequestDetails, JsonObject, OperationState, OperationType, ServiceBindingCredentials,
    ServiceInstanceDetails, TerraformDeployment,
};
pub use traits::{BrokerStorage, RECOVERED_FAILED_MESSAGE};
