//! Service definitions, plans and the registry that serves the catalog.

mod definition;
mod plan;
mod registry;
pub mod schema;
mod variable;

pub use definition::{ServiceDefinition, TF_ID_KEY};
pub use plan::{MaintenanceInfo, ServicePlan};
pub use registry::BrokerRegistry;
pub use variable::{BrokerVariable, ImportVariable};

use crate::validation::FieldError;

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("tried to register multiple instances of: {0:?}")]
    Duplicate(String),
    #[error("error getting user defined plans: {name:?}, {message}")]
    UserPlans { name: String, message: String },
    #[error("service {0:?} has no plans defined; at least one plan must be specified in the service definition or in service.{0}.plans")]
    NoPlans(String),
    #[error("error validating service {name:?}, {source}")]
    Invalid { name: String, source: FieldError },
    #[error("unknown service ID: {0:?}")]
    UnknownService(String),
    #[error("Plan ID {0:?} could not be found")]
    UnknownPlan(String),
}
