//! broker-core: the request-independent half of the service broker.
//!
//! - [`catalog`] -- service definitions, plans, declared variables and the
//!   [`BrokerRegistry`](catalog::BrokerRegistry)
//! - [`paramparser`] -- typed details from inbound OSB request bodies
//! - [`varcontext`] -- layered variable resolution with templated defaults
//! - [`decider`] -- update vs upgrade classification
//! - [`settings`] -- operator settings and feature flags

pub mod catalog;
pub mod decider;
pub mod identity;
pub mod labels;
pub mod paramparser;
pub mod settings;
pub mod validation;
pub mod varcontext;
pub mod version;

pub use catalog::{BrokerRegistry, CatalogError, ServiceDefinition, ServicePlan};
pub use decider::{decide_operation, DeciderError, Operation};
pub use paramparser::{BindDetails, ParseError, ProvisionDetails, UpdateDetails};
pub use settings::{FeatureFlags, Settings};
pub use varcontext::{VarContext, VarContextError};
pub use version::Version;
