//! broker-engine: Open Service Broker lifecycle handlers.
//!
//! - [`broker`] -- the [`ServiceBroker`] and one handler per OSB endpoint
//! - [`provider`] -- the [`ServiceProvider`] contract the handlers drive
//! - [`dryrun`] -- a provider that records deployments without deploying
//! - [`credstore`] -- optional CredHub storage for binding credentials
//! - [`context`] -- per-request correlation id and originating identity
//! - [`error`] -- [`BrokerError`] and its OSB status mapping

pub mod broker;
pub mod context;
pub mod credstore;
pub mod dryrun;
pub mod error;
pub mod provider;
mod tracker;

pub use broker::{
    credential_name, tf_binding_id, tf_instance_id, Binding, DeprovisionServiceSpec,
    GetBindingSpec, GetInstanceDetailsSpec, LastOperation, PlanQuery, ProvisionedServiceSpec,
    ServiceBroker, UpdateServiceSpec,
};
pub use context::RequestContext;
pub use credstore::{CredHubConfig, CredHubStore, CredStore, CredStoreError};
pub use dryrun::DryRunProvider;
pub use error::BrokerError;
pub use provider::{PollResult, ProviderError, ServiceProvider, UpgradeSignal};
