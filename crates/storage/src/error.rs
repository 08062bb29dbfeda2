/// All errors that can be returned by a BrokerStorage implementation.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// No service instance record with the given id.
    #[error("could not find service instance details for: {instance_id}")]
    InstanceNotFound { instance_id: String },

    /// No provision request details stored for the instance.
    #[error("error finding provision request details record: {instance_id}")]
    ProvisionDetailsNotFound { instance_id: String },

    /// No binding credentials row for (binding_id, instance_id).
    #[error("error finding service credential binding: {binding_id}/{instance_id}")]
    BindingNotFound {
        binding_id: String,
        instance_id: String,
    },

    /// A binding credentials row for (binding_id, instance_id) already exists.
    #[error("binding already exists: {binding_id}/{instance_id}")]
    BindingAlreadyExists {
        binding_id: String,
        instance_id: String,
    },

    /// No deployment row with the given tf id.
    #[error("could not find terraform deployment: {id}")]
    DeploymentNotFound { id: String },

    /// A backend-specific storage error (DB connection, serialization, etc.).
    #[error("storage backend error: {0}")]
    Backend(String),
}
