use serde_json::Value;

use broker_core::identity::parse_originating_identity;

/// Per-request data threaded through every handler.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    /// Identifier attached to every log line for this request.
    pub correlation_id: String,
    /// Decoded `X-Broker-API-Originating-Identity` header, if one was sent.
    pub originating_identity: Option<Value>,
}

impl RequestContext {
    pub fn new(correlation_id: impl Into<String>) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            originating_identity: None,
        }
    }

    /// A context with a freshly generated correlation id.
    pub fn generated() -> Self {
        Self::new(uuid::Uuid::new_v4().to_string())
    }

    /// Attach the originating identity from the raw header value.
    /// Malformed headers are dropped.
    pub fn with_identity_header(mut self, header: Option<&str>) -> Self {
        self.originating_identity = header.and_then(parse_originating_identity);
        self
    }

    /// The context a detached task runs under: same correlation id,
    /// no request-scoped identity.
    pub fn background(&self) -> Self {
        Self::new(self.correlation_id.clone())
    }

    pub fn identity(&self) -> Option<&Value> {
        self.originating_identity.as_ref()
    }
}
