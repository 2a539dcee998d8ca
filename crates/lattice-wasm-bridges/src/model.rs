//! Minimal domain model at the extension interface boundary.
//!
//! These types exist so the bridges have real argument and return types to
//! encode across the byte channel. They deliberately carry no strategy
//! semantics of their own; routing and balancing decisions live entirely in
//! the guest modules.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// An RPC endpoint address plus its query parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Url {
    /// `host:port/path` style address string.
    pub address: String,
    /// Query parameters, sorted for a stable encoding.
    #[serde(default)]
    pub parameters: BTreeMap<String, String>,
}

impl Url {
    /// Create a URL with no parameters.
    #[must_use]
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            parameters: BTreeMap::new(),
        }
    }

    /// Add a query parameter.
    #[must_use]
    pub fn with_parameter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    /// Look up a query parameter.
    #[must_use]
    pub fn parameter(&self, key: &str) -> Option<&str> {
        self.parameters.get(key).map(String::as_str)
    }
}

/// One RPC invocation crossing an extension point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invocation {
    /// Fully qualified service name.
    pub service: String,
    /// Method being invoked.
    pub method: String,
    /// Invocation arguments, pre-rendered to strings.
    #[serde(default)]
    pub arguments: Vec<String>,
    /// Implicit attachments travelling with the call.
    #[serde(default)]
    pub attachments: BTreeMap<String, String>,
}

impl Invocation {
    /// Create an invocation with no arguments or attachments.
    #[must_use]
    pub fn new(service: impl Into<String>, method: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            method: method.into(),
            arguments: Vec::new(),
            attachments: BTreeMap::new(),
        }
    }

    /// Add an attachment.
    #[must_use]
    pub fn with_attachment(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attachments.insert(key.into(), value.into());
        self
    }
}

/// A callable provider endpoint, one candidate in a routing decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invoker {
    /// Stable identifier for this provider.
    pub id: String,
    /// Provider address.
    pub url: Url,
}

impl Invoker {
    /// Create an invoker.
    #[must_use]
    pub fn new(id: impl Into<String>, url: Url) -> Self {
        Self { id: id.into(), url }
    }
}

/// Result of one RPC call: an opaque UTF-8 value produced by the callee.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RpcResult {
    /// The value, absent when the call produced none.
    pub value: Option<String>,
}

impl RpcResult {
    /// A result carrying a value.
    #[must_use]
    pub fn with_value(value: impl Into<String>) -> Self {
        Self {
            value: Some(value.into()),
        }
    }
}

/// A routing decision over a candidate list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouterResult {
    /// The surviving candidates, in original order.
    pub invokers: Vec<Invoker>,
    /// Optional diagnostic message from the routing layer.
    pub message: Option<String>,
}

/// A service instance as seen by a discovery system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceInstance {
    /// Name of the service this instance belongs to.
    pub service_name: String,
    /// Instance host.
    pub host: String,
    /// Instance port.
    pub port: u16,
    /// Free-form instance metadata.
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl ServiceInstance {
    /// Create an instance with no metadata.
    #[must_use]
    pub fn new(service_name: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self {
            service_name: service_name.into(),
            host: host.into(),
            port,
            metadata: BTreeMap::new(),
        }
    }
}

/// Callback for registry subscription updates.
pub trait NotifyListener: Send + Sync {
    /// Called with the current provider URL set for a subscribed service.
    fn notify(&self, urls: Vec<Url>);
}

/// Callback for service-instance change events.
pub trait InstancesChangedListener: Send + Sync {
    /// Called when the instance set of a watched service changes.
    fn on_changed(&self, service_name: &str, instances: Vec<ServiceInstance>);
}
