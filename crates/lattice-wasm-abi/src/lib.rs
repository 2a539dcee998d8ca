//! Host/guest ABI contract for Lattice WASM extension modules.
//!
//! Extension logic (routing, load balancing, registries, service discovery,
//! filters, protocols, remoting channels) may be implemented as sandboxed
//! WebAssembly modules instead of trusted host code. This crate pins down the
//! names both sides must agree on:
//!
//! - the import namespace under which the host exposes its functions,
//! - the two byte-channel host functions (`get_args` / `put_result`),
//! - the guest export names for every extension contract,
//! - the `memory` export every guest module must provide.
//!
//! Guest functions take a single 64-bit **handle** as their only parameter.
//! A handle is a correlation key, never a pointer: composite data only ever
//! crosses the boundary through the byte channel, addressed by
//! `(handle, addr, len)` against the guest's exported linear memory.

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

/// Import namespace for all host functions exposed to guest modules.
///
/// Guests declare imports as `(import "lattice" "get_args" ...)`.
pub const HOST_MODULE: &str = "lattice";

/// Names of host functions every guest module may import.
///
/// All host functions share the `(handle: i64, addr: i64, len: i32) -> i32`
/// shape. Bridge-specific additions (see [`channel_export`]) follow the same
/// shape.
pub mod host_function {
    /// Pull: host writes up to `len` bytes of the handle's argument payload
    /// into guest memory at `addr`, returns the number of bytes written.
    pub const GET_ARGS: &str = "get_args";
    /// Push: host reads `len` bytes from guest memory at `addr` and stores
    /// them as the handle's result, returns 0 on success.
    pub const PUT_RESULT: &str = "put_result";
    /// Channel bridge extra: guest reports the remote address host string.
    pub const SET_REMOTE_ADDRESS_HOST: &str = "setRemoteAddressHost";
    /// Channel bridge extra: guest reports the local address host string.
    pub const SET_LOCAL_ADDRESS_HOST: &str = "setLocalAddressHost";
}

/// Exports every guest module must provide regardless of contract.
pub mod wasm_export {
    /// Byte-addressable linear memory, the only medium for composite data.
    pub const MEMORY: &str = "memory";
}

/// Router contract exports.
pub mod router_export {
    /// Required: `route(handle: i64)`.
    pub const ROUTE: &str = "route";
    /// Optional: `notify(handle: i64)`.
    pub const NOTIFY: &str = "notify";
    /// Optional: `stop()`.
    pub const STOP: &str = "stop";
}

/// Load balancer contract exports.
pub mod load_balance_export {
    /// Required: `doSelect(handle: i64) -> i32`, the selected candidate index.
    pub const DO_SELECT: &str = "doSelect";
}

/// Registry contract exports.
pub mod registry_export {
    /// Required: `doRegister(handle: i64)`.
    pub const DO_REGISTER: &str = "doRegister";
    /// Required: `doUnregister(handle: i64)`.
    pub const DO_UNREGISTER: &str = "doUnregister";
    /// Required: `doSubscribe(handle: i64)`.
    pub const DO_SUBSCRIBE: &str = "doSubscribe";
    /// Required: `doUnsubscribe(handle: i64)`.
    pub const DO_UNSUBSCRIBE: &str = "doUnsubscribe";
    /// Required: `isAvailable() -> i32`, positive means available.
    pub const IS_AVAILABLE: &str = "isAvailable";
}

/// Service discovery contract exports.
pub mod service_discovery_export {
    /// Required: `doRegister(handle: i64)`.
    pub const DO_REGISTER: &str = "doRegister";
    /// Required: `doUnregister(handle: i64)`.
    pub const DO_UNREGISTER: &str = "doUnregister";
    /// Required: `doDestroy()`.
    pub const DO_DESTROY: &str = "doDestroy";
    /// Required: `getServices(handle: i64) -> i32`, the element count.
    pub const GET_SERVICES: &str = "getServices";
    /// Required: `getInstances(handle: i64) -> i32`, the element count.
    pub const GET_INSTANCES: &str = "getInstances";
    /// Optional: `addServiceInstancesChangedListener(handle: i64)`.
    pub const ADD_SERVICE_INSTANCES_CHANGED_LISTENER: &str = "addServiceInstancesChangedListener";
    /// Optional: `removeServiceInstancesChangedListener(handle: i64)`.
    pub const REMOVE_SERVICE_INSTANCES_CHANGED_LISTENER: &str =
        "removeServiceInstancesChangedListener";
}

/// Filter contract exports.
pub mod filter_export {
    /// Required: `invoke(handle: i64)`.
    pub const INVOKE: &str = "invoke";
}

/// Protocol contract exports.
pub mod protocol_export {
    /// Required: `refer(handle: i64)`.
    pub const REFER: &str = "refer";
    /// Required: `export(handle: i64)`.
    pub const EXPORT: &str = "export";
}

/// Invoker contract exports.
pub mod invoker_export {
    /// Required: `doInvoke(handle: i64)`.
    pub const DO_INVOKE: &str = "doInvoke";
    /// Optional: `destroy()`.
    pub const DESTROY: &str = "destroy";
    /// Optional: `destroyAll()`.
    pub const DESTROY_ALL: &str = "destroyAll";
}

/// Exporter contract exports.
pub mod exporter_export {
    /// Optional: `afterUnExport()`.
    pub const AFTER_UN_EXPORT: &str = "afterUnExport";
}

/// Remoting channel contract exports.
pub mod channel_export {
    /// Required: `send(handle: i64)`.
    pub const SEND: &str = "send";
    /// Required: `isConnected() -> i32`, positive means connected.
    pub const IS_CONNECTED: &str = "isConnected";
    /// Required: `getRemoteAddressHost(handle: i64)`; the guest answers
    /// through the `setRemoteAddressHost` host function.
    pub const GET_REMOTE_ADDRESS_HOST: &str = "getRemoteAddressHost";
    /// Required: `getRemoteAddressPort(handle: i64) -> i32`.
    pub const GET_REMOTE_ADDRESS_PORT: &str = "getRemoteAddressPort";
    /// Required: `getLocalAddressHost(handle: i64)`; the guest answers
    /// through the `setLocalAddressHost` host function.
    pub const GET_LOCAL_ADDRESS_HOST: &str = "getLocalAddressHost";
    /// Required: `getLocalAddressPort(handle: i64) -> i32`.
    pub const GET_LOCAL_ADDRESS_PORT: &str = "getLocalAddressPort";
    /// Optional: `closeChannel()`.
    pub const CLOSE_CHANNEL: &str = "closeChannel";
    /// Optional: `hasAttribute(handle: i64) -> i32`.
    pub const HAS_ATTRIBUTE: &str = "hasAttribute";
    /// Optional: `getAttribute(handle: i64)`.
    pub const GET_ATTRIBUTE: &str = "getAttribute";
    /// Optional: `setAttribute(handle: i64)`.
    pub const SET_ATTRIBUTE: &str = "setAttribute";
    /// Optional: `removeAttribute(handle: i64)`.
    pub const REMOVE_ATTRIBUTE: &str = "removeAttribute";
}

/// Dynamic configuration contract exports.
pub mod config_export {
    /// Required: `doGetConfig(handle: i64)`.
    pub const DO_GET_CONFIG: &str = "doGetConfig";
    /// Required: `doPublishConfig(handle: i64) -> i32`, non-zero means published.
    pub const DO_PUBLISH_CONFIG: &str = "doPublishConfig";
    /// Required: `doRemoveConfig(handle: i64) -> i32`, non-zero means removed.
    pub const DO_REMOVE_CONFIG: &str = "doRemoveConfig";
    /// Optional: `getInternalProperty(handle: i64)`.
    pub const GET_INTERNAL_PROPERTY: &str = "getInternalProperty";
    /// Optional: `doClose()`.
    pub const DO_CLOSE: &str = "doClose";
}

/// Return codes for host functions.
pub mod return_code {
    /// Operation completed successfully.
    pub const SUCCESS: i32 = 0;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_contract_names() {
        assert_eq!(HOST_MODULE, "lattice");
        assert_eq!(host_function::GET_ARGS, "get_args");
        assert_eq!(host_function::PUT_RESULT, "put_result");
        assert_eq!(wasm_export::MEMORY, "memory");
    }

    #[test]
    fn test_contract_export_names() {
        assert_eq!(router_export::ROUTE, "route");
        assert_eq!(load_balance_export::DO_SELECT, "doSelect");
        assert_eq!(registry_export::IS_AVAILABLE, "isAvailable");
        assert_eq!(service_discovery_export::GET_INSTANCES, "getInstances");
        assert_eq!(filter_export::INVOKE, "invoke");
        assert_eq!(invoker_export::DO_INVOKE, "doInvoke");
        assert_eq!(exporter_export::AFTER_UN_EXPORT, "afterUnExport");
        assert_eq!(config_export::DO_GET_CONFIG, "doGetConfig");
    }
}
