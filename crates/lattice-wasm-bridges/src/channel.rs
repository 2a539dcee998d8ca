//! Remoting channel bridge: a transport channel implemented by a guest
//! module.
//!
//! Address hosts come back through bridge-specific host functions
//! (`setRemoteAddressHost` / `setLocalAddressHost`) rather than the shared
//! result slot, so the channel wires byte sinks into the loader at build
//! time and must construct its own loader.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;

use lattice_wasm_abi::{channel_export, host_function};
use lattice_wasm_runtime::{WasmLoader, WasmLoaderBuilder, WasmResult};

use crate::codec;

type HostSlots = Arc<Mutex<HashMap<u64, String>>>;

#[derive(Serialize)]
struct AttributeArgs<'a> {
    key: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    value: Option<&'a str>,
}

/// A transport channel over a sandboxed guest module.
pub struct WasmChannel {
    loader: WasmLoader,
    remote_hosts: HostSlots,
    local_hosts: HostSlots,
}

impl WasmChannel {
    /// Load the channel module from a file.
    ///
    /// # Errors
    ///
    /// Returns a load-family error when the module cannot be loaded.
    pub fn from_file(path: impl Into<PathBuf>) -> WasmResult<Self> {
        Self::build(WasmLoader::builder().file(path))
    }

    /// Load the channel module from bytes.
    ///
    /// # Errors
    ///
    /// Returns a load-family error when the module cannot be loaded.
    pub fn from_bytes(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> WasmResult<Self> {
        Self::build(WasmLoader::builder().name(name).bytes(bytes))
    }

    fn build(builder: WasmLoaderBuilder) -> WasmResult<Self> {
        let remote_hosts: HostSlots = Arc::new(Mutex::new(HashMap::new()));
        let local_hosts: HostSlots = Arc::new(Mutex::new(HashMap::new()));

        let remote = Arc::clone(&remote_hosts);
        let local = Arc::clone(&local_hosts);
        let loader = builder
            .byte_sink(
                host_function::SET_REMOTE_ADDRESS_HOST,
                Arc::new(move |handle, bytes| {
                    remote
                        .lock()
                        .insert(handle, String::from_utf8_lossy(&bytes).into_owned());
                }),
            )
            .byte_sink(
                host_function::SET_LOCAL_ADDRESS_HOST,
                Arc::new(move |handle, bytes| {
                    local
                        .lock()
                        .insert(handle, String::from_utf8_lossy(&bytes).into_owned());
                }),
            )
            .build()?;

        Ok(Self {
            loader,
            remote_hosts,
            local_hosts,
        })
    }

    /// The underlying loader.
    #[must_use]
    pub fn loader(&self) -> &WasmLoader {
        &self.loader
    }

    /// Send a message over the channel.
    ///
    /// # Errors
    ///
    /// [`lattice_wasm_runtime::WasmError::MissingExport`] when the guest
    /// lacks `send`; guest trap and budget errors pass through.
    pub fn send(&self, message: &[u8]) -> WasmResult<()> {
        let guard = self.loader.bind_args(message.to_vec());
        self.loader
            .call_handle(channel_export::SEND, guard.handle())?
            .ok_or_else(|| self.loader.missing_export(channel_export::SEND))?;
        Ok(())
    }

    /// Whether the guest considers the channel connected.
    ///
    /// # Errors
    ///
    /// Same failure modes as [`WasmChannel::send`], for `isConnected`.
    pub fn is_connected(&self) -> WasmResult<bool> {
        let connected = self
            .loader
            .call_i32(channel_export::IS_CONNECTED)?
            .ok_or_else(|| self.loader.missing_export(channel_export::IS_CONNECTED))?;
        Ok(connected > 0)
    }

    /// The remote peer's host, as reported by the guest via its address sink.
    ///
    /// Returns `None` when the guest did not report one during the call.
    ///
    /// # Errors
    ///
    /// Same failure modes as [`WasmChannel::send`], for
    /// `getRemoteAddressHost`.
    pub fn remote_address_host(&self) -> WasmResult<Option<String>> {
        self.host_call(channel_export::GET_REMOTE_ADDRESS_HOST, &self.remote_hosts)
    }

    /// The remote peer's port.
    ///
    /// # Errors
    ///
    /// Same failure modes as [`WasmChannel::send`], for
    /// `getRemoteAddressPort`.
    pub fn remote_address_port(&self) -> WasmResult<i32> {
        self.port_call(channel_export::GET_REMOTE_ADDRESS_PORT)
    }

    /// The local end's host, as reported by the guest via its address sink.
    ///
    /// # Errors
    ///
    /// Same failure modes as [`WasmChannel::send`], for
    /// `getLocalAddressHost`.
    pub fn local_address_host(&self) -> WasmResult<Option<String>> {
        self.host_call(channel_export::GET_LOCAL_ADDRESS_HOST, &self.local_hosts)
    }

    /// The local end's port.
    ///
    /// # Errors
    ///
    /// Same failure modes as [`WasmChannel::send`], for
    /// `getLocalAddressPort`.
    pub fn local_address_port(&self) -> WasmResult<i32> {
        self.port_call(channel_export::GET_LOCAL_ADDRESS_PORT)
    }

    /// Whether the channel carries an attribute. `None` when the guest does
    /// not implement attributes.
    ///
    /// # Errors
    ///
    /// Guest trap and budget errors pass through.
    pub fn has_attribute(&self, key: &str) -> WasmResult<Option<bool>> {
        let guard = self.loader.bind_args(key.as_bytes().to_vec());
        Ok(self
            .loader
            .call_handle_i32(channel_export::HAS_ATTRIBUTE, guard.handle())?
            .map(|present| present > 0))
    }

    /// Read an attribute value. `None` when the guest does not implement
    /// attributes or has no value for the key.
    ///
    /// # Errors
    ///
    /// Guest trap and budget errors pass through; a non-UTF-8 value is an
    /// invalid guest result.
    pub fn attribute(&self, key: &str) -> WasmResult<Option<String>> {
        let guard = self.loader.bind_args(key.as_bytes().to_vec());
        if self
            .loader
            .call_handle(channel_export::GET_ATTRIBUTE, guard.handle())?
            .is_none()
        {
            return Ok(None);
        }
        guard
            .take_result()
            .map(|bytes| codec::utf8_result(self.loader.wasm_name(), bytes))
            .transpose()
    }

    /// Store an attribute. No-op when the guest does not implement
    /// attributes.
    ///
    /// # Errors
    ///
    /// Guest trap and budget errors pass through.
    pub fn set_attribute(&self, key: &str, value: &str) -> WasmResult<()> {
        let args = codec::to_json_bytes(&AttributeArgs {
            key,
            value: Some(value),
        })?;
        let guard = self.loader.bind_args(args);
        self.loader
            .call_handle(channel_export::SET_ATTRIBUTE, guard.handle())?;
        Ok(())
    }

    /// Remove an attribute. No-op when the guest does not implement
    /// attributes.
    ///
    /// # Errors
    ///
    /// Guest trap and budget errors pass through.
    pub fn remove_attribute(&self, key: &str) -> WasmResult<()> {
        let guard = self.loader.bind_args(key.as_bytes().to_vec());
        self.loader
            .call_handle(channel_export::REMOVE_ATTRIBUTE, guard.handle())?;
        Ok(())
    }

    /// Close the channel: tell the guest if it cares, then close the module.
    /// Guest errors on this path are logged, never returned.
    pub fn close(&self) {
        if let Err(err) = self.loader.call_void(channel_export::CLOSE_CHANNEL) {
            tracing::warn!(module = %self.loader.wasm_name(), %err, "closeChannel failed");
        }
        self.loader.close();
    }

    fn host_call(&self, export: &'static str, slots: &HostSlots) -> WasmResult<Option<String>> {
        let guard = self.loader.bind_args(Vec::new());
        self.loader
            .call_handle(export, guard.handle())?
            .ok_or_else(|| self.loader.missing_export(export))?;
        Ok(slots.lock().remove(&guard.handle()))
    }

    fn port_call(&self, export: &'static str) -> WasmResult<i32> {
        let guard = self.loader.bind_args(Vec::new());
        self.loader
            .call_handle_i32(export, guard.handle())?
            .ok_or_else(|| self.loader.missing_export(export))
    }
}
