//! Service discovery bridge: instance registration and lookup implemented by
//! a guest module.
//!
//! The two lookup operations are list-returning: the guest returns an element
//! count and pushes one result per element through the same handle's channel;
//! the bridge materializes exactly `count` elements.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use lattice_wasm_abi::service_discovery_export;
use lattice_wasm_runtime::{WasmError, WasmLoader, WasmResult};

use crate::codec;
use crate::model::{InstancesChangedListener, ServiceInstance};

/// Service discovery over a sandboxed guest module.
pub struct WasmServiceDiscovery {
    loader: WasmLoader,
    listeners: Mutex<HashMap<String, Arc<dyn InstancesChangedListener>>>,
}

impl WasmServiceDiscovery {
    /// Wrap an already loaded module.
    #[must_use]
    pub fn new(loader: WasmLoader) -> Self {
        Self {
            loader,
            listeners: Mutex::new(HashMap::new()),
        }
    }

    /// Load the discovery module from a file.
    ///
    /// # Errors
    ///
    /// Returns a load-family error when the module cannot be loaded.
    pub fn from_file(path: impl Into<std::path::PathBuf>) -> WasmResult<Self> {
        Ok(Self::new(WasmLoader::from_file(path)?))
    }

    /// The underlying loader.
    #[must_use]
    pub fn loader(&self) -> &WasmLoader {
        &self.loader
    }

    /// Register a service instance.
    ///
    /// # Errors
    ///
    /// [`WasmError::MissingExport`] when the guest lacks `doRegister`; guest
    /// trap and budget errors pass through.
    pub fn register(&self, instance: &ServiceInstance) -> WasmResult<()> {
        self.instance_call(service_discovery_export::DO_REGISTER, instance)
    }

    /// Unregister a service instance.
    ///
    /// # Errors
    ///
    /// Same failure modes as [`WasmServiceDiscovery::register`], for
    /// `doUnregister`.
    pub fn unregister(&self, instance: &ServiceInstance) -> WasmResult<()> {
        self.instance_call(service_discovery_export::DO_UNREGISTER, instance)
    }

    /// List the known service names.
    ///
    /// # Errors
    ///
    /// [`WasmError::MissingExport`] when the guest lacks `getServices`;
    /// [`WasmError::InvalidGuestResult`] when the guest pushes fewer elements
    /// than its count claims or pushes non-UTF-8 names.
    pub fn services(&self) -> WasmResult<Vec<String>> {
        let guard = self.loader.bind_args(Vec::new());
        let count = self
            .loader
            .call_handle_i32(service_discovery_export::GET_SERVICES, guard.handle())?
            .ok_or_else(|| {
                self.loader
                    .missing_export(service_discovery_export::GET_SERVICES)
            })?;

        self.take_counted(count, guard.take_results())?
            .into_iter()
            .map(|bytes| codec::utf8_result(self.loader.wasm_name(), bytes))
            .collect()
    }

    /// List the instances of one service.
    ///
    /// Each element the guest pushes is a JSON-encoded [`ServiceInstance`].
    ///
    /// # Errors
    ///
    /// Same failure modes as [`WasmServiceDiscovery::services`], for
    /// `getInstances`, plus [`WasmError::InvalidGuestResult`] for elements
    /// that do not decode as instances.
    pub fn instances(&self, service_name: &str) -> WasmResult<Vec<ServiceInstance>> {
        let guard = self.loader.bind_args(service_name.as_bytes().to_vec());
        let count = self
            .loader
            .call_handle_i32(service_discovery_export::GET_INSTANCES, guard.handle())?
            .ok_or_else(|| {
                self.loader
                    .missing_export(service_discovery_export::GET_INSTANCES)
            })?;

        self.take_counted(count, guard.take_results())?
            .into_iter()
            .map(|bytes| {
                serde_json::from_slice(&bytes).map_err(|err| WasmError::InvalidGuestResult {
                    module: self.loader.wasm_name().to_string(),
                    detail: format!("instance element does not decode: {err}"),
                })
            })
            .collect()
    }

    /// Watch a service for instance changes. No-op when the guest does not
    /// implement the listener hook; the listener is kept host-side either
    /// way and can be fired through
    /// [`WasmServiceDiscovery::dispatch_changed`].
    ///
    /// # Errors
    ///
    /// Guest trap and budget errors pass through.
    pub fn add_listener(
        &self,
        service_name: &str,
        listener: Arc<dyn InstancesChangedListener>,
    ) -> WasmResult<()> {
        self.listeners
            .lock()
            .insert(service_name.to_string(), listener);
        let guard = self.loader.bind_args(service_name.as_bytes().to_vec());
        self.loader.call_handle(
            service_discovery_export::ADD_SERVICE_INSTANCES_CHANGED_LISTENER,
            guard.handle(),
        )?;
        Ok(())
    }

    /// Stop watching a service. No-op when the guest does not implement the
    /// listener hook.
    ///
    /// # Errors
    ///
    /// Guest trap and budget errors pass through.
    pub fn remove_listener(&self, service_name: &str) -> WasmResult<()> {
        self.listeners.lock().remove(service_name);
        let guard = self.loader.bind_args(service_name.as_bytes().to_vec());
        self.loader.call_handle(
            service_discovery_export::REMOVE_SERVICE_INSTANCES_CHANGED_LISTENER,
            guard.handle(),
        )?;
        Ok(())
    }

    /// Fire the registered listener for a service, if any.
    pub fn dispatch_changed(&self, service_name: &str, instances: Vec<ServiceInstance>) {
        let listener = self.listeners.lock().get(service_name).cloned();
        if let Some(listener) = listener {
            listener.on_changed(service_name, instances);
        }
    }

    /// Destroy the discovery client: tell the guest, then close the module.
    ///
    /// # Errors
    ///
    /// [`WasmError::MissingExport`] when the guest lacks `doDestroy`; guest
    /// trap and budget errors pass through. The module is closed regardless.
    pub fn destroy(&self) -> WasmResult<()> {
        let result = self
            .loader
            .call_void(service_discovery_export::DO_DESTROY)
            .and_then(|called| {
                called.ok_or_else(|| {
                    self.loader
                        .missing_export(service_discovery_export::DO_DESTROY)
                })
            });
        self.loader.close();
        result
    }

    fn instance_call(&self, export: &'static str, instance: &ServiceInstance) -> WasmResult<()> {
        let guard = self.loader.bind_args(codec::to_json_bytes(instance)?);
        self.loader
            .call_handle(export, guard.handle())?
            .ok_or_else(|| self.loader.missing_export(export))?;
        Ok(())
    }

    fn take_counted(&self, count: i32, mut results: Vec<Vec<u8>>) -> WasmResult<Vec<Vec<u8>>> {
        let count = usize::try_from(count).map_err(|_| WasmError::InvalidGuestResult {
            module: self.loader.wasm_name().to_string(),
            detail: format!("negative element count {count}"),
        })?;
        if results.len() < count {
            return Err(WasmError::InvalidGuestResult {
                module: self.loader.wasm_name().to_string(),
                detail: format!("guest claimed {count} elements, pushed {}", results.len()),
            });
        }
        results.truncate(count);
        Ok(results)
    }
}
