//! Registry bridge: service registration and subscription implemented by a
//! guest module.

use lattice_wasm_abi::registry_export;
use lattice_wasm_runtime::{WasmLoader, WasmResult};

use crate::codec;
use crate::model::{NotifyListener, Url};

/// Service registry over a sandboxed guest module.
///
/// All five contract exports are required; the registry is considered
/// misdeployed without any of them.
pub struct WasmRegistry {
    loader: WasmLoader,
}

impl WasmRegistry {
    /// Wrap an already loaded module.
    #[must_use]
    pub fn new(loader: WasmLoader) -> Self {
        Self { loader }
    }

    /// Load the registry module from a file.
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

    /// Register a provider URL. Returns any acknowledgement the guest pushed.
    ///
    /// # Errors
    ///
    /// [`lattice_wasm_runtime::WasmError::MissingExport`] when the guest
    /// lacks `doRegister`; guest trap and budget errors pass through.
    pub fn register(&self, url: &Url) -> WasmResult<Option<String>> {
        self.url_call(registry_export::DO_REGISTER, url)
    }

    /// Unregister a provider URL. Returns any acknowledgement the guest
    /// pushed.
    ///
    /// # Errors
    ///
    /// Same failure modes as [`WasmRegistry::register`], for `doUnregister`.
    pub fn unregister(&self, url: &Url) -> WasmResult<Option<String>> {
        self.url_call(registry_export::DO_UNREGISTER, url)
    }

    /// Subscribe to a consumer URL.
    ///
    /// The guest answers with a comma-separated list of provider addresses;
    /// the listener is notified with the parsed URL set, or with an empty set
    /// when the guest pushed nothing.
    ///
    /// # Errors
    ///
    /// Same failure modes as [`WasmRegistry::register`], for `doSubscribe`.
    pub fn subscribe(&self, url: &Url, listener: &dyn NotifyListener) -> WasmResult<()> {
        let ack = self.url_call(registry_export::DO_SUBSCRIBE, url)?;
        let urls = match ack {
            Some(csv) if !csv.is_empty() => csv.split(',').map(|a| Url::new(a.trim())).collect(),
            _ => Vec::new(),
        };
        listener.notify(urls);
        Ok(())
    }

    /// Unsubscribe a consumer URL. Returns any acknowledgement the guest
    /// pushed.
    ///
    /// # Errors
    ///
    /// Same failure modes as [`WasmRegistry::register`], for `doUnsubscribe`.
    pub fn unsubscribe(&self, url: &Url) -> WasmResult<Option<String>> {
        self.url_call(registry_export::DO_UNSUBSCRIBE, url)
    }

    /// Ask the guest whether the backing registry is reachable.
    ///
    /// # Errors
    ///
    /// Same failure modes as [`WasmRegistry::register`], for `isAvailable`.
    pub fn is_available(&self) -> WasmResult<bool> {
        let available = self
            .loader
            .call_i32(registry_export::IS_AVAILABLE)?
            .ok_or_else(|| self.loader.missing_export(registry_export::IS_AVAILABLE))?;
        Ok(available > 0)
    }

    fn url_call(&self, export: &'static str, url: &Url) -> WasmResult<Option<String>> {
        let guard = self.loader.bind_args(codec::to_json_bytes(url)?);
        self.loader
            .call_handle(export, guard.handle())?
            .ok_or_else(|| self.loader.missing_export(export))?;
        guard
            .take_result()
            .map(|bytes| codec::utf8_result(self.loader.wasm_name(), bytes))
            .transpose()
    }
}
