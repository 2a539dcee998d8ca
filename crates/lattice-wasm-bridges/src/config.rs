//! Dynamic configuration bridge: a config-center client implemented by a
//! guest module.

use lattice_wasm_abi::config_export;
use lattice_wasm_runtime::{WasmLoader, WasmResult};
use serde::Serialize;

use crate::codec;

#[derive(Serialize)]
struct ConfigArgs<'a> {
    key: &'a str,
    group: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<&'a str>,
}

/// Dynamic configuration over a sandboxed guest module.
pub struct WasmDynamicConfiguration {
    loader: WasmLoader,
}

impl WasmDynamicConfiguration {
    /// Wrap an already loaded module.
    #[must_use]
    pub fn new(loader: WasmLoader) -> Self {
        Self { loader }
    }

    /// Load the configuration module from a file.
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

    /// Read a config entry. `None` when the guest pushed no value.
    ///
    /// # Errors
    ///
    /// [`lattice_wasm_runtime::WasmError::MissingExport`] when the guest
    /// lacks `doGetConfig`; guest trap and budget errors pass through.
    pub fn config(&self, key: &str, group: &str) -> WasmResult<Option<String>> {
        let guard = self.loader.bind_args(codec::to_json_bytes(&ConfigArgs {
            key,
            group,
            content: None,
        })?);
        self.loader
            .call_handle(config_export::DO_GET_CONFIG, guard.handle())?
            .ok_or_else(|| self.loader.missing_export(config_export::DO_GET_CONFIG))?;
        guard
            .take_result()
            .map(|bytes| codec::utf8_result(self.loader.wasm_name(), bytes))
            .transpose()
    }

    /// Publish a config entry; true when the guest accepted it.
    ///
    /// # Errors
    ///
    /// Same failure modes as [`WasmDynamicConfiguration::config`], for
    /// `doPublishConfig`.
    pub fn publish_config(&self, key: &str, group: &str, content: &str) -> WasmResult<bool> {
        let guard = self.loader.bind_args(codec::to_json_bytes(&ConfigArgs {
            key,
            group,
            content: Some(content),
        })?);
        let published = self
            .loader
            .call_handle_i32(config_export::DO_PUBLISH_CONFIG, guard.handle())?
            .ok_or_else(|| self.loader.missing_export(config_export::DO_PUBLISH_CONFIG))?;
        Ok(published != 0)
    }

    /// Remove a config entry; true when the guest removed it.
    ///
    /// # Errors
    ///
    /// Same failure modes as [`WasmDynamicConfiguration::config`], for
    /// `doRemoveConfig`.
    pub fn remove_config(&self, key: &str, group: &str) -> WasmResult<bool> {
        let guard = self.loader.bind_args(codec::to_json_bytes(&ConfigArgs {
            key,
            group,
            content: None,
        })?);
        let removed = self
            .loader
            .call_handle_i32(config_export::DO_REMOVE_CONFIG, guard.handle())?
            .ok_or_else(|| self.loader.missing_export(config_export::DO_REMOVE_CONFIG))?;
        Ok(removed != 0)
    }

    /// Read an internal property of the guest's config client. `None` when
    /// the guest does not implement the hook or pushed no value.
    ///
    /// # Errors
    ///
    /// Guest trap and budget errors pass through.
    pub fn internal_property(&self, key: &str) -> WasmResult<Option<String>> {
        let guard = self.loader.bind_args(key.as_bytes().to_vec());
        if self
            .loader
            .call_handle(config_export::GET_INTERNAL_PROPERTY, guard.handle())?
            .is_none()
        {
            return Ok(None);
        }
        guard
            .take_result()
            .map(|bytes| codec::utf8_result(self.loader.wasm_name(), bytes))
            .transpose()
    }

    /// Close the client: tell the guest if it cares, then close the module.
    /// Guest errors on this path are logged, never returned.
    pub fn close(&self) {
        if let Err(err) = self.loader.call_void(config_export::DO_CLOSE) {
            tracing::warn!(module = %self.loader.wasm_name(), %err, "doClose failed");
        }
        self.loader.close();
    }
}
