//! Filter bridge: invocation interception implemented by a guest module.

use lattice_wasm_abi::filter_export;
use lattice_wasm_runtime::{WasmLoader, WasmResult};
use serde::Serialize;

use crate::codec;
use crate::model::{Invocation, Invoker, RpcResult};

#[derive(Serialize)]
struct InvokeArgs<'a> {
    invoker: &'a Invoker,
    invocation: &'a Invocation,
}

/// Invocation filtering over a sandboxed guest module.
///
/// The guest's `invoke` export is required. Whatever the guest pushes back
/// becomes the call's result value; a guest that pushes nothing produces an
/// empty result, leaving the decision to the surrounding chain.
pub struct WasmFilter {
    loader: WasmLoader,
}

impl WasmFilter {
    /// Wrap an already loaded module.
    #[must_use]
    pub fn new(loader: WasmLoader) -> Self {
        Self { loader }
    }

    /// Load the filter module from a file.
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

    /// Run the guest filter over one invocation.
    ///
    /// # Errors
    ///
    /// [`lattice_wasm_runtime::WasmError::MissingExport`] when the guest
    /// lacks `invoke`; guest trap and budget errors pass through.
    pub fn invoke(&self, invoker: &Invoker, invocation: &Invocation) -> WasmResult<RpcResult> {
        let args = codec::to_json_bytes(&InvokeArgs {
            invoker,
            invocation,
        })?;
        let guard = self.loader.bind_args(args);
        self.loader
            .call_handle(filter_export::INVOKE, guard.handle())?
            .ok_or_else(|| self.loader.missing_export(filter_export::INVOKE))?;

        let value = guard
            .take_result()
            .map(|bytes| codec::utf8_result(self.loader.wasm_name(), bytes))
            .transpose()?;
        Ok(RpcResult { value })
    }
}
