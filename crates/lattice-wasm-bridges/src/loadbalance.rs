//! Load balancer bridge: candidate selection implemented by a guest module.

use lattice_wasm_abi::load_balance_export;
use lattice_wasm_runtime::{WasmError, WasmLoader, WasmResult};
use serde::Serialize;

use crate::codec;
use crate::model::{Invocation, Invoker, Url};

#[derive(Serialize)]
struct SelectArgs<'a> {
    invokers: &'a [Invoker],
    url: &'a Url,
    invocation: &'a Invocation,
}

/// Load balancing over a sandboxed guest module.
///
/// The guest's `doSelect` export is required and returns the index of the
/// chosen candidate.
pub struct WasmLoadBalance {
    loader: WasmLoader,
}

impl WasmLoadBalance {
    /// Wrap an already loaded module.
    #[must_use]
    pub fn new(loader: WasmLoader) -> Self {
        Self { loader }
    }

    /// Load the balancer module from a file.
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

    /// Pick one candidate from a non-empty list.
    ///
    /// # Errors
    ///
    /// [`WasmError::InvalidArgument`] for an empty candidate list;
    /// [`WasmError::MissingExport`] when the guest lacks `doSelect`;
    /// [`WasmError::InvalidGuestResult`] when the returned index does not
    /// land in the list; guest trap and budget errors pass through.
    pub fn select<'a>(
        &self,
        invokers: &'a [Invoker],
        url: &Url,
        invocation: &Invocation,
    ) -> WasmResult<&'a Invoker> {
        if invokers.is_empty() {
            return Err(WasmError::InvalidArgument(
                "cannot select from an empty candidate list".to_string(),
            ));
        }

        let args = codec::to_json_bytes(&SelectArgs {
            invokers,
            url,
            invocation,
        })?;
        let guard = self.loader.bind_args(args);
        let index = self
            .loader
            .call_handle_i32(load_balance_export::DO_SELECT, guard.handle())?
            .ok_or_else(|| self.loader.missing_export(load_balance_export::DO_SELECT))?;

        usize::try_from(index)
            .ok()
            .and_then(|index| invokers.get(index))
            .ok_or_else(|| WasmError::InvalidGuestResult {
                module: self.loader.wasm_name().to_string(),
                detail: format!(
                    "doSelect returned {index}, out of range for {} candidates",
                    invokers.len()
                ),
            })
    }
}
