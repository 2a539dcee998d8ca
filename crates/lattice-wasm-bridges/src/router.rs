//! Router bridge: route selection implemented by a guest module.

use lattice_wasm_abi::router_export;
use lattice_wasm_runtime::{WasmError, WasmLoader, WasmResult};
use serde::Serialize;

use crate::codec;
use crate::model::{Invocation, Invoker, RouterResult, Url};

#[derive(Serialize)]
struct RouteArgs<'a> {
    invokers: &'a [Invoker],
    url: &'a Url,
    invocation: &'a Invocation,
}

#[derive(Serialize)]
struct NotifyArgs<'a> {
    invokers: &'a [Invoker],
}

/// Routing over a sandboxed guest module.
///
/// The guest's `route` export is required; `notify` and `stop` are optional
/// hooks treated as no-ops when absent.
pub struct WasmRouter {
    loader: WasmLoader,
}

impl WasmRouter {
    /// Wrap an already loaded module.
    #[must_use]
    pub fn new(loader: WasmLoader) -> Self {
        Self { loader }
    }

    /// Load the router module from a file.
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

    /// Route a call over the candidate list.
    ///
    /// The guest receives the candidates, the consumer URL, and the
    /// invocation through the byte channel and answers with a comma-separated
    /// list of candidate indices. No answer keeps the list unchanged; an
    /// empty answer routes to nobody.
    ///
    /// # Errors
    ///
    /// [`WasmError::MissingExport`] when the guest lacks `route`;
    /// [`WasmError::InvalidGuestResult`] when the answer is not an index
    /// list into the candidates; guest trap and budget errors pass through.
    pub fn route(
        &self,
        invokers: &[Invoker],
        url: &Url,
        invocation: &Invocation,
    ) -> WasmResult<RouterResult> {
        let args = codec::to_json_bytes(&RouteArgs {
            invokers,
            url,
            invocation,
        })?;
        let guard = self.loader.bind_args(args);
        self.loader
            .call_handle(router_export::ROUTE, guard.handle())?
            .ok_or_else(|| self.loader.missing_export(router_export::ROUTE))?;

        let Some(bytes) = guard.take_result() else {
            return Ok(RouterResult {
                invokers: invokers.to_vec(),
                message: None,
            });
        };
        let text = codec::utf8_result(self.loader.wasm_name(), bytes)?;
        let selected = self.parse_indices(&text, invokers.len())?;
        Ok(RouterResult {
            invokers: selected
                .into_iter()
                .filter_map(|index| invokers.get(index).cloned())
                .collect(),
            message: None,
        })
    }

    /// Inform the guest that the candidate set changed. No-op when the guest
    /// does not implement `notify`.
    ///
    /// # Errors
    ///
    /// Guest trap and budget errors pass through.
    pub fn notify(&self, invokers: &[Invoker]) -> WasmResult<()> {
        let args = codec::to_json_bytes(&NotifyArgs { invokers })?;
        let guard = self.loader.bind_args(args);
        self.loader
            .call_handle(router_export::NOTIFY, guard.handle())?;
        Ok(())
    }

    /// Stop the router. No-op when the guest does not implement `stop`.
    ///
    /// # Errors
    ///
    /// Guest trap and budget errors pass through.
    pub fn stop(&self) -> WasmResult<()> {
        self.loader.call_void(router_export::STOP)?;
        Ok(())
    }

    fn parse_indices(&self, text: &str, candidates: usize) -> WasmResult<Vec<usize>> {
        if text.is_empty() {
            return Ok(Vec::new());
        }
        text.split(',')
            .map(|part| {
                let index: usize =
                    part.trim()
                        .parse()
                        .map_err(|_| WasmError::InvalidGuestResult {
                            module: self.loader.wasm_name().to_string(),
                            detail: format!("'{part}' is not a candidate index"),
                        })?;
                if index >= candidates {
                    return Err(WasmError::InvalidGuestResult {
                        module: self.loader.wasm_name().to_string(),
                        detail: format!("index {index} out of range for {candidates} candidates"),
                    });
                }
                Ok(index)
            })
            .collect()
    }
}
