//! Protocol bridge: refer/export and the invokers and exporters they
//! produce, implemented by a guest module.
//!
//! One guest module backs the protocol and everything it hands out; the
//! produced [`WasmInvoker`]s and [`WasmExporter`]s share the protocol's
//! loader, so their guest calls serialize with the protocol's own.

use std::sync::Arc;

use lattice_wasm_abi::{exporter_export, invoker_export, protocol_export};
use lattice_wasm_runtime::{WasmLoader, WasmResult};
use serde::Serialize;

use crate::codec;
use crate::model::{Invocation, Invoker, RpcResult, Url};

#[derive(Serialize)]
struct ReferArgs<'a> {
    url: &'a Url,
}

#[derive(Serialize)]
struct ExportArgs<'a> {
    invoker: &'a Invoker,
}

/// RPC protocol over a sandboxed guest module.
pub struct WasmProtocol {
    loader: Arc<WasmLoader>,
}

impl WasmProtocol {
    /// Wrap an already loaded module.
    #[must_use]
    pub fn new(loader: WasmLoader) -> Self {
        Self {
            loader: Arc::new(loader),
        }
    }

    /// Load the protocol module from a file.
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

    /// Refer a remote service, producing an invoker for it.
    ///
    /// # Errors
    ///
    /// [`lattice_wasm_runtime::WasmError::MissingExport`] when the guest
    /// lacks `refer`; guest trap and budget errors pass through.
    pub fn refer(&self, url: &Url) -> WasmResult<WasmInvoker> {
        let guard = self
            .loader
            .bind_args(codec::to_json_bytes(&ReferArgs { url })?);
        self.loader
            .call_handle(protocol_export::REFER, guard.handle())?
            .ok_or_else(|| self.loader.missing_export(protocol_export::REFER))?;

        let ack = guard
            .take_result()
            .map(|bytes| codec::utf8_result(self.loader.wasm_name(), bytes))
            .transpose()?;
        Ok(WasmInvoker {
            loader: Arc::clone(&self.loader),
            url: url.clone(),
            ack,
        })
    }

    /// Export a local service, producing an exporter for it.
    ///
    /// # Errors
    ///
    /// Same failure modes as [`WasmProtocol::refer`], for `export`.
    pub fn export(&self, invoker: &Invoker) -> WasmResult<WasmExporter> {
        let guard = self
            .loader
            .bind_args(codec::to_json_bytes(&ExportArgs { invoker })?);
        self.loader
            .call_handle(protocol_export::EXPORT, guard.handle())?
            .ok_or_else(|| self.loader.missing_export(protocol_export::EXPORT))?;

        let ack = guard
            .take_result()
            .map(|bytes| codec::utf8_result(self.loader.wasm_name(), bytes))
            .transpose()?;
        Ok(WasmExporter {
            loader: Arc::clone(&self.loader),
            invoker: invoker.clone(),
            ack,
        })
    }

    /// Destroy the protocol: tell the guest if it cares, then close the
    /// module. Guest errors on this path are logged, never returned.
    pub fn destroy(&self) {
        if let Err(err) = self.loader.call_void(invoker_export::DESTROY_ALL) {
            tracing::warn!(module = %self.loader.wasm_name(), %err, "destroyAll failed");
        }
        self.loader.close();
    }
}

/// An invoker referred from a [`WasmProtocol`].
pub struct WasmInvoker {
    loader: Arc<WasmLoader>,
    url: Url,
    ack: Option<String>,
}

impl WasmInvoker {
    /// The referred service URL.
    #[must_use]
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Whatever the guest pushed back while referring, if anything.
    #[must_use]
    pub fn ack(&self) -> Option<&str> {
        self.ack.as_deref()
    }

    /// Invoke the remote service through the guest.
    ///
    /// # Errors
    ///
    /// [`lattice_wasm_runtime::WasmError::MissingExport`] when the guest
    /// lacks `doInvoke`; guest trap and budget errors pass through.
    pub fn invoke(&self, invocation: &Invocation) -> WasmResult<RpcResult> {
        let guard = self.loader.bind_args(codec::to_json_bytes(invocation)?);
        self.loader
            .call_handle(invoker_export::DO_INVOKE, guard.handle())?
            .ok_or_else(|| self.loader.missing_export(invoker_export::DO_INVOKE))?;

        let value = guard
            .take_result()
            .map(|bytes| codec::utf8_result(self.loader.wasm_name(), bytes))
            .transpose()?;
        Ok(RpcResult { value })
    }

    /// Destroy this invoker. No-op when the guest does not implement
    /// `destroy`; guest errors are logged, never returned.
    pub fn destroy(&self) {
        if let Err(err) = self.loader.call_void(invoker_export::DESTROY) {
            tracing::warn!(module = %self.loader.wasm_name(), %err, "destroy failed");
        }
    }
}

/// An exporter produced by [`WasmProtocol::export`].
pub struct WasmExporter {
    loader: Arc<WasmLoader>,
    invoker: Invoker,
    ack: Option<String>,
}

impl WasmExporter {
    /// The exported invoker.
    #[must_use]
    pub fn invoker(&self) -> &Invoker {
        &self.invoker
    }

    /// Whatever the guest pushed back while exporting, if anything.
    #[must_use]
    pub fn ack(&self) -> Option<&str> {
        self.ack.as_deref()
    }

    /// Withdraw the export. No-op when the guest does not implement
    /// `afterUnExport`; guest errors are logged, never returned.
    pub fn unexport(&self) {
        if let Err(err) = self.loader.call_void(exporter_export::AFTER_UN_EXPORT) {
            tracing::warn!(module = %self.loader.wasm_name(), %err, "afterUnExport failed");
        }
    }
}
