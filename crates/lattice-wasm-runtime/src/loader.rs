//! Module store: loads one guest module and mediates every call into it.
//!
//! A [`WasmLoader`] owns the compiled module, its isolated store and linear
//! memory, the registered host functions, and the cache of resolved guest
//! exports. Bridges create one loader per extension instance and drive all
//! guest calls through it.
//!
//! Lifecycle: `Unloaded -> Loading -> Ready -> [Calling]* -> Closed`.
//! `Calling` is exclusive per loader (guest calls on one module serialize on
//! an internal lock); independent loaders may run fully in parallel. Close is
//! terminal and idempotent; no transition leaves `Closed`.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use wasmtime::{Config, Engine, Func, Instance, Linker, Memory, Module, Store};

use lattice_wasm_abi::wasm_export;

use crate::budget::ExecutionBudget;
use crate::handle::{Handle, HandleGuard, HandleRegistry};
use crate::host::{self, ByteSink};
use crate::state::ExtensionState;
use crate::{WasmError, WasmResult};

/// File extension for guest modules.
const WASM_SUFFIX: &str = ".wasm";

/// Default module file name for an extension: `<base>.wasm`.
///
/// This is the whole naming strategy — a pure function from extension name
/// to file name, overridable by passing any other name to the builder.
#[must_use]
pub fn wasm_file_name(base: &str) -> String {
    if base.ends_with(WASM_SUFFIX) {
        base.to_string()
    } else {
        format!("{base}{WASM_SUFFIX}")
    }
}

/// Observable lifecycle state of a loader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleState {
    /// Loaded and idle; ready to accept a guest call.
    Ready,
    /// A guest call is in flight; further calls wait for it.
    Calling,
    /// Closed; terminal.
    Closed,
}

enum ModuleSource {
    Unset,
    Bytes(Vec<u8>),
    File(PathBuf),
}

/// Builder for [`WasmLoader`].
pub struct WasmLoaderBuilder {
    name: Option<String>,
    source: ModuleSource,
    budget: ExecutionBudget,
    sinks: Vec<(String, ByteSink)>,
}

impl Default for WasmLoaderBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl WasmLoaderBuilder {
    /// Create a builder with no source and an unlimited budget.
    #[must_use]
    pub fn new() -> Self {
        Self {
            name: None,
            source: ModuleSource::Unset,
            budget: ExecutionBudget::default(),
            sinks: Vec::new(),
        }
    }

    /// Load the module from a file on disk.
    #[must_use]
    pub fn file(mut self, path: impl Into<PathBuf>) -> Self {
        self.source = ModuleSource::File(path.into());
        self
    }

    /// Load the module from in-memory bytes.
    #[must_use]
    pub fn bytes(mut self, bytes: impl Into<Vec<u8>>) -> Self {
        self.source = ModuleSource::Bytes(bytes.into());
        self
    }

    /// Override the module name used in diagnostics and errors.
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(wasm_file_name(&name.into()));
        self
    }

    /// Apply an execution budget to every guest call.
    #[must_use]
    pub fn budget(mut self, budget: ExecutionBudget) -> Self {
        self.budget = budget;
        self
    }

    /// Register a bridge-specific push-shaped host function.
    ///
    /// The callback receives `(handle, bytes)` whenever the guest calls the
    /// named import with `(handle, addr, len)`.
    #[must_use]
    pub fn byte_sink(mut self, name: impl Into<String>, sink: ByteSink) -> Self {
        self.sinks.push((name.into(), sink));
        self
    }

    /// Load, link, and instantiate the module.
    ///
    /// Host functions are registered before instantiation so the guest's
    /// imports resolve; the guest's `memory` export is resolved immediately
    /// after, and its absence is fatal.
    ///
    /// # Errors
    ///
    /// Returns a load-family error if the module cannot be located, is not
    /// valid bytecode, fails to link, or does not export `memory`.
    pub fn build(self) -> WasmResult<WasmLoader> {
        let (wasm_name, wasm_bytes) = match self.source {
            ModuleSource::Unset => {
                return Err(WasmError::InvalidArgument(
                    "no wasm module source configured".to_string(),
                ));
            }
            ModuleSource::Bytes(bytes) => {
                let name = self.name.unwrap_or_else(|| "anonymous.wasm".to_string());
                (name, bytes)
            }
            ModuleSource::File(path) => {
                let name = self.name.unwrap_or_else(|| {
                    path.file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_else(|| path.to_string_lossy().into_owned())
                });
                let bytes = std::fs::read(&path)
                    .map_err(|source| WasmError::ModuleNotFound { path, source })?;
                (name, bytes)
            }
        };

        let mut config = Config::new();

        // Keep the sandbox narrow: no threads, no multi-value, no bulk memory.
        config.wasm_bulk_memory(false);
        config.wasm_multi_value(false);
        config.wasm_threads(false);

        config.consume_fuel(self.budget.max_fuel.is_some());
        config.epoch_interruption(self.budget.epoch_interruption);

        let engine = Engine::new(&config)?;

        let mut linker = Linker::new(&engine);
        wasmtime_wasi::p1::add_to_linker_sync(&mut linker, |s: &mut ExtensionState| &mut s.wasi)?;
        host::register_host_functions(&mut linker)?;
        for (name, sink) in self.sinks {
            host::register_byte_sink(&mut linker, &name, sink)?;
        }

        let module =
            Module::new(&engine, &wasm_bytes).map_err(|err| WasmError::InvalidModule {
                name: wasm_name.clone(),
                reason: err.to_string(),
            })?;

        let wasi = wasmtime_wasi::WasiCtxBuilder::new()
            .inherit_stdout()
            .inherit_stderr()
            .build_p1();

        let handles = Arc::new(HandleRegistry::new());
        let mut store = Store::new(&engine, ExtensionState::new(wasi, Arc::clone(&handles)));

        if let Some(fuel) = self.budget.max_fuel {
            store.set_fuel(fuel)?;
        }
        if self.budget.epoch_interruption {
            store.set_epoch_deadline(1);
        }

        let instance =
            linker
                .instantiate(&mut store, &module)
                .map_err(|err| WasmError::LinkFailed {
                    name: wasm_name.clone(),
                    reason: err.to_string(),
                })?;

        // The memory export must be resolved during loading; the loader is
        // non-operational without it.
        let memory = instance
            .get_memory(&mut store, wasm_export::MEMORY)
            .ok_or_else(|| WasmError::MemoryNotExported {
                name: wasm_name.clone(),
            })?;

        tracing::info!(module = %wasm_name, "loaded wasm extension module");

        Ok(WasmLoader {
            wasm_name,
            engine,
            budget: self.budget,
            handles,
            closed: AtomicBool::new(false),
            inner: Mutex::new(Some(LoaderInner {
                _module: module,
                store,
                instance,
                memory,
                exports: HashMap::new(),
            })),
        })
    }
}

struct LoaderInner {
    _module: Module,
    store: Store<ExtensionState>,
    instance: Instance,
    memory: Memory,
    /// Export resolution cache; `None` records a confirmed absence.
    exports: HashMap<&'static str, Option<Func>>,
}

/// One loaded guest module: the unit of lifecycle.
///
/// Calls on one loader serialize; separate loaders are fully independent.
pub struct WasmLoader {
    wasm_name: String,
    engine: Engine,
    budget: ExecutionBudget,
    handles: Arc<HandleRegistry>,
    closed: AtomicBool,
    inner: Mutex<Option<LoaderInner>>,
}

impl WasmLoader {
    /// Start building a loader.
    #[must_use]
    pub fn builder() -> WasmLoaderBuilder {
        WasmLoaderBuilder::new()
    }

    /// Load a module from a file with default options.
    ///
    /// # Errors
    ///
    /// Returns a load-family error; see [`WasmLoaderBuilder::build`].
    pub fn from_file(path: impl Into<PathBuf>) -> WasmResult<Self> {
        Self::builder().file(path).build()
    }

    /// Load a module from bytes with default options.
    ///
    /// # Errors
    ///
    /// Returns a load-family error; see [`WasmLoaderBuilder::build`].
    pub fn from_bytes(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> WasmResult<Self> {
        Self::builder().name(name).bytes(bytes).build()
    }

    /// The module's diagnostic name, e.g. `TagRouter.wasm`.
    #[must_use]
    pub fn wasm_name(&self) -> &str {
        &self.wasm_name
    }

    /// The handle registry owned by this loader.
    #[must_use]
    pub fn handles(&self) -> &Arc<HandleRegistry> {
        &self.handles
    }

    /// Bind an argument payload under a fresh handle.
    pub fn bind_args(&self, args: Vec<u8>) -> HandleGuard {
        self.handles.bind(args)
    }

    /// Observable lifecycle state.
    #[must_use]
    pub fn state(&self) -> ModuleState {
        if self.closed.load(Ordering::Acquire) {
            ModuleState::Closed
        } else if self.inner.is_locked() {
            ModuleState::Calling
        } else {
            ModuleState::Ready
        }
    }

    /// Whether the loader has been closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Check whether the guest implements the named export.
    ///
    /// The answer is cached for the loader's lifetime; absence is not an
    /// error here — required-vs-optional is the caller's decision.
    ///
    /// # Errors
    ///
    /// Returns [`WasmError::Closed`] after close.
    pub fn has_export(&self, name: &'static str) -> WasmResult<bool> {
        let mut inner = self.inner.lock();
        let inner = inner.as_mut().ok_or_else(|| self.closed_error())?;
        Ok(Self::resolve(inner, name).is_some())
    }

    /// A missing-export error naming this module, for required call sites.
    #[must_use]
    pub fn missing_export(&self, function: &'static str) -> WasmError {
        WasmError::missing_export(function, self.wasm_name.clone())
    }

    /// Invoke `name(handle: i64)`.
    ///
    /// Returns `Ok(None)` when the guest does not implement the export.
    ///
    /// # Errors
    ///
    /// [`WasmError::Closed`] after close; [`WasmError::GuestTrap`] or
    /// [`WasmError::BudgetExhausted`] when the call fails.
    pub fn call_handle(&self, name: &'static str, handle: Handle) -> WasmResult<Option<()>> {
        self.with_export(name, |store, func| {
            func.typed::<i64, ()>(&mut *store)?
                .call(&mut *store, handle as i64)
        })
    }

    /// Invoke `name(handle: i64) -> i32`.
    ///
    /// Returns `Ok(None)` when the guest does not implement the export.
    ///
    /// # Errors
    ///
    /// Same failure modes as [`WasmLoader::call_handle`].
    pub fn call_handle_i32(&self, name: &'static str, handle: Handle) -> WasmResult<Option<i32>> {
        self.with_export(name, |store, func| {
            func.typed::<i64, i32>(&mut *store)?
                .call(&mut *store, handle as i64)
        })
    }

    /// Invoke `name() -> i32`.
    ///
    /// Returns `Ok(None)` when the guest does not implement the export.
    ///
    /// # Errors
    ///
    /// Same failure modes as [`WasmLoader::call_handle`].
    pub fn call_i32(&self, name: &'static str) -> WasmResult<Option<i32>> {
        self.with_export(name, |store, func| {
            func.typed::<(), i32>(&mut *store)?.call(&mut *store, ())
        })
    }

    /// Invoke `name()`.
    ///
    /// Returns `Ok(None)` when the guest does not implement the export.
    ///
    /// # Errors
    ///
    /// Same failure modes as [`WasmLoader::call_handle`].
    pub fn call_void(&self, name: &'static str) -> WasmResult<Option<()>> {
        self.with_export(name, |store, func| {
            func.typed::<(), ()>(&mut *store)?.call(&mut *store, ())
        })
    }

    /// Current size of the guest's linear memory in bytes.
    ///
    /// # Errors
    ///
    /// Returns [`WasmError::Closed`] after close.
    pub fn memory_data_size(&self) -> WasmResult<usize> {
        let mut inner = self.inner.lock();
        let inner = inner.as_mut().ok_or_else(|| self.closed_error())?;
        Ok(inner.memory.data_size(&inner.store))
    }

    /// Interrupt an in-flight guest call from another thread.
    ///
    /// Only effective when the loader was built with epoch interruption;
    /// the interrupted call fails with [`WasmError::BudgetExhausted`].
    pub fn interrupt(&self) {
        if self.budget.epoch_interruption {
            self.engine.increment_epoch();
        }
    }

    /// Close the loader, releasing the store, instance, and compiled module.
    ///
    /// Idempotent: the second and later calls are no-ops. Safe to call from
    /// a thread other than the calling thread; it waits for any in-flight
    /// guest call to finish. Never returns an error — teardown is often
    /// driven from shutdown paths with nobody left to observe one.
    pub fn close(&self) {
        if self
            .closed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            *self.inner.lock() = None;
            tracing::info!(module = %self.wasm_name, "closed wasm extension module");
        }
    }

    fn closed_error(&self) -> WasmError {
        WasmError::Closed {
            module: self.wasm_name.clone(),
        }
    }

    fn resolve(inner: &mut LoaderInner, name: &'static str) -> Option<Func> {
        if let Some(cached) = inner.exports.get(name) {
            return *cached;
        }
        let resolved = inner.instance.get_func(&mut inner.store, name);
        inner.exports.insert(name, resolved);
        resolved
    }

    fn with_export<R>(
        &self,
        name: &'static str,
        call: impl FnOnce(&mut Store<ExtensionState>, Func) -> Result<R, wasmtime::Error>,
    ) -> WasmResult<Option<R>> {
        let mut inner = self.inner.lock();
        let inner = inner.as_mut().ok_or_else(|| self.closed_error())?;

        let Some(func) = Self::resolve(inner, name) else {
            return Ok(None);
        };

        if let Some(fuel) = self.budget.max_fuel {
            inner.store.set_fuel(fuel)?;
        }
        if self.budget.epoch_interruption {
            inner.store.set_epoch_deadline(1);
        }

        match call(&mut inner.store, func) {
            Ok(value) => Ok(Some(value)),
            Err(err) => Err(self.map_call_error(err)),
        }
    }

    fn map_call_error(&self, err: wasmtime::Error) -> WasmError {
        if let Some(trap) = err.downcast_ref::<wasmtime::Trap>() {
            return match trap {
                wasmtime::Trap::OutOfFuel | wasmtime::Trap::Interrupt => {
                    WasmError::BudgetExhausted {
                        module: self.wasm_name.clone(),
                    }
                }
                _ => WasmError::GuestTrap {
                    module: self.wasm_name.clone(),
                    reason: trap.to_string(),
                },
            };
        }
        WasmError::GuestTrap {
            module: self.wasm_name.clone(),
            reason: err.to_string(),
        }
    }
}

impl Drop for WasmLoader {
    fn drop(&mut self) {
        // Safety net mirroring the original's process-exit hook.
        self.close();
    }
}
