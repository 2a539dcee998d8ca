//! Error types for the WASM extension runtime.
//!
//! Load-time failures (missing file, invalid bytecode, link errors, missing
//! `memory` export) are fatal to the bridge instance and surface at
//! construction. `MissingExport` surfaces at first use of the operation that
//! needs the export. `GuestTrap` and `BudgetExhausted` are per-call runtime
//! failures, kept distinct so callers can tell "the extension is broken"
//! apart from "the extension ran out of budget".

use std::path::PathBuf;

use thiserror::Error;

/// WASM extension runtime result type.
pub type WasmResult<T> = Result<T, WasmError>;

/// WASM extension runtime errors.
#[derive(Error, Debug)]
pub enum WasmError {
    /// The named module file could not be located or read.
    #[error("can't find wasm file: {}", path.display())]
    ModuleNotFound {
        /// Path that was probed.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The module bytes are not valid WebAssembly.
    #[error("invalid wasm module {name}: {reason}")]
    InvalidModule {
        /// Module name.
        name: String,
        /// Compiler diagnostic.
        reason: String,
    },

    /// Instantiation failed, typically an unresolved import.
    #[error("failed to link wasm module {name}: {reason}")]
    LinkFailed {
        /// Module name.
        name: String,
        /// Linker diagnostic.
        reason: String,
    },

    /// The module does not export its linear memory under `memory`.
    #[error("memory export not found in wasm file: {name}")]
    MemoryNotExported {
        /// Module name.
        name: String,
    },

    /// A required contract function is absent from the loaded module.
    #[error("{function} function not found in {module}")]
    MissingExport {
        /// Contract function name.
        function: &'static str,
        /// Module name.
        module: String,
    },

    /// The guest function faulted during execution.
    #[error("wasm module {module} trapped: {reason}")]
    GuestTrap {
        /// Module name.
        module: String,
        /// Trap diagnostic.
        reason: String,
    },

    /// The configured execution budget (fuel or epoch deadline) ran out.
    #[error("execution budget exhausted in wasm module {module}")]
    BudgetExhausted {
        /// Module name.
        module: String,
    },

    /// The module has been closed; no transition leaves this state.
    #[error("wasm module {module} is closed")]
    Closed {
        /// Module name.
        module: String,
    },

    /// A caller-determined handle collided with a live entry.
    #[error("handle {0} is already bound to an in-flight call")]
    HandleInUse(u64),

    /// The guest returned something the bridge cannot interpret.
    #[error("wasm module {module} returned an invalid result: {detail}")]
    InvalidGuestResult {
        /// Module name.
        module: String,
        /// What was wrong with the result.
        detail: String,
    },

    /// Bridge-side argument encoding failed.
    #[error("failed to encode call arguments: {0}")]
    EncodeArgs(String),

    /// A bridge operation was called with unusable host-side arguments.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Underlying runtime error from wasmtime.
    #[error("wasm runtime error: {0}")]
    Runtime(#[from] wasmtime::Error),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl WasmError {
    /// Check if this error belongs to the fatal load-time family.
    #[must_use]
    pub fn is_load_error(&self) -> bool {
        matches!(
            self,
            Self::ModuleNotFound { .. }
                | Self::InvalidModule { .. }
                | Self::LinkFailed { .. }
                | Self::MemoryNotExported { .. }
        )
    }

    /// Check if this error indicates a guest trap.
    #[must_use]
    pub fn is_guest_trap(&self) -> bool {
        matches!(self, Self::GuestTrap { .. })
    }

    /// Check if this error indicates an exhausted execution budget.
    #[must_use]
    pub fn is_budget_exhausted(&self) -> bool {
        matches!(self, Self::BudgetExhausted { .. })
    }

    /// Create a missing-export error.
    #[must_use]
    pub fn missing_export(function: &'static str, module: impl Into<String>) -> Self {
        Self::MissingExport {
            function,
            module: module.into(),
        }
    }
}
