//! Sandboxed WASM extension runtime for Lattice.
//!
//! This crate loads RPC-framework extensions compiled to WebAssembly and
//! mediates every call across the host/guest trust boundary. It uses wasmtime
//! with optional execution budgets (fuel, epoch interruption) so a misbehaving
//! extension cannot hang or destabilize the host.
//!
//! # Architecture
//!
//! - [`WasmLoader`]: Loads one guest module and owns its store, linear
//!   memory, resolved exports, and handle registry
//! - [`HandleRegistry`] / [`HandleGuard`]: The per-loader correlation table
//!   that stands in for object references the guest cannot hold
//! - [`ExecutionBudget`]: Optional fuel and interruption limits applied to
//!   every guest call
//! - [`ByteSink`]: Bridge-specific push-shaped host functions, registered
//!   alongside the core `get_args` / `put_result` pair
//!
//! # Safety Guarantees
//!
//! - **Memory Isolation**: The guest only ever addresses its own exported
//!   linear memory; all host-side copies are bounds-checked
//! - **Execution Limits**: Fuel metering and epoch interruption surface as a
//!   distinct budget-exhaustion error, not a generic trap
//! - **No Shared Mutable State**: Each loader owns its own engine, store,
//!   and handle registry; separate loaders never interfere
//! - **Trap Handling**: Guest faults are caught and reported; the handle
//!   bound for the failing call is always released
//!
//! # Example
//!
//! ```no_run
//! use lattice_wasm_runtime::{ExecutionBudget, WasmLoader};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let loader = WasmLoader::builder()
//!     .file("extensions/TagRouter.wasm")
//!     .budget(ExecutionBudget::default().with_fuel(5_000_000))
//!     .build()?;
//!
//! let guard = loader.bind_args(b"tag=canary".to_vec());
//! loader
//!     .call_handle("route", guard.handle())?
//!     .ok_or_else(|| loader.missing_export("route"))?;
//! let routed = guard.take_result();
//! # let _ = routed;
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_op_in_unsafe_fn, clippy::unwrap_used)]
#![warn(missing_docs, rust_2018_idioms)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod budget;
pub mod error;
pub mod handle;
pub mod host;
pub mod loader;
pub mod state;

pub use budget::ExecutionBudget;
pub use error::{WasmError, WasmResult};
pub use handle::{Handle, HandleGuard, HandleRegistry};
pub use host::ByteSink;
pub use loader::{ModuleState, WasmLoader, WasmLoaderBuilder, wasm_file_name};
pub use state::ExtensionState;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_budget_default_is_unlimited() {
        let budget = ExecutionBudget::default();
        assert!(!budget.is_limited());
    }

    #[test]
    fn test_wasm_file_name() {
        assert_eq!(wasm_file_name("RandomLoadBalance"), "RandomLoadBalance.wasm");
    }
}
