//! Per-module store state.

use std::sync::Arc;

use wasmtime_wasi::p1::WasiP1Ctx;

use crate::handle::HandleRegistry;

/// State carried by each module's wasmtime store.
///
/// Host functions reach the handle registry through this state at call time;
/// the registry is the only data shared between the loader and the guest's
/// imports.
pub struct ExtensionState {
    /// WASI context for the guest's system interface.
    pub wasi: WasiP1Ctx,
    /// Handle registry owned by the loader this store belongs to.
    pub handles: Arc<HandleRegistry>,
}

impl ExtensionState {
    /// Create state for a new module store.
    #[must_use]
    pub fn new(wasi: WasiP1Ctx, handles: Arc<HandleRegistry>) -> Self {
        Self { wasi, handles }
    }
}
