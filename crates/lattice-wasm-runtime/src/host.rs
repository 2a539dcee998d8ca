//! Host functions exposed to guest modules.
//!
//! Two primitives cross the trust boundary, both registered under the
//! [`HOST_MODULE`] namespace and both addressed by `(handle, addr, len)`
//! against the guest's exported linear memory:
//!
//! - `get_args` pulls the handle's argument payload into guest memory,
//! - `put_result` pushes guest bytes back as the handle's result.
//!
//! A stale handle or an out-of-range memory access never traps the guest:
//! the host function logs a warning and reports zero bytes instead, keeping
//! the guest's execution path simple on protocol violations.

use std::sync::Arc;

use wasmtime::{Caller, Linker};

use lattice_wasm_abi::{HOST_MODULE, host_function, return_code, wasm_export};

use crate::WasmResult;
use crate::state::ExtensionState;

/// Bridge-specific push-shaped host callback.
///
/// Receives the handle and the bytes the guest wrote; registered under the
/// same namespace and `(handle, addr, len)` shape as `put_result`.
pub type ByteSink = Arc<dyn Fn(u64, Vec<u8>) + Send + Sync>;

/// Register the core `get_args` / `put_result` host functions.
pub(crate) fn register_host_functions(linker: &mut Linker<ExtensionState>) -> WasmResult<()> {
    linker.func_wrap(
        HOST_MODULE,
        host_function::GET_ARGS,
        |mut caller: Caller<'_, ExtensionState>, handle: i64, addr: i64, len: i32| -> i32 {
            get_args_impl(&mut caller, handle, addr, len)
        },
    )?;

    linker.func_wrap(
        HOST_MODULE,
        host_function::PUT_RESULT,
        |mut caller: Caller<'_, ExtensionState>, handle: i64, addr: i64, len: i32| -> i32 {
            put_result_impl(&mut caller, handle, addr, len)
        },
    )?;

    Ok(())
}

/// Register a bridge-specific push-shaped host function.
pub(crate) fn register_byte_sink(
    linker: &mut Linker<ExtensionState>,
    name: &str,
    sink: ByteSink,
) -> WasmResult<()> {
    linker.func_wrap(
        HOST_MODULE,
        name,
        move |mut caller: Caller<'_, ExtensionState>, handle: i64, addr: i64, len: i32| -> i32 {
            if let Some(bytes) = read_guest_bytes(&mut caller, addr, len) {
                sink(handle as u64, bytes);
            }
            return_code::SUCCESS
        },
    )?;
    Ok(())
}

/// Copy up to `len` bytes of the handle's argument payload into guest memory
/// at `addr`; returns bytes written.
fn get_args_impl(
    caller: &mut Caller<'_, ExtensionState>,
    handle: i64,
    addr: i64,
    len: i32,
) -> i32 {
    let Some(memory) = guest_memory(caller) else {
        return 0;
    };

    if addr < 0 || len <= 0 {
        return 0;
    }

    let handles = Arc::clone(&caller.data().handles);
    let Some(payload) = handles.args_prefix(handle as u64, len as usize) else {
        tracing::warn!(handle, "get_args called with a stale handle");
        return 0;
    };

    let start = addr as usize;
    let Some(end) = start.checked_add(payload.len()) else {
        return 0;
    };

    match memory.data_mut(caller).get_mut(start..end) {
        Some(dest) => {
            dest.copy_from_slice(&payload);
            payload.len() as i32
        }
        None => {
            tracing::warn!(handle, addr, len, "get_args destination out of bounds");
            0
        }
    }
}

/// Read `len` bytes from guest memory at `addr` and store them as the
/// handle's result; returns 0.
fn put_result_impl(
    caller: &mut Caller<'_, ExtensionState>,
    handle: i64,
    addr: i64,
    len: i32,
) -> i32 {
    let Some(bytes) = read_guest_bytes(caller, addr, len) else {
        return return_code::SUCCESS;
    };

    let handles = Arc::clone(&caller.data().handles);
    if !handles.push_result(handle as u64, bytes) {
        tracing::warn!(handle, "put_result called with a stale handle, result dropped");
    }
    return_code::SUCCESS
}

/// Fetch the guest's exported linear memory from the calling instance.
fn guest_memory(caller: &mut Caller<'_, ExtensionState>) -> Option<wasmtime::Memory> {
    match caller.get_export(wasm_export::MEMORY) {
        Some(wasmtime::Extern::Memory(memory)) => Some(memory),
        _ => {
            tracing::warn!("guest module has no linear memory export");
            None
        }
    }
}

/// Copy `len` bytes out of guest memory at `addr`, bounds-checked.
fn read_guest_bytes(
    caller: &mut Caller<'_, ExtensionState>,
    addr: i64,
    len: i32,
) -> Option<Vec<u8>> {
    let memory = guest_memory(caller)?;

    if addr < 0 || len < 0 {
        return None;
    }

    let start = addr as usize;
    let end = start.checked_add(len as usize)?;

    match memory.data(caller).get(start..end) {
        Some(data) => Some(data.to_vec()),
        None => {
            tracing::warn!(addr, len, "guest byte range out of bounds");
            None
        }
    }
}
