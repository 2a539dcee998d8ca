//! Extension-contract bridges driving sandboxed WASM modules.
//!
//! Each bridge maps one Lattice extension contract (routing, load balancing,
//! registry, service discovery, filtering, protocol, remoting, dynamic
//! configuration) onto the generic call protocol of
//! [`lattice_wasm_runtime`]:
//!
//! 1. encode the real arguments and bind them under a fresh handle,
//! 2. invoke the resolved guest export with the handle as its only argument,
//! 3. let the guest pull arguments and push results through the byte channel,
//! 4. release the handle and translate the raw result into the domain type.
//!
//! Handles are freshly generated per call; the registry rejects reuse of a
//! live handle, so concurrent bridges over separate modules never collide.
//!
//! # Example
//!
//! ```no_run
//! use lattice_wasm_bridges::model::{Invocation, Invoker, Url};
//! use lattice_wasm_bridges::WasmLoadBalance;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let balancer = WasmLoadBalance::from_file("extensions/RandomLoadBalance.wasm")?;
//! let candidates = vec![
//!     Invoker::new("a", Url::new("10.0.0.1:20880")),
//!     Invoker::new("b", Url::new("10.0.0.2:20880")),
//! ];
//! let picked = balancer.select(
//!     &candidates,
//!     &Url::new("consumer://10.0.0.9"),
//!     &Invocation::new("demo.Greeter", "greet"),
//! )?;
//! # let _ = picked;
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_op_in_unsafe_fn, clippy::unwrap_used)]
#![warn(missing_docs, rust_2018_idioms)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod channel;
mod codec;
pub mod config;
pub mod filter;
pub mod loadbalance;
pub mod model;
pub mod protocol;
pub mod registry;
pub mod router;
pub mod service_discovery;

pub use channel::WasmChannel;
pub use config::WasmDynamicConfiguration;
pub use filter::WasmFilter;
pub use loadbalance::WasmLoadBalance;
pub use protocol::{WasmExporter, WasmInvoker, WasmProtocol};
pub use registry::WasmRegistry;
pub use router::WasmRouter;
pub use service_discovery::WasmServiceDiscovery;
