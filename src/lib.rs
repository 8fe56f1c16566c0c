//! # Script Bridge
//!
//! A two-way RPC bridge between native Rust code and a hosted script
//! context that can only exchange opaque text messages.
//!
//! ## Features
//!
//! - **Exposed Functions**: typed Rust closures callable from script as `async` functions
//! - **Sync / Async Dispatch**: synchronous functions answer inline, asynchronous ones settle a [`ResolutionHandle`] from any thread
//! - **Native-to-Script Calls**: call script functions and await typed results
//! - **Context Lifecycle**: script text is queued until a context exists and replayed after navigation
//! - **Reference Host**: an embedded QuickJS context for testing and demos
//!
//! ## Architecture Design
//!
//! The bridge never touches the script engine directly:
//! - **Host**: owns the engine, implements [`ScriptHost`], forwards inbound messages
//! - **Bridge**: decodes, routes and tracks calls; emits script text
//! - **Context Queue**: carries that script text to the script thread
//!
//! ### Example
//!
//! ```ignore
//! use script_bridge::{Bridge, QuickJsHost, ScriptCall};
//!
//! let bridge = Bridge::with_defaults()?;
//! bridge.expose_sync("add", |a: i64, b: i64| a + b)?;
//!
//! let mut host = QuickJsHost::new()?;
//! host.attach(&bridge);
//! host.eval("add(2, 3).then(sum => console.log(sum));")?;
//! host.run_until_idle(&bridge);
//! ```
//!
//! ## Modules
//!
//! - [`core`]: Errors, macros and the async task scheduler
//! - [`config`]: Configuration and logging setup
//! - [`bindings`]: Wire protocol and the QuickJS host
//! - [`scripting`]: Script code generation and the script-thread hand-off
//! - [`bridge`]: The bridge controller, registry and call tracking

/// Errors, macros and the async task scheduler
pub mod core;
/// Configuration system
pub mod config;
/// Wire protocol and script host bindings
pub mod bindings;
/// Script-side code generation and thread hand-off
pub mod scripting;
/// Bridge controller
pub mod bridge;

pub use bindings::{CallRequest, CallResponse, Codec, InboundMessage, QuickJsHost};
pub use bridge::{
    Bridge, ControllerState, ExposedFunction, OutboundCall, ResolutionHandle, ScriptCall,
    WeakBridge,
};
pub use config::{init_logging, BridgeConfig};
pub use crate::core::{BridgeError, BridgeResult, CodecError};
pub use scripting::{ContextQueue, ScriptHost};
