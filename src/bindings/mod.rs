//! Script Binding Layer
//!
//! Everything that knows about the concrete script side: the wire protocol
//! shared with the hosted context and a reference host built on QuickJS.
//!
//! Architecture:
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                 Hosted Script Context                        │
//! │   window["add"](2, 3)           window.external.invoke(text) │
//! │         │                                   ▲                │
//! └─────────┼───────────────────────────────────┼────────────────┘
//!           v                                   │
//! ┌──────────────────────────────────────────────────────────────┐
//! │     Wire Protocol (CallRequest / CallResponse, Codec)        │
//! └─────────┬───────────────────────────────────▲────────────────┘
//!           v                                   │
//! ┌──────────────────────────────────────────────────────────────┐
//! │   Bridge (registry, tracker, stubs, context queue)           │
//! └──────────────────────────────────────────────────────────────┘
//! ```

pub mod js;
pub mod protocol;

pub use js::QuickJsHost;
pub use protocol::{CallRequest, CallResponse, Codec, InboundMessage};
