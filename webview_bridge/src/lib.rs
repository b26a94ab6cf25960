//! A message bridge between script code in an embedded web view and the native host.
//!
//! Either side calls named handlers on the other, optionally waiting for a response that is
//! matched to the call by a callback id. The wire format is the json envelope used by the
//! classic `WebViewJavascriptBridge`:
//!
//! ```text
//! call:     { "handlerName": "..", "data": .., "callbackId": "cb_1_1700000000000" }
//! response: { "handlerName": "..", "responseId": "cb_1_1700000000000", "responseData": .. }
//! ```
//!
//! [`bridge::MessageBridge`] holds the correlation state, [`actor::BridgeActor`] gives it a
//! single owner on top of a sink/source transport, and [`install`] keeps one bridge per process.

pub mod actor;
pub mod bridge;
pub mod envelope;
pub mod install;
pub mod transport;

pub use actor::{BridgeConfig, BridgeHandle, connect};
pub use bridge::{CallRequest, DispatchOutcome, MessageBridge, Responder};
pub use envelope::{CallbackId, Envelope};
pub use install::{BridgeSlot, install, installed, on_bridge_ready};
pub use transport::{Transport, TransportMessage, TransportSink, TransportSource};
