use std::{
    collections::HashMap,
    sync::Arc,
    time::{SystemTime, UNIX_EPOCH},
};

use log::{debug, error, info, warn};
use serde::Serialize;
use serde_json::Value;

use crate::{
    envelope::{CallbackId, Envelope},
    transport::Transport,
};

// -------------------------------------------------------------------------------------------------------

pub type HandlerResult = anyhow::Result<()>;

/// A local function the remote peer can call by name.
pub type Handler = Box<dyn FnMut(Value, Option<Responder>) -> HandlerResult + Send + 'static>;

/// Invoked at most once with the `responseData` of the matching response.
pub type ResponseCallback = Box<dyn FnOnce(Value) -> HandlerResult + Send + 'static>;

// -------------------------------------------------------------------------------------------------------

/// Handed to a handler when the remote caller expects a reply.
///
/// `respond` consumes the responder, so a call is answered at most once. Dropping it without
/// responding leaves the caller waiting (or lets its timeout run out).
pub struct Responder {
    handler_name: String,
    callback_id: CallbackId,
    transport: Arc<dyn Transport>,
}

impl Responder {
    pub fn callback_id(&self) -> &CallbackId {
        &self.callback_id
    }

    pub fn respond(self, response_data: Value) -> anyhow::Result<()> {
        self.transport.send(Envelope::response(
            self.handler_name,
            self.callback_id,
            response_data,
        ))
    }

    pub fn respond_with<T: Serialize>(self, response: &T) -> anyhow::Result<()> {
        let response_data = serde_json::to_value(response)?;
        self.respond(response_data)
    }
}

impl std::fmt::Debug for Responder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Responder")
            .field("handler_name", &self.handler_name)
            .field("callback_id", &self.callback_id)
            .finish_non_exhaustive()
    }
}

// -------------------------------------------------------------------------------------------------------

/// The arguments of an outbound call: an optional payload and an optional response callback.
///
/// A request made only of a callback carries `null` data, the same as
/// `CallRequest::with_data(Value::Null).on_response(..)`.
#[derive(Default)]
pub struct CallRequest {
    data: Value,
    on_response: Option<ResponseCallback>,
}

impl CallRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_data(data: impl Into<Value>) -> Self {
        CallRequest {
            data: data.into(),
            on_response: None,
        }
    }

    pub fn with_response<F>(on_response: F) -> Self
    where
        F: FnOnce(Value) -> HandlerResult + Send + 'static,
    {
        Self::new().on_response(on_response)
    }

    pub fn on_response<F>(mut self, on_response: F) -> Self
    where
        F: FnOnce(Value) -> HandlerResult + Send + 'static,
    {
        self.on_response = Some(Box::new(on_response));
        self
    }

    pub fn data(&self) -> &Value {
        &self.data
    }

    pub fn expects_response(&self) -> bool {
        self.on_response.is_some()
    }
}

impl From<Value> for CallRequest {
    fn from(data: Value) -> Self {
        CallRequest::with_data(data)
    }
}

impl From<()> for CallRequest {
    fn from(_: ()) -> Self {
        CallRequest::new()
    }
}

impl std::fmt::Debug for CallRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallRequest")
            .field("data", &self.data)
            .field("expects_response", &self.expects_response())
            .finish()
    }
}

// -------------------------------------------------------------------------------------------------------

/// What became of an inbound envelope. Only handler and callback failures are errors;
/// everything here is absorbed by the bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// a registered handler ran
    HandlerInvoked,
    /// a pending callback received its response
    ResponseDelivered,
    /// the call named a handler that was never registered
    UnregisteredHandler,
    /// the response id is unknown, already fulfilled or expired
    UnknownResponse,
}

// -------------------------------------------------------------------------------------------------------

/// Correlation state of one bridge: registered handlers and callbacks awaiting a response.
///
/// All methods take `&mut self`; concurrent use goes through [`crate::actor::BridgeActor`].
pub struct MessageBridge {
    transport: Arc<dyn Transport>,
    handlers: HashMap<String, Handler>,
    pending_callbacks: HashMap<CallbackId, ResponseCallback>,
    last_callback_id: u64,
}

impl MessageBridge {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        MessageBridge {
            transport,
            handlers: HashMap::new(),
            pending_callbacks: HashMap::new(),
            last_callback_id: 0,
        }
    }

    pub fn register_handler<F>(&mut self, name: impl Into<String>, handler: F)
    where
        F: FnMut(Value, Option<Responder>) -> HandlerResult + Send + 'static,
    {
        self.register_boxed_handler(name.into(), Box::new(handler));
    }

    pub fn register_boxed_handler(&mut self, name: String, handler: Handler) {
        match self.handlers.insert(name.clone(), handler) {
            Some(_) => info!("Handler {} already existed and was overwritten", name),
            None => debug!("Handler {} registered", name),
        }
    }

    pub fn has_handler(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    /// Sends a call to the remote peer. A response, if requested, arrives later through
    /// [`MessageBridge::dispatch`].
    pub fn call_handler(&mut self, name: impl Into<String>, request: impl Into<CallRequest>) {
        self.send_call(name.into(), request.into());
    }

    /// Like [`MessageBridge::call_handler`], but hands back the id under which the response
    /// callback is waiting, if any.
    pub fn send_call(&mut self, name: String, request: CallRequest) -> Option<CallbackId> {
        let CallRequest { data, on_response } = request;

        let callback_id = on_response.map(|on_response| {
            let callback_id = self.next_callback_id();
            self.pending_callbacks
                .insert(callback_id.clone(), on_response);
            callback_id
        });

        let envelope = Envelope::call(name.clone(), data, callback_id.clone());

        if let Err(err) = self.transport.send(envelope) {
            error!("Failed to send call to handler {}: {:#}", name, err);
            // nothing will ever answer this id
            if let Some(id) = &callback_id {
                self.pending_callbacks.remove(id);
            }
            return None;
        }

        callback_id
    }

    /// Routes an inbound envelope to a pending callback or a registered handler.
    ///
    /// Errors returned by the handler or callback are passed through unchanged. A pending
    /// callback is removed before it runs, whatever it returns.
    pub fn dispatch(&mut self, envelope: Envelope) -> anyhow::Result<DispatchOutcome> {
        match envelope {
            Envelope::Response {
                response_id,
                response_data,
                ..
            } => {
                let Some(on_response) = self.pending_callbacks.remove(&response_id) else {
                    debug!("Dropping response for unknown callback {}", response_id);
                    return Ok(DispatchOutcome::UnknownResponse);
                };

                on_response(response_data)?;
                Ok(DispatchOutcome::ResponseDelivered)
            }

            Envelope::Call {
                handler_name,
                data,
                callback_id,
            } => {
                let Some(handler) = self.handlers.get_mut(&handler_name) else {
                    warn!(
                        "No handler for message from remote: {} (callback: {:?}, data: {})",
                        handler_name, callback_id, data
                    );
                    return Ok(DispatchOutcome::UnregisteredHandler);
                };

                let responder = callback_id.map(|callback_id| Responder {
                    handler_name: handler_name.clone(),
                    callback_id,
                    transport: self.transport.clone(),
                });

                handler(data, responder)?;
                Ok(DispatchOutcome::HandlerInvoked)
            }
        }
    }

    /// Gives up on a pending callback without invoking it. Returns whether it was still pending.
    pub fn expire_callback(&mut self, callback_id: &CallbackId) -> bool {
        self.pending_callbacks.remove(callback_id).is_some()
    }

    pub fn is_pending(&self, callback_id: &CallbackId) -> bool {
        self.pending_callbacks.contains_key(callback_id)
    }

    pub fn pending_callbacks(&self) -> usize {
        self.pending_callbacks.len()
    }

    /// Kept for callers written against the old web view bridge. Does nothing.
    pub fn disable_javascript_alert_box_safety_timeout(&self) {}

    fn next_callback_id(&mut self) -> CallbackId {
        self.last_callback_id += 1;
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_millis())
            .unwrap_or_default();
        CallbackId(format!("cb_{}_{}", self.last_callback_id, millis))
    }
}

impl std::fmt::Debug for MessageBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut handlers: Vec<_> = self.handlers.keys().collect();
        handlers.sort();
        f.debug_struct("MessageBridge")
            .field("handlers", &handlers)
            .field("pending_callbacks", &self.pending_callbacks.len())
            .finish_non_exhaustive()
    }
}
