use std::sync::Arc;

use anyhow::anyhow;
use futures::{StreamExt, channel::mpsc::UnboundedReceiver, channel::oneshot};
use log::{debug, error, info, warn};
use ractor::{
    Actor, ActorProcessingErr, ActorRef, ActorStatus, RpcReplyPort, async_trait,
    concurrency::{Duration, JoinHandle},
    rpc::CallResult,
};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;

use crate::{
    bridge::{CallRequest, Handler, HandlerResult, MessageBridge, Responder},
    envelope::{CallbackId, Envelope},
    transport::{
        ChannelTransport, Transport, TransportError, TransportMessage, TransportSink,
        TransportSource,
    },
};

// -------------------------------------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BridgeConfig {
    /// shows up in log lines, e.g. the url loaded into the web view
    pub identifier: String,
    /// drop response callbacks that have not been answered within this time.
    /// `None` keeps them until the bridge goes away.
    pub response_timeout: Option<Duration>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        BridgeConfig {
            identifier: "webview".to_string(),
            response_timeout: None,
        }
    }
}

// -------------------------------------------------------------------------------------------------------

// Messages for the bridge actor
pub enum BridgeActorMessage {
    /// a frame received from the transport
    Inbound(TransportMessage),

    RegisterHandler(String, Handler),
    CallHandler(String, CallRequest),

    /// sent to itself when a response timeout runs out
    ExpireCallback(CallbackId),

    PendingCallbacks(RpcReplyPort<usize>),
    Close,
}

impl std::fmt::Debug for BridgeActorMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BridgeActorMessage::Inbound(msg) => f.debug_tuple("Inbound").field(msg).finish(),
            BridgeActorMessage::RegisterHandler(name, _) => {
                f.debug_tuple("RegisterHandler").field(name).finish()
            }
            BridgeActorMessage::CallHandler(name, request) => f
                .debug_tuple("CallHandler")
                .field(name)
                .field(request)
                .finish(),
            BridgeActorMessage::ExpireCallback(id) => {
                f.debug_tuple("ExpireCallback").field(id).finish()
            }
            BridgeActorMessage::PendingCallbacks(_) => f.write_str("PendingCallbacks"),
            BridgeActorMessage::Close => f.write_str("Close"),
        }
    }
}

// Bridge actor
pub struct BridgeActor;

pub struct BridgeActorState {
    config: BridgeConfig,
    bridge: MessageBridge,
}

pub struct BridgeActorArgs {
    pub config: BridgeConfig,
    pub transport: Arc<dyn Transport>,
}

impl BridgeActor {
    fn dispatch(state: &mut BridgeActorState, envelope: Envelope) {
        let handler_name = envelope.handler_name().to_string();
        match state.bridge.dispatch(envelope) {
            Ok(outcome) => debug!(
                "{}: dispatched message for {}: {:?}",
                state.config.identifier, handler_name, outcome
            ),
            // the actor keeps running, one failing handler must not take the bridge down
            Err(err) => error!(
                "{}: handler {} failed: {:#}",
                state.config.identifier, handler_name, err
            ),
        }
    }
}

#[async_trait]
impl Actor for BridgeActor {
    type Msg = BridgeActorMessage;
    type State = BridgeActorState;
    type Arguments = BridgeActorArgs;

    async fn pre_start(
        &self,
        _myself: ActorRef<Self::Msg>,
        args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        info!("Bridge actor for {} started", args.config.identifier);
        Ok(BridgeActorState {
            bridge: MessageBridge::new(args.transport),
            config: args.config,
        })
    }

    async fn handle(
        &self,
        myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            BridgeActorMessage::Inbound(TransportMessage::Text(text)) => {
                match Envelope::decode(&text) {
                    Ok(envelope) => Self::dispatch(state, envelope),
                    Err(err) => warn!(
                        "{}: dropping undecodable text message: {:#}",
                        state.config.identifier, err
                    ),
                }
            }
            BridgeActorMessage::Inbound(TransportMessage::Binary(data)) => {
                match Envelope::decode_slice(&data) {
                    Ok(envelope) => Self::dispatch(state, envelope),
                    Err(err) => warn!(
                        "{}: dropping undecodable binary message ({} bytes): {:#}",
                        state.config.identifier,
                        data.len(),
                        err
                    ),
                }
            }
            BridgeActorMessage::Inbound(TransportMessage::Close(reason)) => {
                info!(
                    "Transport to {} closed because of reason: {:?}",
                    state.config.identifier, reason
                );
                myself.stop(reason);
            }

            BridgeActorMessage::RegisterHandler(name, handler) => {
                state.bridge.register_boxed_handler(name, handler);
            }

            BridgeActorMessage::CallHandler(name, request) => {
                let callback_id = state.bridge.send_call(name, request);

                if let (Some(callback_id), Some(timeout)) =
                    (callback_id, state.config.response_timeout)
                {
                    let _ = myself.send_after(timeout, move || {
                        BridgeActorMessage::ExpireCallback(callback_id)
                    });
                }
            }

            BridgeActorMessage::ExpireCallback(callback_id) => {
                if state.bridge.expire_callback(&callback_id) {
                    warn!(
                        "{}: no response for {} within {:?}, dropping the callback",
                        state.config.identifier, callback_id, state.config.response_timeout
                    );
                }
            }

            BridgeActorMessage::PendingCallbacks(reply) => {
                reply.send(state.bridge.pending_callbacks())?;
            }

            BridgeActorMessage::Close => {
                info!("Closing bridge to {}", state.config.identifier);
                myself.stop(Some("Bridge closed".into()));
            }
        }
        Ok(())
    }

    async fn post_stop(
        &self,
        _myself: ActorRef<Self::Msg>,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        let abandoned = state.bridge.pending_callbacks();
        if abandoned > 0 {
            warn!(
                "Bridge to {} stopped with {} unanswered calls",
                state.config.identifier, abandoned
            );
        } else {
            info!("Bridge to {} stopped", state.config.identifier);
        }
        Ok(())
    }
}

// -------------------------------------------------------------------------------------------------------

/// wrap the `ActorRef<BridgeActorMessage>` in a more user-friendly interface
#[derive(Clone, Debug)]
pub struct BridgeHandle {
    actor: ActorRef<BridgeActorMessage>,
    /// `None` once some clone has seen the actor exit
    join_handle: Arc<tokio::sync::Mutex<Option<JoinHandle<()>>>>,
}

impl BridgeHandle {
    pub fn new(actor: ActorRef<BridgeActorMessage>, join_handle: JoinHandle<()>) -> Self {
        BridgeHandle {
            actor,
            join_handle: Arc::new(tokio::sync::Mutex::new(Some(join_handle))),
        }
    }

    pub fn actor(&self) -> &ActorRef<BridgeActorMessage> {
        &self.actor
    }

    pub fn register_handler<F>(&self, name: impl Into<String>, handler: F) -> anyhow::Result<()>
    where
        F: FnMut(Value, Option<Responder>) -> HandlerResult + Send + 'static,
    {
        self.cast(BridgeActorMessage::RegisterHandler(
            name.into(),
            Box::new(handler),
        ))
    }

    /// Registers a handler that works on typed values. The call data is deserialized into
    /// `Req`; the returned `Resp` is sent back if the caller asked for a reply.
    pub fn register_typed_handler<Req, Resp, F>(
        &self,
        name: impl Into<String>,
        mut handler: F,
    ) -> anyhow::Result<()>
    where
        Req: DeserializeOwned,
        Resp: Serialize,
        F: FnMut(Req) -> anyhow::Result<Resp> + Send + 'static,
    {
        self.register_handler(name, move |data, responder| {
            let request: Req = serde_json::from_value(data)?;
            let response = handler(request)?;
            if let Some(responder) = responder {
                responder.respond_with(&response)?;
            }
            Ok(())
        })
    }

    pub fn call_handler(
        &self,
        name: impl Into<String>,
        request: impl Into<CallRequest>,
    ) -> anyhow::Result<()> {
        self.cast(BridgeActorMessage::CallHandler(name.into(), request.into()))
    }

    /// Calls a remote handler and waits for its response.
    ///
    /// Fails if the bridge drops the callback first, i.e. the response timeout ran out or
    /// the bridge stopped.
    pub async fn ask(
        &self,
        name: impl Into<String>,
        data: impl Into<Value>,
    ) -> anyhow::Result<Value> {
        let name = name.into();
        let (tx, rx) = oneshot::channel();

        let request = CallRequest::with_data(data).on_response(move |response_data| {
            // the asking side may have stopped waiting
            let _ = tx.send(response_data);
            Ok(())
        });
        self.call_handler(name.clone(), request)?;

        rx.await
            .map_err(|_| anyhow!("no response from remote handler {}", name))
    }

    pub async fn ask_typed<Req, Resp>(
        &self,
        name: impl Into<String>,
        request: &Req,
    ) -> anyhow::Result<Resp>
    where
        Req: Serialize,
        Resp: DeserializeOwned,
    {
        let data = serde_json::to_value(request)?;
        let response = self.ask(name, data).await?;
        Ok(serde_json::from_value(response)?)
    }

    /// number of outbound calls still waiting for a response
    pub async fn pending_callbacks(&self) -> anyhow::Result<usize> {
        let call_result = self
            .actor
            .call(BridgeActorMessage::PendingCallbacks, None)
            .await
            .map_err(|err| anyhow!("bridge actor {} is gone: {}", self.actor.get_id(), err))?;

        match call_result {
            CallResult::Success(count) => Ok(count),
            CallResult::Timeout => Err(anyhow!(
                "pending_callbacks: timeout of bridge actor {}",
                self.actor.get_id()
            )),
            CallResult::SenderError => Err(anyhow!(
                "pending_callbacks: SenderError of bridge actor {}",
                self.actor.get_id()
            )),
        }
    }

    pub fn is_running(&self) -> bool {
        !matches!(
            self.actor.get_status(),
            ActorStatus::Stopping | ActorStatus::Stopped
        )
    }

    pub fn close(&self) -> anyhow::Result<()> {
        self.cast(BridgeActorMessage::Close)
    }

    /// Waits until the bridge actor has exited, after [`BridgeHandle::close`] or when the
    /// transport went away. Any number of clones may wait at the same time.
    pub async fn stopped(&self) -> anyhow::Result<()> {
        let mut join_handle = self.join_handle.lock().await;
        if let Some(handle) = join_handle.as_mut() {
            let result = handle.await;
            *join_handle = None;
            result.map_err(|err| {
                anyhow!("bridge actor {} failed to exit cleanly: {}", self.actor.get_id(), err)
            })?;
        }
        Ok(())
    }

    /// Kept for callers written against the old web view bridge. Does nothing.
    pub fn disable_javascript_alert_box_safety_timeout(&self) {}

    fn cast(&self, message: BridgeActorMessage) -> anyhow::Result<()> {
        self.actor
            .cast(message)
            .map_err(|err| anyhow!("bridge actor {} is gone: {}", self.actor.get_id(), err))
    }
}

// -------------------------------------------------------------------------------------------------------

/// Starts a bridge on top of a sink/source pair.
///
/// Spawns the bridge actor, a task that forwards outbound envelopes into `sink`, and the
/// receive loop that feeds `source` into the actor.
pub async fn connect(
    sink: TransportSink,
    source: TransportSource,
    config: BridgeConfig,
) -> Result<BridgeHandle, anyhow::Error> {
    let identifier = config.identifier.clone();
    let (transport, outbound) = ChannelTransport::new();

    let (actor, join_handle) = Actor::spawn(
        None,
        BridgeActor,
        BridgeActorArgs {
            config,
            transport: Arc::new(transport),
        },
    )
    .await?;

    info!("Bridge actor started for: {identifier}");

    ractor::concurrency::spawn(send_loop(outbound, sink, identifier.clone()));

    let actor_copy = actor.clone();
    ractor::concurrency::spawn(async move { receive_loop(source, identifier, actor_copy).await });

    Ok(BridgeHandle::new(actor, join_handle))
}

async fn send_loop(
    outbound: UnboundedReceiver<TransportMessage>,
    sink: TransportSink,
    identifier: String,
) {
    if let Err(err) = outbound.map(Ok::<_, TransportError>).forward(sink).await {
        error!("Error sending message to {}: {}", identifier, err);
    }
    debug!("Outbound channel to {} finished", identifier);
}

pub async fn receive_loop(
    mut source: TransportSource,
    identifier: String,
    actor_ref: ActorRef<BridgeActorMessage>,
) {
    // Process incoming messages
    while let Some(msg) = source.next().await {
        match msg {
            Ok(msg) => {
                // a close frame stops the actor with the remote's reason
                let is_close = matches!(msg, TransportMessage::Close(_));
                if let Err(err) = actor_ref.cast(BridgeActorMessage::Inbound(msg)) {
                    error!("Error forwarding message to bridge actor: {}", err);
                    break;
                }
                if is_close {
                    return;
                }
            }
            Err(e) => {
                error!("Error receiving message from {}: {}", identifier, e);
                break;
            }
        }
    }

    info!("Transport with {} closed", identifier);
    let _ = actor_ref.cast(BridgeActorMessage::Close);
}
