use std::pin::Pin;

use anyhow::anyhow;
use futures::{
    Sink, SinkExt, Stream, StreamExt,
    channel::mpsc::{self, UnboundedReceiver, UnboundedSender},
};

use crate::envelope::Envelope;

// -------------------------------------------------------------------------------------------------------

/// A single frame moving between the web view and the native host.
/// Envelopes travel as json, either as text or as utf-8 bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportMessage {
    Text(String),
    Binary(Vec<u8>),
    Close(Option<String>),
}

pub type TransportError = anyhow::Error;

pub type TransportSink = Pin<Box<dyn Sink<TransportMessage, Error = TransportError> + Send>>;
pub type TransportSource =
    Pin<Box<dyn Stream<Item = Result<TransportMessage, TransportError>> + Send>>;

// -------------------------------------------------------------------------------------------------------

/// The outbound half of the host channel, as seen by the bridge.
///
/// Sending is fire-and-forget: there is no delivery confirmation, an `Err` only means the
/// envelope could not even be handed over.
pub trait Transport: Send + Sync {
    fn send(&self, envelope: Envelope) -> Result<(), TransportError>;
}

/// Encodes envelopes as json text and queues them on an unbounded channel.
/// The receiving end is usually forwarded into a [`TransportSink`] by [`crate::actor::connect`].
#[derive(Clone, Debug)]
pub struct ChannelTransport {
    sender: UnboundedSender<TransportMessage>,
}

impl ChannelTransport {
    pub fn new() -> (Self, UnboundedReceiver<TransportMessage>) {
        let (sender, receiver) = mpsc::unbounded();
        (Self { sender }, receiver)
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

impl Transport for ChannelTransport {
    fn send(&self, envelope: Envelope) -> Result<(), TransportError> {
        let text = envelope.encode()?;
        self.sender
            .unbounded_send(TransportMessage::Text(text))
            .map_err(|err| anyhow!("transport channel closed: {err}"))
    }
}

// -------------------------------------------------------------------------------------------------------

/// Two connected in-memory ends. Whatever is sent into the first sink comes out of the second
/// source and vice versa.
pub fn duplex(
    buffer: usize,
) -> (
    (TransportSink, TransportSource),
    (TransportSink, TransportSource),
) {
    let (tx1, rx1) = mpsc::channel::<TransportMessage>(buffer);
    let (tx2, rx2) = mpsc::channel::<TransportMessage>(buffer);

    let sink1: TransportSink = Box::pin(tx1.sink_map_err(|e| anyhow::Error::msg(e.to_string())));
    let source1: TransportSource = Box::pin(rx1.map(Ok));

    let sink2: TransportSink = Box::pin(tx2.sink_map_err(|e| anyhow::Error::msg(e.to_string())));
    let source2: TransportSource = Box::pin(rx2.map(Ok));

    ((sink1, source2), (sink2, source1))
}
