pub mod protocol;
pub mod websocket;

use std::future::Future;

use tokio::sync::mpsc;

use crate::error::Result;

/// Callbacks from the remote channel, delivered in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// The channel is ready for traffic.
    Open,
    Message(String),
    Error(String),
    /// The remote end went away, with its close reason if it gave one.
    Closed(Option<String>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportCommand {
    Send(String),
    Close,
}

/// Session-side end of a duplex channel.
#[derive(Debug)]
pub struct TransportLink {
    pub commands: mpsc::Sender<TransportCommand>,
    pub events: mpsc::Receiver<TransportEvent>,
}

/// Driver-side end of a duplex channel, held by whatever moves bytes.
#[derive(Debug)]
pub struct TransportPeer {
    pub commands: mpsc::Receiver<TransportCommand>,
    pub events: mpsc::Sender<TransportEvent>,
}

impl TransportLink {
    /// A connected link/peer pair with `capacity` slots in each direction.
    #[must_use]
    pub fn pair(capacity: usize) -> (Self, TransportPeer) {
        let (command_tx, command_rx) = mpsc::channel(capacity);
        let (event_tx, event_rx) = mpsc::channel(capacity);
        (
            Self {
                commands: command_tx,
                events: event_rx,
            },
            TransportPeer {
                commands: command_rx,
                events: event_tx,
            },
        )
    }
}

/// Opens the remote channel for a session.
pub trait Connector {
    /// Perform the handshake. The returned link emits `Open` once the
    /// channel is ready for traffic.
    fn connect(&self) -> impl Future<Output = Result<TransportLink>>;
}
