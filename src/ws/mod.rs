//! Wire protocol, transports and the websocket endpoint

pub mod handler;
pub mod protocol;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::warn;

use crate::mailbox::Mailbox;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("peer disconnected")]
    Closed,

    #[error("message encoding: {0}")]
    Encode(#[from] serde_json::Error),
}

/// A duplex channel's outbound half
pub trait Transport: Send + Sync {
    fn send_json(&self, message: serde_json::Value) -> Result<(), TransportError>;
}

/// Serialize and send any message
pub fn send<M: Serialize>(transport: &dyn Transport, message: &M) -> Result<(), TransportError> {
    transport.send_json(serde_json::to_value(message)?)
}

/// Outbound text frames over an unbounded tokio channel; the receiving end is
/// a websocket writer task or, in tests, the other side of a loopback.
#[derive(Debug, Clone)]
pub struct ChannelTransport {
    tx: mpsc::UnboundedSender<String>,
}

impl ChannelTransport {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl Transport for ChannelTransport {
    fn send_json(&self, message: serde_json::Value) -> Result<(), TransportError> {
        self.tx
            .send(message.to_string())
            .map_err(|_| TransportError::Closed)
    }
}

/// Messages that know which folder they belong in
pub trait Subject {
    fn subject(&self) -> &'static str;
}

impl Subject for protocol::ClientMsg {
    fn subject(&self) -> &'static str {
        protocol::ClientMsg::subject(self)
    }
}

impl Subject for protocol::ServerMsg {
    fn subject(&self) -> &'static str {
        protocol::ServerMsg::subject(self)
    }
}

/// Parse one inbound text frame. Malformed frames are logged and dropped.
pub fn parse_inbound<M: DeserializeOwned>(text: &str) -> Option<M> {
    match serde_json::from_str::<M>(text) {
        Ok(message) => Some(message),
        Err(e) => {
            warn!(error = %e, "Failed to parse inbound message");
            None
        }
    }
}

/// File a message under its subject
pub fn deliver<M: Subject + Clone>(mailbox: &Mailbox<M>, message: M) {
    let folder = message.subject();
    mailbox.deliver(message, folder);
}

/// Parse one inbound text frame and file it under its subject; returns
/// whether anything was delivered
pub fn route_inbound<M>(mailbox: &Mailbox<M>, text: &str) -> bool
where
    M: DeserializeOwned + Subject + Clone,
{
    match parse_inbound::<M>(text) {
        Some(message) => {
            deliver(mailbox, message);
            true
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::protocol::{ClientMsg, ServerMsg};
    use super::*;
    use crate::game::ids::EntityId;

    #[test]
    fn channel_transport_round_trips_into_a_mailbox() {
        let (transport, mut rx) = ChannelTransport::new();
        send(&transport, &ServerMsg::ShipSunk { tick: 8, ship_id: EntityId(2) }).expect("open channel");

        let mailbox = Mailbox::new();
        let text = rx.try_recv().expect("frame sent");
        assert!(route_inbound::<ServerMsg>(&mailbox, &text));
        assert_eq!(
            mailbox.request_access().drain_unread("ship_sunk"),
            vec![ServerMsg::ShipSunk { tick: 8, ship_id: EntityId(2) }]
        );
    }

    #[test]
    fn malformed_frames_are_dropped() {
        let mailbox: Mailbox<ClientMsg> = Mailbox::new();
        assert!(!route_inbound(&mailbox, "{\"subject\":\"launch_missiles\"}"));
        assert!(!route_inbound(&mailbox, "not json"));
    }

    #[test]
    fn closed_channels_report_closed() {
        let (transport, rx) = ChannelTransport::new();
        drop(rx);
        assert!(matches!(
            send(&transport, &ClientMsg::Leave),
            Err(TransportError::Closed)
        ));
    }
}
