//! WebSocket upgrade handler

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::app::AppState;
use crate::game::{ClientProxy, MatchHandle, MatchSettings};
use crate::mailbox::Mailbox;
use crate::util::rate_limit::InboundLimiter;
use crate::ws::protocol::{ClientMsg, JoinRequest};
use crate::ws::{self, parse_inbound, ChannelTransport};

/// WebSocket upgrade handler
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(join): Query<JoinRequest>,
    State(state): State<AppState>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, join, state))
}

/// Handle the upgraded WebSocket connection
async fn handle_socket(socket: WebSocket, join: JoinRequest, state: AppState) {
    let connection_id = Uuid::new_v4();
    info!(connection_id = %connection_id, kind = ?join.kind, "New WebSocket connection");

    let (transport, outbound_rx) = ChannelTransport::new();
    let mailbox = Arc::new(Mailbox::new());
    let proxy = ClientProxy {
        mailbox: mailbox.clone(),
        transport: Arc::new(transport),
        kind: join.kind,
    };

    let handle = find_or_create_match(&state);
    if handle.join_tx.send(proxy).await.is_err() {
        error!(connection_id = %connection_id, match_id = %handle.id, "Match closed before join");
        return;
    }
    info!(connection_id = %connection_id, match_id = %handle.id, "Connection handed to match");

    run_session(connection_id, socket, mailbox, outbound_rx, state.props.tick_rate).await;

    info!(connection_id = %connection_id, "WebSocket connection closed");
}

fn find_or_create_match(state: &AppState) -> MatchHandle {
    if let Some(handle) = state.match_registry.find_available_match() {
        return handle;
    }
    let seed = state.config.match_seed.unwrap_or_else(rand::random::<u64>);
    let settings = MatchSettings::from_config(&state.config, seed);
    state.match_registry.spawn_match(state.props.clone(), settings)
}

/// Pump frames between the socket and the match until either side lets go.
/// The match lets go by dropping our transport: after refusing the join or
/// once the match is over.
async fn run_session(
    connection_id: Uuid,
    socket: WebSocket,
    mailbox: Arc<Mailbox<ClientMsg>>,
    mut outbound_rx: mpsc::UnboundedReceiver<String>,
    tick_rate: u32,
) {
    let (mut ws_sink, mut ws_stream) = socket.split();
    let limiter = InboundLimiter::for_tick_rate(tick_rate);

    // Writer task: match -> WebSocket
    let mut writer_handle = tokio::spawn(async move {
        while let Some(text) = outbound_rx.recv().await {
            if let Err(e) = ws_sink.send(Message::Text(text)).await {
                debug!(connection_id = %connection_id, error = %e, "WebSocket send failed");
                break;
            }
        }
        let _ = ws_sink.close().await;
    });

    // Reader loop: WebSocket -> mailbox
    loop {
        let result = tokio::select! {
            next = ws_stream.next() => match next {
                Some(result) => result,
                None => break,
            },
            _ = &mut writer_handle => {
                info!(connection_id = %connection_id, "Match released the connection");
                break;
            }
        };

        match result {
            Ok(Message::Text(text)) => {
                if let Err(e) = limiter.admit_frame() {
                    warn!(connection_id = %connection_id, reason = %e, "Rate limited inbound frame");
                    continue;
                }
                let Some(message) = parse_inbound::<ClientMsg>(&text) else {
                    continue;
                };
                if let Err(e) = limiter.admit(&message) {
                    warn!(connection_id = %connection_id, reason = %e, "Rate limited inbound message");
                    continue;
                }
                ws::deliver(&mailbox, message);
            }
            Ok(Message::Binary(_)) => {
                warn!(connection_id = %connection_id, "Received binary message, ignoring");
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
            Ok(Message::Close(_)) => {
                info!(connection_id = %connection_id, "Client initiated close");
                break;
            }
            Err(e) => {
                error!(connection_id = %connection_id, error = %e, "WebSocket error");
                break;
            }
        }
    }

    // A vanished socket counts as leaving
    mailbox.deliver(ClientMsg::Leave, "leave");
    writer_handle.abort();
}
