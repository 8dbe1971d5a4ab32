//! The realtime endpoint: token validation, upgrade, and the per-connection
//! reader/writer pump.
//!
//! Each admitted connection gets a bounded outbound queue drained by a
//! writer task that also emits keep-alive pings, and a reader loop with a
//! deadline renewed by every inbound frame. Either side failing tears the
//! connection down: the writer closes the socket on exit, and the reader's
//! end aborts the writer before the room is cleaned up.

use crate::player::Player;
use crate::registry::{PendingJoin, Registry};
use crate::room::Room;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use log::{debug, info, warn};
use serde::Deserialize;
use shared::protocol::{
    msg, BoardSnapshot, Envelope, Join, LinesCleared, Ready, SetTarget,
};
use shared::{MAX_MESSAGE_SIZE, OUTBOUND_QUEUE, PING_INTERVAL, PONG_WAIT, WRITE_WAIT};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::{interval, timeout, MissedTickBehavior};

#[derive(Debug, Deserialize)]
pub struct PlayQuery {
    room: String,
    token: String,
}

/// `GET /play?room=CODE&token=TOK` — validates and consumes the join token
/// before upgrading.
pub async fn ws_play(
    State(registry): State<Arc<Registry>>,
    Query(query): Query<PlayQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    let pending = match registry.consume_token(&query.token).await {
        Ok(pending) => pending,
        Err(err) => {
            warn!("rejected connection: {}", err);
            return (StatusCode::UNAUTHORIZED, err.to_string()).into_response();
        }
    };

    if pending.room_code != query.room.to_uppercase() {
        warn!(
            "rejected connection: token for {} used against {}",
            pending.room_code, query.room
        );
        return (StatusCode::FORBIDDEN, "token does not match room").into_response();
    }

    let Some(room) = registry.room(&pending.room_code).await else {
        return (StatusCode::NOT_FOUND, "room not found").into_response();
    };

    ws.max_message_size(MAX_MESSAGE_SIZE)
        .on_upgrade(move |socket| handle_socket(socket, registry, room, pending))
}

async fn handle_socket(
    socket: WebSocket,
    registry: Arc<Registry>,
    room: Arc<Room>,
    pending: PendingJoin,
) {
    let PendingJoin {
        player_id,
        player_name,
        ..
    } = pending;

    let (out_tx, out_rx) = mpsc::channel(OUTBOUND_QUEUE);
    let player = Player::new(player_id.clone(), player_name.clone(), out_tx);

    // The id goes out first so the client knows itself before any lobby
    // traffic arrives.
    player.send(Envelope::new(
        msg::ASSIGN_ID,
        &shared::protocol::AssignId {
            player_id: player_id.clone(),
        },
    ));

    room.add_player(player).await;
    info!(
        "player {} ({}) connected to room {}",
        player_name,
        player_id,
        room.code()
    );
    room.broadcast_lobby_update().await;

    let (sink, stream) = socket.split();
    let writer = tokio::spawn(write_pump(sink, out_rx));

    read_pump(stream, &room, &player_id).await;

    // Disconnect: drop the player (which also drops the queue sender) and
    // hard-stop the writer in case it is mid-drain.
    Arc::clone(&room).remove_player(&player_id).await;
    writer.abort();

    if room.player_count().await == 0 {
        registry.remove_room_if_empty(room.code()).await;
    } else {
        room.broadcast_lobby_update().await;
    }
    info!("player {} ({}) disconnected", player_name, player_id);
}

/// Drains the outbound queue onto the socket and pings on a timer. Exits
/// when the queue closes or a write fails, closing the socket so the reader
/// notices.
async fn write_pump(mut sink: SplitSink<WebSocket, Message>, mut out_rx: mpsc::Receiver<Envelope>) {
    let mut ping = interval(PING_INTERVAL);
    ping.set_missed_tick_behavior(MissedTickBehavior::Skip);
    // The first tick completes immediately.
    ping.tick().await;

    loop {
        tokio::select! {
            maybe = out_rx.recv() => {
                let Some(envelope) = maybe else { break };
                let Ok(text) = serde_json::to_string(&envelope) else { continue };
                match timeout(WRITE_WAIT, sink.send(Message::Text(text))).await {
                    Ok(Ok(())) => {}
                    _ => break,
                }
            }
            _ = ping.tick() => {
                match timeout(WRITE_WAIT, sink.send(Message::Ping(Vec::new()))).await {
                    Ok(Ok(())) => {}
                    _ => break,
                }
            }
        }
    }
    let _ = sink.close().await;
}

/// Reads frames until an error, close, or an expired deadline. Every frame,
/// keep-alive pongs included, renews the deadline.
async fn read_pump(mut stream: SplitStream<WebSocket>, room: &Arc<Room>, player_id: &str) {
    loop {
        let frame = match timeout(PONG_WAIT, stream.next()).await {
            Err(_) => {
                warn!("read deadline expired for {}", player_id);
                return;
            }
            Ok(None) => return,
            Ok(Some(Err(err))) => {
                debug!("read error for {}: {}", player_id, err);
                return;
            }
            Ok(Some(Ok(frame))) => frame,
        };

        match frame {
            Message::Text(text) => {
                if !dispatch(room, player_id, &text).await {
                    return;
                }
            }
            // Pongs and pings only exist to renew the deadline; axum
            // answers pings itself.
            Message::Pong(_) | Message::Ping(_) => {}
            Message::Close(_) => return,
            Message::Binary(_) => {
                debug!("ignoring binary frame from {}", player_id);
            }
        }
    }
}

/// Decodes and routes one inbound envelope. Returns `false` when the
/// connection should close.
async fn dispatch(room: &Arc<Room>, player_id: &str, text: &str) -> bool {
    let envelope: Envelope = match serde_json::from_str(text) {
        Ok(env) => env,
        Err(err) => {
            warn!("malformed envelope from {}: {}", player_id, err);
            return true;
        }
    };

    match envelope.kind.as_str() {
        msg::READY => match envelope.decode::<Ready>() {
            Ok(payload) => Arc::clone(room).set_ready(player_id, payload.ready).await,
            Err(err) => warn!("bad ready payload from {}: {}", player_id, err),
        },
        msg::BOARD_SNAPSHOT => match envelope.decode::<BoardSnapshot>() {
            Ok(payload) => room.update_snapshot(player_id, payload).await,
            Err(err) => warn!("bad board_snapshot payload from {}: {}", player_id, err),
        },
        msg::LINES_CLEARED => match envelope.decode::<LinesCleared>() {
            Ok(payload) => room.handle_lines_cleared(player_id, payload).await,
            Err(err) => warn!("bad lines_cleared payload from {}: {}", player_id, err),
        },
        msg::SET_TARGET => match envelope.decode::<SetTarget>() {
            Ok(payload) => {
                let target = (!payload.target_id.is_empty()).then_some(payload.target_id);
                room.set_target(player_id, target).await;
            }
            Err(err) => warn!("bad set_target payload from {}: {}", player_id, err),
        },
        msg::PLAYER_DEAD => Arc::clone(room).handle_player_dead(player_id).await,
        msg::JOIN => match envelope.decode::<Join>() {
            Ok(payload) => room.set_name(player_id, payload.player_name).await,
            Err(err) => warn!("bad join payload from {}: {}", player_id, err),
        },
        msg::LEAVE_ROOM => {
            info!("player {} leaving room {}", player_id, room.code());
            return false;
        }
        other => {
            debug!("unknown message type {:?} from {}", other, player_id);
        }
    }
    true
}
