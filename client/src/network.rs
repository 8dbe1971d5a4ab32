//! HTTP and WebSocket connections to the game server.
//!
//! HTTP is the front desk (room creation, joining, browsing); the
//! WebSocket is the game room. The realtime connection runs a read pump
//! and a write pump, mirroring the server's pair: outbound envelopes go
//! through a bounded queue that drops on overflow, and inbound envelopes
//! are decoded into [`ServerEvent`]s delivered over a channel.

use futures_util::{SinkExt, StreamExt};
use log::{debug, warn};
use serde::Serialize;
use shared::protocol::{
    msg, AssignId, BoardSnapshot, Countdown, CreateRoomRequest, CreateRoomResponse, Envelope,
    ErrorResponse, GameStart, Join, JoinRoomRequest, JoinRoomResponse, LinesCleared,
    ListRoomsResponse, LobbyUpdate, MatchOver, OpponentUpdate, Ready, ReceiveGarbage, RoomInfo,
    SetTarget,
};
use shared::{CLIENT_OUTBOUND_QUEUE, PING_INTERVAL, PONG_WAIT, WRITE_WAIT};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval, timeout, MissedTickBehavior};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("server unreachable: {0}")]
    Http(#[from] reqwest::Error),
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("{0}")]
    Server(String),
}

/// A server message decoded for the frontend.
#[derive(Debug, Clone)]
pub enum ServerEvent {
    AssignId { player_id: String },
    LobbyUpdate(LobbyUpdate),
    Countdown(u32),
    GameStart(GameStart),
    OpponentUpdate(OpponentUpdate),
    ReceiveGarbage { lines: u32, attacker_id: String },
    MatchOver(MatchOver),
    /// The connection dropped; a fresh handshake is needed to rejoin.
    Disconnected,
}

/// Talks to one game server.
pub struct Client {
    http_base: String,
    ws_base: String,
    http: reqwest::Client,
}

impl Client {
    /// Builds a client for the given HTTP base URL, e.g.
    /// `http://localhost:8080`. No connection is opened yet.
    pub fn new(http_base: &str) -> Self {
        let http_base = http_base.trim_end_matches('/').to_string();
        let ws_base = if let Some(rest) = http_base.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = http_base.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            format!("ws://{http_base}")
        };
        Self {
            http_base,
            ws_base,
            http: reqwest::Client::new(),
        }
    }

    pub async fn create_room(&self, player_name: &str) -> Result<CreateRoomResponse, ClientError> {
        let response = self
            .http
            .post(format!("{}/create-room", self.http_base))
            .json(&CreateRoomRequest {
                player_name: player_name.to_string(),
            })
            .send()
            .await?;
        expect_json(response).await
    }

    pub async fn join_room(
        &self,
        room_id: &str,
        player_name: &str,
    ) -> Result<JoinRoomResponse, ClientError> {
        let response = self
            .http
            .post(format!("{}/join-room", self.http_base))
            .json(&JoinRoomRequest {
                room_id: room_id.to_string(),
                player_name: player_name.to_string(),
            })
            .send()
            .await?;
        expect_json(response).await
    }

    pub async fn list_rooms(&self) -> Result<Vec<RoomInfo>, ClientError> {
        let response = self
            .http
            .get(format!("{}/list-rooms", self.http_base))
            .send()
            .await?;
        let listing: ListRoomsResponse = expect_json(response).await?;
        Ok(listing.rooms)
    }

    /// Opens the realtime connection with a token from the front desk and
    /// starts the read/write pumps.
    pub async fn connect(&self, room_id: &str, token: &str) -> Result<Connection, ClientError> {
        let url = format!("{}/play?room={}&token={}", self.ws_base, room_id, token);
        let (socket, _response) = connect_async(url.as_str()).await?;
        let (sink, stream) = socket.split();

        let (out_tx, out_rx) = mpsc::channel::<Message>(CLIENT_OUTBOUND_QUEUE);
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let writer = tokio::spawn(write_pump(sink, out_rx));
        let reader = tokio::spawn(read_pump(stream, out_tx.clone(), event_tx));

        Ok(Connection {
            handle: ConnectionHandle { out: out_tx },
            events: event_rx,
            reader,
            writer,
        })
    }
}

async fn expect_json<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, ClientError> {
    let status = response.status();
    if status.is_success() {
        Ok(response.json().await?)
    } else {
        let message = response
            .json::<ErrorResponse>()
            .await
            .map(|e| e.error)
            .unwrap_or_else(|_| format!("server returned {status}"));
        Err(ClientError::Server(message))
    }
}

/// An active realtime connection.
pub struct Connection {
    handle: ConnectionHandle,
    events: mpsc::UnboundedReceiver<ServerEvent>,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

impl Connection {
    /// Waits for the next decoded server event. `None` after disconnect.
    pub async fn next_event(&mut self) -> Option<ServerEvent> {
        self.events.recv().await
    }

    /// A cloneable sender for outbound messages.
    pub fn handle(&self) -> ConnectionHandle {
        self.handle.clone()
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.reader.abort();
        self.writer.abort();
    }
}

/// Queues outbound messages for the write pump. Sends never block; on a
/// full queue the message is dropped and logged.
#[derive(Clone)]
pub struct ConnectionHandle {
    out: mpsc::Sender<Message>,
}

impl ConnectionHandle {
    fn send_envelope<P: Serialize>(&self, kind: &str, payload: &P) {
        let envelope = Envelope::new(kind, payload);
        match serde_json::to_string(&envelope) {
            Ok(text) => {
                if self.out.try_send(Message::Text(text)).is_err() {
                    warn!("outbound queue full or closed, dropping {kind}");
                }
            }
            Err(err) => warn!("failed to encode {kind}: {err}"),
        }
    }

    pub fn send_join(&self, player_name: &str) {
        self.send_envelope(
            msg::JOIN,
            &Join {
                player_name: player_name.to_string(),
            },
        );
    }

    pub fn send_ready(&self, ready: bool) {
        self.send_envelope(msg::READY, &Ready { ready });
    }

    pub fn send_snapshot(&self, snapshot: &BoardSnapshot) {
        self.send_envelope(msg::BOARD_SNAPSHOT, snapshot);
    }

    pub fn send_lines_cleared(&self, count: u32, attack_power: u32) {
        self.send_envelope(
            msg::LINES_CLEARED,
            &LinesCleared {
                count,
                attack_power,
            },
        );
    }

    pub fn send_player_dead(&self) {
        let envelope = Envelope::empty(msg::PLAYER_DEAD);
        if let Ok(text) = serde_json::to_string(&envelope) {
            if self.out.try_send(Message::Text(text)).is_err() {
                warn!("outbound queue full or closed, dropping player_dead");
            }
        }
    }

    pub fn send_set_target(&self, target_id: &str) {
        self.send_envelope(
            msg::SET_TARGET,
            &SetTarget {
                target_id: target_id.to_string(),
            },
        );
    }

    pub fn send_leave_room(&self) {
        let envelope = Envelope::empty(msg::LEAVE_ROOM);
        if let Ok(text) = serde_json::to_string(&envelope) {
            let _ = self.out.try_send(Message::Text(text));
        }
    }
}

type WsSink = futures_util::stream::SplitSink<
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>,
    Message,
>;
type WsStream = futures_util::stream::SplitStream<
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>,
>;

async fn write_pump(mut sink: WsSink, mut out_rx: mpsc::Receiver<Message>) {
    let mut ping = interval(PING_INTERVAL);
    ping.set_missed_tick_behavior(MissedTickBehavior::Skip);
    ping.tick().await;

    loop {
        tokio::select! {
            maybe = out_rx.recv() => {
                let Some(message) = maybe else { break };
                match timeout(WRITE_WAIT, sink.send(message)).await {
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

async fn read_pump(
    mut stream: WsStream,
    out_tx: mpsc::Sender<Message>,
    event_tx: mpsc::UnboundedSender<ServerEvent>,
) {
    loop {
        let frame = match timeout(PONG_WAIT, stream.next()).await {
            Err(_) => {
                warn!("read deadline expired");
                break;
            }
            Ok(None) => break,
            Ok(Some(Err(err))) => {
                debug!("read error: {err}");
                break;
            }
            Ok(Some(Ok(frame))) => frame,
        };

        match frame {
            Message::Text(text) => {
                if let Some(event) = decode_event(&text) {
                    if event_tx.send(event).is_err() {
                        break;
                    }
                }
            }
            Message::Ping(data) => {
                let _ = out_tx.try_send(Message::Pong(data));
            }
            Message::Pong(_) => {}
            Message::Close(_) => break,
            _ => {}
        }
    }
    let _ = event_tx.send(ServerEvent::Disconnected);
}

fn decode_event(text: &str) -> Option<ServerEvent> {
    let envelope: Envelope = match serde_json::from_str(text) {
        Ok(env) => env,
        Err(err) => {
            warn!("malformed server envelope: {err}");
            return None;
        }
    };

    let decoded = match envelope.kind.as_str() {
        msg::ASSIGN_ID => envelope
            .decode::<AssignId>()
            .map(|p| ServerEvent::AssignId {
                player_id: p.player_id,
            }),
        msg::LOBBY_UPDATE => envelope.decode::<LobbyUpdate>().map(ServerEvent::LobbyUpdate),
        msg::COUNTDOWN => envelope
            .decode::<Countdown>()
            .map(|p| ServerEvent::Countdown(p.value)),
        msg::GAME_START => envelope.decode::<GameStart>().map(ServerEvent::GameStart),
        msg::OPPONENT_UPDATE => envelope
            .decode::<OpponentUpdate>()
            .map(ServerEvent::OpponentUpdate),
        msg::RECEIVE_GARBAGE => envelope
            .decode::<ReceiveGarbage>()
            .map(|p| ServerEvent::ReceiveGarbage {
                lines: p.lines,
                attacker_id: p.attacker_id,
            }),
        msg::MATCH_OVER => envelope.decode::<MatchOver>().map(ServerEvent::MatchOver),
        other => {
            debug!("ignoring server message type {other:?}");
            return None;
        }
    };

    match decoded {
        Ok(event) => Some(event),
        Err(err) => {
            warn!("bad {} payload: {err}", envelope.kind);
            None
        }
    }
}
