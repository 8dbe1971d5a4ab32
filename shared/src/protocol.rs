//! Wire protocol for the realtime connection and the front-desk HTTP API.
//!
//! Every realtime message is a JSON envelope `{"type": ..., "payload": ...}`.
//! The envelope is decoded in two steps: the outer shape first, keeping the
//! payload as a raw [`serde_json::Value`], then the payload into the concrete
//! struct selected by the type tag. Unrecognized tags are ignored by both
//! sides rather than failing the connection.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Message type tags.
pub mod msg {
    // Server -> client
    pub const ASSIGN_ID: &str = "assign_id";
    pub const GAME_START: &str = "game_start";
    pub const COUNTDOWN: &str = "countdown";
    pub const OPPONENT_UPDATE: &str = "opponent_update";
    pub const RECEIVE_GARBAGE: &str = "receive_garbage";
    pub const LOBBY_UPDATE: &str = "lobby_update";
    pub const MATCH_OVER: &str = "match_over";

    // Client -> server
    pub const JOIN: &str = "join";
    pub const READY: &str = "ready";
    pub const BOARD_SNAPSHOT: &str = "board_snapshot";
    pub const LINES_CLEARED: &str = "lines_cleared";
    pub const PLAYER_DEAD: &str = "player_dead";
    pub const SET_TARGET: &str = "set_target";
    pub const LEAVE_ROOM: &str = "leave_room";
}

/// Top-level wire format for all realtime messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub payload: Value,
}

impl Envelope {
    /// Wraps a payload under the given type tag.
    pub fn new<P: Serialize>(kind: &str, payload: &P) -> Self {
        Self {
            kind: kind.to_string(),
            // Only fails on payloads that are not valid JSON values, which
            // none of the protocol structs are.
            payload: serde_json::to_value(payload).unwrap_or(Value::Null),
        }
    }

    /// An envelope whose payload carries no data.
    pub fn empty(kind: &str) -> Self {
        Self {
            kind: kind.to_string(),
            payload: Value::Null,
        }
    }

    /// Re-decodes the payload into the concrete shape for this type tag.
    pub fn decode<P: DeserializeOwned>(&self) -> Result<P, serde_json::Error> {
        serde_json::from_value(self.payload.clone())
    }
}

// --- Server -> client payloads ---

/// Sent once immediately after a connection is admitted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignId {
    pub player_id: String,
}

/// Tells every member of a room to begin simulating.
///
/// `players` is sorted by id so all clients agree on the roster order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameStart {
    pub seed: u64,
    pub players: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Countdown {
    pub value: u32,
}

/// Display-only snapshot of one opponent. Never authoritative.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpponentState {
    pub player_id: String,
    pub player_name: String,
    pub score: u32,
    pub level: u32,
    pub lines: u32,
    pub alive: bool,
    /// Flat row-major color indices, `BOARD_HEIGHT * BOARD_WIDTH` long;
    /// empty until the opponent has reported a snapshot.
    pub board: Vec<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpponentUpdate {
    pub opponents: Vec<OpponentState>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReceiveGarbage {
    pub lines: u32,
    pub attacker_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LobbyPlayer {
    pub player_id: String,
    pub name: String,
    pub ready: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LobbyUpdate {
    pub players: Vec<LobbyPlayer>,
}

/// Match result, individualized per recipient.
///
/// An empty `winner_id` means nobody survived.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchOver {
    pub winner_id: String,
    pub winner_name: String,
    pub your_rank: u32,
}

// --- Client -> server payloads ---

/// Updates the sender's display name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Join {
    pub player_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ready {
    pub ready: bool,
}

/// The sender's current board, reported periodically for opponent display.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoardSnapshot {
    pub score: u32,
    pub level: u32,
    pub lines: u32,
    pub alive: bool,
    pub board: Vec<u8>,
}

/// Reports a clearing lock so the room can route the attack.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinesCleared {
    pub count: u32,
    pub attack_power: u32,
}

/// Selects which opponent to send garbage to. Empty id clears the choice.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetTarget {
    pub target_id: String,
}

// --- Front-desk HTTP bodies ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateRoomRequest {
    pub player_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateRoomResponse {
    pub room_id: String,
    pub join_token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinRoomRequest {
    pub room_id: String,
    pub player_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinRoomResponse {
    pub room_id: String,
    pub join_token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomInfo {
    pub room_id: String,
    pub player_count: usize,
    pub max_players: usize,
    pub phase: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListRoomsResponse {
    pub rooms: Vec<RoomInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}
