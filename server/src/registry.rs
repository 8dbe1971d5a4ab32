//! Room and join-token bookkeeping.
//!
//! One registry instance is shared (by `Arc`) across every handler; there
//! is no process-wide singleton. Room admission is a two-step handshake:
//! the HTTP front desk registers a `PendingJoin` and hands the client a
//! single-use token, and the realtime endpoint consumes that token when the
//! WebSocket arrives.

use crate::room::Room;
use rand::seq::SliceRandom;
use shared::protocol::RoomInfo;
use shared::{JOIN_TOKEN_TTL, ROOM_CODE_LENGTH};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tokio::sync::RwLock;
use tokio::time::Instant;

/// Room codes avoid easily-confused characters (no 0/O/1/I).
const ROOM_CODE_CHARSET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("invalid or expired token")]
    TokenInvalid,
    #[error("room {0} not found")]
    RoomNotFound(String),
    #[error("game already in progress")]
    GameInProgress,
}

/// Bridges the HTTP admission step to the realtime connection step.
#[derive(Debug, Clone)]
pub struct PendingJoin {
    pub room_code: String,
    pub player_name: String,
    pub player_id: String,
    pub created_at: Instant,
}

#[derive(Default)]
struct RegistryState {
    rooms: HashMap<String, Arc<Room>>,
    pending: HashMap<String, PendingJoin>,
    next_id: u64,
}

#[derive(Default)]
pub struct Registry {
    state: RwLock<RegistryState>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a room in the lobby phase under a fresh unique code.
    pub async fn create_room(&self) -> Arc<Room> {
        let mut state = self.state.write().await;
        let code = generate_room_code(&state.rooms);
        let room = Arc::new(Room::new(code.clone()));
        state.rooms.insert(code.clone(), room.clone());
        log::info!("room {} created", code);
        room
    }

    /// Looks up a room by code, case-insensitively.
    pub async fn room(&self, code: &str) -> Option<Arc<Room>> {
        let state = self.state.read().await;
        state.rooms.get(&code.to_uppercase()).cloned()
    }

    /// Consistent snapshot of every room for the browse endpoint.
    pub async fn list_rooms(&self) -> Vec<RoomInfo> {
        let state = self.state.read().await;
        let mut rooms = Vec::with_capacity(state.rooms.len());
        for room in state.rooms.values() {
            rooms.push(room.info().await);
        }
        rooms.sort_by(|a, b| a.room_id.cmp(&b.room_id));
        rooms
    }

    /// Removes the room once its membership has reached zero, signalling
    /// its broadcast task to stop. Safe to call repeatedly.
    pub async fn remove_room_if_empty(&self, code: &str) {
        let mut state = self.state.write().await;
        let empty = match state.rooms.get(code) {
            Some(room) => room.player_count().await == 0,
            None => return,
        };
        if empty {
            if let Some(room) = state.rooms.remove(code) {
                room.signal_stop();
                log::info!("room {} removed (empty)", code);
            }
        }
    }

    pub async fn generate_player_id(&self) -> String {
        let mut state = self.state.write().await;
        state.next_id += 1;
        format!("player_{}_{}", unix_millis(), state.next_id)
    }

    /// Registers a pending join and returns its single-use token. Expired
    /// entries are swept here, on every new registration.
    pub async fn add_pending_join(
        &self,
        room_code: String,
        player_name: String,
        player_id: String,
    ) -> String {
        let mut state = self.state.write().await;

        let now = Instant::now();
        state
            .pending
            .retain(|_, pending| now.duration_since(pending.created_at) <= JOIN_TOKEN_TTL);

        state.next_id += 1;
        let token = format!("tok_{}_{}", unix_millis(), state.next_id);
        state.pending.insert(
            token.clone(),
            PendingJoin {
                room_code,
                player_name,
                player_id,
                created_at: now,
            },
        );
        token
    }

    /// Consumes a token. Unknown, already-consumed, and expired tokens all
    /// fail the same way; a consumed token never validates twice.
    pub async fn consume_token(&self, token: &str) -> Result<PendingJoin, RegistryError> {
        let mut state = self.state.write().await;
        let pending = state
            .pending
            .remove(token)
            .ok_or(RegistryError::TokenInvalid)?;
        if pending.created_at.elapsed() > JOIN_TOKEN_TTL {
            return Err(RegistryError::TokenInvalid);
        }
        Ok(pending)
    }
}

fn generate_room_code(existing: &HashMap<String, Arc<Room>>) -> String {
    let mut rng = rand::thread_rng();
    loop {
        let code: String = (0..ROOM_CODE_LENGTH)
            .map(|_| *ROOM_CODE_CHARSET.choose(&mut rng).unwrap_or(&b'A') as char)
            .collect();
        if !existing.contains_key(&code) {
            return code;
        }
    }
}

fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
