//! Types shared between the game server and clients.
//!
//! This crate holds the two halves every side of the system agrees on:
//! the JSON wire protocol (`protocol`) and the deterministic falling-block
//! simulation (`piece`, `board`, `game`). Two clients that construct their
//! simulation from the same seed replay the exact same piece sequence,
//! which is what keeps independently simulated boards comparable.

use std::time::Duration;

pub mod board;
pub mod game;
pub mod piece;
pub mod protocol;

pub use board::{Board, Cell};
pub use game::{GameState, LockResult, TickOutcome};
pub use piece::{Piece, PieceGenerator, PieceKind};

/// Board width in cells.
pub const BOARD_WIDTH: usize = 10;
/// Board height in cells.
pub const BOARD_HEIGHT: usize = 20;

/// Minimum players required before a match can start.
pub const MIN_PLAYERS: usize = 2;
/// Advertised room capacity.
pub const MAX_PLAYERS: usize = 8;

/// Length of generated room codes.
pub const ROOM_CODE_LENGTH: usize = 5;
/// Countdown starts from this value, ticking once per second.
pub const COUNTDOWN_START: u32 = 3;

/// How often a room rebroadcasts opponent snapshots while playing.
pub const BROADCAST_INTERVAL: Duration = Duration::from_millis(100);
/// Delay between the match ending and the room returning to the lobby.
pub const GAME_OVER_LOBBY_DELAY: Duration = Duration::from_secs(2);

/// A connection is considered dead if nothing arrives within this window.
pub const PONG_WAIT: Duration = Duration::from_secs(60);
/// Keep-alive ping cadence; must stay well under `PONG_WAIT`.
pub const PING_INTERVAL: Duration = Duration::from_secs(54);
/// Upper bound on a single outbound write.
pub const WRITE_WAIT: Duration = Duration::from_secs(10);
/// Largest inbound frame accepted on a connection.
pub const MAX_MESSAGE_SIZE: usize = 16384;

/// Join tokens are valid for this long after issuance.
pub const JOIN_TOKEN_TTL: Duration = Duration::from_secs(60);

/// Server-side per-player outbound queue depth.
pub const OUTBOUND_QUEUE: usize = 64;
/// Client-side outbound queue depth.
pub const CLIENT_OUTBOUND_QUEUE: usize = 256;
