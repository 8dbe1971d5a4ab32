//! Server-side view of one connected player.

use log::{debug, warn};
use shared::protocol::{BoardSnapshot, Envelope};
use tokio::sync::mpsc;

/// A player admitted to a room. Owned by the room's state; the connection
/// tasks hold the other end of the outbound queue.
#[derive(Debug)]
pub struct Player {
    pub id: String,
    pub name: String,
    pub ready: bool,
    pub alive: bool,
    /// Preferred garbage target; `None` means pick a random opponent.
    pub target_id: Option<String>,
    /// Latest display snapshot reported by this client.
    pub snapshot: Option<BoardSnapshot>,
    tx: mpsc::Sender<Envelope>,
}

impl Player {
    pub fn new(id: String, name: String, tx: mpsc::Sender<Envelope>) -> Self {
        Self {
            id,
            name,
            ready: false,
            alive: true,
            target_id: None,
            snapshot: None,
            tx,
        }
    }

    /// Queues an envelope for the writer task. Never blocks: when the queue
    /// is full the newest message is dropped so a slow client cannot stall
    /// the room.
    pub fn send(&self, envelope: Envelope) {
        match self.tx.try_send(envelope) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(env)) => {
                warn!("outbound queue full for {}, dropping {}", self.id, env.kind);
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!("outbound queue closed for {}", self.id);
            }
        }
    }
}
