//! Renderer-agnostic game session.
//!
//! A `Session` owns the local simulation for one match and keeps the room
//! informed: every visible change reports a board snapshot, clearing locks
//! report the attack, and topping out reports the death exactly once. The
//! frontend translates input into the methods here and drives gravity from
//! [`Session::drop_interval`].

use crate::network::ConnectionHandle;
use shared::game::{GameState, LockResult, TickOutcome};
use shared::protocol::BoardSnapshot;
use std::time::Duration;

pub struct Session {
    state: GameState,
    handle: ConnectionHandle,
    reported_dead: bool,
}

impl Session {
    /// Starts a match from the seed announced in `game_start`.
    pub fn new(seed: u64, handle: ConnectionHandle) -> Self {
        let session = Self {
            state: GameState::new(seed),
            handle,
            reported_dead: false,
        };
        session.push_snapshot();
        session
    }

    pub fn state(&self) -> &GameState {
        &self.state
    }

    pub fn is_game_over(&self) -> bool {
        self.state.game_over
    }

    pub fn drop_interval(&self) -> Duration {
        self.state.drop_interval()
    }

    pub fn move_left(&mut self) {
        if !self.state.game_over && self.state.move_left() {
            self.push_snapshot();
        }
    }

    pub fn move_right(&mut self) {
        if !self.state.game_over && self.state.move_right() {
            self.push_snapshot();
        }
    }

    pub fn soft_drop(&mut self) {
        if !self.state.game_over && self.state.move_down() {
            self.push_snapshot();
        }
    }

    pub fn rotate(&mut self) {
        if !self.state.game_over && self.state.rotate() {
            self.push_snapshot();
        }
    }

    pub fn hold(&mut self) {
        if !self.state.game_over && self.state.hold() {
            self.push_snapshot();
        }
    }

    pub fn hard_drop(&mut self) {
        if self.state.game_over {
            return;
        }
        let result = self.state.hard_drop();
        self.after_lock(result);
    }

    /// One gravity step; called by the frontend's timer.
    pub fn tick(&mut self) {
        match self.state.tick() {
            TickOutcome::Descended => self.push_snapshot(),
            TickOutcome::Locked(result) => self.after_lock(result),
            TickOutcome::GameOver => {}
        }
    }

    /// Buffers garbage from a `receive_garbage` event; the engine applies
    /// it at the next lock, never mid-drop.
    pub fn queue_garbage(&mut self, lines: u32) {
        if !self.state.game_over {
            self.state.receive_garbage(lines);
        }
    }

    fn after_lock(&mut self, result: LockResult) {
        if result.lines_cleared > 0 {
            self.handle
                .send_lines_cleared(result.lines_cleared, result.attack_power);
        }
        if result.topped_out && !self.reported_dead {
            self.reported_dead = true;
            self.handle.send_player_dead();
        }
        self.push_snapshot();
    }

    fn push_snapshot(&self) {
        self.handle.send_snapshot(&BoardSnapshot {
            score: self.state.score,
            level: self.state.level,
            lines: self.state.lines,
            alive: !self.state.game_over,
            board: self.state.board.to_flat(),
        });
    }
}
