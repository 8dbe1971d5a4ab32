//! The per-client simulation.
//!
//! Each client runs its own `GameState`, authoritative for its own board.
//! Determinism comes entirely from the seeded piece generator: garbage hole
//! columns are deliberately local randomness since they only ever touch the
//! owning client's board.

use crate::board::Board;
use crate::piece::{Piece, PieceGenerator, PieceKind};
use crate::BOARD_WIDTH;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::Duration;

/// Gravity interval per level, in milliseconds. Levels past the end of the
/// table use the final entry.
const DROP_INTERVALS_MS: [u64; 20] = [
    800, 720, 630, 550, 470, 380, 300, 220, 130, 100, 80, 80, 80, 70, 70, 70, 50, 50, 50, 30,
];

/// What a lock produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockResult {
    pub lines_cleared: u32,
    /// Garbage lines to send to an opponent; zero unless 2+ lines cleared.
    pub attack_power: u32,
    /// The freshly spawned piece could not be placed.
    pub topped_out: bool,
}

/// Outcome of one gravity tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// The current piece moved down one row.
    Descended,
    /// The piece could not descend and was locked.
    Locked(LockResult),
    /// The game was already over; nothing happened.
    GameOver,
}

pub struct GameState {
    pub board: Board,
    pub current: Piece,
    pub next: Piece,
    pub held: Option<PieceKind>,
    pub can_hold: bool,
    pub score: u32,
    pub level: u32,
    pub lines: u32,
    /// Garbage lines buffered from opponents, applied at the next lock.
    pub garbage_queue: u32,
    pub game_over: bool,
    generator: PieceGenerator,
    hole_rng: StdRng,
}

impl GameState {
    /// Builds a fresh game from the match seed shared by every player.
    pub fn new(seed: u64) -> Self {
        let mut generator = PieceGenerator::new(seed);
        let current = generator.next_piece();
        let next = generator.next_piece();
        Self {
            board: Board::new(),
            current,
            next,
            held: None,
            can_hold: true,
            score: 0,
            level: 1,
            lines: 0,
            garbage_queue: 0,
            game_over: false,
            generator,
            hole_rng: StdRng::from_entropy(),
        }
    }

    pub fn move_left(&mut self) -> bool {
        if self.board.is_valid_position(&self.current, -1, 0) {
            self.current.x -= 1;
            return true;
        }
        false
    }

    pub fn move_right(&mut self) -> bool {
        if self.board.is_valid_position(&self.current, 1, 0) {
            self.current.x += 1;
            return true;
        }
        false
    }

    pub fn move_down(&mut self) -> bool {
        if self.board.is_valid_position(&self.current, 0, 1) {
            self.current.y += 1;
            return true;
        }
        false
    }

    /// Rotates clockwise, trying horizontal kick offsets in order before
    /// giving up and reverting.
    pub fn rotate(&mut self) -> bool {
        let original = self.current.shape.clone();
        self.current.rotate_cw();

        for dx in [0, -1, 1, -2, 2] {
            if self.board.is_valid_position(&self.current, dx, 0) {
                self.current.x += dx;
                return true;
            }
        }

        self.current.shape = original;
        false
    }

    /// Swaps the current piece with the held one; allowed once per lock.
    pub fn hold(&mut self) -> bool {
        if !self.can_hold {
            return false;
        }
        self.can_hold = false;

        match self.held.take() {
            None => {
                self.held = Some(self.current.kind);
                self.current = std::mem::replace(&mut self.next, self.generator.next_piece());
            }
            Some(kind) => {
                self.held = Some(self.current.kind);
                self.current = Piece::spawn(kind);
            }
        }
        true
    }

    /// Drops the piece as far as it goes (2 points per row) and locks it.
    pub fn hard_drop(&mut self) -> LockResult {
        while self.move_down() {
            self.score += 2;
        }
        self.lock_current()
    }

    /// One gravity step: descend if possible, otherwise lock.
    pub fn tick(&mut self) -> TickOutcome {
        if self.game_over {
            return TickOutcome::GameOver;
        }
        if self.move_down() {
            TickOutcome::Descended
        } else {
            TickOutcome::Locked(self.lock_current())
        }
    }

    /// Buffers garbage announced by the room; applied at the next lock.
    pub fn receive_garbage(&mut self, lines: u32) {
        self.garbage_queue += lines;
    }

    /// Current gravity interval for the caller's tick timer.
    pub fn drop_interval(&self) -> Duration {
        let idx = (self.level as usize)
            .saturating_sub(1)
            .min(DROP_INTERVALS_MS.len() - 1);
        Duration::from_millis(DROP_INTERVALS_MS[idx])
    }

    fn lock_current(&mut self) -> LockResult {
        self.board.lock_piece(&self.current);
        let cleared = self.board.clear_lines();

        self.lines += cleared;
        // Score is awarded at the level the clear happened on.
        self.score += base_score(cleared) * self.level;
        self.level = self.lines / 10 + 1;
        let attack_power = attack_for(cleared);

        self.current = std::mem::replace(&mut self.next, self.generator.next_piece());
        self.can_hold = true;

        if self.garbage_queue > 0 {
            for _ in 0..self.garbage_queue {
                let hole_x = self.hole_rng.gen_range(0..BOARD_WIDTH);
                self.board.add_garbage_line(hole_x);
            }
            self.garbage_queue = 0;
        }

        let topped_out = !self.board.is_valid_position(&self.current, 0, 0);
        if topped_out {
            self.game_over = true;
        }

        LockResult {
            lines_cleared: cleared,
            attack_power,
            topped_out,
        }
    }
}

fn base_score(lines: u32) -> u32 {
    match lines {
        1 => 100,
        2 => 300,
        3 => 500,
        4 => 800,
        _ => 0,
    }
}

fn attack_for(lines: u32) -> u32 {
    match lines {
        1 => 0,
        2 => 1,
        3 => 2,
        4 => 4,
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{BOARD_HEIGHT, BOARD_WIDTH};

    /// Replaces the board with bottom `rows` rows full except column `gap_x`.
    fn prime_board(state: &mut GameState, rows: usize, gap_x: usize) {
        let mut flat = vec![0u8; BOARD_WIDTH * BOARD_HEIGHT];
        for y in (BOARD_HEIGHT - rows)..BOARD_HEIGHT {
            for x in 0..BOARD_WIDTH {
                if x != gap_x {
                    flat[y * BOARD_WIDTH + x] = 1;
                }
            }
        }
        state.board = Board::from_flat(&flat);
    }

    /// Puts a vertical I piece in play over column `x`.
    fn vertical_i_over(state: &mut GameState, x: i32) {
        let mut piece = Piece::spawn(PieceKind::I);
        piece.rotate_cw();
        piece.x = x - 2; // rotated I occupies matrix column 2
        piece.y = 0;
        state.current = piece;
    }

    #[test]
    fn test_new_game_defaults() {
        let state = GameState::new(1);
        assert_eq!(state.score, 0);
        assert_eq!(state.level, 1);
        assert_eq!(state.lines, 0);
        assert!(state.can_hold);
        assert!(state.held.is_none());
        assert!(!state.game_over);
    }

    #[test]
    fn test_moves_respect_walls() {
        let mut state = GameState::new(1);
        state.current = Piece::spawn(PieceKind::O);

        while state.move_left() {}
        assert_eq!(state.current.x, 0);
        assert!(!state.move_left());

        while state.move_right() {}
        assert_eq!(state.current.x, BOARD_WIDTH as i32 - 2);
    }

    #[test]
    fn test_hard_drop_scores_two_per_row() {
        let mut state = GameState::new(1);
        state.current = Piece::spawn(PieceKind::O);

        // O spawns occupying rows 0-1; it can descend BOARD_HEIGHT - 2 rows.
        let result = state.hard_drop();
        assert_eq!(result.lines_cleared, 0);
        assert_eq!(state.score, 2 * (BOARD_HEIGHT as u32 - 2));
    }

    #[test]
    fn test_single_clear_scores_100_and_no_attack() {
        let mut state = GameState::new(3);
        prime_board(&mut state, 1, 4);
        vertical_i_over(&mut state, 4);

        // Descend manually so the score delta is the clear alone.
        while state.move_down() {}
        let score_before = state.score;
        let result = state.tick();

        match result {
            TickOutcome::Locked(lock) => {
                assert_eq!(lock.lines_cleared, 1);
                assert_eq!(lock.attack_power, 0);
            }
            other => panic!("expected lock, got {:?}", other),
        }
        assert_eq!(state.lines, 1);
        assert_eq!(state.score - score_before, 100);
    }

    #[test]
    fn test_tetris_scores_800_times_level_and_attacks_4() {
        let mut state = GameState::new(3);
        prime_board(&mut state, 4, 4);
        vertical_i_over(&mut state, 4);

        let score_before = state.score;
        let result = state.hard_drop();

        assert_eq!(result.lines_cleared, 4);
        assert_eq!(result.attack_power, 4);
        // Cleared at level 1; drop points are the only other delta.
        let gained = state.score - score_before;
        let drop_points = gained - 800;
        assert!(drop_points % 2 == 0 && drop_points < 2 * BOARD_HEIGHT as u32);
    }

    #[test]
    fn test_double_and_triple_attack_power() {
        for (rows, expected_attack, expected_base) in [(2u32, 1u32, 300u32), (3, 2, 500)] {
            let mut state = GameState::new(5);
            prime_board(&mut state, rows as usize, 6);
            vertical_i_over(&mut state, 6);

            // Descend manually so the score delta is the clear alone.
            while state.move_down() {}
            let score_before = state.score;
            let result = state.tick();

            match result {
                TickOutcome::Locked(lock) => {
                    assert_eq!(lock.lines_cleared, rows);
                    assert_eq!(lock.attack_power, expected_attack);
                }
                other => panic!("expected lock, got {:?}", other),
            }
            assert_eq!(state.score - score_before, expected_base);
        }
    }

    #[test]
    fn test_score_multiplies_by_level() {
        let mut state = GameState::new(9);
        state.level = 4;
        state.lines = 30;
        prime_board(&mut state, 1, 2);
        vertical_i_over(&mut state, 2);

        while state.move_down() {}
        let score_before = state.score;
        state.tick();

        assert_eq!(state.score - score_before, 100 * 4);
    }

    #[test]
    fn test_level_advances_every_ten_lines() {
        let mut state = GameState::new(11);
        state.lines = 9;
        prime_board(&mut state, 1, 3);
        vertical_i_over(&mut state, 3);

        while state.move_down() {}
        state.tick();

        assert_eq!(state.lines, 10);
        assert_eq!(state.level, 2);
    }

    #[test]
    fn test_drop_interval_table_and_clamp() {
        let mut state = GameState::new(1);
        assert_eq!(state.drop_interval(), Duration::from_millis(800));

        state.level = 2;
        assert_eq!(state.drop_interval(), Duration::from_millis(720));

        state.level = 20;
        assert_eq!(state.drop_interval(), Duration::from_millis(30));

        // Beyond the table: stays at the fastest entry.
        state.level = 57;
        assert_eq!(state.drop_interval(), Duration::from_millis(30));
    }

    #[test]
    fn test_hold_once_between_locks() {
        let mut state = GameState::new(21);
        let first_kind = state.current.kind;
        let next_kind = state.next.kind;

        assert!(state.hold());
        assert_eq!(state.held, Some(first_kind));
        assert_eq!(state.current.kind, next_kind);

        // Second hold before locking is refused.
        assert!(!state.hold());

        // Locking re-enables hold, and holding swaps back.
        state.hard_drop();
        let current_kind = state.current.kind;
        assert!(state.hold());
        assert_eq!(state.held, Some(current_kind));
        assert_eq!(state.current.kind, first_kind);
        // The swapped-in piece returns at its spawn position.
        assert_eq!(state.current.y, 0);
    }

    #[test]
    fn test_garbage_applies_at_lock_not_before() {
        let mut state = GameState::new(31);
        state.receive_garbage(3);
        assert_eq!(state.garbage_queue, 3);
        assert!(state.board.to_flat().iter().all(|&c| c == 0));

        state.hard_drop();
        assert_eq!(state.garbage_queue, 0);

        // Each of the three bottom rows has exactly one hole.
        let flat = state.board.to_flat();
        for row in (BOARD_HEIGHT - 3)..BOARD_HEIGHT {
            let cells = &flat[row * BOARD_WIDTH..(row + 1) * BOARD_WIDTH];
            let filled = cells
                .iter()
                .filter(|&&c| c == crate::board::GARBAGE_COLOR)
                .count();
            assert_eq!(filled, BOARD_WIDTH - 1);
        }
    }

    #[test]
    fn test_rotation_kicks_off_the_wall() {
        let mut state = GameState::new(41);
        let mut piece = Piece::spawn(PieceKind::I);
        piece.rotate_cw();
        piece.x = -2; // occupied column hugs the left wall
        piece.y = 5;
        state.current = piece;

        // Rotating to horizontal needs a kick to the right.
        assert!(state.rotate());
        assert!(state
            .board
            .is_valid_position(&state.current, 0, 0));
    }

    #[test]
    fn test_rotation_reverts_when_no_kick_fits() {
        let mut state = GameState::new(43);
        // Wall on both sides of a one-wide well at column 0, deeper than
        // any kick can escape.
        let mut flat = vec![0u8; BOARD_WIDTH * BOARD_HEIGHT];
        for y in 2..BOARD_HEIGHT {
            for x in 1..BOARD_WIDTH {
                flat[y * BOARD_WIDTH + x] = 1;
            }
        }
        state.board = Board::from_flat(&flat);

        let mut piece = Piece::spawn(PieceKind::I);
        piece.rotate_cw();
        piece.x = -2;
        piece.y = 4;
        state.current = piece;
        let shape_before = state.current.shape.clone();

        assert!(!state.rotate());
        assert_eq!(state.current.shape, shape_before);
    }

    #[test]
    fn test_top_out_on_blocked_spawn() {
        let mut state = GameState::new(51);
        // Block the spawn columns near the top without completing any row,
        // so the piece spawned by the next lock has nowhere to go.
        let mut flat = vec![0u8; BOARD_WIDTH * BOARD_HEIGHT];
        for y in 0..2 {
            for x in 3..7 {
                flat[y * BOARD_WIDTH + x] = 1;
            }
        }
        state.board = Board::from_flat(&flat);

        let mut piece = Piece::spawn(PieceKind::O);
        piece.x = 0;
        piece.y = BOARD_HEIGHT as i32 - 2;
        state.current = piece;

        let result = state.tick();
        match result {
            TickOutcome::Locked(lock) => assert!(lock.topped_out),
            other => panic!("expected lock, got {:?}", other),
        }
        assert!(state.game_over);
        assert_eq!(state.tick(), TickOutcome::GameOver);
    }

    #[test]
    fn test_seeded_games_share_piece_sequences() {
        let mut a = GameState::new(777);
        let mut b = GameState::new(777);

        for _ in 0..20 {
            assert_eq!(a.current.kind, b.current.kind);
            assert_eq!(a.next.kind, b.next.kind);
            a.hard_drop();
            b.hard_drop();
        }
    }
}
