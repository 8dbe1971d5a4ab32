//! Piece definitions and the seeded 7-bag generator.

use crate::BOARD_WIDTH;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// The seven tetromino kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PieceKind {
    I,
    O,
    T,
    S,
    Z,
    J,
    L,
}

impl PieceKind {
    pub const ALL: [PieceKind; 7] = [
        PieceKind::I,
        PieceKind::O,
        PieceKind::T,
        PieceKind::S,
        PieceKind::Z,
        PieceKind::J,
        PieceKind::L,
    ];

    /// Spawn-orientation shape matrix. Matrices are square so a clockwise
    /// rotation stays within the same footprint.
    fn base_shape(self) -> Vec<Vec<bool>> {
        let rows: &[&[u8]] = match self {
            PieceKind::I => &[
                &[0, 0, 0, 0],
                &[1, 1, 1, 1],
                &[0, 0, 0, 0],
                &[0, 0, 0, 0],
            ],
            PieceKind::O => &[&[1, 1], &[1, 1]],
            PieceKind::T => &[&[0, 1, 0], &[1, 1, 1], &[0, 0, 0]],
            PieceKind::S => &[&[0, 1, 1], &[1, 1, 0], &[0, 0, 0]],
            PieceKind::Z => &[&[1, 1, 0], &[0, 1, 1], &[0, 0, 0]],
            PieceKind::J => &[&[1, 0, 0], &[1, 1, 1], &[0, 0, 0]],
            PieceKind::L => &[&[0, 0, 1], &[1, 1, 1], &[0, 0, 0]],
        };
        rows.iter()
            .map(|row| row.iter().map(|&c| c != 0).collect())
            .collect()
    }

    /// Display color index for this kind.
    pub fn color(self) -> u8 {
        match self {
            PieceKind::I => 6,
            PieceKind::O => 3,
            PieceKind::T => 5,
            PieceKind::S => 2,
            PieceKind::Z => 1,
            PieceKind::J => 4,
            PieceKind::L => 3,
        }
    }
}

/// A piece in play: its kind, current rotation of the shape matrix, and
/// position of the matrix's top-left corner on the board.
#[derive(Debug, Clone)]
pub struct Piece {
    pub kind: PieceKind,
    pub shape: Vec<Vec<bool>>,
    pub x: i32,
    pub y: i32,
    pub color: u8,
}

impl Piece {
    /// Creates a piece of the given kind at its spawn position.
    pub fn spawn(kind: PieceKind) -> Self {
        let shape = kind.base_shape();
        let width = shape[0].len() as i32;
        Self {
            kind,
            x: BOARD_WIDTH as i32 / 2 - width / 2,
            y: 0,
            color: kind.color(),
            shape,
        }
    }

    /// Rotates the shape matrix 90 degrees clockwise in place.
    pub fn rotate_cw(&mut self) {
        let n = self.shape.len();
        let mut rotated = vec![vec![false; n]; n];
        for (i, row) in self.shape.iter().enumerate() {
            for (j, &cell) in row.iter().enumerate() {
                rotated[j][n - 1 - i] = cell;
            }
        }
        self.shape = rotated;
    }
}

/// Produces pieces via the 7-bag system: each kind appears exactly once per
/// bag, in an order drawn from a seeded shuffle. Two generators built from
/// the same seed yield identical sequences forever.
pub struct PieceGenerator {
    rng: StdRng,
    bag: VecDeque<PieceKind>,
}

impl PieceGenerator {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            bag: VecDeque::new(),
        }
    }

    /// Draws the next piece, refilling the bag when exhausted.
    pub fn next_piece(&mut self) -> Piece {
        if self.bag.is_empty() {
            self.refill();
        }
        // Refill guarantees a non-empty bag.
        let kind = self.bag.pop_front().unwrap_or(PieceKind::I);
        Piece::spawn(kind)
    }

    /// Returns the next kind without consuming it.
    pub fn peek(&mut self) -> PieceKind {
        if self.bag.is_empty() {
            self.refill();
        }
        self.bag.front().copied().unwrap_or(PieceKind::I)
    }

    fn refill(&mut self) {
        let mut kinds = PieceKind::ALL;
        kinds.shuffle(&mut self.rng);
        self.bag.extend(kinds);
    }
}
