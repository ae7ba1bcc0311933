//! Direction-path runs and their decoder.
//!
//! A run is a fixed-width 256-bit value holding a self-delimiting
//! sequence of grid moves: the direction count lives in the top 8 bits
//! and directions are 2-bit values consumed from the least-significant
//! end. One run holds at most 124 directions.

use alloy::primitives::U256;
use serde::{Deserialize, Serialize};

/// A single grid move.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    North,
    South,
    East,
    West,
}

impl Direction {
    fn from_bits(bits: u8) -> Self {
        match bits & 0b11 {
            0b00 => Direction::North,
            0b01 => Direction::South,
            0b10 => Direction::East,
            _ => Direction::West,
        }
    }

    fn bits(self) -> u8 {
        match self {
            Direction::North => 0b00,
            Direction::South => 0b01,
            Direction::East => 0b10,
            Direction::West => 0b11,
        }
    }
}

/// One packed path run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PathRun(U256);

impl PathRun {
    /// Directions representable by one run (248 payload bits / 2).
    pub const MAX_DIRECTIONS: usize = 124;

    pub fn new(raw: U256) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> U256 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Directions not yet consumed from this run.
    pub fn remaining(&self) -> usize {
        (self.0 >> 248usize).to::<usize>()
    }

    pub fn has_next(&self) -> bool {
        self.remaining() > 0
    }

    /// Pop the next direction, returning it with the advanced run state.
    pub fn next_direction(self) -> Option<(Direction, PathRun)> {
        let count = self.remaining();
        if count == 0 {
            return None;
        }

        let dir = Direction::from_bits((self.0 & U256::from(0b11u8)).to::<u8>());

        let payload_mask = (U256::from(1u8) << 248) - U256::from(1u8);
        let payload = (self.0 & payload_mask) >> 2;
        let rest = (U256::from(count - 1) << 248) | payload;

        Some((dir, PathRun(rest)))
    }

    /// Pack an ordered direction sequence into a run. The first
    /// direction lands in the lowest bits and is consumed first.
    ///
    /// # Panics
    ///
    /// Panics if more than [`Self::MAX_DIRECTIONS`] directions are given.
    pub fn from_directions(directions: &[Direction]) -> Self {
        assert!(
            directions.len() <= Self::MAX_DIRECTIONS,
            "a path run holds at most {} directions",
            Self::MAX_DIRECTIONS
        );

        let mut payload = U256::ZERO;
        for (i, dir) in directions.iter().enumerate() {
            payload |= U256::from(dir.bits()) << (2 * i);
        }
        Self((U256::from(directions.len()) << 248) | payload)
    }
}

/// Lazily decodes an ordered run list into a direction sequence.
///
/// Mirrors the host contract's consumption order: the first run is
/// loaded up front (a zero first run contributes nothing), subsequent
/// runs are loaded only once the current one is exhausted. Runs that
/// encode zero directions are skipped.
pub struct PathDecoder {
    runs: Vec<PathRun>,
    index: usize,
    current: PathRun,
}

impl PathDecoder {
    pub fn new(runs: &[U256]) -> Self {
        let current = match runs.first() {
            Some(first) if !first.is_zero() => PathRun::new(*first),
            _ => PathRun::default(),
        };
        Self {
            runs: runs.iter().copied().map(PathRun::new).collect(),
            index: 0,
            current,
        }
    }
}

impl Iterator for PathDecoder {
    type Item = Direction;

    fn next(&mut self) -> Option<Direction> {
        loop {
            if let Some((dir, rest)) = self.current.next_direction() {
                self.current = rest;
                return Some(dir);
            }

            self.index += 1;
            if self.index >= self.runs.len() {
                return None;
            }
            self.current = self.runs[self.index];
        }
    }
}
