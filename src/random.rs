//! Injectable randomness.
//!
//! Candidate order, the final pair and the signing scheme are all picked at
//! random. Everything goes through `RandomSource` so tests can script the
//! choices.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::VecDeque;

pub trait RandomSource: Send {
    /// Uniform index in `0..upper`. `upper` is never zero.
    fn next_index(&mut self, upper: usize) -> usize;
}

/// Fisher-Yates shuffle in place.
pub fn shuffle<T>(items: &mut [T], rng: &mut dyn RandomSource) {
    for i in (1..items.len()).rev() {
        let j = rng.next_index(i + 1);
        items.swap(i, j);
    }
}

/// Pick one element uniformly. `None` for an empty slice.
pub fn select<'a, T>(items: &'a [T], rng: &mut dyn RandomSource) -> Option<&'a T> {
    if items.is_empty() {
        return None;
    }
    items.get(rng.next_index(items.len()))
}

// ---------------------------------------------------------------------------
// Sources
// ---------------------------------------------------------------------------

/// Production source backed by the OS-seeded `StdRng`.
pub struct SystemRandom(StdRng);

impl SystemRandom {
    pub fn new() -> Self {
        Self(StdRng::from_entropy())
    }
}

impl Default for SystemRandom {
    fn default() -> Self {
        Self::new()
    }
}

impl RandomSource for SystemRandom {
    fn next_index(&mut self, upper: usize) -> usize {
        self.0.gen_range(0..upper)
    }
}

/// Reproducible source for a fixed seed.
pub struct SeededRandom(StdRng);

impl SeededRandom {
    pub fn new(seed: u64) -> Self {
        Self(StdRng::seed_from_u64(seed))
    }
}

impl RandomSource for SeededRandom {
    fn next_index(&mut self, upper: usize) -> usize {
        self.0.gen_range(0..upper)
    }
}

/// Replays a fixed list of raw values (each reduced modulo `upper`),
/// then always the last index.
pub struct ScriptedRandom {
    values: VecDeque<usize>,
}

impl ScriptedRandom {
    pub fn new(values: impl IntoIterator<Item = usize>) -> Self {
        Self {
            values: values.into_iter().collect(),
        }
    }

    /// Always picks the last index, which makes `shuffle` a no-op.
    pub fn identity() -> Self {
        Self::new([])
    }
}

impl RandomSource for ScriptedRandom {
    fn next_index(&mut self, upper: usize) -> usize {
        match self.values.pop_front() {
            Some(v) => v % upper,
            // i == j on every Fisher-Yates step keeps the original order
            None => upper - 1,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
