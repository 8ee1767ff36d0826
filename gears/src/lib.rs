//! [`gears`](crate) is the generic game-capability substrate: a game-agnostic [`general::game::Game`] trait,
//! score and search types shared with the engine crate, and a small text-output/config layer. It forms the
//! foundation of the `abapa` search core; concrete game rules (Oware, chess, draughts, ...) live outside it
//! and are supplied as an implementation of the `Game` trait.

#![deny(unused_results)]

pub use colored;
pub use dyn_clone;
pub use itertools;
pub use rand;
pub use strum;
pub use strum_macros;

/// Anything that doesn't fit into the other modules: the `Game` capability trait, moves, and low-level helpers.
pub mod general;
/// Anything related to printing search output and log messages.
pub mod output;
/// Score type and cache-relevant node classification.
pub mod score;
/// Basic search helper types (time control, search limits, depth) shared by every engine.
pub mod search;
/// Engine option types used to configure the search core.
pub mod ugi;

// *** Match status information ***

/// Result of a match from a player's perspective.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
#[must_use]
pub enum PlayerResult {
    Win,
    Lose,
    Draw,
}

impl PlayerResult {
    pub fn flip(self) -> Self {
        match self {
            PlayerResult::Win => PlayerResult::Lose,
            PlayerResult::Lose => PlayerResult::Win,
            PlayerResult::Draw => PlayerResult::Draw,
        }
    }

    pub fn flip_if(self, condition: bool) -> Self {
        if condition { self.flip() } else { self }
    }
}
