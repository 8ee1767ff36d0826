/*
 *  Gears, a collection of board games.
 *  Copyright (C) 2024 ToTheAnd
 *
 *  Gears is free software: you can redistribute it and/or modify
 *  it under the terms of the GNU General Public License as published by
 *  the Free Software Foundation, either version 3 of the License, or
 *  (at your option) any later version.
 *
 *  Gears is distributed in the hope that it will be useful,
 *  but WITHOUT ANY WARRANTY; without even the implied warranty of
 *  MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 *  GNU General Public License for more details.
 *
 *  You should have received a copy of the GNU General Public License
 *  along with Gears. If not, see <https://www.gnu.org/licenses/>.
 */

use crate::general::common::Res;
use crate::general::game::Game;
use anyhow::bail;
use arbitrary::Arbitrary;
use num::PrimInt;
use std::fmt;
use std::fmt::{Debug, Display, Formatter};
use std::hash::Hash;

/// Statically known properties of a move.
/// Many games don't have a distinction between legal and pseudolegal moves, so those moves are always `Legal`.
/// In some contexts, such as when loading a move from the cache, it's unknown whether this is actually a pseudolegal
/// move for the given position, which is why such a move is represented as an [`UntrustedMove`].
#[derive(Debug, Copy, Clone, Eq, PartialEq, Arbitrary)]
pub enum Legality {
    PseudoLegal,
    Legal,
}

#[derive(Debug, Eq, PartialEq, Copy, Clone)]
pub enum ExtendedFormat {
    Standard,
    Alternative,
}

/// A `GameMove` implementation uniquely describes a (pseudolegal) move in a given position. It may not store enough
/// information to reconstruct the move without the position. The `default()` value is always the null move, used as
/// the TT's empty-slot sentinel and as the "no move found yet" placeholder during search.
pub trait GameMove<G: Game>:
    Eq + Copy + Clone + Debug + Default + Hash + Send + Sync + for<'a> Arbitrary<'a>
where
    G: Game<Move = Self>,
{
    type Underlying: PrimInt + Into<u64>;

    fn is_null(self) -> bool {
        self == Self::default()
    }

    /// For games with legal movegen, this should return `Legal`, for games with pseudo-legal movegen this should
    /// return `PseudoLegal`.
    fn legality() -> Legality;

    /// Captures, big redistributions and other moves worth searching first. Always returning `false` is valid.
    fn is_tactical(self, pos: &G) -> bool;

    /// Compact text representation, as used by the opening book and the text protocol. Must not panic for illegal
    /// moves.
    fn format_compact(self, f: &mut Formatter<'_>, pos: &G) -> fmt::Result;

    /// A longer representation that may require the position, such as algebraic notation.
    fn format_extended(&self, f: &mut Formatter<'_>, pos: &G, _format: ExtendedFormat) -> fmt::Result {
        self.format_compact(f, pos)
    }

    fn compact_formatter(self, pos: &G) -> CompactFormatter<G> {
        CompactFormatter { pos, mov: self }
    }

    fn extended_formatter(self, pos: &G, format: ExtendedFormat) -> ExtendedFormatter<G> {
        ExtendedFormatter { pos, mov: self, format }
    }

    fn to_extended_text(self, pos: &G, format: ExtendedFormat) -> String {
        self.extended_formatter(pos, format).to_string()
    }

    /// Parse a compact text representation. Returns the remaining input. Must ensure pseudolegality.
    fn parse_compact_text<'a>(s: &'a str, pos: &G) -> Res<(&'a str, G::Move)>;

    fn from_compact_text(s: &str, pos: &G) -> Res<G::Move> {
        let (remaining, parsed) = Self::parse_compact_text(s, pos)?;
        if !remaining.is_empty() {
            bail!(
                "Additional input after move {0}: '{1}'",
                parsed.compact_formatter(pos),
                remaining
            );
        }
        Ok(parsed)
    }

    /// Load the move from its raw underlying integer representation, the inverse of `to_underlying`. Does not take
    /// a position and therefore does not ensure pseudolegality.
    fn from_u64_unchecked(val: u64) -> UntrustedMove<G>;

    /// Serialize this move into the internal integer representation used by the cache and the opening book.
    fn to_underlying(self) -> Self::Underlying;
}

#[derive(Debug, Copy, Clone)]
pub struct CompactFormatter<'a, G: Game> {
    pos: &'a G,
    mov: G::Move,
}

impl<G: Game> Display for CompactFormatter<'_, G> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        self.mov.format_compact(f, self.pos)
    }
}

#[derive(Debug, Copy, Clone)]
pub struct ExtendedFormatter<'a, G: Game> {
    pos: &'a G,
    mov: G::Move,
    format: ExtendedFormat,
}

impl<G: Game> Display for ExtendedFormatter<'_, G> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if self.mov == G::Move::default() {
            write!(f, "0000")
        } else {
            self.mov.format_extended(f, self.pos, self.format)
        }
    }
}

/// A wrapper type that statically denotes that the wrapped move is not trusted to be (pseudo)legal in the context
/// where it is expected to be used. Moves loaded from the cache or the opening book are wrapped in this struct until
/// checked against the actual position.
#[derive(Debug, Default, Copy, Clone, Eq, PartialEq, Hash)]
#[must_use]
#[repr(transparent)]
pub struct UntrustedMove<G: Game>(G::Move);

impl<G: Game> Display for UntrustedMove<G>
where
    G::Move: Display,
{
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        <G::Move as Display>::fmt(&self.0, f)
    }
}

impl<G: Game> UntrustedMove<G> {
    pub fn from_move(mov: G::Move) -> Self {
        Self(mov)
    }

    pub fn check_pseudolegal(self, pos: &G) -> Option<G::Move> {
        if pos.is_legal(self.0) {
            Some(self.0)
        } else {
            None
        }
    }

    pub fn trust_unchecked(self) -> G::Move {
        self.0
    }

    pub fn to_underlying(self) -> <G::Move as GameMove<G>>::Underlying {
        self.0.to_underlying()
    }
}
