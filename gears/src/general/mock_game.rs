//! A tiny deterministic game used to exercise the search core without depending on a real game
//! implementation. Two players alternately remove one or two tokens from a pile; whoever is forced
//! to take the last token loses. Small enough to brute-force, which makes it useful for property
//! tests of the cache, the tablebase and both engines.

use crate::general::common::Res;
use crate::general::game::{Game, Outcome, Player, PosHash, Settings};
use crate::general::moves::{GameMove, Legality, UntrustedMove};
use crate::score::Score;
use anyhow::bail;
use arbitrary::Arbitrary;
use std::fmt;
use std::fmt::Formatter;

#[derive(Debug, Copy, Clone, Eq, PartialEq, Default, Hash, Arbitrary)]
pub struct TakeTokens(pub u8);

impl GameMove<CountdownGame> for TakeTokens {
    type Underlying = u64;

    fn legality() -> Legality {
        Legality::Legal
    }

    fn is_tactical(self, _pos: &CountdownGame) -> bool {
        false
    }

    fn format_compact(self, f: &mut Formatter<'_>, _pos: &CountdownGame) -> fmt::Result {
        write!(f, "take{}", self.0)
    }

    fn parse_compact_text<'a>(s: &'a str, _pos: &CountdownGame) -> Res<(&'a str, TakeTokens)> {
        let digit = s
            .as_bytes()
            .first()
            .ok_or_else(|| anyhow::anyhow!("expected a digit, got empty input"))?;
        let n = digit.checked_sub(b'0').ok_or_else(|| anyhow::anyhow!("'{}' is not a digit", *digit as char))?;
        if n == 0 || n > 2 {
            bail!("take count must be 1 or 2, got {n}");
        }
        Ok((&s[1..], TakeTokens(n)))
    }

    fn from_u64_unchecked(val: u64) -> UntrustedMove<CountdownGame> {
        UntrustedMove::from_move(TakeTokens(val as u8))
    }

    fn to_underlying(self) -> Self::Underlying {
        self.0 as u64
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Default)]
pub struct CountdownSettings {
    pub pile_size: u8,
}

impl Settings for CountdownSettings {}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct CountdownGame {
    pub remaining: u8,
    pub to_move: Player,
    pub ply: usize,
}

impl Default for CountdownGame {
    fn default() -> Self {
        Self {
            remaining: 21,
            to_move: Player::South,
            ply: 0,
        }
    }
}

impl CountdownGame {
    pub fn new(pile_size: u8) -> Self {
        Self {
            remaining: pile_size,
            to_move: Player::South,
            ply: 0,
        }
    }
}

impl Game for CountdownGame {
    type Move = TakeTokens;
    type Cursor = u8;
    type Settings = CountdownSettings;

    fn make_move(&self, m: Self::Move) -> Option<Self> {
        if m.0 == 0 || m.0 > 2 || m.0 > self.remaining {
            return None;
        }
        Some(Self {
            remaining: self.remaining - m.0,
            to_move: self.to_move.other(),
            ply: self.ply + 1,
        })
    }

    fn length(&self) -> usize {
        self.ply
    }

    fn turn(&self) -> Player {
        self.to_move
    }

    fn next_move(&self, cursor: Self::Cursor) -> (Option<Self::Move>, Self::Cursor) {
        if self.has_ended() {
            return (None, cursor);
        }
        let take = cursor + 1;
        if take > 2 || take > self.remaining {
            (None, cursor)
        } else {
            (Some(TakeTokens(take)), take)
        }
    }

    fn outcome(&self) -> Option<Outcome> {
        if self.remaining == 0 {
            // the player to move has just been handed the empty pile, meaning the previous mover took the
            // last token and loses
            Some(Outcome::Win(self.to_move))
        } else {
            None
        }
    }

    fn score(&self) -> Score {
        if self.remaining % 3 == 0 {
            Score(-1)
        } else {
            Score(1)
        }
    }

    fn hash(&self) -> PosHash {
        let mut h = self.remaining as u64;
        h = h.wrapping_mul(0x9E37_79B9_7F4A_7C15);
        h ^= matches!(self.to_move, Player::South) as u64;
        PosHash(h)
    }

    fn to_diagram(&self) -> String {
        format!("{}|{:?}", self.remaining, self.to_move)
    }

    fn from_diagram(s: &str) -> Res<Self> {
        let (pile, player) = s
            .split_once('|')
            .ok_or_else(|| anyhow::anyhow!("expected '<pile>|<player>'"))?;
        let remaining: u8 = pile.parse()?;
        let to_move = match player {
            "South" => Player::South,
            "North" => Player::North,
            other => bail!("unknown player '{other}'"),
        };
        Ok(Self {
            remaining,
            to_move,
            ply: 0,
        })
    }

    fn to_move(&self, coord: &str) -> Res<Self::Move> {
        let n: u8 = coord
            .strip_prefix("take")
            .ok_or_else(|| anyhow::anyhow!("expected 'take1' or 'take2', got '{coord}'"))?
            .parse()?;
        Ok(TakeTokens(n))
    }
}
