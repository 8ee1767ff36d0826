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

//! Anything related to search that is also used by `monitors`, and therefore doesn't belong in `motors`.

use crate::PlayerResult;
use crate::general::common::Res;
use crate::search::NodeType;
use crate::search::NodeType::{Exact, FailHigh, FailLow};
use anyhow::anyhow;
use derive_more::{Add, AddAssign, Neg, Sub, SubAssign};
use std::fmt::{Display, Formatter};
use std::ops::{Add, Div, Mul, Sub};

/// Valid scores fit into 16 bits, but it's possible to temporarily overflow that range with some operations,
/// e.g. when computing `score - previous_score`. So in order to avoid bugs related to that, simply use 32 bits.
pub type ScoreT = i32;

/// The width a score is packed into for cache storage. Widened from a 16-bit original to 32 so a cache
/// entry's score never needs renormalizing for a different game's score range.
pub type CompactScoreT = i32;

#[derive(Default, Debug, Eq, PartialEq, Ord, PartialOrd, Copy, Clone, Hash, Add, Sub, Neg, AddAssign, SubAssign)]
#[must_use]
pub struct Score(pub ScoreT);

impl Display for Score {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if let Some(moves_until_over) = self.moves_until_game_won() {
            write!(f, "mate {moves_until_over}")
        } else {
            write!(f, "cp {0}", self.0) // TODO: WDL normalization
        }
    }
}

impl Add<ScoreT> for Score {
    type Output = Score;

    fn add(self, rhs: ScoreT) -> Self::Output {
        Score(self.0 + rhs)
    }
}

impl Sub<ScoreT> for Score {
    type Output = Score;

    fn sub(self, rhs: ScoreT) -> Self::Output {
        Score(self.0 - rhs)
    }
}

impl Mul<ScoreT> for Score {
    type Output = Score;

    fn mul(self, rhs: ScoreT) -> Self::Output {
        Score(self.0 * rhs)
    }
}

impl Div<ScoreT> for Score {
    type Output = Score;

    fn div(self, rhs: ScoreT) -> Self::Output {
        Score(self.0 / rhs)
    }
}

impl TryFrom<isize> for Score {
    type Error = anyhow::Error;

    fn try_from(value: isize) -> Res<Self> {
        let score = ScoreT::try_from(value)?;
        Score(score).verify_valid().ok_or_else(|| anyhow!("{score} is outside of the valid values for a Score"))
    }
}

impl Score {
    pub fn from_compact(compact: CompactScoreT) -> Self {
        Self(compact as ScoreT)
    }
    pub fn is_game_won_score(self) -> bool {
        self >= MIN_SCORE_WON
    }
    pub fn is_game_lost_score(self) -> bool {
        self <= MAX_SCORE_LOST
    }
    pub fn is_won_or_lost(self) -> bool {
        self.is_game_won_score() || self.is_game_lost_score()
    }
    // a draw implies score == 0, but score == 0 does not imply a draw
    pub fn is_won_lost_or_draw_score(self) -> bool {
        self.is_won_or_lost() || self.0 == 0
    }
    /// Returns a negative number of plies if the game is lost
    pub fn plies_until_game_won(self) -> Option<isize> {
        if self.is_game_won_score() {
            Some((SCORE_WON - self).0 as isize)
        } else if self.is_game_lost_score() {
            Some((SCORE_LOST - self).0 as isize)
        } else {
            None
        }
    }
    /// Returns a negative number if the game is lost
    pub fn moves_until_game_won(self) -> Option<isize> {
        self.plies_until_game_won().map(|n| (n as f32 / 2f32).ceil() as isize)
    }

    pub fn plies_until_game_over(self) -> Option<isize> {
        self.plies_until_game_won().map(isize::abs)
    }

    pub fn abs(self) -> Self {
        Self(self.0.abs())
    }

    pub fn verify_valid(self) -> Option<Self> {
        if (self <= SCORE_WON && self >= SCORE_LOST) || self == SCORE_TIME_UP || self == NO_SCORE_YET {
            Some(self)
        } else {
            None
        }
    }

    pub fn is_valid(self) -> bool {
        self.verify_valid().is_some()
    }

    pub fn flip_if(self, flip: bool) -> Self {
        if flip { -self } else { self }
    }

    pub fn node_type(self, alpha: Score, beta: Score) -> NodeType {
        if self <= alpha {
            FailLow
        } else if self >= beta {
            FailHigh
        } else {
            Exact
        }
    }

    pub fn compact(self) -> CompactScoreT {
        self.0 as CompactScoreT
    }
}

/// `SCORE_WON` and `SCORE_LOST` need to fit into 16 bits for the tapered score to work,
/// and the open interval `(alpha, beta)` has to be able to contain them.
pub const MIN_ALPHA: Score = Score(-31_001);
pub const MAX_BETA: Score = Score(31_001);
pub const SCORE_LOST: Score = Score(-31_000);
pub const SCORE_WON: Score = Score(31_000);
pub const SCORE_TIME_UP: Score = Score(SCORE_LOST.0 - 1000);
// can't use + directly because derive_more's + isn't `const`
pub const MIN_SCORE_WON: Score = Score(SCORE_WON.0 - 1000);
pub const MAX_SCORE_LOST: Score = Score(SCORE_LOST.0 + 1000);
pub const MIN_NORMAL_SCORE: Score = Score(MAX_SCORE_LOST.0 + 1);
pub const MAX_NORMAL_SCORE: Score = Score(MIN_SCORE_WON.0 - 1);
pub const NO_SCORE_YET: Score = Score(SCORE_LOST.0 - 100);

pub fn game_result_to_score(res: PlayerResult, ply: usize) -> Score {
    match res {
        PlayerResult::Win => SCORE_WON - ply as ScoreT,
        PlayerResult::Lose => SCORE_LOST + ply as ScoreT,
        PlayerResult::Draw => Score(0),
    }
}

pub const fn is_valid_score(score: ScoreT) -> bool {
    score >= SCORE_LOST.0 && score <= SCORE_WON.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn won_lost_score_test() {
        assert!(SCORE_WON.is_game_won_score());
        assert!(SCORE_LOST.is_game_lost_score());
        assert!(!Score(0).is_won_or_lost());
        assert_eq!(Score(0).plies_until_game_won(), None);
        assert_eq!((SCORE_WON - 3).plies_until_game_won(), Some(3));
        assert_eq!((SCORE_LOST + 4).plies_until_game_won(), Some(-4));
    }

    #[test]
    fn node_type_test() {
        let alpha = Score(10);
        let beta = Score(20);
        assert_eq!(Score(5).node_type(alpha, beta), NodeType::FailLow);
        assert_eq!(Score(15).node_type(alpha, beta), NodeType::Exact);
        assert_eq!(Score(25).node_type(alpha, beta), NodeType::FailHigh);
    }

    #[test]
    fn game_result_to_score_test() {
        assert_eq!(game_result_to_score(PlayerResult::Draw, 0), Score(0));
        assert!(game_result_to_score(PlayerResult::Win, 0).is_game_won_score());
        assert!(game_result_to_score(PlayerResult::Lose, 0).is_game_lost_score());
    }
}
