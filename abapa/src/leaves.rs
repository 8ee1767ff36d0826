//! Read-only endgame lookup. An implementation answers "is this position inside my solved domain, and if so
//! what's its exact outcome" without needing to search it. [`Negamax`](crate::negamax::Negamax) and
//! [`Uct`](crate::uct::Uct) both probe a `Leaves<G>` at every node, the same way they probe [`crate::cache::Cache`].
//!
//! No game shipped in this crate comes with its own tablebase, so the perfect-hash solver below follows the
//! retrograde-analysis shape common to endgame tablebases generally:
//! enumerate positions by ascending material, seed terminal scores, then repeatedly sweep until no more
//! positions become known, same fixed-point idea as a standard backward induction over a DAG.

use gears::general::game::Game;
use gears::score::Score;
use gears::search::NodeType;

/// A qualifying bound on a stored exact-or-bounded score, mirroring [`NodeType`] but with an explicit "nothing
/// stored here" state a lookup can return before any entry has been computed.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Default)]
pub enum LeafFlag {
    #[default]
    Empty,
    Lower,
    Upper,
    Exact,
}

impl From<NodeType> for LeafFlag {
    fn from(value: NodeType) -> Self {
        match value {
            NodeType::Exact => LeafFlag::Exact,
            NodeType::FailLow => LeafFlag::Upper,
            NodeType::FailHigh => LeafFlag::Lower,
        }
    }
}

/// A found entry: the exact (or bounded) score from the side to move's perspective, and its flag.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct LeafEntry {
    pub score: Score,
    pub flag: LeafFlag,
}

/// Read-only endgame lookup. `find` is the only operation the search engines call; everything else is
/// construction/solving machinery specific to an implementation.
///
/// Only [`LeafFlag::Exact`] is ever relied upon by the engines in this crate: a tablebase that can only bound a
/// position (rather than solve it exactly) is free to report [`LeafFlag::Lower`]/[`LeafFlag::Upper`], but
/// [`crate::negamax::Negamax`] and [`crate::uct::Uct`] both treat anything other than `Exact` as a miss, per the
/// guidance that a leaves implementation should never be relied on for a bound it can't fully justify.
pub trait Leaves<G: Game> {
    fn find(&self, pos: &G) -> Option<LeafEntry>;
}

/// A [`Leaves`] that never has anything, used where no tablebase is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoLeaves;

impl<G: Game> Leaves<G> for NoLeaves {
    fn find(&self, _pos: &G) -> Option<LeafEntry> {
        None
    }
}

/// A perfect-hash tablebase over positions reachable with at most `max_seeds` total seeds on the board (the
/// intended domain is Oware Abapa with `max_seeds = 12`, but the solver itself is agnostic to what "seeds"
/// means for a given `Game` beyond the caller-supplied `seed_count`).
///
/// The table is a flat byte-per-position array indexed by a caller-supplied perfect hash (typically a binomial
/// numbering of the position within its seed-count class); each byte packs a signed score in the high 6 bits
/// (`(score + max_seeds + 1) / 2`, recovered as `byte * 2 - max_seeds - 1`) and a 2-bit [`LeafFlag`] in the low
/// bits, a packed-byte cache-entry style scaled down to a single byte.
#[derive(Debug, Clone)]
pub struct PerfectHashTablebase<G: Game> {
    max_seeds: u32,
    table: Box<[u8]>,
    index_of: fn(&G) -> Option<usize>,
    _game: std::marker::PhantomData<G>,
}

const EMPTY_BYTE: u8 = 0b11;

impl<G: Game> PerfectHashTablebase<G> {
    /// `index_of` maps a position to its slot in `table`, or `None` if the position falls outside the domain
    /// this table indexes (e.g. too many seeds). `table.len()` must equal the number of distinct indices
    /// `index_of` can produce.
    pub fn new(max_seeds: u32, table: Box<[u8]>, index_of: fn(&G) -> Option<usize>) -> Self {
        Self { max_seeds, table, index_of, _game: std::marker::PhantomData }
    }

    fn pack(&self, score: Score, flag: LeafFlag) -> u8 {
        let clamped = score.0.clamp(-(self.max_seeds as i32) - 1, self.max_seeds as i32 + 1);
        let high = ((clamped + self.max_seeds as i32 + 1) / 2) as u8;
        (high << 2) | Self::flag_bits(flag)
    }

    fn unpack(&self, byte: u8) -> LeafEntry {
        let high = byte >> 2;
        let score = Score(high as i32 * 2 - self.max_seeds as i32 - 1);
        LeafEntry { score, flag: Self::bits_flag(byte & 0b11) }
    }

    fn flag_bits(flag: LeafFlag) -> u8 {
        match flag {
            LeafFlag::Empty => 0b11,
            LeafFlag::Lower => 0b00,
            LeafFlag::Upper => 0b01,
            LeafFlag::Exact => 0b10,
        }
    }

    fn bits_flag(bits: u8) -> LeafFlag {
        match bits {
            0b00 => LeafFlag::Lower,
            0b01 => LeafFlag::Upper,
            0b10 => LeafFlag::Exact,
            _ => LeafFlag::Empty,
        }
    }

    pub fn set(&mut self, index: usize, score: Score, flag: LeafFlag) {
        self.table[index] = self.pack(score, flag);
    }

    pub fn is_known(&self, index: usize) -> bool {
        self.table[index] & 0b11 != EMPTY_BYTE
    }
}

impl<G: Game> Leaves<G> for PerfectHashTablebase<G> {
    fn find(&self, pos: &G) -> Option<LeafEntry> {
        let index = (self.index_of)(pos)?;
        let entry = self.unpack(self.table[index]);
        if entry.flag == LeafFlag::Empty { None } else { Some(entry) }
    }
}

/// One node's contribution while [`solve`] sweeps towards a fixed point: either a known exact score, or "not
/// known yet".
#[derive(Debug, Copy, Clone)]
enum SolveState {
    Unknown,
    Known(Score),
}

/// Builds a [`PerfectHashTablebase`] by retrograde analysis: seed every position whose game has already ended
/// with its terminal score, then repeatedly sweep every unsolved position, resolving it once every one of its
/// children is solved (its score is the negamax minimum, i.e. the worst score among children from the mover's
/// perspective once negated). Iterates to a fixed point; positions that can't be resolved (a domain with a
/// reachable cycle not covered by repetition rules) are left unknown.
///
/// `positions` must enumerate every position the resulting table should cover, in an order where `index_of`
/// applied to each yields a unique slot; `children_of` must only return positions also covered by `positions`.
pub fn solve<G: Game>(
    max_seeds: u32,
    positions: &[G],
    index_of: fn(&G) -> Option<usize>,
    children_of: impl Fn(&G) -> Vec<G>,
) -> PerfectHashTablebase<G> {
    let mut table = vec![EMPTY_BYTE; positions.len()].into_boxed_slice();
    let mut states = vec![SolveState::Unknown; positions.len()];

    let mut tablebase = PerfectHashTablebase::new(max_seeds, table.clone(), index_of);

    for (i, pos) in positions.iter().enumerate() {
        if let Some(outcome) = pos.outcome() {
            let score = match outcome {
                gears::general::game::Outcome::Draw => Score(0),
                gears::general::game::Outcome::Win(p) if p == pos.turn() => gears::score::SCORE_WON,
                gears::general::game::Outcome::Win(_) => gears::score::SCORE_LOST,
            };
            states[i] = SolveState::Known(score);
        }
    }

    loop {
        let mut progressed = false;
        for (i, pos) in positions.iter().enumerate() {
            if matches!(states[i], SolveState::Known(_)) {
                continue;
            }
            let children = children_of(pos);
            let mut best: Option<Score> = None;
            let mut all_known = true;
            for child in &children {
                let Some(child_idx) = index_of(child) else {
                    all_known = false;
                    break;
                };
                match states[child_idx] {
                    SolveState::Known(s) => {
                        let negated = -s;
                        best = Some(best.map_or(negated, |b: Score| b.max(negated)));
                        // A child worth the theoretical maximum can't be beaten by any other child, so the
                        // sweep over remaining children is pointless for this node.
                        if negated.0 >= max_seeds as i32 {
                            break;
                        }
                    }
                    SolveState::Unknown => {
                        all_known = false;
                        break;
                    }
                }
            }
            if all_known {
                if let Some(score) = best {
                    states[i] = SolveState::Known(score);
                    progressed = true;
                }
            }
        }
        if !progressed {
            break;
        }
    }

    for (i, state) in states.iter().enumerate() {
        if let SolveState::Known(score) = state {
            let byte = tablebase.pack(*score, LeafFlag::Exact);
            table[i] = byte;
        }
    }
    tablebase.table = table;
    tablebase
}

#[cfg(test)]
mod tests {
    use super::*;
    use gears::general::mock_game::CountdownGame;
    use proptest::prelude::*;

    fn index_of(pos: &CountdownGame) -> Option<usize> {
        Some(pos.remaining as usize)
    }

    #[test]
    fn no_leaves_always_misses() {
        let leaves = NoLeaves;
        assert!(Leaves::<CountdownGame>::find(&leaves, &CountdownGame::default()).is_none());
    }

    #[test]
    fn pack_unpack_round_trips() {
        let table = PerfectHashTablebase::<CountdownGame>::new(12, vec![EMPTY_BYTE; 1].into_boxed_slice(), index_of);
        for score in [-13, -1, 0, 1, 13] {
            let byte = table.pack(Score(score), LeafFlag::Exact);
            let entry = table.unpack(byte);
            assert_eq!(entry.score, Score(score));
            assert_eq!(entry.flag, LeafFlag::Exact);
        }
    }

    #[test]
    fn solve_resolves_terminal_and_backs_up_one_ply() {
        let positions: Vec<CountdownGame> = (0..=3).map(CountdownGame::new).collect();
        let children_of = |pos: &CountdownGame| -> Vec<CountdownGame> {
            pos.legal_moves().into_iter().filter_map(|m| pos.make_move(m)).collect()
        };
        let tb = solve(12, &positions, index_of, children_of);
        // an empty pile has already ended the game, so it must resolve without needing any child
        let zero = CountdownGame::new(0);
        let entry = tb.find(&zero).expect("terminal position must be known");
        assert_eq!(entry.flag, LeafFlag::Exact);
        // every position reachable within the enumerated range must resolve, since CountdownGame has no cycles
        for pos in &positions {
            assert!(tb.find(pos).is_some(), "{pos:?} should have resolved");
        }
    }

    proptest! {
        /// Tablebase idempotence (spec §8): repeated lookups of an in-domain position return the same
        /// `(score, flag)` every time, and the score never exceeds the seed bound.
        #[test]
        fn find_is_idempotent_and_score_bounded(pile in 0u8..=20) {
            let positions: Vec<CountdownGame> = (0..=20).map(CountdownGame::new).collect();
            let children_of = |pos: &CountdownGame| -> Vec<CountdownGame> {
                pos.legal_moves().into_iter().filter_map(|m| pos.make_move(m)).collect()
            };
            let tb = solve(20, &positions, index_of, children_of);
            let pos = CountdownGame::new(pile);
            let Some(first) = tb.find(&pos) else { return Ok(()) };
            let second = tb.find(&pos).expect("a position known once must stay known");
            prop_assert_eq!(first, second);
            prop_assert!(first.score.0.unsigned_abs() <= 20);
        }
    }
}
