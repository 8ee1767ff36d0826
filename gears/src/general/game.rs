use crate::PlayerResult;
use crate::general::common::Res;
use crate::general::moves::GameMove;
use arbitrary::Arbitrary;
use derive_more::{BitXor, BitXorAssign};
use std::cmp::min;
use std::fmt::Debug;
use std::hash::Hash;
use std::marker::PhantomData;

/// A player, South moves first and is represented by `+1`, North is `-1`.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Arbitrary)]
pub enum Player {
    South,
    North,
}

impl Player {
    pub fn other(self) -> Self {
        match self {
            Player::South => Player::North,
            Player::North => Player::South,
        }
    }

    pub fn sign(self) -> i32 {
        match self {
            Player::South => 1,
            Player::North => -1,
        }
    }
}

/// Why a game ended.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Outcome {
    Win(Player),
    Draw,
}

/// Hash of a single position. Used as the key into the cache, the tablebase and the opening book.
#[derive(
    Copy,
    Clone,
    Eq,
    PartialEq,
    Default,
    Debug,
    derive_more::Display,
    BitXor,
    BitXorAssign,
    Arbitrary,
)]
#[must_use]
pub struct PosHash(pub u64);

/// Settings a game can be configured with, such as board size. Most games have none.
pub trait Settings: Eq + Debug + Default + Clone {
    fn text(&self) -> Option<String> {
        None
    }
}

/// Something that remembers previously visited positions so that repetitions can be detected.
/// Generalizes `gears`'s board history over the generic [`Game`] capability instead of a concrete board type.
pub trait GameHistory<G: Game>: Default + Debug + Clone + 'static {
    fn len(&self) -> usize;
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
    fn is_repetition(&self, pos: &G, plies_ago: usize) -> bool;
    fn push(&mut self, pos: &G);
    fn pop(&mut self);
    fn clear(&mut self);
}

/// A history that never records a repetition. Used by games, such as Oware, whose rules don't care about repeated
/// positions.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Default)]
pub struct NoHistory {}

impl<G: Game> GameHistory<G> for NoHistory {
    fn len(&self) -> usize {
        0
    }

    fn is_repetition(&self, _pos: &G, _plies_ago: usize) -> bool {
        false
    }

    fn push(&mut self, _pos: &G) {}

    fn pop(&mut self) {}

    fn clear(&mut self) {}
}

/// Stores only the hash of each previously visited position, which is enough to detect (almost certain) repetitions
/// cheaply, at the cost of an astronomically unlikely hash collision.
#[derive(Clone, Eq, PartialEq, Default, Debug)]
#[must_use]
pub struct ZobristHistory<G: Game>(pub Vec<PosHash>, PhantomData<G>);

impl<G: Game> GameHistory<G> for ZobristHistory<G> {
    fn len(&self) -> usize {
        self.0.len()
    }

    fn is_repetition(&self, pos: &G, plies_ago: usize) -> bool {
        pos.hash() == self.0[self.0.len() - plies_ago]
    }

    fn push(&mut self, pos: &G) {
        self.0.push(pos.hash());
    }

    fn pop(&mut self) {
        _ = self
            .0
            .pop()
            .expect("ZobristHistory::pop() called on empty history");
    }
    fn clear(&mut self) {
        self.0.clear();
    }
}

/// Compares the actual positions instead of only the hashes. Slower, but immune to hash collisions.
#[derive(Debug, Default, Clone)]
#[must_use]
pub struct PositionCopyHistory<G: Game>(Vec<G>);

impl<G: Game> GameHistory<G> for PositionCopyHistory<G> {
    fn len(&self) -> usize {
        self.0.len()
    }

    fn is_repetition(&self, pos: &G, plies_ago: usize) -> bool {
        self.0[self.len() - plies_ago] == *pos
    }

    fn push(&mut self, pos: &G) {
        self.0.push(pos.clone());
    }

    fn pop(&mut self) {
        self.0.pop();
    }

    fn clear(&mut self) {
        self.0.clear();
    }
}

/// True once `pos` has occurred at least `count` times (including the current occurrence) within the last
/// `max_lookback` plies of `history`.
pub fn n_fold_repetition<G: Game, H: GameHistory<G>>(
    mut count: usize,
    history: &H,
    pos: &G,
    max_lookback: usize,
) -> bool {
    let stop = min(history.len(), max_lookback);
    if stop < 2 {
        return false;
    }
    for i in (2..=stop).step_by(2) {
        if history.is_repetition(pos, i) {
            count -= 1;
            if count <= 1 {
                return true;
            }
        }
    }
    false
}

/// The generic capability every playable game must provide to the search core. Concrete rules, move generation
/// and notation (Oware, Chess, Draughts, Go, Othello, ...) live outside this crate and outside the search core;
/// this trait is the entire seam between them.
pub trait Game: Clone + Debug + Default + Eq + Hash {
    type Move: GameMove<Self>;
    /// Opaque iteration state for [`Game::next_move`]; lets a caller enumerate moves without allocating a `Vec`.
    type Cursor: Copy + Default + Eq + Debug;
    type Settings: Settings;

    fn make_move(&self, m: Self::Move) -> Option<Self>;

    fn unmake_move(&self, history: &mut Vec<Self>) -> Self {
        history.pop().expect("unmake_move called with empty history")
    }

    fn unmake_moves(&self, history: &mut Vec<Self>, n: usize) -> Self {
        let mut res = self.clone();
        for _ in 0..n {
            res = res.unmake_move(history);
        }
        res
    }

    fn length(&self) -> usize;

    fn turn(&self) -> Player;

    /// Advances `cursor` and returns the next legal move, or `None` once exhausted.
    fn next_move(&self, cursor: Self::Cursor) -> (Option<Self::Move>, Self::Cursor);

    fn get_cursor(&self) -> Self::Cursor {
        Self::Cursor::default()
    }

    /// Rewinds (or fast-forwards) enumeration to `c`, the way a value previously returned by [`Self::get_cursor`]
    /// or [`Self::next_move`] can be replayed later. Games whose cursor is just an index into a fixed, stateless
    /// move order (like the default [`Self::get_cursor`]) don't need to override this; games that enumerate moves
    /// lazily from mutable internal state must, so that `next_move` after a `set_cursor(c)` reproduces the same
    /// move it would have produced the first time the search visited `c`.
    fn set_cursor(&mut self, _c: Self::Cursor) {}

    fn legal_moves(&self) -> Vec<Self::Move> {
        let mut res = vec![];
        let mut cursor = self.get_cursor();
        loop {
            let (m, next) = self.next_move(cursor);
            match m {
                Some(m) => res.push(m),
                None => break,
            }
            cursor = next;
        }
        res
    }

    fn is_legal(&self, m: Self::Move) -> bool {
        self.legal_moves().contains(&m)
    }

    fn has_ended(&self) -> bool {
        self.outcome().is_some()
    }

    fn outcome(&self) -> Option<Outcome>;

    fn player_result(&self) -> Option<PlayerResult> {
        self.outcome().map(|o| match o {
            Outcome::Draw => PlayerResult::Draw,
            Outcome::Win(p) if p == self.turn() => PlayerResult::Win,
            Outcome::Win(_) => PlayerResult::Lose,
        })
    }

    /// A static evaluation of the position from the side to move's perspective. Negamax and UCT both read this
    /// value as-is at every node they visit, with no per-player sign flip anywhere in either engine, so an
    /// implementor must already fold `self.turn()` into the sign: a position good for whoever is about to move
    /// is positive, regardless of which player that is.
    fn score(&self) -> crate::score::Score;

    fn hash(&self) -> PosHash;

    /// Score assigned to a draw that the engine can play towards or away from.
    fn contempt(&self) -> crate::score::Score {
        crate::score::Score(0)
    }

    fn infinity(&self) -> crate::score::Score {
        crate::score::Score(crate::score::SCORE_WON + 1)
    }

    fn to_centi_pawns(&self, s: crate::score::Score) -> i32 {
        s.0
    }

    /// Reserves space for at least `n` additional plies of history; a no-op for games without a growable buffer.
    fn ensure_capacity(&mut self, _n: usize) {}

    fn to_diagram(&self) -> String;

    fn from_diagram(s: &str) -> Res<Self>;

    fn to_coordinates(&self, m: Self::Move) -> String {
        format!("{m:?}")
    }

    fn to_move(&self, coord: &str) -> Res<Self::Move>;

    fn to_notation(&self, moves: &[Self::Move]) -> String {
        moves
            .iter()
            .map(|m| self.to_coordinates(*m))
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn to_moves(&self, notation: &str) -> Res<Vec<Self::Move>> {
        notation.split_whitespace().map(|w| self.to_move(w)).collect()
    }

    fn is_repetition<H: GameHistory<Self>>(&self, history: &H) -> bool {
        n_fold_repetition(2, history, self, history.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::general::moves::{GameMove, Legality, UntrustedMove};
    use std::fmt::Formatter;

    #[derive(Debug, Eq, PartialEq, Clone, Default)]
    struct UnitSettings;

    impl Settings for UnitSettings {}

    #[derive(Debug, Copy, Clone, Eq, PartialEq, Default, Hash, Arbitrary)]
    struct CursorItem(u8);

    impl GameMove<CursorDemo> for CursorItem {
        type Underlying = u64;

        fn legality() -> Legality {
            Legality::Legal
        }

        fn is_tactical(self, _pos: &CursorDemo) -> bool {
            false
        }

        fn format_compact(self, f: &mut Formatter<'_>, _pos: &CursorDemo) -> std::fmt::Result {
            write!(f, "{}", self.0)
        }

        fn parse_compact_text<'a>(s: &'a str, _pos: &CursorDemo) -> Res<(&'a str, Self)> {
            let split = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
            let (num, rest) = s.split_at(split);
            Ok((rest, CursorItem(num.parse()?)))
        }

        fn from_u64_unchecked(val: u64) -> UntrustedMove<CursorDemo> {
            UntrustedMove::from_move(CursorItem(val as u8))
        }

        fn to_underlying(self) -> u64 {
            self.0 as u64
        }
    }

    const CURSOR_DEMO_MOVE_COUNT: u8 = 5;

    /// A position whose only state is how far enumeration over the fixed move list `0..CURSOR_DEMO_MOVE_COUNT`
    /// has advanced. Exists only to exercise `get_cursor`/`set_cursor` in isolation.
    #[derive(Debug, Clone, Eq, PartialEq, Hash, Default)]
    struct CursorDemo {
        cursor: u8,
    }

    impl Game for CursorDemo {
        type Move = CursorItem;
        type Cursor = u8;
        type Settings = UnitSettings;

        fn make_move(&self, _m: Self::Move) -> Option<Self> {
            Some(self.clone())
        }

        fn length(&self) -> usize {
            0
        }

        fn turn(&self) -> Player {
            Player::South
        }

        fn next_move(&self, cursor: Self::Cursor) -> (Option<Self::Move>, Self::Cursor) {
            if cursor < CURSOR_DEMO_MOVE_COUNT {
                (Some(CursorItem(cursor)), cursor + 1)
            } else {
                (None, cursor)
            }
        }

        fn get_cursor(&self) -> Self::Cursor {
            self.cursor
        }

        fn set_cursor(&mut self, c: Self::Cursor) {
            self.cursor = c;
        }

        fn outcome(&self) -> Option<Outcome> {
            None
        }

        fn score(&self) -> crate::score::Score {
            crate::score::Score(0)
        }

        fn hash(&self) -> PosHash {
            PosHash(self.cursor as u64)
        }

        fn to_diagram(&self) -> String {
            self.cursor.to_string()
        }

        fn from_diagram(s: &str) -> Res<Self> {
            Ok(Self { cursor: s.parse()? })
        }

        fn to_move(&self, _coord: &str) -> Res<Self::Move> {
            Ok(CursorItem(0))
        }
    }

    /// Reshuffling enumeration order via `set_cursor` must still reproduce the same move identity each
    /// previously-recorded cursor value produced, per the move-enumeration-with-cursor property.
    #[test]
    fn set_cursor_reproduces_recorded_move_identity() {
        let mut pos = CursorDemo::default();
        let mut cursor = pos.get_cursor();
        let mut recorded = Vec::new();
        loop {
            let (mov, next) = pos.next_move(cursor);
            match mov {
                Some(m) => recorded.push((cursor, m)),
                None => break,
            }
            cursor = next;
        }
        assert_eq!(recorded.len(), CURSOR_DEMO_MOVE_COUNT as usize);

        for (saved_cursor, expected_move) in recorded {
            pos.set_cursor(saved_cursor);
            assert_eq!(pos.get_cursor(), saved_cursor);
            let (mov, _) = pos.next_move(pos.get_cursor());
            assert_eq!(mov, Some(expected_move));
        }
    }
}
