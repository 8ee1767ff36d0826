//! Shared data structures and the [`Engine`] trait that both [`crate::negamax`] and [`crate::uct`] implement.
//! A searcher is parameterized purely over [`Game`]; it knows its cache, its time and node limits, and how to
//! report progress, and nothing about protocol. `search` itself still runs to completion on the calling
//! thread -- running it on a worker thread is the external text-protocol layer's job -- but [`AbortFlag`]
//! lets any other thread holding a clone of it stop that search early via [`Engine::abort_computation`].

use crate::cache::Cache;
use crate::report::{Reporter, Summary};
use gears::general::common::{NamedEntity, Res, StaticallyNamedEntity};
use gears::general::game::{Game, GameHistory, NoHistory};
use gears::score::Score;
use gears::search::{Depth, NodesLimit, SearchInfo, SearchLimit, SearchResult};
use std::fmt::Debug;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

/// The best line found so far at a given root move, kept across iterative-deepening iterations so that a
/// search that runs out of time can still report the previous iteration's principal variation.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Pv<G: Game> {
    moves: Vec<G::Move>,
}

impl<G: Game> Default for Pv<G> {
    fn default() -> Self {
        Self { moves: Vec::new() }
    }
}

impl<G: Game> Pv<G> {
    pub fn as_slice(&self) -> &[G::Move] {
        &self.moves
    }

    pub fn len(&self) -> usize {
        self.moves.len()
    }

    pub fn is_empty(&self) -> bool {
        self.moves.is_empty()
    }

    pub fn clear(&mut self) {
        self.moves.clear();
    }

    /// Extends this pv with `mov` followed by the child node's pv, the usual way a pv is assembled while
    /// unwinding the search tree.
    pub fn extend(&mut self, mov: G::Move, child: &Pv<G>) {
        self.moves.clear();
        self.moves.push(mov);
        self.moves.extend_from_slice(child.as_slice());
    }

    pub fn reset_to_move(&mut self, mov: G::Move) {
        self.moves.clear();
        self.moves.push(mov);
    }
}

/// Parameters a caller hands to [`Engine::search`]: the position, the time/node budget, the repetition
/// history leading up to this position, and the cache to read from and write into.
#[derive(Debug)]
pub struct SearchParams<G: Game, H: GameHistory<G> = NoHistory> {
    pub pos: G,
    pub limit: SearchLimit,
    pub history: H,
    pub cache: Cache<G>,
    pub contempt: Score,
}

impl<G: Game> SearchParams<G, NoHistory> {
    pub fn new(pos: G, limit: SearchLimit) -> Self {
        Self { pos, limit, history: NoHistory::default(), cache: Cache::default(), contempt: Score(0) }
    }
}

impl<G: Game, H: GameHistory<G>> SearchParams<G, H> {
    pub fn with_history(pos: G, limit: SearchLimit, history: H, cache: Cache<G>) -> Self {
        Self { pos, limit, history, cache, contempt: Score(0) }
    }

    pub fn with_contempt(mut self, contempt: Score) -> Self {
        self.contempt = contempt;
        self
    }

    /// Caps search depth, leaving every other limit untouched.
    pub fn set_depth(&mut self, depth: Depth) {
        self.limit.depth = depth;
    }

    /// Caps this move's search time, leaving every other limit untouched.
    pub fn set_move_time(&mut self, time: Duration) {
        self.limit.fixed_time = time;
    }

    pub fn set_contempt(&mut self, contempt: Score) {
        self.contempt = contempt;
    }

    /// Removes every limit: the search runs until [`Engine::abort_computation`] stops it.
    pub fn set_infinity(&mut self) {
        self.limit = SearchLimit::infinite();
    }
}

/// A stop signal a caller can set from outside a running search, following the original engine thread's
/// `AtomicSearchState::should_stop`/`set_stop`/`stop_flag` fields minus the rest of that struct's
/// per-iteration telemetry, which [`SearchFlags`] already covers here. Cloning shares the same underlying
/// flag, so a caller can keep a handle alive across the thread boundary while a search runs elsewhere.
#[derive(Debug, Clone, Default)]
pub struct AbortFlag(Arc<AtomicBool>);

impl AbortFlag {
    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    pub fn set(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn clear(&self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Tracks whether a running search should stop: either because the caller asked for it, or because
/// [`Engine::should_stop`] noticed a limit was reached. Plain state, no atomics, because a search and its
/// caller never run concurrently in this crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct SearchFlags {
    pub stop: bool,
    pub nodes: u64,
    pub seldepth: Depth,
    pub iterations: Depth,
}

impl SearchFlags {
    pub fn count_node(&mut self) {
        self.nodes += 1;
    }

    pub fn update_seldepth(&mut self, ply: usize) {
        self.seldepth = self.seldepth.max(Depth::new_unchecked(ply));
    }
}

/// A pluggable adversarial searcher: given a position and a [`SearchLimit`], returns a move, a score, and
/// (where applicable) a principal variation. [`crate::negamax::Negamax`] and [`crate::uct::Uct`] are the two
/// implementations in this crate.
pub trait Engine<G: Game>: StaticallyNamedEntity + NamedEntity + Debug {
    /// Runs a fresh search, ignoring any history (no repetition detection before the root).
    fn search_with_new_cache(&mut self, pos: G, limit: SearchLimit) -> SearchResult<G> {
        self.search(SearchParams::new(pos, limit))
    }

    /// Runs a search, respecting the repetition history and cache the caller supplies.
    fn search<H: GameHistory<G>>(&mut self, params: SearchParams<G, H>) -> SearchResult<G>;

    /// Clears all learned state (the cache, history tables, ...). Should be called between unrelated
    /// searches (e.g. a new game) so that stale entries don't leak across positions.
    fn forget(&mut self);

    /// Reports progress so far; can be called while a search is conceptually "in progress" from the
    /// caller's point of view, even though `search` itself only returns once finished.
    fn search_info(&self) -> SearchInfo<G>;

    /// Registers where this engine pushes per-iteration info and the final result. Replaces any previously
    /// attached consumer; pass a [`crate::report::NullReporter`] to detach.
    fn attach_consumer(&mut self, reporter: Box<dyn Reporter<G>>);

    /// The handle [`Self::abort_computation`] signals and [`Self::should_stop`] polls. An implementor clears
    /// it at the start of every [`Self::search`] call so a stale signal from a previous search can't abort
    /// the next one before it starts.
    fn abort_flag(&self) -> &AbortFlag;

    /// Stops a running search. With `delay` omitted, the abort flag is set immediately, so the next
    /// [`Self::should_stop`] poll (every 1024 nodes) ends the search; with `delay` given, a background
    /// thread sets the flag after sleeping that long instead, for a caller that wants a wall-clock deadline
    /// without polling the search itself.
    fn abort_computation(&self, delay: Option<Duration>) {
        match delay {
            None => self.abort_flag().set(),
            Some(delay) => {
                let flag = self.abort_flag().clone();
                let _ = thread::spawn(move || {
                    thread::sleep(delay);
                    flag.set();
                });
            }
        }
    }

    fn should_stop(&self, flags: &SearchFlags, limit: &SearchLimit, start: Instant) -> bool {
        if self.abort_flag().is_set() {
            return true;
        }
        if flags.nodes >= limit.nodes.get() {
            return true;
        }
        if flags.nodes % 1024 != 0 {
            return false;
        }
        start.elapsed() >= limit.max_move_time()
    }

    fn default_bench_depth(&self) -> Depth;

    fn default_bench_nodes(&self) -> NodesLimit;
}

/// Runs `engine` to a fixed limit on every position in `positions` without resetting learned state between
/// searches, then returns a summary used to detect search regressions (the usual meaning of a "bench").
pub fn run_bench<G: Game, E: Engine<G>>(
    engine: &mut E,
    limit: SearchLimit,
    positions: &[G],
    reporter: &mut dyn Reporter<G>,
) -> Summary {
    let start = Instant::now();
    let mut total_nodes = 0u64;
    for pos in positions {
        let res = engine.search_with_new_cache(pos.clone(), limit);
        total_nodes += engine.search_info().nodes.get();
        reporter.report_result(&res);
    }
    Summary { nodes: total_nodes, time: start.elapsed() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gears::general::mock_game::{CountdownGame, TakeTokens};

    #[test]
    fn pv_extend_prepends_move() {
        let mut pv = Pv::<CountdownGame>::default();
        let mut child = Pv::<CountdownGame>::default();
        child.reset_to_move(TakeTokens(1));
        pv.extend(TakeTokens(2), &child);
        assert_eq!(pv.as_slice(), &[TakeTokens(2), TakeTokens(1)]);
    }

    #[test]
    fn search_flags_seldepth_tracks_max() {
        let mut flags = SearchFlags::default();
        flags.update_seldepth(3);
        flags.update_seldepth(1);
        assert_eq!(flags.seldepth, Depth::new_unchecked(3));
    }
}
