//! Best-first Monte-Carlo tree search (UCT). `abapa/src/search/generic/proof_number.rs`'s AND/OR proof-number
//! search is the closest analogue elsewhere in this crate, but it contributes only its always-replace
//! flat-table habit, not its structure, since it recomputes children from the position on every visit instead
//! of keeping an explicit tree. The arena-of-handles shape here (parent/first-child/next-sibling indices into
//! one `Vec`, the parent link a weak back-reference only) and the depth-2 subtree retention scan are this
//! module's own design. Wiring (cache, leaves, reporter, the `Engine` trait) follows `crate::negamax::Negamax`.

use crate::leaves::{LeafFlag, Leaves, NoLeaves};
use crate::report::{NullReporter, Reporter};
use crate::search::{AbortFlag, Engine, SearchFlags, SearchParams};
use gears::general::common::StaticallyNamedEntity;
use gears::general::game::{Game, GameHistory};
use gears::general::moves::GameMove;
use gears::score::{SCORE_LOST, SCORE_WON, Score, game_result_to_score};
use gears::search::{Depth, NodesLimit, SearchInfo, SearchLimit, SearchResult};
use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};
use std::collections::VecDeque;
use std::time::Instant;

/// Expansions completed before an abort is honored, so an interrupted search still returns a move backed
/// by some evidence.
const MIN_PROBES: u64 = 1000;
/// How often (in expansions) progress is reported to the attached consumer.
const REPORT_PROBES: u64 = 250_000;
/// A child must retain at least this fraction of its parent's visits to survive principal-variation
/// extraction; below it the sample is too thin to trust.
const PV_VISIT_FRACTION: f64 = 0.6;
/// Exploration bias for heuristic-guided UCT (the default evaluator).
pub const DEFAULT_EXPLORATION_HEURISTIC: f64 = 0.176;
/// Exploration bias for the random-rollout (Monte-Carlo) variant -- the classical `1/sqrt(2)` UCT constant.
pub const DEFAULT_EXPLORATION_ROLLOUT: f64 = 0.707;

#[derive(Debug, Clone, Copy, PartialEq)]
enum Evaluator {
    Heuristic,
    RandomRollout { max_depth: usize },
}

#[derive(Debug, Clone)]
struct UctNode<G: Game> {
    pos: G,
    /// The move that produced this node from its parent; meaningless at the root.
    mov: G::Move,
    parent: Option<usize>,
    first_child: Option<usize>,
    next_sibling: Option<usize>,
    visits: u32,
    /// Running mean of backed-up values, from this node's own side-to-move's perspective.
    mean: f64,
    next_unexpanded: usize,
    legal_moves: Vec<G::Move>,
    terminal: bool,
}

impl<G: Game> UctNode<G> {
    fn new(pos: G, mov: G::Move, parent: Option<usize>) -> Self {
        let terminal = pos.has_ended();
        let legal_moves = if terminal { Vec::new() } else { pos.legal_moves() };
        Self { pos, mov, parent, first_child: None, next_sibling: None, visits: 0, mean: 0.0, next_unexpanded: 0, legal_moves, terminal }
    }

    fn fully_expanded(&self) -> bool {
        self.next_unexpanded >= self.legal_moves.len()
    }
}

/// Best-first UCT/MCTS over a generic [`Game`]. `L` is the tablebase consulted when evaluating a freshly
/// expanded leaf; the default [`NoLeaves`] disables tablebase probing entirely.
pub struct Uct<G: Game, L: Leaves<G> = NoLeaves> {
    nodes: Vec<UctNode<G>>,
    root: Option<usize>,
    leaves: L,
    reporter: Box<dyn Reporter<G>>,
    rng: StdRng,
    exploration: f64,
    evaluator: Evaluator,
    /// Running min/max of values backed up all the way to the root, used to scale the exploration term.
    root_alpha: Score,
    root_beta: Score,
    flags: SearchFlags,
    limit: SearchLimit,
    start: Instant,
    last_pos: G,
    last_score: Score,
    abort: AbortFlag,
}

impl<G: Game, L: Leaves<G> + Default> Default for Uct<G, L> {
    fn default() -> Self {
        Self {
            nodes: Vec::new(),
            root: None,
            leaves: L::default(),
            reporter: Box::new(NullReporter),
            rng: StdRng::seed_from_u64(rand::rng().next_u64()),
            exploration: DEFAULT_EXPLORATION_HEURISTIC,
            evaluator: Evaluator::Heuristic,
            root_alpha: Score(SCORE_WON.0 + 1),
            root_beta: Score(SCORE_LOST.0 - 1),
            flags: SearchFlags::default(),
            limit: SearchLimit::infinite(),
            start: Instant::now(),
            last_pos: G::default(),
            last_score: Score(0),
            abort: AbortFlag::default(),
        }
    }
}

impl<G: Game, L: Leaves<G>> std::fmt::Debug for Uct<G, L> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Uct")
            .field("tree_size", &self.nodes.len())
            .field("last_score", &self.last_score)
            .field("exploration", &self.exploration)
            .finish()
    }
}

impl<G: Game, L: Leaves<G>> StaticallyNamedEntity for Uct<G, L> {
    fn static_short_name() -> impl std::fmt::Display {
        "uct"
    }

    fn static_long_name() -> String {
        "Best-First UCT".to_string()
    }

    fn static_description() -> String {
        "Best-first Monte-Carlo tree search with a lazily expanded arena and reusable subtrees across moves."
            .to_string()
    }
}

impl<G: Game, L: Leaves<G> + Default> Uct<G, L> {
    pub fn new(leaves: L) -> Self {
        Self { leaves, ..Self::default() }
    }

    /// Switches to the random-rollout (Monte-Carlo) evaluator and its matching exploration default.
    pub fn with_rollout(leaves: L, max_depth: usize) -> Self {
        Self { leaves, evaluator: Evaluator::RandomRollout { max_depth }, exploration: DEFAULT_EXPLORATION_ROLLOUT, ..Self::default() }
    }

    pub fn with_exploration(mut self, c: f64) -> Self {
        self.exploration = c;
        self
    }

    /// Replaces this engine's tablebase.
    pub fn set_leaves(&mut self, leaves: L) {
        self.leaves = leaves;
    }

    /// Number of nodes live in the current tree, including ones no longer reachable from the root (pruned
    /// lazily at the next [`Self::reuse_or_reset_root`] call).
    pub fn tree_size(&self) -> usize {
        self.nodes.len()
    }

    /// Visits accumulated at the current root, or zero if there is no tree yet.
    pub fn root_visits(&self) -> u32 {
        self.root.map(|r| self.nodes[r].visits).unwrap_or(0)
    }

    /// Locates `pos` within the previous root's subtree (depth-2 scan) and promotes it, compacting the
    /// arena down to just the retained subtree. Starts a fresh single-node tree if no match is found.
    fn reuse_or_reset_root(&mut self, pos: &G) {
        if let Some(root) = self.root {
            let mut frontier = VecDeque::new();
            frontier.push_back((root, 0usize));
            while let Some((idx, depth)) = frontier.pop_front() {
                if self.nodes[idx].pos == *pos {
                    self.compact_subtree(idx);
                    return;
                }
                if depth >= 2 {
                    continue;
                }
                let mut child = self.nodes[idx].first_child;
                while let Some(c) = child {
                    frontier.push_back((c, depth + 1));
                    child = self.nodes[c].next_sibling;
                }
            }
        }
        self.nodes = vec![UctNode::new(pos.clone(), G::Move::default(), None)];
        self.root = Some(0);
    }

    /// Rebuilds the arena containing only the subtree rooted at `old_root`, relabeling indices in BFS
    /// order. Cheaper than chasing pointers forever across a long match, at the cost of an O(subtree) copy
    /// once per move.
    fn compact_subtree(&mut self, old_root: usize) {
        let mut order = Vec::new();
        let mut remap = std::collections::HashMap::new();
        let mut queue = VecDeque::new();
        queue.push_back(old_root);
        while let Some(idx) = queue.pop_front() {
            let _ = remap.insert(idx, order.len());
            order.push(idx);
            let mut child = self.nodes[idx].first_child;
            while let Some(c) = child {
                queue.push_back(c);
                child = self.nodes[c].next_sibling;
            }
        }
        let mut new_nodes: Vec<UctNode<G>> = order
            .iter()
            .map(|&old_idx| {
                let mut node = self.nodes[old_idx].clone();
                node.parent = node.parent.and_then(|p| remap.get(&p).copied());
                node.first_child = node.first_child.and_then(|c| remap.get(&c).copied());
                node.next_sibling = node.next_sibling.and_then(|c| remap.get(&c).copied());
                node
            })
            .collect();
        new_nodes[0].parent = None;
        new_nodes[0].next_sibling = None;
        self.nodes = new_nodes;
        self.root = Some(0);
    }

    fn terminal_value(&self, idx: usize) -> Score {
        let res = self.nodes[idx].pos.player_result().expect("terminal node must have a player result");
        game_result_to_score(res, 0)
    }

    /// Evaluates a freshly expanded node: tablebase first, then the configured evaluator, both expressed
    /// from the node's own side-to-move's perspective (matching how `Game::score` and `Leaves::find` are
    /// already used elsewhere in this crate).
    fn evaluate(&mut self, idx: usize) -> Score {
        if self.nodes[idx].terminal {
            return self.terminal_value(idx);
        }
        let pos = self.nodes[idx].pos.clone();
        if let Some(leaf) = self.leaves.find(&pos) {
            if leaf.flag == LeafFlag::Exact {
                return leaf.score;
            }
        }
        match self.evaluator {
            Evaluator::Heuristic => pos.score(),
            Evaluator::RandomRollout { max_depth } => self.rollout(pos, max_depth),
        }
    }

    fn rollout(&mut self, mut pos: G, max_depth: usize) -> Score {
        let mut plies = 0usize;
        while !pos.has_ended() && plies < max_depth {
            let moves = pos.legal_moves();
            let mov = moves[self.rng.random_range(0..moves.len())];
            pos = pos.make_move(mov).expect("a legal move must be playable");
            plies += 1;
        }
        let value = match pos.player_result() {
            Some(res) => game_result_to_score(res, 0),
            None => pos.score(),
        };
        if plies % 2 == 1 { -value } else { value }
    }

    fn expand(&mut self, parent: usize) -> usize {
        let mov_idx = self.nodes[parent].next_unexpanded;
        let mov = self.nodes[parent].legal_moves[mov_idx];
        self.nodes[parent].next_unexpanded += 1;
        let child_pos = self.nodes[parent].pos.make_move(mov).expect("move from legal_moves must be playable");
        let mut child = UctNode::new(child_pos, mov, Some(parent));
        child.next_sibling = self.nodes[parent].first_child;
        let child_idx = self.nodes.len();
        self.nodes.push(child);
        self.nodes[parent].first_child = Some(child_idx);
        child_idx
    }

    /// `q_child + c*|beta-alpha|*sqrt(ln(n_parent)/n_child)`, maximized from the parent's perspective (the
    /// child's own mean is negated since it's stored from the child's perspective).
    fn select_child(&self, idx: usize) -> usize {
        let width = (self.root_alpha.0 as f64 - self.root_beta.0 as f64).abs();
        let ln_parent = (self.nodes[idx].visits.max(1) as f64).ln();
        let mut child = self.nodes[idx].first_child;
        let mut best = child.expect("select_child called on a node with no children");
        let mut best_value = f64::NEG_INFINITY;
        while let Some(c) = child {
            let cn = &self.nodes[c];
            let value = -cn.mean + self.exploration * width * (ln_parent / cn.visits.max(1) as f64).sqrt();
            if value > best_value {
                best_value = value;
                best = c;
            }
            child = cn.next_sibling;
        }
        best
    }

    fn backup(&mut self, mut idx: usize, mut value: Score) {
        loop {
            let node = &mut self.nodes[idx];
            node.visits += 1;
            let v = value.0 as f64;
            node.mean += (v - node.mean) / node.visits as f64;
            match node.parent {
                Some(parent) => {
                    value = -value;
                    idx = parent;
                }
                None => {
                    self.root_alpha = self.root_alpha.min(value);
                    self.root_beta = self.root_beta.max(value);
                    return;
                }
            }
        }
    }

    /// One tree-policy iteration: descend, lazily expand the first unvisited move, evaluate, back up.
    fn run_iteration(&mut self, root: usize) {
        let mut idx = root;
        loop {
            if self.nodes[idx].terminal {
                let v = self.terminal_value(idx);
                self.backup(idx, v);
                return;
            }
            if !self.nodes[idx].fully_expanded() {
                let child = self.expand(idx);
                let v = self.evaluate(child);
                self.backup(child, v);
                return;
            }
            idx = self.select_child(idx);
        }
    }

    /// The root's current best estimate: the mean of its most-visited child, negated back to the root's
    /// own perspective. Zero if the root has no children yet.
    fn root_score(&self, root: usize) -> Score {
        let mut best_visits = 0u32;
        let mut best_mean = 0.0f64;
        let mut child = self.nodes[root].first_child;
        while let Some(c) = child {
            if self.nodes[c].visits > best_visits {
                best_visits = self.nodes[c].visits;
                best_mean = self.nodes[c].mean;
            }
            child = self.nodes[c].next_sibling;
        }
        Score((-best_mean).round() as i32)
    }

    /// Repeatedly picks the most-visited child, stopping once a child holds under
    /// [`PV_VISIT_FRACTION`] of its parent's visits (too thin a sample to trust).
    fn extract_pv(&self, root: usize) -> Vec<G::Move> {
        let mut pv = Vec::new();
        let mut idx = root;
        loop {
            let node = &self.nodes[idx];
            let Some(first) = node.first_child else { break };
            let mut best = first;
            let mut best_visits = self.nodes[first].visits;
            let mut child = self.nodes[first].next_sibling;
            while let Some(c) = child {
                if self.nodes[c].visits > best_visits {
                    best_visits = self.nodes[c].visits;
                    best = c;
                }
                child = self.nodes[c].next_sibling;
            }
            if (best_visits as f64) < PV_VISIT_FRACTION * node.visits.max(1) as f64 {
                break;
            }
            pv.push(self.nodes[best].mov);
            idx = best;
        }
        pv
    }
}

impl<G: Game, L: Leaves<G> + Default> Engine<G> for Uct<G, L> {
    fn search<H: GameHistory<G>>(&mut self, params: SearchParams<G, H>) -> SearchResult<G> {
        // params.cache is unused: the arena already memoizes every position visited this search, and
        // retained subtrees across moves serve the role a transposition cache plays for Negamax.
        self.limit = params.limit;
        self.flags = SearchFlags::default();
        self.start = Instant::now();
        self.last_pos = params.pos.clone();
        self.root_alpha = Score(SCORE_WON.0 + 1);
        self.root_beta = Score(SCORE_LOST.0 - 1);
        self.abort.clear();

        self.reuse_or_reset_root(&params.pos);
        let root = self.root.expect("reuse_or_reset_root always sets a root");

        if self.nodes[root].terminal {
            let result = SearchResult::move_only(G::Move::default(), params.pos.clone());
            self.reporter.report_result(&result);
            return result;
        }

        loop {
            self.run_iteration(root);
            self.flags.count_node();
            if self.flags.nodes % REPORT_PROBES == 0 {
                self.reporter.report_info(&self.search_info());
            }
            if self.flags.nodes >= MIN_PROBES && self.should_stop(&self.flags, &self.limit, self.start) {
                break;
            }
        }

        let pv = self.extract_pv(root);
        self.last_score = self.root_score(root);

        let result = SearchResult::new_from_pv(self.last_score, params.pos.clone(), &pv);
        self.reporter.report_result(&result);
        result
    }

    fn forget(&mut self) {
        self.nodes.clear();
        self.root = None;
    }

    fn search_info(&self) -> SearchInfo<G> {
        let pv = self.root.map(|r| self.extract_pv(r)).unwrap_or_default();
        SearchInfo {
            best_move_of_all_pvs: pv.first().copied().unwrap_or_default(),
            depth: Depth::new_unchecked(pv.len()),
            seldepth: Depth::new_unchecked(pv.len()),
            time: self.start.elapsed(),
            nodes: NodesLimit::new(self.flags.nodes.max(1)).unwrap(),
            pv_num: 0,
            max_num_pvs: 1,
            pv,
            score: self.last_score,
            hashfull: 0,
            pos: self.last_pos.clone(),
            additional: Some(format!("tree_size {}", self.nodes.len())),
        }
    }

    fn attach_consumer(&mut self, reporter: Box<dyn Reporter<G>>) {
        self.reporter = reporter;
    }

    fn abort_flag(&self) -> &AbortFlag {
        &self.abort
    }

    fn default_bench_depth(&self) -> Depth {
        Depth::new_unchecked(1)
    }

    fn default_bench_nodes(&self) -> NodesLimit {
        NodesLimit::new(MIN_PROBES * 4).unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gears::general::game::NoHistory;
    use gears::general::mock_game::CountdownGame;
    use proptest::prelude::*;

    #[test]
    fn terminal_root_returns_null_move() {
        let mut engine = Uct::<CountdownGame, NoLeaves>::default();
        let pos = CountdownGame::new(0);
        let params = SearchParams::<CountdownGame, NoHistory>::new(pos, SearchLimit::nodes_(10));
        let result = engine.search(params);
        assert!(result.chosen_move.is_null());
    }

    #[test]
    fn runs_at_least_min_probes() {
        let mut engine = Uct::<CountdownGame, NoLeaves>::default();
        let pos = CountdownGame::new(6);
        let params = SearchParams::<CountdownGame, NoHistory>::new(pos, SearchLimit::nodes_(1));
        let _ = engine.search(params);
        assert!(engine.search_info().nodes.get() >= MIN_PROBES);
    }

    #[test]
    fn subtree_is_reused_after_a_move() {
        let mut engine = Uct::<CountdownGame, NoLeaves>::default();
        let pos = CountdownGame::new(8);
        let params = SearchParams::<CountdownGame, NoHistory>::new(pos, SearchLimit::nodes_(1));
        let result = engine.search(params);
        let next_pos = pos.make_move(result.chosen_move).expect("engine chose a legal move");
        let visits_before = engine.root_visits();
        // a full search always completes at least MIN_PROBES iterations, each reaching the root.
        assert!(visits_before >= MIN_PROBES as u32);
        let params2 = SearchParams::<CountdownGame, NoHistory>::new(next_pos, SearchLimit::nodes_(1));
        let _ = engine.search(params2);
        // the new root carries over the visits it already had as a child of the old root, on top of
        // whatever the second search's own iterations add.
        assert!(engine.root_visits() >= MIN_PROBES as u32);
    }

    #[test]
    fn forget_clears_the_tree() {
        let mut engine = Uct::<CountdownGame, NoLeaves>::default();
        let pos = CountdownGame::new(5);
        let params = SearchParams::<CountdownGame, NoHistory>::new(pos, SearchLimit::nodes_(1));
        let _ = engine.search(params);
        assert!(engine.tree_size() > 0);
        engine.forget();
        assert_eq!(engine.tree_size(), 0);
    }

    #[test]
    fn aborted_search_still_completes_min_probes() {
        let mut engine = Uct::<CountdownGame, NoLeaves>::default();
        engine.abort_computation(None);
        let pos = CountdownGame::new(8);
        let params = SearchParams::<CountdownGame, NoHistory>::new(pos, SearchLimit::nodes_(1_000_000));
        let _ = engine.search(params);
        let nodes = engine.search_info().nodes.get();
        assert!(nodes >= MIN_PROBES && nodes < MIN_PROBES * 2);
    }

    proptest! {
        /// UCT consistency (spec §8): with enough iterations on a tiny tree, the root's chosen move converges
        /// to the game-theoretic optimum -- here, whichever of take-1/take-2 leaves a pile divisible by three.
        #[test]
        fn uct_converges_to_the_game_theoretic_move(pile in 1u8..12) {
            prop_assume!(pile % 3 != 0);
            let mut engine = Uct::<CountdownGame, NoLeaves>::default();
            let pos = CountdownGame::new(pile);
            let params = SearchParams::<CountdownGame, NoHistory>::new(pos, SearchLimit::nodes_(20_000));
            let result = engine.search(params);
            let chosen = result.chosen_move;
            prop_assert!(!chosen.is_null());
            let resulting = pos.make_move(chosen).expect("engine chose a legal move");
            prop_assert_eq!(resulting.remaining % 3, 0);
        }
    }
}
