//! Converts a [`TimeControl`] into a per-move deadline. Grounded on `gears::search::{TimeControl,
//! SearchLimit}`, kept almost verbatim (`remaining`/`increment`/`moves_to_go`, `is_infinite`,
//! `max_move_time`); the actual `get_move_time_advice` formula has no analogue elsewhere in this crate (time
//! policy usually lives in the protocol layer) and is implemented fresh from scratch.

use gears::search::{SearchLimit, TimeControl};
use std::time::Duration;

/// Plies-to-go assumed when the controller never sends a `movestogo` hint.
const MAX_MOVES: usize = 20;
/// Used as a stand-in for "time left" when the time control has none (e.g. an increment-only clock).
const DEFAULT_MOVETIME: Duration = Duration::from_millis(1000);
/// Reserved per horizon-ply so that a slow move doesn't eat into the next one's budget.
const OVERHEAD: Duration = Duration::from_millis(50);
/// Floor below which a budget is never allowed to fall, so a near-flagging clock still gets a legal move out.
const MIN_MOVETIME: Duration = Duration::from_millis(500);

/// Computes the per-move deadline implied by a [`TimeControl`], or a fixed override when one is set.
#[derive(Debug, Default, Clone, Copy)]
pub struct TimeManager {
    fixed_time: Option<Duration>,
}

impl TimeManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overrides the clock-derived budget with a constant, e.g. for a `movetime` command.
    pub fn set_fixed_time(&mut self, time: Option<Duration>) {
        self.fixed_time = time;
    }

    pub fn is_fixed_time_active(&self) -> bool {
        self.fixed_time.is_some()
    }

    /// The deadline for the move about to be searched.
    pub fn get_move_time_advice(&self, tc: TimeControl) -> Duration {
        if let Some(fixed) = self.fixed_time {
            return fixed;
        }
        if tc.is_infinite() {
            return Duration::MAX;
        }
        let moves_left = tc.moves_to_go.unwrap_or(MAX_MOVES).min(MAX_MOVES).max(1);
        let horizon = 2 * moves_left;
        let fallback = DEFAULT_MOVETIME * horizon as u32;
        let bonus = tc.increment * horizon as u32;
        let overhead = OVERHEAD * horizon as u32;

        let time_left = if tc.remaining.is_zero() { fallback } else { tc.remaining };
        let total = (time_left + bonus).saturating_sub(overhead);
        (total / horizon as u32).max(MIN_MOVETIME)
    }

    /// Builds a [`SearchLimit`] that combines this manager's advice with the caller's other limits
    /// (depth/nodes/mate), so a single `SearchLimit` captures both the clock and any fixed bounds.
    pub fn limit_for(&self, tc: TimeControl, mut limit: SearchLimit) -> SearchLimit {
        limit.fixed_time = self.get_move_time_advice(tc);
        limit.tc = tc;
        limit
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_time_overrides_clock() {
        let mut tm = TimeManager::new();
        tm.set_fixed_time(Some(Duration::from_millis(2500)));
        let tc = TimeControl { remaining: Duration::from_secs(60), increment: Duration::ZERO, moves_to_go: None };
        assert_eq!(tm.get_move_time_advice(tc), Duration::from_millis(2500));
    }

    #[test]
    fn budget_never_below_floor() {
        let tm = TimeManager::new();
        let tc = TimeControl { remaining: Duration::from_millis(100), increment: Duration::ZERO, moves_to_go: None };
        assert!(tm.get_move_time_advice(tc) >= MIN_MOVETIME);
    }

    #[test]
    fn more_remaining_time_yields_larger_budget() {
        let tm = TimeManager::new();
        let short = TimeControl { remaining: Duration::from_secs(10), increment: Duration::ZERO, moves_to_go: None };
        let long = TimeControl { remaining: Duration::from_secs(600), increment: Duration::ZERO, moves_to_go: None };
        assert!(tm.get_move_time_advice(long) > tm.get_move_time_advice(short));
    }

    #[test]
    fn fewer_moves_to_go_yields_larger_per_move_budget() {
        let tm = TimeManager::new();
        let many_left = TimeControl { remaining: Duration::from_secs(120), increment: Duration::ZERO, moves_to_go: Some(40) };
        let few_left = TimeControl { remaining: Duration::from_secs(120), increment: Duration::ZERO, moves_to_go: Some(4) };
        assert!(tm.get_move_time_advice(few_left) > tm.get_move_time_advice(many_left));
    }

    #[test]
    fn infinite_time_control_has_no_deadline() {
        let tm = TimeManager::new();
        assert_eq!(tm.get_move_time_advice(TimeControl::infinite()), Duration::MAX);
    }
}
