//! Turns search progress into text. Grounded on the `gears::output` stack (a [`Message`]-typed
//! sink plus the [`SearchInfo`] the engine hands over after every iteration), trimmed of the UGI/PGN-aware
//! `write_search_res`/`write_currmove`/`write_refutation` family since this crate has no protocol layer of
//! its own; a caller that needs those can build them on top of [`Reporter`].

use gears::general::game::Game;
use gears::output::{Message, Output};
use gears::search::{SearchInfo, SearchResult};
use std::fmt::Display;
use std::time::Duration;

/// Aggregated result of running a fixed-depth/fixed-node search over a batch of positions, the kind of thing
/// printed after a `bench` run so that a regression in node count or time shows up in source control.
#[derive(Debug, Default, Clone, Copy)]
pub struct Summary {
    pub nodes: u64,
    pub time: Duration,
}

impl Summary {
    pub fn nps(&self) -> u64 {
        let micros = self.time.as_micros() as u64;
        if micros == 0 { 0 } else { self.nodes * 1_000_000 / micros }
    }
}

impl Display for Summary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} nodes {} ms {} nps", self.nodes, self.time.as_millis(), self.nps())
    }
}

/// Receives search progress and final results. An engine reports through this trait instead of printing
/// directly, so that a caller can plug in the text protocol, a GUI, or nothing at all (as the bench loop does).
pub trait Reporter<G: Game> {
    fn report_info(&mut self, info: &SearchInfo<G>);
    fn report_result(&mut self, res: &SearchResult<G>);
}

/// Forwards every report to a [`gears::output::Output`] as a plain [`Message::Info`] line. This is the
/// default reporter used outside of tests.
pub struct OutputReporter<'a, G: Game> {
    output: &'a mut dyn Output<G>,
}

impl<'a, G: Game> OutputReporter<'a, G> {
    pub fn new(output: &'a mut dyn Output<G>) -> Self {
        Self { output }
    }
}

impl<G: Game> Reporter<G> for OutputReporter<'_, G>
where
    G::Move: Display,
{
    fn report_info(&mut self, info: &SearchInfo<G>) {
        self.output.display_message(Message::Info, &info.to_string());
    }

    fn report_result(&mut self, res: &SearchResult<G>) {
        self.output.display_message(Message::Info, &res.to_string());
    }
}

/// Discards everything; useful for benches and tests that only care about the final [`SearchResult`].
#[derive(Debug, Default)]
pub struct NullReporter;

impl<G: Game> Reporter<G> for NullReporter {
    fn report_info(&mut self, _info: &SearchInfo<G>) {}
    fn report_result(&mut self, _res: &SearchResult<G>) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use gears::general::mock_game::{CountdownGame, TakeTokens};
    use gears::score::Score;

    #[test]
    fn summary_nps_handles_zero_time() {
        let s = Summary { nodes: 100, time: Duration::ZERO };
        assert_eq!(s.nps(), 0);
    }

    #[test]
    fn null_reporter_accepts_everything() {
        let mut r = NullReporter;
        let res = SearchResult::<CountdownGame>::move_only(TakeTokens(1), CountdownGame::default());
        r.report_result(&res);
        let info = SearchInfo::<CountdownGame>::default();
        r.report_info(&info);
    }
}
