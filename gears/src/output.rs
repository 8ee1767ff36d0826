use std::fmt::Debug;

use dyn_clone::DynClone;
use strum_macros::Display;

use crate::general::common::{NamedEntity, Res};
use crate::general::game::Game;
use crate::output::logger::LoggerBuilder;
use crate::output::text_output::TextOutputBuilder;
use crate::search::SearchInfo;

pub mod logger;
pub mod text_output;

#[derive(Debug, Display, Eq, PartialEq, Copy, Clone)]
pub enum Message {
    Info,
    Warning,
    /// Text-based outputs print `Error` and `Debug` messages to `stderr` and all other types to `stdout`.
    Error,
    /// Also printed to `stderr` on text-based outputs.
    Debug,
}

impl Message {
    pub(crate) fn message_prefix(self) -> &'static str {
        match self {
            Message::Info => "",
            Message::Warning => "Warning:",
            Message::Error => "Error:",
            Message::Debug => "Debug:",
        }
    }
}

/// The part of an `Output` that doesn't depend on the game being played.
pub trait AbstractOutput: NamedEntity + Debug + Send + 'static {
    fn is_logger(&self) -> bool {
        false
    }

    fn display_message(&mut self, typ: Message, message: &str);
}

/// An `Output` receives search info and log messages from an engine. Unlike an output tied to one game, this
/// trait has no notion of printing a board: position display belongs to whatever crate implements `Game`, not
/// to the game-agnostic search core.
pub trait Output<G: Game>: AbstractOutput {
    fn update_engine_info(&mut self, engine_name: &str, info: &SearchInfo<G>)
    where
        G::Move: std::fmt::Display,
    {
        self.display_message(Message::Info, &format!("{engine_name}: {info}"));
    }
}

/// Factory to create the specified `Output`.
pub trait OutputBuilder<G: Game>: NamedEntity + DynClone + Send {
    fn build(&mut self, name: &str) -> Res<OutputBox<G>>;

    fn add_option(&mut self, option: String) -> Res<()>;

    fn add_options(&mut self, options: &[String]) -> Res<()> {
        for option in options {
            self.add_option(option.clone())?;
        }
        Ok(())
    }
}

pub type OutputBox<G> = Box<dyn Output<G>>;

#[must_use]
pub fn required_outputs<G: Game>() -> Vec<Box<dyn OutputBuilder<G>>> {
    vec![
        Box::new(TextOutputBuilder::new("stdout")),
        #[allow(clippy::box_default)]
        Box::new(LoggerBuilder::default()),
    ]
}
