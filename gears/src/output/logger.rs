use std::fmt;
use std::str::SplitWhitespace;

use itertools::Itertools;

use crate::general::common::{NamedEntity, Res, StaticallyNamedEntity};
use crate::general::game::Game;
use crate::output::text_output::TextStream;
use crate::output::{AbstractOutput, Message, Output, OutputBox, OutputBuilder};

/// An output that timestamps its startup and never gets filtered out, used to keep an always-on record of
/// engine activity independent of whatever other outputs are configured.
#[derive(Debug)]
pub struct Logger {
    stream: TextStream,
}

impl Logger {
    fn new(stream: TextStream) -> Self {
        let mut res = Self { stream };
        res.display_message(Message::Info, &format!("[Starting logging at {}]", chrono::offset::Utc::now().to_rfc2822()));
        res
    }

    fn from_words(words: SplitWhitespace, fallback_name: &str) -> Res<Self> {
        Ok(Self::new(TextStream::from_words(words, fallback_name)?))
    }
}

impl NamedEntity for Logger {
    fn short_name(&self) -> String {
        LoggerBuilder::static_short_name().to_string()
    }

    fn long_name(&self) -> String {
        LoggerBuilder::static_long_name()
    }

    fn description(&self) -> Option<String> {
        Some(LoggerBuilder::static_description())
    }
}

impl AbstractOutput for Logger {
    fn is_logger(&self) -> bool {
        true
    }

    fn display_message(&mut self, typ: Message, message: &str) {
        self.stream.write(typ.message_prefix(), message);
    }
}

impl<G: Game> Output<G> for Logger {}

#[derive(Clone, Debug, Default)]
pub struct LoggerBuilder {
    stream_name: String,
}

impl LoggerBuilder {
    pub fn new(stream: &str) -> Self {
        Self { stream_name: stream.to_string() }
    }

    pub fn from_words(words: SplitWhitespace) -> Self {
        Self::new(&words.join(" "))
    }
}

impl NamedEntity for LoggerBuilder {
    fn short_name(&self) -> String {
        Self::static_short_name().to_string()
    }

    fn long_name(&self) -> String {
        Self::static_long_name()
    }

    fn description(&self) -> Option<String> {
        Some(Self::static_description())
    }
}

impl StaticallyNamedEntity for LoggerBuilder {
    fn static_short_name() -> impl fmt::Display {
        "logger"
    }

    fn static_long_name() -> String {
        "Logger".to_string()
    }

    fn static_description() -> String {
        "A logger that records all engine activity, independent of other configured outputs".to_string()
    }
}

impl<G: Game> OutputBuilder<G> for LoggerBuilder {
    fn build(&mut self, fallback_name: &str) -> Res<OutputBox<G>> {
        let fallback_name = format!("debug_output_{fallback_name}.log");
        Ok(Box::new(Logger::from_words(self.stream_name.split_whitespace(), &fallback_name).unwrap_or_else(|err| {
            eprintln!("Error while setting log stream, falling back to default: {err}");
            Logger::from_words("".split_whitespace(), &fallback_name).unwrap()
        })))
    }

    fn add_option(&mut self, option: String) -> Res<()> {
        self.stream_name = option;
        Ok(())
    }
}
