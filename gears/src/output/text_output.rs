use std::fmt;
use std::fs::File;
use std::io::{Stderr, Stdout, stderr, stdout};
use std::path::Path;
use std::str::SplitWhitespace;

use anyhow::{anyhow, ensure};

use crate::general::common::{NamedEntity, Res, StaticallyNamedEntity};
use crate::general::game::Game;
use crate::output::{AbstractOutput, Message, Output, OutputBox, OutputBuilder};

/// A sink for log lines: a file (never buffered, so the log is always current), or one of the standard streams.
#[derive(Debug)]
pub enum TextStream {
    File(File, String),
    Stdout(Stdout),
    Stderr(Stderr),
}

impl TextStream {
    pub fn write(&mut self, prefix: &str, msg: &str) {
        use std::io::Write;
        _ = writeln!(self.stream(), "{prefix} {msg}");
    }

    fn stream(&mut self) -> &mut dyn std::io::Write {
        match self {
            TextStream::File(f, _) => f,
            TextStream::Stdout(out) => out,
            TextStream::Stderr(err) => err,
        }
    }

    pub fn from_words(mut words: SplitWhitespace, fallback_name: &str) -> Res<Self> {
        let stream = match words.next().unwrap_or_default() {
            "" => return Self::from_words(fallback_name.split_whitespace(), ""),
            "stdout" => TextStream::Stdout(stdout()),
            "stderr" => TextStream::Stderr(stderr()),
            s => TextStream::from_filename(s)?,
        };
        Ok(stream)
    }

    pub fn from_filename(name: &str) -> Res<Self> {
        ensure!(
            name.contains('.'),
            "'{name}' does not look like a valid log filename (no '.'). Expected a filename, 'stdout' or 'stderr'."
        );
        let path = Path::new(name);
        let file = File::create(path).map_err(|err| anyhow!("Couldn't create log file: {err}"))?;
        Ok(TextStream::File(
            file,
            path.canonicalize().ok().as_ref().and_then(|p| p.to_str()).unwrap_or(name).to_string(),
        ))
    }

    pub fn name(&self) -> String {
        match self {
            TextStream::File(_, name) => name.clone(),
            TextStream::Stdout(_) => "stdout".to_string(),
            TextStream::Stderr(_) => "stderr".to_string(),
        }
    }
}

/// Builds a [`TextOutput`] that prints every [`Message`] it's given to its stream, prefixed with the message type.
#[derive(Debug, Clone)]
pub struct TextOutputBuilder {
    stream_name: String,
}

impl TextOutputBuilder {
    pub fn new(stream_name: &str) -> Self {
        Self { stream_name: stream_name.to_string() }
    }
}

impl NamedEntity for TextOutputBuilder {
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

impl StaticallyNamedEntity for TextOutputBuilder {
    fn static_short_name() -> impl fmt::Display {
        "text"
    }

    fn static_long_name() -> String {
        "Text Output".to_string()
    }

    fn static_description() -> String {
        "Prints engine search info and log messages as plain text".to_string()
    }
}

impl<G: Game> OutputBuilder<G> for TextOutputBuilder {
    fn build(&mut self, fallback_name: &str) -> Res<OutputBox<G>> {
        let stream = TextStream::from_words(self.stream_name.split_whitespace(), fallback_name)?;
        Ok(Box::new(TextOutput { stream }))
    }

    fn add_option(&mut self, option: String) -> Res<()> {
        self.stream_name = option;
        Ok(())
    }
}

#[derive(Debug)]
pub struct TextOutput {
    stream: TextStream,
}

impl NamedEntity for TextOutput {
    fn short_name(&self) -> String {
        TextOutputBuilder::static_short_name().to_string()
    }

    fn long_name(&self) -> String {
        TextOutputBuilder::static_long_name()
    }

    fn description(&self) -> Option<String> {
        Some(TextOutputBuilder::static_description())
    }
}

impl AbstractOutput for TextOutput {
    fn display_message(&mut self, typ: Message, message: &str) {
        self.stream.write(typ.message_prefix(), message);
    }
}

impl<G: Game> Output<G> for TextOutput {}
