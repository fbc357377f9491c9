use std::{
    hash::{DefaultHasher, Hash, Hasher},
    io::{self, Stdout, Write},
};

use colored::{Color, Colorize};

/// Line-oriented user output with a coloured `[name]` prefix per service.
pub struct Logger<W: Write = Stdout> {
    output: W,
}

impl<W: Write> Logger<W> {
    pub fn new(output: W) -> Self {
        Self { output }
    }

    fn string_to_color(s: &str) -> Color {
        let colors = [
            Color::Green,
            Color::Blue,
            Color::Magenta,
            Color::Cyan,
            Color::BrightGreen,
            Color::BrightBlue,
            Color::BrightMagenta,
            Color::BrightCyan,
        ];

        let mut hasher = DefaultHasher::new();
        s.hash(&mut hasher);
        let hash = hasher.finish();

        let idx = usize::try_from(hash).unwrap_or_default() % colors.len();
        colors[idx]
    }

    fn write_prefixed(&mut self, prefix: &colored::ColoredString, message: &str) {
        for line in message.lines() {
            let _ = writeln!(self.output, "{prefix} {line}");
        }
    }

    pub fn service(&mut self, service_name: &str, message: &str) {
        let prefix = format!("[{service_name}]").color(Self::string_to_color(service_name));
        self.write_prefixed(&prefix, message);
    }

    pub fn system(&mut self, message: &str) {
        let prefix = "[warden]".bold();
        self.write_prefixed(&prefix, message);
    }

    pub fn warn(&mut self, service_name: &str, message: &str) {
        let prefix = format!("[{service_name}]").color(Color::Yellow);
        self.write_prefixed(&prefix, message);
    }

    pub fn error(&mut self, service_name: &str, message: &str) {
        let prefix = format!("[{service_name}]").color(Color::Red);
        self.write_prefixed(&prefix, message);
    }

    /// Unprefixed output, e.g. tables and JSON.
    pub fn raw(&mut self, text: &str) {
        let _ = writeln!(self.output, "{text}");
    }
}

impl Logger {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}
