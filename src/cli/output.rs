//! Colored terminal output.
//!
//! User-facing progress goes to stdout, warnings and errors to stderr.
//! Colors are disabled automatically when the stream is not a terminal.

use std::io::{IsTerminal, Write};
use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};

/// Writes styled messages to the terminal.
#[derive(Debug, Clone)]
pub struct OutputManager {
    verbose: bool,
    quiet: bool,
}

impl OutputManager {
    /// Creates an output manager.
    ///
    /// # Arguments
    ///
    /// * `verbose` - Print [`OutputManager::verbose`] messages
    /// * `quiet` - Suppress everything except errors
    pub fn new(verbose: bool, quiet: bool) -> Self {
        Self { verbose, quiet }
    }

    fn stdout() -> StandardStream {
        StandardStream::stdout(choice(std::io::stdout().is_terminal()))
    }

    fn stderr() -> StandardStream {
        StandardStream::stderr(choice(std::io::stderr().is_terminal()))
    }

    fn styled(
        mut stream: StandardStream,
        color: Option<Color>,
        bold: bool,
        prefix: &str,
        message: &str,
    ) -> std::io::Result<()> {
        stream.set_color(ColorSpec::new().set_fg(color).set_bold(bold))?;
        write!(stream, "{prefix}")?;
        stream.reset()?;
        writeln!(stream, "{message}")
    }

    /// Print a debug-level message in verbose mode.
    pub fn verbose(&self, message: &str) -> std::io::Result<()> {
        if !self.verbose || self.quiet {
            return Ok(());
        }
        Self::styled(Self::stdout(), None, false, "  · ", message)
    }

    /// Print a warning.
    pub fn warn(&self, message: &str) -> std::io::Result<()> {
        if self.quiet {
            return Ok(());
        }
        Self::styled(Self::stderr(), Some(Color::Yellow), true, "⚠ ", message)
    }

    /// Print a success message.
    pub fn success(&self, message: &str) -> std::io::Result<()> {
        if self.quiet {
            return Ok(());
        }
        Self::styled(Self::stdout(), Some(Color::Green), true, "✓ ", message)
    }

    /// Print a progress message.
    pub fn progress(&self, message: &str) -> std::io::Result<()> {
        if self.quiet {
            return Ok(());
        }
        Self::styled(Self::stdout(), Some(Color::Cyan), false, "→ ", message)
    }

    /// Print a section header.
    pub fn section(&self, title: &str) -> std::io::Result<()> {
        if self.quiet {
            return Ok(());
        }
        let mut stream = Self::stdout();
        stream.set_color(ColorSpec::new().set_bold(true))?;
        writeln!(stream, "\n{title}")?;
        stream.reset()
    }

    /// Print indented detail text.
    pub fn indent(&self, message: &str) -> std::io::Result<()> {
        if self.quiet {
            return Ok(());
        }
        let mut stream = Self::stdout();
        writeln!(stream, "    {message}")
    }

    /// Print an error. Never suppressed.
    pub fn error(&self, message: &str) -> std::io::Result<()> {
        Self::styled(Self::stderr(), Some(Color::Red), true, "✗ ", message)
    }
}

fn choice(is_terminal: bool) -> ColorChoice {
    if is_terminal {
        ColorChoice::Auto
    } else {
        ColorChoice::Never
    }
}
