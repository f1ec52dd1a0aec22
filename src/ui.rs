//! User-facing progress output and destroy confirmation.
//!
//! The UI sink is append-only: workflows write progress, warnings and errors
//! to it and never read anything back.

use std::io::{self, BufRead, Write};

/// Append-only sink for human-readable progress lines.
pub trait Ui: Send + Sync {
    /// Emits an informational line.
    fn info(&self, message: &str);
    /// Emits a warning line.
    fn warn(&self, message: &str);
    /// Emits an error line.
    fn error(&self, message: &str);
}

/// Writes progress to standard error, prefixed with the machine label.
#[derive(Clone, Debug)]
pub struct ConsoleUi {
    label: String,
}

impl ConsoleUi {
    /// Creates a console sink for the given machine label.
    #[must_use]
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
        }
    }

    fn write_line(&self, marker: &str, message: &str) {
        writeln!(io::stderr(), "{marker} {}: {message}", self.label).ok();
    }
}

impl Ui for ConsoleUi {
    fn info(&self, message: &str) {
        self.write_line("==>", message);
    }

    fn warn(&self, message: &str) {
        self.write_line("==> WARNING", message);
    }

    fn error(&self, message: &str) {
        self.write_line("==> ERROR", message);
    }
}

/// Asks the operator whether a destructive action may proceed.
pub trait Confirmer: Send + Sync {
    /// Returns `true` when the operator accepts `prompt`.
    fn confirm(&self, prompt: &str) -> bool;
}

/// Prompts on standard error and reads a `y`/`n` answer from standard input.
#[derive(Clone, Copy, Debug, Default)]
pub struct StdinConfirmer;

impl Confirmer for StdinConfirmer {
    fn confirm(&self, prompt: &str) -> bool {
        write!(io::stderr(), "{prompt} [y/N] ").ok();
        io::stderr().flush().ok();

        let mut answer = String::new();
        if io::stdin().lock().read_line(&mut answer).is_err() {
            return false;
        }
        matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
    }
}

/// Answers every confirmation with a fixed value.
#[derive(Clone, Copy, Debug)]
pub struct FixedConfirmer(pub bool);

impl Confirmer for FixedConfirmer {
    fn confirm(&self, _prompt: &str) -> bool {
        self.0
    }
}
