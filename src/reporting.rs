//! Leveled diagnostics for the grammar compilation pipeline.
//!
//! Messages are recorded unconditionally and printed to stderr only when the
//! reporter's verbosity admits them. Errors are batched per pass: the pipeline
//! finishes the current pass, then aborts if the batch contains any error.

use std::fmt;
use std::str::FromStr;

/// Verbosity levels, ordered. A level admits every message at or below it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum Verbosity {
    Error,
    #[default]
    Warning,
    Success,
    Debug1,
    Info,
    Debug2,
    Debug3,
    All,
}

impl Verbosity {
    pub fn label(self) -> &'static str {
        match self {
            Verbosity::Error => "error",
            Verbosity::Warning => "warning",
            Verbosity::Success => "success",
            Verbosity::Debug1 => "debug1",
            Verbosity::Info => "info",
            Verbosity::Debug2 => "debug2",
            Verbosity::Debug3 => "debug3",
            Verbosity::All => "all",
        }
    }
}

impl fmt::Display for Verbosity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Verbosity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "error" => Ok(Verbosity::Error),
            "warning" => Ok(Verbosity::Warning),
            "success" => Ok(Verbosity::Success),
            "debug1" => Ok(Verbosity::Debug1),
            "info" => Ok(Verbosity::Info),
            "debug2" => Ok(Verbosity::Debug2),
            "debug3" => Ok(Verbosity::Debug3),
            "all" => Ok(Verbosity::All),
            _ => Err(format!("unknown verbosity level `{s}`")),
        }
    }
}

/// A 1-based source position in the grammar file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Loc {
    pub line: u32,
    pub col: u32,
}

impl Loc {
    pub fn new(line: u32, col: u32) -> Loc {
        Loc { line, col }
    }
}

impl fmt::Display for Loc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.col)
    }
}

/// A single recorded message.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub level: Verbosity,
    pub message: String,
    pub loc: Option<Loc>,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.loc {
            Some(loc) => write!(f, "{}: {} ({})", self.level, self.message, loc),
            None => write!(f, "{}: {}", self.level, self.message),
        }
    }
}

/// The diagnostics sink shared by every pipeline pass.
#[derive(Debug)]
pub struct Reporter {
    level: Verbosity,
    filename: String,
    messages: Vec<Diagnostic>,
    batch_errors: usize,
}

impl Reporter {
    pub fn new(level: Verbosity, filename: impl Into<String>) -> Reporter {
        Reporter {
            level,
            filename: filename.into(),
            messages: Vec::new(),
            batch_errors: 0,
        }
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn error(&mut self, loc: impl Into<Option<Loc>>, message: impl Into<String>) {
        self.batch_errors += 1;
        self.emit(Verbosity::Error, loc.into(), message.into());
    }

    pub fn warning(&mut self, loc: impl Into<Option<Loc>>, message: impl Into<String>) {
        self.emit(Verbosity::Warning, loc.into(), message.into());
    }

    pub fn success(&mut self, message: impl Into<String>) {
        self.emit(Verbosity::Success, None, message.into());
    }

    pub fn info(&mut self, message: impl Into<String>) {
        self.emit(Verbosity::Info, None, message.into());
    }

    pub fn debug(&mut self, level: Verbosity, message: impl Into<String>) {
        debug_assert!(level >= Verbosity::Debug1);
        self.emit(level, None, message.into());
    }

    fn emit(&mut self, level: Verbosity, loc: Option<Loc>, message: String) {
        if level <= self.level {
            match loc {
                Some(loc) => eprintln!("{}: {} ({}:{})", level, message, self.filename, loc),
                None => eprintln!("{}: {}", level, message),
            }
        }
        self.messages.push(Diagnostic { level, message, loc });
    }

    /// Ends the current pass batch, returning how many errors it recorded.
    pub fn end_batch(&mut self) -> usize {
        std::mem::take(&mut self.batch_errors)
    }

    /// All messages recorded so far, regardless of the print gate.
    pub fn messages(&self) -> &[Diagnostic] {
        &self.messages
    }

    pub fn error_count(&self) -> usize {
        self.messages
            .iter()
            .filter(|d| d.level == Verbosity::Error)
            .count()
    }

    pub fn warning_count(&self) -> usize {
        self.messages
            .iter()
            .filter(|d| d.level == Verbosity::Warning)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_ordering_matches_admission_rule() {
        assert!(Verbosity::Error < Verbosity::Warning);
        assert!(Verbosity::Warning < Verbosity::Success);
        assert!(Verbosity::Success < Verbosity::Debug1);
        assert!(Verbosity::Debug1 < Verbosity::Info);
        assert!(Verbosity::Info < Verbosity::Debug2);
        assert!(Verbosity::Debug2 < Verbosity::Debug3);
        assert!(Verbosity::Debug3 < Verbosity::All);
    }

    #[test]
    fn batches_reset_after_end() {
        let mut r = Reporter::new(Verbosity::Error, "test.grammar");
        r.error(Loc::new(1, 1), "first");
        r.error(None, "second");
        assert_eq!(r.end_batch(), 2);
        assert_eq!(r.end_batch(), 0);
        r.warning(None, "only a warning");
        assert_eq!(r.end_batch(), 0);
        assert_eq!(r.error_count(), 2);
    }
}
