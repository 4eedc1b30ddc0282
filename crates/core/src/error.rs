//! Failure model shared by commands and tasks.
//!
//! A [`Failure`] is an ordered list of `(message, source)` entries. The first
//! entry is the lowest-level cause; every layer that wraps the failure with
//! [`Failure::context`] appends one more entry, so a failure read top-down
//! tells the story from the outermost operation to the root cause.

use serde::Serialize;

use crate::source::ExecutionSource;

/// Result type returned by command and task bodies.
pub type Outcome<T = ()> = Result<T, Failure>;

/// One message in a [`Failure`] chain, with the location that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorEntry {
    message: String,
    source: ExecutionSource,
}

impl ErrorEntry {
    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn source(&self) -> ExecutionSource {
        self.source
    }
}

/// Ordered, non-empty chain of error entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Failure {
    entries: Vec<ErrorEntry>,
}

impl Failure {
    /// Create a failure at the caller's location.
    #[track_caller]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            entries: vec![ErrorEntry {
                message: message.into(),
                source: ExecutionSource::caller(),
            }],
        }
    }

    /// Create a failure from any error value, keeping its display text.
    #[track_caller]
    pub fn from_error<E>(error: &E) -> Self
    where
        E: std::error::Error + ?Sized,
    {
        Self::new(error.to_string())
    }

    /// Wrap this failure in a higher-level message.
    #[track_caller]
    pub fn context(mut self, message: impl Into<String>) -> Self {
        self.entries.push(ErrorEntry {
            message: message.into(),
            source: ExecutionSource::caller(),
        });
        self
    }

    /// Concatenate another failure's entries after this one's.
    pub fn merge(mut self, other: Failure) -> Self {
        self.entries.extend(other.entries);
        self
    }

    /// Entries from the root cause (first) to the outermost context (last).
    pub fn entries(&self) -> &[ErrorEntry] {
        &self.entries
    }

    /// The outermost message.
    pub fn message(&self) -> &str {
        self.entries.last().map(|e| e.message.as_str()).unwrap_or_default()
    }

    /// The innermost message.
    pub fn root_cause(&self) -> &str {
        self.entries.first().map(|e| e.message.as_str()).unwrap_or_default()
    }
}

impl core::fmt::Display for Failure {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        for (idx, entry) in self.entries.iter().rev().enumerate() {
            if idx > 0 {
                f.write_str(": ")?;
            }
            write!(f, "{} ({})", entry.message, entry.source)?;
        }
        Ok(())
    }
}

impl std::error::Error for Failure {}

/// Adds [`Failure::context`] to `Outcome` values.
pub trait OutcomeExt<T> {
    fn context(self, message: impl Into<String>) -> Outcome<T>;
}

impl<T> OutcomeExt<T> for Outcome<T> {
    #[track_caller]
    fn context(self, message: impl Into<String>) -> Outcome<T> {
        match self {
            Ok(value) => Ok(value),
            Err(failure) => Err(failure.context(message)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn load() -> Outcome<u32> {
        Err(Failure::new("file not found"))
    }

    #[test]
    fn context_appends_outer_message() {
        let failure = load().context("failed to open project").unwrap_err();

        assert_eq!(failure.entries().len(), 2);
        assert_eq!(failure.root_cause(), "file not found");
        assert_eq!(failure.message(), "failed to open project");
    }

    #[test]
    fn display_lists_outermost_first() {
        let failure = Failure::new("disk full").context("save failed");
        let text = failure.to_string();

        let save = text.find("save failed").unwrap();
        let disk = text.find("disk full").unwrap();
        assert!(save < disk);
        assert!(text.contains("error.rs:"));
    }

    #[test]
    fn merge_concatenates_in_order() {
        let a = Failure::new("first");
        let b = Failure::new("second").context("second wrapped");
        let merged = a.merge(b);

        let messages: Vec<&str> = merged.entries().iter().map(|e| e.message()).collect();
        assert_eq!(messages, vec!["first", "second", "second wrapped"]);
    }

    #[test]
    fn from_error_keeps_display_text() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "broken pipe");
        assert_eq!(Failure::from_error(&io).message(), "broken pipe");
    }
}
