//! Call-site provenance for diagnostics.

use std::panic::Location;

use serde::Serialize;

/// Where a piece of work was submitted from.
///
/// Purely a logging aid. Nothing in the engine branches on it.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ExecutionSource {
    file: &'static str,
    line: u32,
}

impl ExecutionSource {
    pub const fn new(file: &'static str, line: u32) -> Self {
        Self { file, line }
    }

    /// Capture the location of the caller.
    ///
    /// Functions that forward this must themselves be `#[track_caller]` for
    /// the captured location to point at user code.
    #[track_caller]
    pub fn caller() -> Self {
        Self::from(Location::caller())
    }

    /// File name without its directory.
    pub fn file(&self) -> &'static str {
        self.file
            .rsplit(['/', '\\'])
            .next()
            .unwrap_or(self.file)
    }

    pub fn line(&self) -> u32 {
        self.line
    }
}

impl From<&'static Location<'static>> for ExecutionSource {
    fn from(location: &'static Location<'static>) -> Self {
        Self::new(location.file(), location.line())
    }
}

impl core::fmt::Display for ExecutionSource {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}:{}", self.file(), self.line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn caller_points_at_this_file() {
        let source = ExecutionSource::caller();
        assert_eq!(source.file(), "source.rs");
        assert!(source.line() > 0);
    }

    #[test]
    fn display_strips_directories() {
        let source = ExecutionSource::new("crates/app/src/editor.rs", 42);
        assert_eq!(source.to_string(), "editor.rs:42");

        let windows = ExecutionSource::new(r"C:\work\app\main.rs", 7);
        assert_eq!(windows.to_string(), "main.rs:7");
    }
}
