//! Common error handling utilities
//!
//! Provides a lightweight context-adding trait usable with any crate's
//! error type, similar to anyhow's `context()` but without forcing the
//! callers onto `anyhow::Error`.

use std::fmt;

/// Trait for adding context to errors
///
/// This trait provides a consistent way to add context to errors
/// across all crates while keeping each crate's own error enum.
pub trait ErrorContext<T> {
    /// Add context to an error
    ///
    /// # Errors
    /// Returns the original error message prefixed with `context`.
    fn context<C>(self, context: C) -> Result<T, String>
    where
        C: fmt::Display + Send + Sync + 'static;

    /// Add context with a closure (lazy evaluation)
    ///
    /// # Errors
    /// Returns the original error message prefixed with the closure's output.
    fn with_context<C, F>(self, f: F) -> Result<T, String>
    where
        C: fmt::Display + Send + Sync + 'static,
        F: FnOnce() -> C;
}

impl<T, E> ErrorContext<T> for Result<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn context<C>(self, context: C) -> Result<T, String>
    where
        C: fmt::Display + Send + Sync + 'static,
    {
        self.map_err(|e| format!("{context}: {e}"))
    }

    fn with_context<C, F>(self, f: F) -> Result<T, String>
    where
        C: fmt::Display + Send + Sync + 'static,
        F: FnOnce() -> C,
    {
        self.map_err(|e| format!("{}: {e}", f()))
    }
}
