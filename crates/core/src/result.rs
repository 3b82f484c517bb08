//! Result type definition and extension traits.
//!
//! Provides combinators for Result types so callers can log-and-continue
//! without unwrap/expect/panic.

use crate::error::Error;

/// The standard Result type for flowmesh operations.
///
/// # Examples
///
/// ```ignore
/// fn lookup(store: &DeferredStore<u32>, key: DataKey) -> Result<u32> {
///     store.get(&key).into_result()
/// }
/// ```
pub type Result<T> = std::result::Result<T, Error>;

/// Extension trait providing logging combinators for Results.
pub trait ResultExt<T> {
    /// Convert a Result to an Option, logging the error if present.
    fn into_option_logged(self) -> Option<T>;

    /// Get the value or a default, logging the error if present.
    fn or_default_logged(self, default: T) -> T;

    /// Inspect the error without consuming the Result.
    #[must_use]
    fn inspect_error<F: FnOnce(&Error)>(self, f: F) -> Self;

    /// Discard the result, logging a failure as a warning under `context`.
    fn swallow_logged(self, context: &str);
}

impl<T> ResultExt<T> for Result<T> {
    fn into_option_logged(self) -> Option<T> {
        match self {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::error!(error = %e, "Operation failed");
                None
            }
        }
    }

    fn or_default_logged(self, default: T) -> T {
        match self {
            Ok(value) => value,
            Err(e) => {
                tracing::error!(error = %e, "Operation failed, using default");
                default
            }
        }
    }

    fn inspect_error<F: FnOnce(&Error)>(self, f: F) -> Self {
        if let Err(ref e) = self {
            f(e);
        }
        self
    }

    fn swallow_logged(self, context: &str) {
        if let Err(e) = self {
            tracing::warn!(error = %e, context, "Ignoring failure");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_into_option_ok() {
        let result: Result<i32> = Ok(42);
        assert_eq!(result.into_option_logged(), Some(42));
    }

    #[test]
    fn test_result_into_option_err() {
        let result: Result<i32> = Err(Error::Cancelled);
        assert_eq!(result.into_option_logged(), None);
    }

    #[test]
    fn test_result_or_default_logged_err() {
        let result: Result<i32> = Err(Error::failed_execution("boom"));
        assert_eq!(result.or_default_logged(99), 99);
    }

    #[test]
    fn test_result_inspect_error() {
        let result: Result<i32> = Err(Error::Abandoned);
        let mut called = false;
        let _ = result.inspect_error(|_| {
            called = true;
        });
        assert!(called);
    }

    #[test]
    fn test_swallow_logged_accepts_both_arms() {
        let ok: Result<()> = Ok(());
        ok.swallow_logged("ok path");
        let err: Result<()> = Err(Error::failed_execution("stop failed"));
        err.swallow_logged("forced stop");
    }
}
