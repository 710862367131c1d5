//! Error Types
//!
//! Every error that crosses an observable boundary travels as data inside an
//! `error` notification. The payload is a closed type: a kind, a message and
//! an optional underlying cause.
//!
//! Errors are only returned as `Err` values when they happen outside of any
//! subscription, for example when an operator is constructed with malformed
//! arguments.

use std::any::Any;
use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

/// Result alias used by fallible constructors and callbacks.
pub type Result<T, E = RxError> = std::result::Result<T, E>;

/// Broad classification of an [`RxError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// A user supplied callback (selector, predicate, accumulator) failed.
    Callback,
    /// The producing side of a sequence reported a failure.
    Source,
    /// No notification arrived within the allotted time.
    Timeout,
    /// An operator was constructed with invalid arguments.
    Argument,
    /// A host facility (such as a timer runtime) is not available.
    Unavailable,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Callback => "callback error",
            ErrorKind::Source => "source error",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Argument => "invalid argument",
            ErrorKind::Unavailable => "unavailable",
        };
        f.write_str(name)
    }
}

/// The error payload carried by `error` notifications.
#[derive(Debug, Clone, Error)]
#[error("{kind}: {message}")]
pub struct RxError {
    kind: ErrorKind,
    message: String,
    #[source]
    cause: Option<Arc<dyn StdError + Send + Sync>>,
}

impl RxError {
    /// Create an error of the given kind.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            cause: None,
        }
    }

    /// A failure reported by a producer.
    pub fn upstream(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Source, message)
    }

    /// A failure raised by a user callback.
    pub fn callback(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Callback, message)
    }

    /// An invalid constructor argument.
    pub fn argument(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Argument, message)
    }

    /// A sequence that stayed silent for longer than `after`.
    pub fn timeout(after: Duration) -> Self {
        Self::new(ErrorKind::Timeout, format!("no notification within {after:?}"))
    }

    /// Wrap an arbitrary error as a source failure, keeping it as the cause.
    pub fn from_error<E>(error: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self::upstream(error.to_string()).with_cause(error)
    }

    /// Attach an underlying cause.
    pub fn with_cause<E>(mut self, cause: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        self.cause = Some(Arc::new(cause));
        self
    }

    /// Convert a caught panic payload into a callback error.
    pub(crate) fn from_panic(payload: &(dyn Any + Send)) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "callback panicked".to_string()
        };
        Self::callback(message)
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl PartialEq for RxError {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind && self.message == other.message
    }
}

/// Invoke a user callback, turning a panic into a [`RxError`].
///
/// Only the callback itself runs under the guard. Callers must deliver the
/// result downstream outside of it, so that a panicking observer is never
/// mistaken for a failing selector.
pub(crate) fn guard<R>(f: impl FnOnce() -> R) -> Result<R> {
    std::panic::catch_unwind(std::panic::AssertUnwindSafe(f))
        .map_err(|payload| RxError::from_panic(payload.as_ref()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_kind_and_message() {
        let err = RxError::upstream("disk on fire");
        assert_eq!(err.to_string(), "source error: disk on fire");
    }

    #[test]
    fn cause_is_exposed_as_source() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "boom");
        let err = RxError::from_error(io);
        assert_eq!(err.kind(), ErrorKind::Source);
        assert!(err.source().is_some());
    }

    #[test]
    fn guard_converts_panics() {
        let result: Result<i32> = guard(|| panic!("selector exploded"));
        let err = result.expect_err("panic should be converted");
        assert_eq!(err.kind(), ErrorKind::Callback);
        assert_eq!(err.message(), "selector exploded");
    }

    #[test]
    fn guard_passes_values_through() {
        assert_eq!(guard(|| 7).ok(), Some(7));
    }
}
