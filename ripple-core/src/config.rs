//! Composition-root configuration.
//!
//! Operators never pick a scheduler on their own beyond their documented
//! default. An application that wants to choose schedulers in one place
//! loads an [`RxConfig`] and passes the materialized [`SchedulerRef`]s to
//! the `*_on` and time-based operators.
//!
//! ```rust
//! use ripple_core::{RxConfig, SchedulerKind};
//!
//! let config = RxConfig::from_json(r#"{ "scheduler": "immediate" }"#).unwrap();
//! assert_eq!(config.scheduler, SchedulerKind::Immediate);
//! assert_eq!(config.timer, SchedulerKind::Timeout);
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{Result, RxError};
use crate::scheduler::{CurrentThreadScheduler, ImmediateScheduler, SchedulerRef, TimeoutScheduler};

/// The built-in scheduler variants.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerKind {
    Immediate,
    #[default]
    CurrentThread,
    /// Backed by the tokio runtime of the calling context.
    Timeout,
}

impl SchedulerKind {
    /// Materialize the scheduler. `Timeout` needs a tokio runtime and fails
    /// with [`ErrorKind::Unavailable`](crate::ErrorKind::Unavailable)
    /// outside of one.
    pub fn build(self) -> Result<SchedulerRef> {
        match self {
            SchedulerKind::Immediate => Ok(ImmediateScheduler::instance()),
            SchedulerKind::CurrentThread => Ok(CurrentThreadScheduler::instance()),
            SchedulerKind::Timeout => Ok(TimeoutScheduler::current()?.into_ref()),
        }
    }
}

/// Scheduler selection for an application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RxConfig {
    /// For work that should start as soon as possible.
    pub scheduler: SchedulerKind,
    /// For time-based operators.
    pub timer: SchedulerKind,
}

impl Default for RxConfig {
    fn default() -> Self {
        Self {
            scheduler: SchedulerKind::CurrentThread,
            timer: SchedulerKind::Timeout,
        }
    }
}

impl RxConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| RxError::argument("invalid scheduler configuration").with_cause(e))
    }

    pub fn scheduler(&self) -> Result<SchedulerRef> {
        self.scheduler.build()
    }

    pub fn timer_scheduler(&self) -> Result<SchedulerRef> {
        self.timer.build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn defaults_apply_to_missing_fields() {
        let config = RxConfig::from_json("{}").unwrap();
        assert_eq!(config, RxConfig::default());
        assert_eq!(config.scheduler, SchedulerKind::CurrentThread);
        assert_eq!(config.timer, SchedulerKind::Timeout);
    }

    #[test]
    fn round_trips_through_json() {
        let config = RxConfig {
            scheduler: SchedulerKind::Immediate,
            timer: SchedulerKind::CurrentThread,
        };
        let json = serde_json::to_string(&config).unwrap();
        assert_eq!(json, r#"{"scheduler":"immediate","timer":"current_thread"}"#);
        assert_eq!(RxConfig::from_json(&json).unwrap(), config);
    }

    #[test]
    fn unknown_kind_is_an_argument_error() {
        let error = RxConfig::from_json(r#"{ "timer": "thread_pool" }"#).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Argument);
        assert!(std::error::Error::source(&error).is_some());
    }

    #[test]
    fn timeout_kind_needs_a_runtime() {
        let error = RxConfig::default().timer_scheduler().err().expect("no runtime");
        assert_eq!(error.kind(), ErrorKind::Unavailable);
        assert!(RxConfig::default().scheduler().is_ok());
    }

    #[tokio::test]
    async fn timeout_kind_inside_a_runtime() {
        assert!(RxConfig::default().timer_scheduler().is_ok());
    }
}
