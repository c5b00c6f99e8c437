//! Timed commissioning of queued work.
//!
//! Without a timeout items run inline on the caller's thread. With a
//! timeout each item runs on a dedicated worker thread; when the timeout
//! expires the item's cancellation token is cancelled and the worker gets a
//! grace period to return. The three abnormal outcomes are:
//!
//! - **interrupted**: the item returned after cancellation
//! - **terminated**: the item did not return within the grace period
//! - **failed**: the item returned an error (or panicked)
//!
//! A fail-fast commissioner escalates every abnormal outcome to an error;
//! otherwise outcomes are logged and absorbed.

use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::cancellation::CancellationToken;
use crate::config::RuntimeConfig;
use crate::error::{ControlError, ControlResult};
use crate::traits::Commissionable;

/// Terminal outcome of one commissioning item
#[derive(Debug)]
pub enum Outcome {
    Completed,
    Interrupted,
    Terminated,
    Failed(ControlError),
}

impl Outcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, Outcome::Completed)
    }
}

/// Runs commissionable items with optional timeouts
#[derive(Debug, Clone)]
pub struct Commissioner {
    label: String,
    timeout: Option<Duration>,
    grace: Duration,
    fail_fast: bool,
}

impl Commissioner {
    /// Inline, fail-fast commissioner.
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            timeout: None,
            grace: Duration::from_millis(250),
            fail_fast: true,
        }
    }

    pub fn from_config(label: impl Into<String>, config: &RuntimeConfig) -> Self {
        Self::new(label)
            .with_timeout(config.commission_timeout)
            .with_grace(config.commission_grace)
            .fail_fast(config.fail_fast)
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    pub fn fail_fast(mut self, fail_fast: bool) -> Self {
        self.fail_fast = fail_fast;
        self
    }

    pub fn is_fail_fast(&self) -> bool {
        self.fail_fast
    }

    /// Runs one item and reports its outcome without escalation.
    pub fn run(&self, item: Arc<dyn Commissionable>) -> Outcome {
        match self.timeout {
            None => match item.commission(&CancellationToken::new()) {
                Ok(()) => Outcome::Completed,
                Err(error) => Outcome::Failed(error),
            },
            Some(timeout) => self.run_timed(item, timeout),
        }
    }

    fn run_timed(&self, item: Arc<dyn Commissionable>, timeout: Duration) -> Outcome {
        let token = CancellationToken::new();
        let (tx, rx) = mpsc::channel();
        let worker_item = item.clone();
        let worker_token = token.clone();
        let spawned = thread::Builder::new()
            .name(format!("{}-commission", self.label))
            .spawn(move || {
                let result = panic::catch_unwind(AssertUnwindSafe(|| worker_item.commission(&worker_token)));
                let _ = tx.send(result);
            });
        if let Err(error) = spawned {
            tracing::warn!(commissioner = %self.label, %error, "unable to spawn worker; commissioning inline");
            return match item.commission(&token) {
                Ok(()) => Outcome::Completed,
                Err(error) => Outcome::Failed(error),
            };
        }

        let label = item.label();
        match rx.recv_timeout(timeout) {
            Ok(Ok(Ok(()))) => Outcome::Completed,
            Ok(Ok(Err(error))) => Outcome::Failed(error),
            Ok(Err(payload)) => Outcome::Failed(ControlError::panicked(label.as_str(), "commissioning", payload)),
            Err(RecvTimeoutError::Timeout) => {
                token.cancel();
                let cancelled_at = Instant::now();
                match rx.recv_timeout(self.grace) {
                    Ok(_) => {
                        tracing::debug!(item = %label, after = ?cancelled_at.elapsed(), "commissioning interrupted");
                        Outcome::Interrupted
                    }
                    Err(RecvTimeoutError::Timeout) => Outcome::Terminated,
                    Err(RecvTimeoutError::Disconnected) => Outcome::Interrupted,
                }
            }
            Err(RecvTimeoutError::Disconnected) => {
                Outcome::Failed(ControlError::IllegalState(format!("commissioning worker for [{}] vanished", label)))
            }
        }
    }

    /// Runs one item and escalates its outcome according to the fail-fast flag.
    pub fn commission(&self, item: Arc<dyn Commissionable>) -> ControlResult<()> {
        let label = item.label();
        let outcome = self.run(item);
        self.escalate(&label, outcome)
    }

    fn escalate(&self, label: &str, outcome: Outcome) -> ControlResult<()> {
        let error = match outcome {
            Outcome::Completed => return Ok(()),
            Outcome::Interrupted => ControlError::Timeout {
                name: label.to_string(),
                timeout: self.timeout.unwrap_or_default(),
            },
            Outcome::Terminated => ControlError::Terminated { name: label.to_string() },
            Outcome::Failed(error) => error,
        };
        if self.fail_fast {
            Err(error)
        } else {
            tracing::warn!(commissioner = %self.label, item = label, %error, "commissioning failure absorbed");
            Ok(())
        }
    }
}
