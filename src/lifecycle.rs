//! Per-resource operation lifecycle.
//!
//! Every mutating operation walks an explicit state machine:
//!
//! ```text
//! Planned ──> Creating ─┐
//!         ──> Updating ─┼──> Polling ──> Ready
//!         ──> Deleting ─┘        └─────> Failed
//! ```
//!
//! Operations that have nothing to wait for go straight from their working
//! state to `Ready`. Any non-terminal state may move to `Failed`.
//! Polling is driven by [`PollPolicy`] so interval and timeout are explicit.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::error::ProviderError;

/// Where an operation currently is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleState {
    /// Accepted by the plan, nothing sent yet.
    Planned,
    /// Create request in flight.
    Creating,
    /// Update request in flight.
    Updating,
    /// Delete request in flight.
    Deleting,
    /// Waiting for the remote side to settle.
    Polling,
    /// Operation finished.
    Ready,
    /// Operation failed with a reason.
    Failed(String),
}

impl LifecycleState {
    /// Whether no further transitions are allowed.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Ready | Self::Failed(_))
    }

    fn can_move_to(&self, next: &LifecycleState) -> bool {
        use LifecycleState::*;
        match (self, next) {
            (Planned, Creating | Updating | Deleting) => true,
            (Creating | Updating | Deleting, Polling | Ready) => true,
            (Polling, Ready) => true,
            (from, Failed(_)) => !from.is_terminal(),
            _ => false,
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Planned => write!(f, "planned"),
            Self::Creating => write!(f, "creating"),
            Self::Updating => write!(f, "updating"),
            Self::Deleting => write!(f, "deleting"),
            Self::Polling => write!(f, "polling"),
            Self::Ready => write!(f, "ready"),
            Self::Failed(reason) => write!(f, "failed: {}", reason),
        }
    }
}

/// Result of one readiness probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollStatus {
    /// The remote side has settled.
    Ready,
    /// Not there yet; poll again.
    Pending,
    /// The remote side reached a state it will not recover from.
    Failed(String),
}

/// How often and how long to poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    /// Wait between probes.
    pub interval: Duration,
    /// Give up after this long.
    pub timeout: Duration,
}

impl PollPolicy {
    /// Create a policy.
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        Self { interval, timeout }
    }
}

/// Poll `probe` until it reports ready, fails, or the policy times out.
pub async fn wait_until<F, Fut>(
    policy: PollPolicy,
    what: &str,
    mut probe: F,
) -> Result<(), ProviderError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<PollStatus, ProviderError>>,
{
    let deadline = Instant::now() + policy.timeout;
    let mut attempts = 0u32;

    loop {
        attempts += 1;
        match probe().await? {
            PollStatus::Ready => {
                debug!(what, attempts, "ready");
                return Ok(());
            },
            PollStatus::Failed(reason) => {
                return Err(ProviderError::FailedPrecondition(format!(
                    "{} failed: {}",
                    what, reason
                )));
            },
            PollStatus::Pending => {
                if Instant::now() + policy.interval > deadline {
                    warn!(what, attempts, timeout = ?policy.timeout, "gave up waiting");
                    return Err(ProviderError::DeadlineExceeded(format!(
                        "timed out after {:?} waiting for {}",
                        policy.timeout, what
                    )));
                }
                debug!(what, attempts, "not ready, waiting");
                tokio::time::sleep(policy.interval).await;
            },
        }
    }
}

/// Tracks one resource operation through [`LifecycleState`].
#[derive(Debug)]
pub struct Lifecycle {
    resource: String,
    state: LifecycleState,
    history: Vec<LifecycleState>,
}

impl Lifecycle {
    /// Start a lifecycle for `resource` (used in logs and errors).
    pub fn new(resource: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            state: LifecycleState::Planned,
            history: vec![LifecycleState::Planned],
        }
    }

    /// Current state.
    pub fn state(&self) -> &LifecycleState {
        &self.state
    }

    /// Every state visited, in order.
    pub fn history(&self) -> &[LifecycleState] {
        &self.history
    }

    /// Move to `next`, rejecting transitions the machine does not allow.
    pub fn transition(&mut self, next: LifecycleState) -> Result<(), ProviderError> {
        if !self.state.can_move_to(&next) {
            return Err(ProviderError::FailedPrecondition(format!(
                "{}: cannot go from {} to {}",
                self.resource, self.state, next
            )));
        }
        debug!(resource = %self.resource, from = %self.state, to = %next, "lifecycle transition");
        self.state = next.clone();
        self.history.push(next);
        Ok(())
    }

    /// Record a failure and hand the error back for propagation.
    pub fn fail(&mut self, err: ProviderError) -> ProviderError {
        if !self.state.is_terminal() {
            let failed = LifecycleState::Failed(err.to_string());
            self.state = failed.clone();
            self.history.push(failed);
        }
        err
    }

    /// Run a step in the current working state, failing the lifecycle on error.
    pub async fn step<T, Fut>(&mut self, fut: Fut) -> Result<T, ProviderError>
    where
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        match fut.await {
            Ok(value) => Ok(value),
            Err(e) => Err(self.fail(e)),
        }
    }

    /// Wait on `check` without leaving the current working state. Used when a
    /// step may only start once the remote side has settled.
    pub async fn wait<F, Fut>(
        &mut self,
        policy: PollPolicy,
        what: &str,
        check: F,
    ) -> Result<(), ProviderError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<PollStatus, ProviderError>>,
    {
        match wait_until(policy, what, check).await {
            Ok(()) => Ok(()),
            Err(e) => Err(self.fail(e)),
        }
    }

    /// Enter `Polling`, wait on `probe`, then finish as `Ready` or `Failed`.
    pub async fn poll<F, Fut>(
        &mut self,
        policy: PollPolicy,
        what: &str,
        probe: F,
    ) -> Result<(), ProviderError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<PollStatus, ProviderError>>,
    {
        self.transition(LifecycleState::Polling)?;
        match wait_until(policy, what, probe).await {
            Ok(()) => self.finish(),
            Err(e) => Err(self.fail(e)),
        }
    }

    /// Mark the operation as done.
    pub fn finish(&mut self) -> Result<(), ProviderError> {
        self.transition(LifecycleState::Ready)?;
        info!(resource = %self.resource, "operation complete");
        Ok(())
    }
}
