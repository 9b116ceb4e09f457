//! Timed per-target dispatch.
//!
//! Each target call runs on the blocking pool and is raced against its own deadline.
//! A call that loses the race keeps running; only the orchestrator's wait is bounded.
//! Its handle is returned as a straggler so the caller can act once it finishes.
//! Results always come back in input order.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::{JoinError, JoinHandle};
use tokio::time::{Instant, error::Elapsed, timeout_at};
use tracing::warn;

use crate::client::ConfigTarget;
use crate::error::StitchError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DispatchMode {
    /// Every target call is launched at once.
    #[default]
    Concurrent,
    /// One call at a time; for diagnosing a misbehaving target.
    Sequential,
}

/// One entry of a batch: a registered target or an id nothing is registered under.
#[derive(Debug, Clone)]
pub(crate) enum Slot {
    Known(Arc<dyn ConfigTarget>),
    Unknown(String),
}

impl Slot {
    pub(crate) fn id(&self) -> &str {
        match self {
            Slot::Known(target) => target.id(),
            Slot::Unknown(id) => id,
        }
    }
}

/// Operations whose abandoned calls may still change a file.
const WRITING_OPERATIONS: &[&str] = &["configure", "remove"];

/// A call that missed its deadline and is still running.
pub(crate) struct Straggler<T> {
    pub(crate) target: Arc<dyn ConfigTarget>,
    pub(crate) handle: JoinHandle<Result<T, StitchError>>,
}

pub(crate) struct Dispatched<T> {
    /// One result per slot, in input order.
    pub(crate) results: Vec<Result<T, StitchError>>,
    pub(crate) stragglers: Vec<Straggler<T>>,
}

pub(crate) async fn run<T, F>(
    slots: &[Slot],
    mode: DispatchMode,
    budget: Duration,
    operation: &'static str,
    call: F,
) -> Dispatched<T>
where
    T: Send + 'static,
    F: Fn(Arc<dyn ConfigTarget>) -> Result<T, StitchError> + Send + Sync + 'static,
{
    let call = Arc::new(call);
    let launch = |target: &Arc<dyn ConfigTarget>| {
        let call = Arc::clone(&call);
        let target = Arc::clone(target);
        let deadline = Instant::now() + budget;
        (deadline, tokio::task::spawn_blocking(move || call(target)))
    };

    let mut dispatched = Dispatched {
        results: Vec::with_capacity(slots.len()),
        stragglers: Vec::new(),
    };
    match mode {
        DispatchMode::Concurrent => {
            let pending: Vec<_> = slots
                .iter()
                .map(|slot| match slot {
                    Slot::Known(target) => Some(launch(target)),
                    Slot::Unknown(_) => None,
                })
                .collect();
            for (slot, launched) in slots.iter().zip(pending) {
                let result = match (slot, launched) {
                    (Slot::Known(target), Some((deadline, handle))) => {
                        race(target, deadline, handle, operation, budget, &mut dispatched.stragglers)
                            .await
                    }
                    _ => Err(StitchError::UnknownTarget(slot.id().to_string())),
                };
                dispatched.results.push(result);
            }
        }
        DispatchMode::Sequential => {
            for slot in slots {
                let result = match slot {
                    Slot::Known(target) => {
                        let (deadline, handle) = launch(target);
                        race(target, deadline, handle, operation, budget, &mut dispatched.stragglers)
                            .await
                    }
                    Slot::Unknown(id) => Err(StitchError::UnknownTarget(id.clone())),
                };
                dispatched.results.push(result);
            }
        }
    }
    dispatched
}

/// Wait for one call until its deadline; a call that misses it is kept as a straggler.
async fn race<T>(
    target: &Arc<dyn ConfigTarget>,
    deadline: Instant,
    mut handle: JoinHandle<Result<T, StitchError>>,
    operation: &'static str,
    budget: Duration,
    stragglers: &mut Vec<Straggler<T>>,
) -> Result<T, StitchError> {
    let raced = timeout_at(deadline, &mut handle).await;
    let timed_out = raced.is_err();
    let result = settle(target.id(), operation, budget, raced);
    if timed_out {
        stragglers.push(Straggler {
            target: Arc::clone(target),
            handle,
        });
    }
    result
}

fn settle<T>(
    target: &str,
    operation: &'static str,
    budget: Duration,
    raced: Result<Result<Result<T, StitchError>, JoinError>, Elapsed>,
) -> Result<T, StitchError> {
    match raced {
        Ok(Ok(result)) => result,
        Ok(Err(join)) => Err(StitchError::TaskFailed {
            target: target.to_string(),
            operation,
            message: join.to_string(),
        }),
        Err(_) => {
            warn!(target_id = target, operation, budget_ms = budget.as_millis() as u64, "target call timed out");
            Err(StitchError::Timeout {
                target: target.to_string(),
                operation,
                after: budget,
                late_write: WRITING_OPERATIONS.contains(&operation),
            })
        }
    }
}
