//! Batch operations across registered targets.
//!
//! The orchestrator turns one request into one outcome per attempted target. Target
//! failures become failed outcomes rather than errors; only a structurally invalid
//! spec is rejected up front. With `rollback_on_failure`, a batch with any failure
//! asks every target that changed its file to undo the change. That rollback is
//! best effort: failures are logged and reflected by `rolled_back = false`.
//! A call that timed out is undone later by a follow-up task once it finishes;
//! [`Orchestrator::finish_late_rollbacks`] waits for those tasks.

mod dispatch;
pub mod outcome;

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, timeout_at};
use tracing::{debug, info, warn};

use crate::bridge::BridgeMapper;
use crate::client::{ConfigTarget, TargetRegistry, WriteMode};
use crate::error::{ErrorKind, StitchError};
use crate::mcp::ServerSpec;

pub use dispatch::DispatchMode;
use dispatch::{Dispatched, Slot, Straggler};
pub use outcome::{
    ConfigurationOutcome, DetectionOutcome, RemovalOutcome, ServerLocation, TargetOutcome,
    TargetServers, any_failed,
};

pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrchestratorOptions {
    /// Budget for each individual target call.
    pub call_timeout: Duration,
    pub dispatch: DispatchMode,
}

impl Default for OrchestratorOptions {
    fn default() -> Self {
        Self {
            call_timeout: DEFAULT_CALL_TIMEOUT,
            dispatch: DispatchMode::Concurrent,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfigureOptions {
    pub rollback_on_failure: bool,
    pub backup: bool,
}

impl Default for ConfigureOptions {
    fn default() -> Self {
        Self {
            rollback_on_failure: false,
            backup: true,
        }
    }
}

/// Result of a successful mutating call on one target.
struct Applied {
    backup_path: Option<std::path::PathBuf>,
    changed: bool,
    bridged: bool,
}

#[derive(Debug, Clone)]
pub struct Orchestrator {
    registry: TargetRegistry,
    bridge: Arc<BridgeMapper>,
    options: OrchestratorOptions,
    late_rollbacks: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl Orchestrator {
    pub fn new(registry: TargetRegistry, bridge: BridgeMapper, options: OrchestratorOptions) -> Self {
        Self {
            registry,
            bridge: Arc::new(bridge),
            options,
            late_rollbacks: Arc::default(),
        }
    }

    pub fn registry(&self) -> &TargetRegistry {
        &self.registry
    }

    pub fn options(&self) -> &OrchestratorOptions {
        &self.options
    }

    /// Resolve each target. `found` reports whether the tool appears installed.
    pub async fn detect_all(&self, filter: Option<&[String]>) -> Vec<DetectionOutcome> {
        let slots = self.select(filter);
        let results = self
            .dispatch(&slots, "detect", |target| {
                Ok((target.detect(None), target.is_present()))
            })
            .await;

        slots
            .iter()
            .zip(results)
            .map(|(slot, result)| match result {
                Ok((path, present)) => {
                    let mut outcome = TargetOutcome::succeeded(slot.id()).with_path(path);
                    outcome.found = Some(present);
                    outcome
                }
                Err(err) => {
                    let mut outcome = TargetOutcome::failed(slot.id(), &err);
                    outcome.found = Some(false);
                    outcome
                }
            })
            .collect()
    }

    /// Upsert `spec` into every selected target.
    ///
    /// `targets = None` selects the detected subset. Remote specs are bridged for
    /// targets that only launch local processes.
    pub async fn configure_all(
        &self,
        spec: &ServerSpec,
        targets: Option<&[String]>,
        options: ConfigureOptions,
    ) -> Result<Vec<ConfigurationOutcome>, StitchError> {
        spec.validate()?;
        let slots = self.select_or_detected(targets).await;
        info!(server = %spec.id, targets = slots.len(), "configuring server");

        let shared = spec.clone();
        let bridge = Arc::clone(&self.bridge);
        let dispatched = self
            .dispatch_tracked(&slots, "configure", move |target| {
                let bridged = target.capabilities().needs_bridge(&shared);
                let spec = if bridged {
                    bridge.map(&shared)?
                } else {
                    shared.clone()
                };
                let backup_path = target.configure(&spec, options.backup)?;
                Ok(Applied {
                    backup_path,
                    changed: true,
                    bridged,
                })
            })
            .await;

        Ok(self
            .settle_batch(&slots, dispatched, options.rollback_on_failure)
            .await)
    }

    /// Remove `spec.id` from every selected target.
    ///
    /// A target without the entry is a successful no-op. Backups are always taken.
    pub async fn remove_all(
        &self,
        spec: &ServerSpec,
        targets: Option<&[String]>,
        rollback_on_failure: bool,
    ) -> Result<Vec<RemovalOutcome>, StitchError> {
        spec.validate_id()?;
        let slots = self.select_or_detected(targets).await;
        info!(server = %spec.id, targets = slots.len(), "removing server");

        let shared = spec.clone();
        let dispatched = self
            .dispatch_tracked(&slots, "remove", move |target| {
                match target.remove(&shared, true) {
                    Ok(backup_path) => Ok(Applied {
                        backup_path,
                        changed: true,
                        bridged: false,
                    }),
                    Err(err) if err.is_not_found() => {
                        debug!(target_id = target.id(), server = %shared.id, "server not present");
                        Ok(Applied {
                            backup_path: None,
                            changed: false,
                            bridged: false,
                        })
                    }
                    Err(err) => Err(err),
                }
            })
            .await;

        Ok(self
            .settle_batch(&slots, dispatched, rollback_on_failure)
            .await)
    }

    /// Wait up to `within` for the follow-up rollbacks of calls that timed out.
    ///
    /// Tasks still pending afterwards stay detached.
    pub async fn finish_late_rollbacks(&self, within: Duration) {
        let tasks = std::mem::take(
            &mut *self
                .late_rollbacks
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );
        if tasks.is_empty() {
            return;
        }
        let deadline = Instant::now() + within;
        let pending = tasks.len();
        for task in tasks {
            if timeout_at(deadline, task).await.is_err() {
                warn!(pending, "late rollbacks still running");
                return;
            }
        }
    }

    /// Server ids per target. Unreadable targets list nothing.
    pub async fn list_all(&self, targets: Option<&[String]>) -> Vec<TargetServers> {
        let slots = self.select(targets);
        let results = self
            .dispatch(&slots, "list", |target| {
                Ok((target.detect(None), target.list_servers(None)))
            })
            .await;

        slots
            .iter()
            .zip(results)
            .map(|(slot, result)| match result {
                Ok((path, servers)) => TargetServers {
                    target: slot.id().to_string(),
                    path,
                    servers,
                    error: None,
                },
                Err(err) => TargetServers {
                    target: slot.id().to_string(),
                    path: None,
                    servers: Vec::new(),
                    error: Some(err.to_string()),
                },
            })
            .collect()
    }

    /// Targets whose configuration contains `id`, in selection order.
    pub async fn find_server_across_targets(
        &self,
        id: &str,
        targets: Option<&[String]>,
    ) -> Vec<ServerLocation> {
        let slots = self.select(targets);
        let wanted = id.to_string();
        let results = self
            .dispatch(&slots, "find", move |target| {
                if !target.has_server(&wanted, None) {
                    return Ok(None);
                }
                Ok(Some((target.detect(None), target.get_server(&wanted, None))))
            })
            .await;

        slots
            .iter()
            .zip(results)
            .filter_map(|(slot, result)| match result {
                Ok(Some((path, spec))) => Some(ServerLocation {
                    target: slot.id().to_string(),
                    path,
                    spec,
                }),
                Ok(None) => None,
                Err(err) => {
                    warn!(target_id = slot.id(), error = %err, "skipping target in search");
                    None
                }
            })
            .collect()
    }

    /// Shape-check every selected target's file.
    pub async fn validate_all(&self, targets: Option<&[String]>) -> Vec<TargetOutcome> {
        let slots = self.select(targets);
        let results = self
            .dispatch(&slots, "validate", |target| {
                Ok((target.detect(None), target.validate()))
            })
            .await;

        slots
            .iter()
            .zip(results)
            .map(|(slot, result)| match result {
                Ok((path, true)) => TargetOutcome::succeeded(slot.id()).with_path(path),
                Ok((path, false)) => {
                    let mut outcome = TargetOutcome::succeeded(slot.id()).with_path(path);
                    outcome.success = false;
                    outcome.error = Some("configuration failed validation".to_string());
                    outcome.error_kind = Some(ErrorKind::Validation);
                    outcome
                }
                Err(err) => TargetOutcome::failed(slot.id(), &err),
            })
            .collect()
    }

    fn select(&self, filter: Option<&[String]>) -> Vec<Slot> {
        match filter {
            None => self
                .registry
                .all()
                .iter()
                .map(|target| Slot::Known(Arc::clone(target)))
                .collect(),
            Some(ids) => {
                let mut seen = HashSet::new();
                ids.iter()
                    .filter(|id| seen.insert(id.as_str()))
                    .map(|id| match self.registry.get(id) {
                        Some(target) => Slot::Known(target),
                        None => Slot::Unknown(id.clone()),
                    })
                    .collect()
            }
        }
    }

    async fn select_or_detected(&self, targets: Option<&[String]>) -> Vec<Slot> {
        if targets.is_some() {
            return self.select(targets);
        }
        let detected: Vec<String> = self
            .detect_all(None)
            .await
            .into_iter()
            .filter(|outcome| outcome.found == Some(true))
            .map(|outcome| outcome.target)
            .collect();
        debug!(?detected, "defaulting to detected targets");
        self.select(Some(detected.as_slice()))
    }

    async fn dispatch<T, F>(
        &self,
        slots: &[Slot],
        operation: &'static str,
        call: F,
    ) -> Vec<Result<T, StitchError>>
    where
        T: Send + 'static,
        F: Fn(Arc<dyn ConfigTarget>) -> Result<T, StitchError> + Send + Sync + 'static,
    {
        self.dispatch_tracked(slots, operation, call).await.results
    }

    async fn dispatch_tracked<T, F>(
        &self,
        slots: &[Slot],
        operation: &'static str,
        call: F,
    ) -> Dispatched<T>
    where
        T: Send + 'static,
        F: Fn(Arc<dyn ConfigTarget>) -> Result<T, StitchError> + Send + Sync + 'static,
    {
        dispatch::run(
            slots,
            self.options.dispatch,
            self.options.call_timeout,
            operation,
            call,
        )
        .await
    }

    /// Outcomes for a mutating batch, rolled back when asked and anything failed.
    async fn settle_batch(
        &self,
        slots: &[Slot],
        dispatched: Dispatched<Applied>,
        rollback_on_failure: bool,
    ) -> Vec<TargetOutcome> {
        let mut outcomes = self.collect_applied(slots, dispatched.results);
        if rollback_on_failure && any_failed(&outcomes) {
            self.roll_back(slots, &mut outcomes).await;
            self.roll_back_late(dispatched.stragglers);
        }
        outcomes
    }

    fn collect_applied(
        &self,
        slots: &[Slot],
        results: Vec<Result<Applied, StitchError>>,
    ) -> Vec<TargetOutcome> {
        slots
            .iter()
            .zip(results)
            .map(|(slot, result)| {
                let path = match slot {
                    Slot::Known(target) => target.detect(None),
                    Slot::Unknown(_) => None,
                };
                match result {
                    Ok(applied) => {
                        let mut outcome = TargetOutcome::succeeded(slot.id()).with_path(path);
                        outcome.backup_path = applied.backup_path;
                        outcome.changed = applied.changed;
                        outcome.bridged = applied.bridged;
                        outcome
                    }
                    Err(err) => {
                        warn!(target_id = slot.id(), error = %err, "target failed");
                        TargetOutcome::failed(slot.id(), &err).with_path(path)
                    }
                }
            })
            .collect()
    }

    /// Undo the change of every target that succeeded and wrote its file.
    async fn roll_back(&self, slots: &[Slot], outcomes: &mut [TargetOutcome]) {
        let candidates: Vec<(usize, Slot)> = slots
            .iter()
            .zip(outcomes.iter())
            .enumerate()
            .filter_map(|(index, (slot, outcome))| match slot {
                Slot::Known(target)
                    if outcome.success
                        && outcome.changed
                        && target.descriptor().write_mode == WriteMode::File =>
                {
                    Some((index, slot.clone()))
                }
                _ => None,
            })
            .collect();
        if candidates.is_empty() {
            return;
        }

        info!(targets = candidates.len(), "rolling back after partial failure");
        let rollback_slots: Vec<Slot> = candidates.iter().map(|(_, slot)| slot.clone()).collect();
        let results = self
            .dispatch(&rollback_slots, "rollback", |target| target.rollback())
            .await;

        for ((index, slot), result) in candidates.into_iter().zip(results) {
            match result {
                Ok(_) => outcomes[index].rolled_back = true,
                Err(err) => {
                    warn!(target_id = slot.id(), error = %err, "rollback failed");
                }
            }
        }
    }

    /// Undo the writes of timed-out calls once they complete.
    fn roll_back_late(&self, stragglers: Vec<Straggler<Applied>>) {
        let mut tasks = self
            .late_rollbacks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        for Straggler { target, handle } in stragglers {
            if target.descriptor().write_mode != WriteMode::File {
                continue;
            }
            tasks.push(tokio::spawn(async move {
                let Ok(Ok(applied)) = handle.await else {
                    return;
                };
                if !applied.changed {
                    return;
                }
                let id = target.id().to_string();
                match tokio::task::spawn_blocking(move || target.rollback()).await {
                    Ok(Ok(_)) => info!(target_id = %id, "rolled back late write"),
                    Ok(Err(err)) => warn!(target_id = %id, error = %err, "rollback of late write failed"),
                    Err(err) => warn!(target_id = %id, error = %err, "rollback of late write panicked"),
                }
            }));
        }
    }
}
