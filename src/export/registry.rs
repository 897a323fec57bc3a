//! Admission control and the active run registry
//!
//! All shared admission state lives in one [`ExportRegistry`] behind a single
//! mutex: per-actor cooldown timestamps, the set of active runs and the
//! maintenance flag. [`ExportRegistry::admit`] checks and updates that state
//! in one critical section, so two concurrent requests from the same actor
//! can never both pass the cooldown.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::Config;
use crate::error::AdmissionError;

use super::memory::{MemoryStatus, SharedMemoryMonitor};

/// Prune cooldown entries once the map grows past this size
const COOLDOWN_PRUNE_THRESHOLD: usize = 1000;

struct ActiveRun {
    actor: String,
    label: String,
    started_at: DateTime<Utc>,
    started: Instant,
    cancel: CancellationToken,
}

/// Public view of an active run
#[derive(Debug, Clone, PartialEq)]
pub struct ActiveRunInfo {
    pub run_id: Uuid,
    pub actor: String,
    pub label: String,
    pub started_at: DateTime<Utc>,
    pub elapsed: Duration,
}

#[derive(Default)]
struct RegistryState {
    last_request: HashMap<String, Instant>,
    active: HashMap<Uuid, ActiveRun>,
    maintenance: bool,
}

pub struct ExportRegistry {
    state: Mutex<RegistryState>,
    cooldown: Duration,
    max_concurrent: usize,
    memory: SharedMemoryMonitor,
}

impl ExportRegistry {
    /// Create a new registry
    ///
    /// # Arguments
    /// * `config` - Cooldown, concurrency limit and initial maintenance flag
    /// * `memory` - Monitor consulted at admission
    pub fn new(config: &Config, memory: SharedMemoryMonitor) -> Self {
        Self {
            state: Mutex::new(RegistryState {
                maintenance: config.admission.maintenance,
                ..RegistryState::default()
            }),
            cooldown: config.cooldown(),
            max_concurrent: config.admission.max_concurrent.max(1),
            memory,
        }
    }

    /// Admit a new run for `actor`
    ///
    /// Checks, in order: maintenance mode, the actor's cooldown, critical
    /// memory pressure and the concurrency limit. On success the actor's
    /// cooldown restarts and the run is registered until the returned ticket
    /// is dropped.
    ///
    /// # Arguments
    /// * `actor` - Identity of the requester
    /// * `label` - Short description shown in run listings
    /// * `cancel` - Token cancelling the run
    ///
    /// # Returns
    /// * `Result<AdmissionTicket, AdmissionError>` - Ticket or rejection
    pub fn admit(
        self: &Arc<Self>,
        actor: &str,
        label: &str,
        cancel: CancellationToken,
    ) -> Result<AdmissionTicket, AdmissionError> {
        let mut state = self.lock();

        if state.maintenance {
            return Err(AdmissionError::Maintenance);
        }

        let now = Instant::now();
        if let Some(last) = state.last_request.get(actor) {
            let since = now.saturating_duration_since(*last);
            if since < self.cooldown {
                return Err(AdmissionError::Cooldown {
                    remaining: self.cooldown - since,
                });
            }
        }

        let memory = {
            let mut monitor = match self.memory.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            monitor.check_now()
        };
        if memory.status == MemoryStatus::Critical {
            return Err(AdmissionError::MemoryCritical(memory.message));
        }

        if state.active.len() >= self.max_concurrent {
            return Err(AdmissionError::TooManyActive {
                limit: self.max_concurrent,
            });
        }

        if state.last_request.len() > COOLDOWN_PRUNE_THRESHOLD {
            let cooldown = self.cooldown;
            state
                .last_request
                .retain(|_, last| now.saturating_duration_since(*last) < cooldown);
        }
        state.last_request.insert(actor.to_string(), now);

        let run_id = Uuid::new_v4();
        state.active.insert(
            run_id,
            ActiveRun {
                actor: actor.to_string(),
                label: label.to_string(),
                started_at: Utc::now(),
                started: now,
                cancel: cancel.clone(),
            },
        );

        info!("Admitted run {} for {} ({})", run_id, actor, label);

        Ok(AdmissionTicket {
            registry: Arc::clone(self),
            run_id,
            actor: actor.to_string(),
            cancel,
        })
    }

    pub fn set_maintenance(&self, enabled: bool) {
        self.lock().maintenance = enabled;
        info!("Maintenance mode {}", if enabled { "enabled" } else { "disabled" });
    }

    pub fn is_maintenance(&self) -> bool {
        self.lock().maintenance
    }

    /// Cancel every active run of `actor`
    ///
    /// # Returns
    /// * `usize` - Number of runs signalled
    pub fn cancel_actor(&self, actor: &str) -> usize {
        let state = self.lock();
        let mut cancelled = 0;
        for run in state.active.values().filter(|run| run.actor == actor) {
            run.cancel.cancel();
            cancelled += 1;
        }
        if cancelled > 0 {
            info!("Cancelled {} active run(s) of {}", cancelled, actor);
        }
        cancelled
    }

    /// Cancel a single run
    pub fn cancel_run(&self, run_id: Uuid) -> bool {
        match self.lock().active.get(&run_id) {
            Some(run) => {
                run.cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// Snapshot of active runs, oldest first
    pub fn active_runs(&self) -> Vec<ActiveRunInfo> {
        let state = self.lock();
        let mut runs: Vec<ActiveRunInfo> = state
            .active
            .iter()
            .map(|(run_id, run)| ActiveRunInfo {
                run_id: *run_id,
                actor: run.actor.clone(),
                label: run.label.clone(),
                started_at: run.started_at,
                elapsed: run.started.elapsed(),
            })
            .collect();
        runs.sort_by(|a, b| b.elapsed.cmp(&a.elapsed));
        runs
    }

    pub fn active_count(&self) -> usize {
        self.lock().active.len()
    }

    fn release(&self, run_id: Uuid) {
        if self.lock().active.remove(&run_id).is_some() {
            debug!("Released run {}", run_id);
        }
    }

    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// Proof of admission; unregisters the run when dropped
pub struct AdmissionTicket {
    registry: Arc<ExportRegistry>,
    run_id: Uuid,
    actor: String,
    cancel: CancellationToken,
}

impl AdmissionTicket {
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn actor(&self) -> &str {
        &self.actor
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }
}

impl Drop for AdmissionTicket {
    fn drop(&mut self) {
        self.registry.release(self.run_id);
    }
}
