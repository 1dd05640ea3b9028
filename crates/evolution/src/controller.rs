use crate::error::EvolutionError;
use crate::runner::IterationRunner;
use crate::signals::{ControlSignals, SignalReceiver};
use crate::tracker;
use core_types::{Evolution, EvolutionStatus, IterationStatus};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{error, info, warn};

/// Owns the loop of one evolution and the signals that steer it.
///
/// `start` drives versions until the evolution completes, converges, is
/// stopped, or hits a fatal error. The other control methods may be called
/// from any task while `start` is running.
pub struct EvolutionController {
    evolution_id: String,
    runner: Arc<IterationRunner>,
    signals: ControlSignals,
    running: AtomicBool,
}

/// Clears the running flag and the runner's claim however `start` exits.
struct RunningGuard<'a> {
    running: &'a AtomicBool,
    runner: &'a IterationRunner,
    evolution_id: &'a str,
}

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.runner.release(self.evolution_id);
        self.running.store(false, Ordering::SeqCst);
    }
}

impl EvolutionController {
    pub fn new(evolution_id: impl Into<String>, runner: Arc<IterationRunner>) -> Self {
        Self {
            evolution_id: evolution_id.into(),
            runner,
            signals: ControlSignals::new(),
            running: AtomicBool::new(false),
        }
    }

    pub fn evolution_id(&self) -> &str {
        &self.evolution_id
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Begins or resumes the loop and blocks until it ends.
    ///
    /// The resume point is re-derived from persisted state on every call, so
    /// calling this again after a crash or an error is always safe. A stop
    /// request ends the loop with `Ok`.
    pub async fn start(&self) -> Result<(), EvolutionError> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(EvolutionError::AlreadyRunning(self.evolution_id.clone()));
        }
        // Another controller on the same runner may already drive this evolution.
        if !self.runner.claim(&self.evolution_id) {
            self.running.store(false, Ordering::SeqCst);
            return Err(EvolutionError::AlreadyRunning(self.evolution_id.clone()));
        }
        let _guard = RunningGuard {
            running: &self.running,
            runner: &self.runner,
            evolution_id: &self.evolution_id,
        };

        self.signals.rearm();
        let mut signals = self.signals.subscribe();
        let mut version = 0;

        match self.drive(&mut signals, &mut version).await {
            Ok(()) => Ok(()),
            Err(EvolutionError::Cancelled) => {
                info!(evolution_id = %self.evolution_id, version, "Evolution stopped");
                Ok(())
            }
            Err(e) => {
                self.fail(version, &e).await;
                Err(e)
            }
        }
    }

    /// Takes effect at the top of the next version; the one in flight finishes.
    pub async fn pause(&self) -> Result<(), EvolutionError> {
        self.transition_to(EvolutionStatus::Paused).await?;
        self.signals.pause();
        info!(evolution_id = %self.evolution_id, "Evolution paused");
        Ok(())
    }

    /// Releases a paused loop. If no loop is active, `start` must be called.
    pub async fn resume(&self) -> Result<(), EvolutionError> {
        let current = self.status().await?;
        if current != EvolutionStatus::Paused {
            return Err(EvolutionError::InvalidTransition {
                kind: "evolution",
                from: current.to_string(),
                to: "resumed".to_string(),
            });
        }
        self.transition_to(EvolutionStatus::Running).await?;
        self.signals.resume();
        info!(evolution_id = %self.evolution_id, "Evolution resumed");
        Ok(())
    }

    /// Observed within one poll interval plus any in-flight call.
    pub async fn stop(&self) -> Result<(), EvolutionError> {
        self.transition_to(EvolutionStatus::Stopped).await?;
        self.signals.stop();
        info!(evolution_id = %self.evolution_id, "Evolution stop requested");
        Ok(())
    }

    pub async fn status(&self) -> Result<EvolutionStatus, EvolutionError> {
        Ok(self
            .runner
            .evolutions()
            .get_evolution(&self.evolution_id)
            .await?
            .status)
    }

    async fn drive(
        &self,
        signals: &mut SignalReceiver,
        version: &mut u32,
    ) -> Result<(), EvolutionError> {
        let store = self.runner.evolutions();
        let evolution = store.get_evolution(&self.evolution_id).await?;
        if evolution.status == EvolutionStatus::Completed {
            info!(evolution_id = %self.evolution_id, "Evolution already completed");
            return Ok(());
        }
        if !evolution.status.can_transition_to(EvolutionStatus::Running) {
            return Err(EvolutionError::InvalidTransition {
                kind: "evolution",
                from: evolution.status.to_string(),
                to: EvolutionStatus::Running.to_string(),
            });
        }
        store
            .update_status(&self.evolution_id, EvolutionStatus::Running)
            .await?;

        let first = self.resume_point(&evolution).await?;
        info!(
            evolution_id = %self.evolution_id,
            first_version = first,
            max_iterations = evolution.max_iterations,
            "Evolution running"
        );

        for v in first..=evolution.max_iterations {
            *version = v;
            if signals.is_paused() {
                info!(evolution_id = %self.evolution_id, version = v, "Waiting for resume");
            }
            signals.wait_while_paused().await?;

            // Written before the version runs so a crash resumes exactly here.
            store.update_current_iteration(&self.evolution_id, v).await?;
            info!(evolution_id = %self.evolution_id, version = v, "Starting iteration");
            self.runner.run(&self.evolution_id, v, signals).await?;

            let iterations = store.get_iterations(&self.evolution_id).await?;
            let returns = tracker::completed_returns(&iterations);
            if tracker::has_converged(&returns, evolution.convergence_threshold) {
                info!(
                    evolution_id = %self.evolution_id,
                    version = v,
                    threshold = evolution.convergence_threshold,
                    "Returns converged"
                );
                return self.complete().await;
            }
        }

        info!(evolution_id = %self.evolution_id, "Reached max iterations");
        self.complete().await
    }

    // Also repairs a crash between the completion write and the versioning writes.
    async fn resume_point(&self, evolution: &Evolution) -> Result<u32, EvolutionError> {
        let store = self.runner.evolutions();
        let current = evolution.current_iteration;
        let row = if current > 0 {
            store.get_iteration(&evolution.id, current).await?
        } else {
            None
        };

        if let Some(iteration) = row.as_ref().filter(|it| it.status == IterationStatus::Completed) {
            let iterations = store.get_iterations(&evolution.id).await?;
            let best = tracker::current_best(evolution, &iterations);
            self.runner
                .apply_versioning(evolution, iteration, best.as_ref())
                .await?;
        }

        Ok(tracker::resume_point(current, row.map(|it| it.status)))
    }

    async fn complete(&self) -> Result<(), EvolutionError> {
        let current = self.status().await?;
        if !current.can_transition_to(EvolutionStatus::Completed) {
            // Stopped while the last version was finishing.
            info!(evolution_id = %self.evolution_id, status = %current, "Leaving evolution as is");
            return Ok(());
        }
        self.runner
            .evolutions()
            .update_status(&self.evolution_id, EvolutionStatus::Completed)
            .await?;
        info!(evolution_id = %self.evolution_id, "Evolution completed");
        Ok(())
    }

    async fn fail(&self, version: u32, err: &EvolutionError) {
        error!(evolution_id = %self.evolution_id, version, error = %err, "Evolution stopped on error");
        if version > 0 {
            if let Err(e) = self.runner.mark_failed(&self.evolution_id, version).await {
                warn!(evolution_id = %self.evolution_id, version, error = %e, "Failed to mark iteration as failed");
            }
        }
        if let Err(e) = self
            .runner
            .evolutions()
            .update_status(&self.evolution_id, EvolutionStatus::Stopped)
            .await
        {
            error!(evolution_id = %self.evolution_id, error = %e, "Failed to persist stopped status");
        }
    }

    async fn transition_to(&self, next: EvolutionStatus) -> Result<(), EvolutionError> {
        let current = self.status().await?;
        if !current.can_transition_to(next) {
            return Err(EvolutionError::InvalidTransition {
                kind: "evolution",
                from: current.to_string(),
                to: next.to_string(),
            });
        }
        self.runner
            .evolutions()
            .update_status(&self.evolution_id, next)
            .await?;
        Ok(())
    }
}
