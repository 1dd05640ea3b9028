//! Pause and stop flags for one evolution loop.
//!
//! Both are `watch` channels owned by the controller. Unlike a one-shot
//! signal they can be raised and cleared any number of times, so resuming
//! never has to swap in a fresh primitive.

use crate::error::EvolutionError;
use std::time::Duration;
use tokio::sync::watch;

#[derive(Debug)]
pub struct ControlSignals {
    paused: watch::Sender<bool>,
    stopped: watch::Sender<bool>,
}

impl Default for ControlSignals {
    fn default() -> Self {
        Self::new()
    }
}

impl ControlSignals {
    pub fn new() -> Self {
        let (paused, _) = watch::channel(false);
        let (stopped, _) = watch::channel(false);
        Self { paused, stopped }
    }

    pub fn pause(&self) {
        self.paused.send_replace(true);
    }

    pub fn resume(&self) {
        self.paused.send_replace(false);
    }

    pub fn stop(&self) {
        self.stopped.send_replace(true);
    }

    /// Clears both flags before a new `start`.
    pub fn rearm(&self) {
        self.paused.send_replace(false);
        self.stopped.send_replace(false);
    }

    pub fn is_paused(&self) -> bool {
        *self.paused.borrow()
    }

    pub fn is_stopped(&self) -> bool {
        *self.stopped.borrow()
    }

    pub fn subscribe(&self) -> SignalReceiver {
        SignalReceiver {
            paused: self.paused.subscribe(),
            stopped: self.stopped.subscribe(),
        }
    }
}

/// The loop's view of [`ControlSignals`].
#[derive(Debug, Clone)]
pub struct SignalReceiver {
    paused: watch::Receiver<bool>,
    stopped: watch::Receiver<bool>,
}

impl SignalReceiver {
    pub fn is_stopped(&self) -> bool {
        *self.stopped.borrow()
    }

    pub fn is_paused(&self) -> bool {
        *self.paused.borrow()
    }

    /// Returns once the pause flag is clear, or `Cancelled` if stop is raised first.
    pub async fn wait_while_paused(&mut self) -> Result<(), EvolutionError> {
        if self.is_stopped() {
            return Err(EvolutionError::Cancelled);
        }
        tokio::select! {
            biased;
            _ = wait_until(&mut self.stopped, true) => Err(EvolutionError::Cancelled),
            _ = wait_until(&mut self.paused, false) => Ok(()),
        }
    }

    /// Sleeps for `period`, returning `Cancelled` as soon as stop is raised.
    pub async fn sleep(&mut self, period: Duration) -> Result<(), EvolutionError> {
        if self.is_stopped() {
            return Err(EvolutionError::Cancelled);
        }
        tokio::select! {
            biased;
            _ = wait_until(&mut self.stopped, true) => Err(EvolutionError::Cancelled),
            _ = tokio::time::sleep(period) => Ok(()),
        }
    }
}

// Resolves when the flag equals `target`, or when the controller is gone.
async fn wait_until(rx: &mut watch::Receiver<bool>, target: bool) {
    loop {
        if *rx.borrow_and_update() == target {
            return;
        }
        if rx.changed().await.is_err() {
            return;
        }
    }
}
