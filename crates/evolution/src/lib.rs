//! # Evolver Evolution Crate
//!
//! The closed loop at the heart of the system: backtest a strategy prompt,
//! evaluate the outcome, rewrite the prompt, repeat.
//!
//! ## Public API
//!
//! - `EvolutionController`: start / pause / resume / stop for one evolution.
//! - `IterationRunner`: drives a single version, resuming interrupted attempts.
//! - `tracker`: the improvement rule, convergence check and resume-point derivation.
//! - `ControlSignals`: the pause and stop flags owned by a controller.

pub mod controller;
pub mod error;
pub mod runner;
pub mod signals;
pub mod tracker;

pub use controller::EvolutionController;
pub use error::EvolutionError;
pub use runner::{Collaborators, IterationRunner, RunnerSettings};
pub use signals::{ControlSignals, SignalReceiver};
