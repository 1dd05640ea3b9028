//! # Evolver Database Crate
//!
//! The system's permanent record of evolutions, their iterations, the strategy
//! prompts they produce and the AI models the simulation may use.
//!
//! ## Public API
//!
//! - `connect`: The async function to establish the database connection pool.
//! - `run_migrations`: Applies the embedded migrations, ensuring the schema is up-to-date.
//! - `EvolutionStore`, `StrategyStore`, `ModelStore`: the record-access traits the
//!   evolution engine is written against.
//! - `DbRepository`: the PostgreSQL implementation of all three.
//! - `DbError`: The specific error types that can be returned from this crate.

// Declare the modules that constitute this crate.
pub mod connection;
pub mod error;
pub mod repository;
pub mod store;

// Re-export the key components to create a clean, public-facing API.
pub use connection::{connect, run_migrations};
pub use error::DbError;
pub use repository::DbRepository;
pub use store::{EvolutionStore, ModelStore, StrategyStore};
