use crate::error::ConfigError;
use std::path::Path;

// Declare the modules that make up this crate.
pub mod error;
pub mod evolution_config;
pub mod logging;
pub mod settings;

// Re-export the core types to provide a clean public API.
pub use evolution_config::{EvolutionDefinition, FixedParamsDefinition, load_evolution_definition};
pub use logging::init_tracing;
pub use settings::{AiSettings, BacktestSettings, Config, DatabaseSettings, LoggingSettings};

/// Loads the application configuration from `config.toml` in the working directory.
///
/// The file is optional; every value has a default. Environment variables prefixed with
/// `EVOLVER__` override file values (e.g. `EVOLVER__BACKTEST__BASE_URL`).
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(Path::new("config.toml"))
}

/// Same as [`load_config`] but reads the given file instead of `config.toml`.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let builder = config::Config::builder()
        .add_source(config::File::from(path).required(false))
        .add_source(
            config::Environment::with_prefix("EVOLVER")
                .prefix_separator("__")
                .separator("__"),
        )
        .build()?;

    // Attempt to deserialize the entire configuration into our `Config` struct
    let config = builder.try_deserialize::<Config>()?;
    config.validate()?;

    Ok(config)
}
