use std::path::Path;

// Declare the modules that make up this crate.
pub mod error;
pub mod settings;

// Re-export the core types to provide a clean public API.
pub use error::ConfigError;
pub use settings::{Config, Database, Logging, Retention, Server, Settlement};

/// Prefix for environment overrides, e.g. `RIFT__SERVER__PORT=8080`.
pub const ENV_PREFIX: &str = "RIFT";

/// Loads the application configuration from `config.toml` in the working
/// directory, if present, layered under `RIFT__*` environment variables.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(Path::new("config.toml"))
}

/// Same as [`load_config`] but reads the file at `path`. A missing file is not
/// an error; every section has defaults.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let builder = config::Config::builder()
        .add_source(config::File::from(path).required(false))
        .add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__"),
        )
        .build()?;

    let config = builder.try_deserialize::<Config>()?;
    config.validate()?;
    tracing::debug!(path = %path.display(), "Configuration loaded.");
    Ok(config)
}
