use super::models::Config;
use config::{ConfigError, Environment, File};
use std::env;
use std::path::PathBuf;

const CONFIG_ENV_VAR: &str = "STEMBOX_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "config/stembox.toml";
const ENV_PREFIX: &str = "STEMBOX";
const ENV_SEPARATOR: &str = "__";
const BACKEND_URL_ENV_VAR: &str = "BACKEND_BASE_URL";

/// Load configuration from multiple sources with priority:
/// 1. Defaults (embedded in structs)
/// 2. TOML file (if exists)
/// 3. Environment variables from .env file (via dotenvy)
/// 4. System environment variables
/// 5. `BACKEND_BASE_URL` (highest priority)
pub fn load() -> Result<Config, ConfigError> {
    // Load .env first so STEMBOX_CONFIG may come from it
    let _ = dotenvy::dotenv();

    let config_path = env::var(CONFIG_ENV_VAR)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));

    load_with_path(config_path)
}

/// Same as [`load`] but with an explicit config file path
pub fn load_with_path(config_path: PathBuf) -> Result<Config, ConfigError> {
    // Ignore errors if the .env file doesn't exist
    let _ = dotenvy::dotenv();

    let mut config = load_from_sources(config_path)?;
    apply_backend_override(&mut config, env::var(BACKEND_URL_ENV_VAR).ok());
    Ok(config)
}

/// The conventional unprefixed variable wins over everything but the CLI flag
fn apply_backend_override(config: &mut Config, base_url: Option<String>) {
    if let Some(url) = base_url.filter(|url| !url.trim().is_empty()) {
        config.backend.base_url = url;
    }
}

/// Load configuration from a specific path and environment
/// Useful for testing with custom config files
pub fn load_from_sources(config_path: PathBuf) -> Result<Config, ConfigError> {
    let mut builder = config::Config::builder();

    if config_path.exists() {
        tracing::info!("Loading configuration from: {}", config_path.display());
        builder = builder.add_source(File::from(config_path).required(false));
    } else {
        tracing::debug!(
            "Configuration file not found at {}, using defaults and environment overrides",
            config_path.display()
        );
    }

    // STEMBOX__BACKEND__BASE_URL -> backend.base_url
    builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .separator(ENV_SEPARATOR)
            .try_parsing(true),
    );

    let config = builder.build()?;
    config.try_deserialize()
}
