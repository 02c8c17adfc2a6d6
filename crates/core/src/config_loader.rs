use crate::config::AnalyticsConfig;
use anyhow::{Context, Result};
use figment::{
    providers::{Env, Format, Json, Serialized, Toml},
    Figment,
};
use std::path::Path;

pub struct ConfigLoader;

impl ConfigLoader {
    /// Loads analytics configuration by merging defaults, TOML, environment variables, and JSON.
    ///
    /// Missing files are skipped; environment variables use the `APP_` prefix
    /// with `__` separating nested keys (e.g. `APP_REGIME__N_STATES=3`).
    ///
    /// # Errors
    ///
    /// Returns an error if configuration files cannot be parsed.
    pub fn load() -> Result<AnalyticsConfig> {
        let config: AnalyticsConfig = Self::base()
            .merge(Toml::file("config/Config.toml"))
            .merge(Env::prefixed("APP_").split("__"))
            .join(Json::file("config/Config.json"))
            .extract()
            .context("Failed to load analytics configuration")?;

        Ok(config)
    }

    /// Loads analytics configuration with a specific profile.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration files cannot be parsed.
    pub fn load_with_profile(profile: &str) -> Result<AnalyticsConfig> {
        let config: AnalyticsConfig = Self::base()
            .merge(Toml::file("config/Config.toml"))
            .merge(Toml::file(format!("config/Config.{profile}.toml")))
            .merge(Env::prefixed("APP_").split("__"))
            .join(Json::file("config/Config.json"))
            .extract()
            .with_context(|| format!("Failed to load analytics configuration for profile {profile}"))?;

        Ok(config)
    }

    /// Loads analytics configuration from an explicit TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file does not exist or cannot be parsed.
    pub fn load_from(path: impl AsRef<Path>) -> Result<AnalyticsConfig> {
        let path = path.as_ref();
        if !path.exists() {
            anyhow::bail!("Config file not found: {}", path.display());
        }

        let config: AnalyticsConfig = Self::base()
            .merge(Toml::file(path))
            .merge(Env::prefixed("APP_").split("__"))
            .extract()
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        tracing::debug!(path = %path.display(), "Loaded analytics configuration");
        Ok(config)
    }

    fn base() -> Figment {
        Figment::from(Serialized::defaults(AnalyticsConfig::default()))
    }
}
