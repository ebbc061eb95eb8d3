//! Runtime configuration.
//!
//! Settings are layered: built-in defaults, an optional TOML file, then
//! `ALIRANTUNAI_*` environment variables (nested keys use `__`, e.g.
//! `ALIRANTUNAI_API__PRODUCTION_URL`). The raw [`Settings`] are then resolved
//! once into a [`ClientConfig`], which is what the rest of the crate reads.

use std::path::{Path, PathBuf};

use chrono_tz::Tz;
use config::{ConfigBuilder, builder::DefaultState};
use reqwest::Url;
use serde::Deserialize;

use crate::error::{Error, Result};

mod brand;
mod features;

pub use brand::{Brand, BrandSettings, HeadMeta};
pub use features::{Feature, FeatureFlags, FeatureSettings};

pub const DEFAULT_CONFIG_PATH: &str = "config/alirantunai.toml";
pub const DEFAULT_STATE_PATH: &str = "config/alirantunai_state.json";
pub const ENV_PREFIX: &str = "ALIRANTUNAI";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildMode {
    Development,
    Production,
}

impl BuildMode {
    /// Mode matching the compiled profile.
    pub fn compiled() -> Self {
        if cfg!(debug_assertions) {
            Self::Development
        } else {
            Self::Production
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Some(Self::Development),
            "production" | "prod" => Some(Self::Production),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    pub build_mode: Option<String>,
    pub log_level: String,
    pub state_path: String,
    pub download_dir: String,
    pub timezone: String,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            build_mode: None,
            log_level: "info".to_string(),
            state_path: DEFAULT_STATE_PATH.to_string(),
            download_dir: "downloads".to_string(),
            timezone: "Asia/Kuala_Lumpur".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiSettings {
    /// Origin the dev proxy listens on; relative API paths resolve against it.
    pub dev_origin: String,
    pub production_url: String,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            dev_origin: "http://localhost:5000".to_string(),
            production_url: "https://api.alirantunai.com".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub app: AppSettings,
    pub api: ApiSettings,
    pub brand: BrandSettings,
    pub features: FeatureSettings,
}

impl Settings {
    /// Reads the optional config file and the environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = path.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_PATH));
        let builder = config::Config::builder()
            .add_source(config::File::from(path).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__"),
            );
        Self::from_builder(builder)
    }

    pub fn from_builder(builder: ConfigBuilder<DefaultState>) -> Result<Self> {
        Ok(builder.build()?.try_deserialize()?)
    }
}

/// Fully resolved configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub build_mode: BuildMode,
    pub api_base: Url,
    pub timezone: Tz,
    pub log_level: String,
    pub state_path: PathBuf,
    pub download_dir: PathBuf,
    pub brand: Brand,
    pub features: FeatureFlags,
}

impl ClientConfig {
    pub fn resolve(settings: &Settings) -> Result<Self> {
        let build_mode = match settings.app.build_mode.as_deref() {
            None => BuildMode::compiled(),
            Some(raw) => BuildMode::parse(raw)
                .ok_or_else(|| Error::Settings(format!("unknown build mode `{raw}`")))?,
        };

        let origin = match build_mode {
            BuildMode::Development => &settings.api.dev_origin,
            BuildMode::Production => &settings.api.production_url,
        };
        let api_base = Url::parse(origin)
            .map_err(|err| Error::Settings(format!("invalid api origin `{origin}`: {err}")))?;

        let timezone = settings
            .app
            .timezone
            .parse::<Tz>()
            .map_err(|err| Error::Settings(format!("invalid timezone: {err}")))?;

        let config = Self {
            build_mode,
            api_base,
            timezone,
            log_level: settings.app.log_level.clone(),
            state_path: PathBuf::from(&settings.app.state_path),
            download_dir: PathBuf::from(&settings.app.download_dir),
            brand: Brand::resolve(&settings.brand),
            features: FeatureFlags::resolve(&settings.features),
        };
        tracing::debug!(
            "resolved config: mode={:?} api={} tz={}",
            config.build_mode,
            config.api_base,
            config.timezone
        );
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use api_types::identity::Mode;
    use config::{File, FileFormat};

    use super::*;

    fn settings_from(toml: &str) -> Settings {
        let builder = config::Config::builder().add_source(File::from_str(toml, FileFormat::Toml));
        Settings::from_builder(builder).unwrap()
    }

    #[test]
    fn development_uses_dev_origin() {
        let settings = settings_from(
            r#"
            [app]
            build_mode = "development"
            [api]
            dev_origin = "http://127.0.0.1:9999"
            "#,
        );
        let config = ClientConfig::resolve(&settings).unwrap();
        assert_eq!(config.build_mode, BuildMode::Development);
        assert_eq!(config.api_base.as_str(), "http://127.0.0.1:9999/");
    }

    #[test]
    fn production_uses_fixed_origin() {
        let settings = settings_from(
            r#"
            [app]
            build_mode = "prod"
            "#,
        );
        let config = ClientConfig::resolve(&settings).unwrap();
        assert_eq!(config.build_mode, BuildMode::Production);
        assert_eq!(config.api_base.as_str(), "https://api.alirantunai.com/");
    }

    #[test]
    fn unknown_timezone_is_rejected() {
        let settings = settings_from(
            r#"
            [app]
            timezone = "Mars/Olympus"
            "#,
        );
        assert!(matches!(
            ClientConfig::resolve(&settings),
            Err(Error::Settings(_))
        ));
    }

    #[test]
    fn feature_strings_flow_through() {
        let settings = settings_from(
            r#"
            [features]
            enable_business_mode = "false"
            default_mode = "business"
            "#,
        );
        let config = ClientConfig::resolve(&settings).unwrap();
        assert_eq!(config.features.available_modes(), vec![Mode::Personal]);
        assert_eq!(config.features.default_mode(), Mode::Personal);
        assert!(!config.features.can_switch_modes());
    }
}
