use crate::chat::DEFAULT_CLIENT;
use anyhow::{Context, Result};
use std::path::PathBuf;
use std::time::Duration;

pub const DATABASE_URL_ENV: &str = "CHATDESK_DATABASE_URL";
pub const MOBILE_BREAKPOINT_ENV: &str = "CHATDESK_MOBILE_BREAKPOINT";
pub const MENU_PULSE_MS_ENV: &str = "CHATDESK_MENU_PULSE_MS";
pub const DEFAULT_CLIENT_ENV: &str = "CHATDESK_DEFAULT_CLIENT";
pub const BACKEND_ENV: &str = "CHATDESK_BACKEND";

const DEFAULT_DATABASE_FILE: &str = "chatdesk.sqlite";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UiConfig {
    /// Viewports this wide or narrower get the mobile menu.
    pub mobile_breakpoint: u32,
    /// How long the opening/closing flags stay raised.
    pub menu_pulse: Duration,
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            mobile_breakpoint: 1024,
            menu_pulse: Duration::from_millis(300),
        }
    }
}

/// Where state is stored.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DatabaseLocation {
    Path(PathBuf),
    Url(String),
}

/// Which medium the desktop shell persists into.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum BackendKind {
    #[default]
    Sqlite,
    /// The web view's JSON store file
    StoreFile,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AppConfig {
    pub backend: BackendKind,
    pub database: DatabaseLocation,
    pub default_client: String,
    pub ui: UiConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::default(),
            database: DatabaseLocation::Path(PathBuf::from(DEFAULT_DATABASE_FILE)),
            default_client: DEFAULT_CLIENT.to_string(),
            ui: UiConfig::default(),
        }
    }
}

impl AppConfig {
    /// Reads overrides from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds a config from any variable lookup; unset variables keep their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(raw) = lookup(BACKEND_ENV) {
            config.backend = match raw.trim() {
                "sqlite" => BackendKind::Sqlite,
                "store" => BackendKind::StoreFile,
                other => anyhow::bail!("{} must be 'sqlite' or 'store', got '{}'", BACKEND_ENV, other),
            };
        }
        if let Some(url) = lookup(DATABASE_URL_ENV) {
            config.database = DatabaseLocation::Url(url);
        }
        if let Some(client) = lookup(DEFAULT_CLIENT_ENV) {
            config.default_client = client;
        }
        if let Some(raw) = lookup(MOBILE_BREAKPOINT_ENV) {
            config.ui.mobile_breakpoint = raw
                .trim()
                .parse()
                .with_context(|| format!("{} must be a pixel width, got '{}'", MOBILE_BREAKPOINT_ENV, raw))?;
        }
        if let Some(raw) = lookup(MENU_PULSE_MS_ENV) {
            let millis: u64 = raw
                .trim()
                .parse()
                .with_context(|| format!("{} must be milliseconds, got '{}'", MENU_PULSE_MS_ENV, raw))?;
            config.ui.menu_pulse = Duration::from_millis(millis);
        }

        log::debug!("Loaded configuration: {:?}", config);
        Ok(config)
    }

    /// Puts a relative database path under `base`, e.g. the app's data directory.
    pub fn with_data_dir(mut self, base: impl Into<PathBuf>) -> Self {
        if let DatabaseLocation::Path(path) = &self.database {
            if path.is_relative() {
                self.database = DatabaseLocation::Path(base.into().join(path));
            }
        }
        self
    }
}
