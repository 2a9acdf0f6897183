//! Configuration management for the image proxy.
//!
//! Two layers of configuration exist:
//! - Process settings from the command line via clap (`DSIMAGE_` environment prefix)
//! - Service settings from a TOML file (backends, thumbnail limits, rights service,
//!   placeholders, timeouts), held as a swappable snapshot in [`ConfigHandle`]
//!
//! # Environment Variables
//!
//! - `DSIMAGE_HOST` - Server bind address (default: 0.0.0.0)
//! - `DSIMAGE_PORT` - Server port (default: 3000)
//! - `DSIMAGE_CONFIG` - Path to the service configuration file
//! - `DSIMAGE_CORS_ORIGINS` - Allowed CORS origins, comma-separated
//!
//! # Service Configuration
//!
//! ```toml
//! [imageservers]
//! iip = "http://iip.example.com/iipsrv/iipsrv.fcgi"
//! iiif = "http://iip.example.com/iipsrv/iipsrv.fcgi?IIIF="
//!
//! [imageservers.deepzoom]
//! param = "http://iip.example.com/iipsrv/iipsrv.fcgi"
//!
//! [thumbnail]
//! max_width = 600
//! max_height = 600
//!
//! [rights]
//! url = "http://licensemodule.example.com/ds-license/v1"
//! ```

use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use clap::Parser;
use serde::Deserialize;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::ConfigError;
use crate::protocol::{AddressingMode, BackendAddress, Backends};

// =============================================================================
// Default Values
// =============================================================================

/// Default server host.
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Default server port.
pub const DEFAULT_PORT: u16 = 3000;

/// Default service configuration file.
pub const DEFAULT_CONFIG_PATH: &str = "config/ds-image.toml";

/// Default thumbnail maximum, applied to both width and height.
pub const DEFAULT_THUMBNAIL_MAX: u64 = 600;

/// Default interval between configuration reloads.
pub const DEFAULT_AUTOUPDATE_INTERVAL_MS: u64 = 60_000;

/// Shortest accepted interval between configuration reloads.
pub const MIN_AUTOUPDATE_INTERVAL_MS: u64 = 1_000;

// =============================================================================
// CLI Arguments
// =============================================================================

/// DS Image Proxy - access-controlled proxy for IIP, IIIF and DeepZoom image servers.
///
/// Validates inbound image requests, checks them against the rights service
/// and streams the result from the configured backend image server.
#[derive(Parser, Debug, Clone)]
#[command(name = "ds-image-proxy")]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// Host address to bind the server to.
    #[arg(long, default_value = DEFAULT_HOST, env = "DSIMAGE_HOST")]
    pub host: String,

    /// Port to listen on.
    #[arg(short, long, default_value_t = DEFAULT_PORT, env = "DSIMAGE_PORT")]
    pub port: u16,

    /// Path to the TOML service configuration.
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH, env = "DSIMAGE_CONFIG")]
    pub config: PathBuf,

    /// Allowed CORS origins (comma-separated).
    ///
    /// If not specified, allows any origin.
    #[arg(long, env = "DSIMAGE_CORS_ORIGINS", value_delimiter = ',')]
    pub cors_origins: Option<Vec<String>>,

    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,

    /// Disable request tracing.
    #[arg(long, default_value_t = false)]
    pub no_tracing: bool,
}

impl Config {
    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if self.host.trim().is_empty() {
            return Err("Host must not be empty. Set --host or DSIMAGE_HOST".to_string());
        }

        if self.config.as_os_str().is_empty() {
            return Err(
                "Service configuration path is required. Set --config or DSIMAGE_CONFIG"
                    .to_string(),
            );
        }

        Ok(())
    }

    /// Get the server bind address as "host:port".
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

// =============================================================================
// Service Configuration
// =============================================================================

/// Service settings loaded from the TOML configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub imageservers: ImageServersConfig,
    pub thumbnail: ThumbnailConfig,
    pub images: PlaceholderConfig,
    pub rights: RightsConfig,
    pub proxy: ProxyConfig,
    pub autoupdate: AutoUpdateConfig,
}

/// Backend image server base URLs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ImageServersConfig {
    pub iip: Option<String>,
    pub iiif: Option<String>,
    pub deepzoom: DeepZoomServerConfig,
}

/// DeepZoom backend; exactly one of the two addressing modes may be set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DeepZoomServerConfig {
    /// Base for `{base}/{imageid}_files/...`
    pub path: Option<String>,
    /// Base for `{base}?DeepZoom={imageid}_files/...`
    pub param: Option<String>,
}

/// Largest output still classified as a thumbnail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ThumbnailConfig {
    pub max_width: u64,
    pub max_height: u64,
}

impl Default for ThumbnailConfig {
    fn default() -> Self {
        Self {
            max_width: DEFAULT_THUMBNAIL_MAX,
            max_height: DEFAULT_THUMBNAIL_MAX,
        }
    }
}

/// Placeholder image files served for denied and unknown resources.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PlaceholderConfig {
    pub no_access: Option<PathBuf>,
    pub non_existing: Option<PathBuf>,
}

/// Rights service endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RightsConfig {
    pub url: Option<String>,
    /// When disabled every image request is treated as accessible.
    pub enabled: bool,
}

impl Default for RightsConfig {
    fn default() -> Self {
        Self {
            url: None,
            enabled: true,
        }
    }
}

/// Outbound connection timeouts. Absent means no timeout.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    pub connect_timeout_ms: Option<u64>,
    pub read_timeout_ms: Option<u64>,
}

impl ProxyConfig {
    pub fn connect_timeout(&self) -> Option<Duration> {
        self.connect_timeout_ms.map(Duration::from_millis)
    }

    pub fn read_timeout(&self) -> Option<Duration> {
        self.read_timeout_ms.map(Duration::from_millis)
    }
}

/// Periodic reload of the configuration file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct AutoUpdateConfig {
    pub enabled: bool,
    pub interval_ms: u64,
}

impl Default for AutoUpdateConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_ms: DEFAULT_AUTOUPDATE_INTERVAL_MS,
        }
    }
}

impl ServiceConfig {
    /// Read, parse and validate the configuration file at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&content, &path.display().to_string())
    }

    /// Parse and validate configuration text. `origin` names the source in errors.
    pub fn from_toml_str(content: &str, origin: &str) -> Result<Self, ConfigError> {
        let config: ServiceConfig = toml::from_str(content).map_err(|source| ConfigError::Parse {
            path: origin.to_string(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Check constraints that the schema alone does not express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let servers = &self.imageservers;
        check_url("imageservers.iip", servers.iip.as_deref())?;
        check_url("imageservers.iiif", servers.iiif.as_deref())?;
        check_url("imageservers.deepzoom.path", servers.deepzoom.path.as_deref())?;
        check_url("imageservers.deepzoom.param", servers.deepzoom.param.as_deref())?;

        if servers.deepzoom.path.is_some() && servers.deepzoom.param.is_some() {
            return Err(ConfigError::Invalid(
                "imageservers.deepzoom must set either 'path' or 'param', not both".to_string(),
            ));
        }

        if self.thumbnail.max_width == 0 || self.thumbnail.max_height == 0 {
            return Err(ConfigError::Invalid(
                "thumbnail.max_width and thumbnail.max_height must be greater than 0".to_string(),
            ));
        }

        if self.rights.enabled {
            if self.rights.url.is_none() {
                return Err(ConfigError::Invalid(
                    "rights.url is required when the rights check is enabled".to_string(),
                ));
            }
            check_url("rights.url", self.rights.url.as_deref())?;
        }

        if self.autoupdate.enabled && self.autoupdate.interval_ms < MIN_AUTOUPDATE_INTERVAL_MS {
            return Err(ConfigError::Invalid(format!(
                "autoupdate.interval_ms must be at least {}, got {}",
                MIN_AUTOUPDATE_INTERVAL_MS, self.autoupdate.interval_ms
            )));
        }

        Ok(())
    }

    /// Backend addresses for the translator.
    pub fn backends(&self) -> Backends {
        let servers = &self.imageservers;
        let deepzoom = match (&servers.deepzoom.path, &servers.deepzoom.param) {
            (Some(base), _) => Some(BackendAddress::new(base, AddressingMode::Path)),
            (None, Some(base)) => Some(BackendAddress::new(base, AddressingMode::Param)),
            (None, None) => None,
        };
        Backends {
            iip: servers.iip.clone(),
            iiif: servers.iiif.clone(),
            deepzoom,
        }
    }
}

fn check_url(key: &str, value: Option<&str>) -> Result<(), ConfigError> {
    match value {
        Some(raw) => Url::parse(raw)
            .map(|_| ())
            .map_err(|e| ConfigError::Invalid(format!("{} is not a valid URL '{}': {}", key, raw, e))),
        None => Ok(()),
    }
}

// =============================================================================
// Configuration Handle
// =============================================================================

/// Shared, swappable configuration snapshot.
///
/// Readers take an `Arc` to the current snapshot and keep using it for the
/// whole request, so a concurrent reload is never observed half-applied.
#[derive(Debug, Clone)]
pub struct ConfigHandle {
    current: Arc<RwLock<Arc<ServiceConfig>>>,
    path: Option<PathBuf>,
}

impl ConfigHandle {
    /// Wrap a configuration that has no backing file.
    pub fn new(config: ServiceConfig) -> Self {
        Self {
            current: Arc::new(RwLock::new(Arc::new(config))),
            path: None,
        }
    }

    /// Load the configuration file and remember its path for reloads.
    pub fn from_file(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let config = ServiceConfig::load(&path)?;
        Ok(Self {
            current: Arc::new(RwLock::new(Arc::new(config))),
            path: Some(path),
        })
    }

    /// The current configuration snapshot.
    pub fn snapshot(&self) -> Arc<ServiceConfig> {
        let guard = self.current.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&guard)
    }

    /// Install a new snapshot.
    pub fn replace(&self, config: ServiceConfig) {
        let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
        *guard = Arc::new(config);
    }

    /// Re-read the backing file.
    ///
    /// Returns `Ok(true)` when a changed configuration was installed. On any
    /// error the current snapshot stays in place. Changes to sections that are
    /// only read at startup are installed but logged as needing a restart.
    pub fn reload(&self) -> Result<bool, ConfigError> {
        let Some(path) = &self.path else {
            return Ok(false);
        };
        let loaded = ServiceConfig::load(path)?;
        let current = self.snapshot();
        if *current == loaded {
            return Ok(false);
        }

        let sections = restart_required(&current, &loaded);
        if !sections.is_empty() {
            warn!(
                sections = %sections.join(", "),
                "Reloaded configuration changes settings that only apply after a restart"
            );
        }
        self.replace(loaded);
        Ok(true)
    }

    /// Start the periodic reload task if the current snapshot enables it.
    pub fn spawn_autoupdate(&self) -> Option<JoinHandle<()>> {
        let settings = self.snapshot().autoupdate;
        if !settings.enabled || self.path.is_none() {
            return None;
        }

        let handle = self.clone();
        let period = Duration::from_millis(settings.interval_ms);
        info!(interval_ms = settings.interval_ms, "Configuration autoupdate enabled");

        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            // The first tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let reloader = handle.clone();
                match tokio::task::spawn_blocking(move || reloader.reload()).await {
                    Ok(Ok(true)) => info!("Configuration reloaded"),
                    Ok(Ok(false)) => debug!("Configuration unchanged"),
                    Ok(Err(e)) => warn!(error = %e, "Configuration reload failed, keeping previous configuration"),
                    Err(e) => warn!(error = %e, "Configuration reload task failed"),
                }
            }
        }))
    }
}

/// Names of the sections that differ between `old` and `new` but are only
/// read when the server starts: the rights client, placeholder images, the
/// upstream client and the autoupdate schedule.
pub fn restart_required(old: &ServiceConfig, new: &ServiceConfig) -> Vec<&'static str> {
    let mut sections = Vec::new();
    if old.rights != new.rights {
        sections.push("rights");
    }
    if old.images != new.images {
        sections.push("images");
    }
    if old.proxy != new.proxy {
        sections.push("proxy");
    }
    if old.autoupdate != new.autoupdate {
        sections.push("autoupdate");
    }
    sections
}

// =============================================================================
// Tests
// =============================================================================
