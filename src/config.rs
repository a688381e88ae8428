use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use crate::constants::{defaults, env};
use crate::error::ConfigError;
use crate::services::gating::TradingWindowPolicy;
use crate::symbols::SymbolParams;
use crate::window::Rect;

/// Top-level config sections, named the way they appear in `config.yaml`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ConfigSection {
    Window,
    TradingHours,
    Retention,
    Pacing,
    Pricing,
    Vision,
    Symbols,
    Server,
}

impl ConfigSection {
    pub fn key(&self) -> &'static str {
        match self {
            ConfigSection::Window => "window",
            ConfigSection::TradingHours => "trading_hours",
            ConfigSection::Retention => "retention",
            ConfigSection::Pacing => "pacing",
            ConfigSection::Pricing => "pricing",
            ConfigSection::Vision => "vision",
            ConfigSection::Symbols => "symbols",
            ConfigSection::Server => "server",
        }
    }
}

impl fmt::Display for ConfigSection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    /// Client executable; required for launch and relaunch.
    pub exe_path: Option<PathBuf>,
    /// Tried in order against visible window titles.
    pub title_patterns: Vec<String>,
    pub class_pattern: Option<String>,
    pub launch_timeout_secs: u64,
    pub poll_interval_ms: u64,
    pub focus_retries: u32,
    pub focus_retry_delay_ms: u64,
    /// Relaunch from `exe_path` when the window is gone and cannot be re-activated.
    pub auto_relaunch: bool,
    pub launch_on_start: bool,
    /// Named capture regions in window coordinates.
    pub regions: HashMap<String, Rect>,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            exe_path: None,
            title_patterns: defaults::TITLE_PATTERNS.iter().map(|s| s.to_string()).collect(),
            class_pattern: None,
            launch_timeout_secs: defaults::LAUNCH_TIMEOUT_SECS,
            poll_interval_ms: defaults::LAUNCH_POLL_INTERVAL_MS,
            focus_retries: defaults::FOCUS_RETRIES,
            focus_retry_delay_ms: defaults::FOCUS_RETRY_DELAY_MS,
            auto_relaunch: true,
            launch_on_start: false,
            regions: HashMap::new(),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    pub days: u32,
    /// Six-field cron expression (seconds first).
    pub cleanup_cron: String,
    pub sweep_on_start: bool,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            days: defaults::RETENTION_DAYS,
            cleanup_cron: defaults::CLEANUP_CRON.to_string(),
            sweep_on_start: true,
        }
    }
}

/// Delays between synthetic inputs. The client drops keys that arrive too fast.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct PacingConfig {
    pub key_delay_ms: u64,
    pub char_delay_ms: u64,
    pub field_delay_ms: u64,
    /// Wait after switching pages, before capturing.
    pub settle_delay_ms: u64,
    /// Upper bound of random extra delay added to every pause.
    pub jitter_ms: u64,
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            key_delay_ms: 200,
            char_delay_ms: 150,
            field_delay_ms: 300,
            settle_delay_ms: 1000,
            jitter_ms: 50,
        }
    }
}

impl PacingConfig {
    /// No pauses at all; used with fake actuators.
    pub fn immediate() -> Self {
        Self {
            key_delay_ms: 0,
            char_delay_ms: 0,
            field_delay_ms: 0,
            settle_delay_ms: 0,
            jitter_ms: 0,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct PricingConfig {
    /// Fraction applied to the base price for market-mode orders.
    pub market_offset: Decimal,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            market_offset: dec!(0.01),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VisionRegion {
    #[default]
    Mainland,
    International,
}

impl VisionRegion {
    pub fn endpoint(&self) -> &'static str {
        match self {
            VisionRegion::Mainland => "https://dashscope.aliyuncs.com/compatible-mode/v1",
            VisionRegion::International => "https://dashscope-intl.aliyuncs.com/compatible-mode/v1",
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct VisionConfig {
    pub enabled: bool,
    pub region: VisionRegion,
    /// Overrides the region endpoint.
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub model: String,
    pub timeout_secs: u64,
    /// Run extraction for position / trade / order pages.
    pub extract_queries: bool,
    /// Read back the confirmation screen after buy / sell / cancel.
    pub verify_orders: bool,
}

impl Default for VisionConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            region: VisionRegion::default(),
            base_url: None,
            api_key: None,
            model: defaults::VISION_MODEL.to_string(),
            timeout_secs: defaults::VISION_TIMEOUT_SECS,
            extract_queries: true,
            verify_orders: false,
        }
    }
}

impl VisionConfig {
    pub fn base_url(&self) -> String {
        self.base_url
            .clone()
            .unwrap_or_else(|| self.region.endpoint().to_string())
    }

    /// The environment variable wins over the config file.
    pub fn resolve_api_key(&self) -> Option<String> {
        self.resolve_api_key_with(std::env::var(env::VISION_API_KEY).ok())
    }

    pub fn resolve_api_key_with(&self, from_env: Option<String>) -> Option<String> {
        from_env
            .filter(|k| !k.trim().is_empty())
            .or_else(|| self.api_key.clone().filter(|k| !k.trim().is_empty()))
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub enabled: bool,
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind: defaults::SERVER_BIND.to_string(),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    pub log_root: PathBuf,
    pub window: WindowConfig,
    pub trading_hours: TradingWindowPolicy,
    pub retention: RetentionConfig,
    pub pacing: PacingConfig,
    pub pricing: PricingConfig,
    pub vision: VisionConfig,
    /// Per-symbol parameters keyed by code.
    pub symbols: HashMap<String, SymbolParams>,
    pub server: ServerConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            log_root: PathBuf::from(defaults::LOG_ROOT),
            window: WindowConfig::default(),
            trading_hours: TradingWindowPolicy::default(),
            retention: RetentionConfig::default(),
            pacing: PacingConfig::default(),
            pricing: PricingConfig::default(),
            vision: VisionConfig::default(),
            symbols: HashMap::new(),
            server: ServerConfig::default(),
        }
    }
}

impl AppConfig {
    /// Loads the file named by `EXECUTOR_CONFIG`, or `config.yaml`.
    /// A missing `config.yaml` means defaults; a missing explicit path is an error.
    pub fn load() -> Result<Self, ConfigError> {
        match std::env::var(env::CONFIG_PATH) {
            Ok(path) => Self::load_from(Path::new(&path)),
            Err(_) => {
                let path = Path::new("config.yaml");
                if path.exists() {
                    Self::load_from(path)
                } else {
                    tracing::warn!("⚠️ [CONFIG] config.yaml not found, using defaults");
                    let config = AppConfig::default();
                    config.validate()?;
                    Ok(config)
                }
            }
        }
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml_str(&content).map_err(|e| match e {
            ConfigError::Parse { source, .. } => ConfigError::Parse {
                path: path.display().to_string(),
                source,
            },
            other => other,
        })
    }

    pub fn from_yaml_str(content: &str) -> Result<Self, ConfigError> {
        // Strip BOM if present
        let content = content.strip_prefix('\u{feff}').unwrap_or(content);

        let config: AppConfig = if content.trim().is_empty() {
            AppConfig::default()
        } else {
            serde_yaml::from_str(content).map_err(|source| ConfigError::Parse {
                path: "<inline>".to_string(),
                source,
            })?
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.window.title_patterns.is_empty() && self.window.class_pattern.is_none() {
            return Err(ConfigError::invalid(
                ConfigSection::Window,
                "at least one title pattern or a class pattern is required",
            ));
        }
        if self.window.focus_retries == 0 {
            return Err(ConfigError::invalid(ConfigSection::Window, "focus_retries must be >= 1"));
        }
        if self.window.launch_timeout_secs == 0 {
            return Err(ConfigError::invalid(ConfigSection::Window, "launch_timeout_secs must be >= 1"));
        }

        self.trading_hours
            .validate()
            .map_err(|reason| ConfigError::invalid(ConfigSection::TradingHours, reason))?;

        if self.retention.days == 0 {
            return Err(ConfigError::invalid(ConfigSection::Retention, "days must be >= 1"));
        }

        if !valid_offset(self.pricing.market_offset) {
            return Err(ConfigError::invalid(
                ConfigSection::Pricing,
                format!("market_offset {} must be in (0, 1)", self.pricing.market_offset),
            ));
        }

        for (code, params) in &self.symbols {
            if let Some(offset) = params.market_offset {
                if !valid_offset(offset) {
                    return Err(ConfigError::invalid(
                        ConfigSection::Symbols,
                        format!("{}: market_offset {} must be in (0, 1)", code, offset),
                    ));
                }
            }
            if params.lot_size == Some(0) {
                return Err(ConfigError::invalid(ConfigSection::Symbols, format!("{}: lot_size must be >= 1", code)));
            }
        }

        if self.vision.enabled && self.vision.timeout_secs == 0 {
            return Err(ConfigError::invalid(ConfigSection::Vision, "timeout_secs must be >= 1"));
        }
        if let Some(base_url) = &self.vision.base_url {
            if let Err(e) = url::Url::parse(base_url) {
                return Err(ConfigError::invalid(
                    ConfigSection::Vision,
                    format!("base_url '{}': {}", base_url, e),
                ));
            }
        }

        if self.server.enabled && self.server.bind.parse::<std::net::SocketAddr>().is_err() {
            return Err(ConfigError::invalid(
                ConfigSection::Server,
                format!("bind '{}' is not a socket address", self.server.bind),
            ));
        }

        Ok(())
    }
}

fn valid_offset(offset: Decimal) -> bool {
    offset > Decimal::ZERO && offset < Decimal::ONE
}
