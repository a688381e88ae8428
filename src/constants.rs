//! Application-wide constants and magic numbers
//!
//! Key bindings and input counts are those of the desktop trading client;
//! change them together with the client's hotkey settings.

/// Environment variable names
pub mod env {
    /// Overrides `vision.api_key` from the config file
    pub const VISION_API_KEY: &str = "DASHSCOPE_API_KEY";

    /// Path of the YAML config
    pub const CONFIG_PATH: &str = "EXECUTOR_CONFIG";
}

/// Defaults applied when a config section omits a field
pub mod defaults {
    pub const TITLE_PATTERNS: &[&str] = &["网上股票交易系统", "下单", "交易", "委托"];

    pub const LAUNCH_TIMEOUT_SECS: u64 = 30;
    pub const LAUNCH_POLL_INTERVAL_MS: u64 = 500;

    pub const FOCUS_RETRIES: u32 = 3;
    pub const FOCUS_RETRY_DELAY_MS: u64 = 150;

    pub const RETENTION_DAYS: u32 = 7;

    /// Daily at 03:00 local time (sec min hour dom mon dow)
    pub const CLEANUP_CRON: &str = "0 0 3 * * *";

    pub const VISION_MODEL: &str = "qwen3-vl-plus";
    pub const VISION_TIMEOUT_SECS: u64 = 30;

    pub const LOG_ROOT: &str = "./data";
    pub const SERVER_BIND: &str = "127.0.0.1:3000";

    /// Shares per board lot for A-share stocks
    pub const LOT_SIZE: u64 = 100;

    pub const QUEUE_CAPACITY: usize = 64;
    pub const EVENT_BUS_CAPACITY: usize = 256;
}

/// Client hotkeys and input counts
pub mod keys {
    /// Backspaces sent to clear the code / order-id field before typing
    pub const FIELD_CLEAR_BACKSPACES: usize = 6;

    /// Enter presses on the confirmation dialog
    pub const CONFIRM_ENTERS: usize = 2;
}

/// Tick sizes
pub mod ticks {
    /// Funds and ETFs (codes starting with 1 or 5) quote in 0.001
    pub const FUND_PRICE_DECIMALS: u32 = 3;

    pub const STOCK_PRICE_DECIMALS: u32 = 2;
}

/// Persistence layout under `log_root`
pub mod layout {
    pub const SCREENSHOTS_DIR: &str = "screenshots";
    pub const ASSETS_DIR: &str = "assets";
    pub const LOGS_DIR: &str = "logs";

    /// File stem of persisted artifacts (microseconds keep bursts apart)
    pub const ARTIFACT_STAMP: &str = "%Y%m%d_%H%M%S_%6f";

    pub const LOG_FILE_DATE: &str = "%Y-%m-%d";
}
