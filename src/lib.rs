//! Desk executor - drives a desktop stock trading client
//!
//! Commands become window focus plus keystrokes against the client; results are
//! read back from screenshots, optionally interpreted by a vision model, and
//! every step is persisted under the log root.

pub mod api;
pub mod bus;
pub mod capture;
pub mod config;
pub mod constants;
pub mod error;
pub mod events;
pub mod persistence;
pub mod pricing;
pub mod services;
pub mod symbols;
pub mod types;
pub mod vision;
pub mod window;

// Re-export commonly used types
pub use bus::EventBus;
pub use config::AppConfig;
pub use error::{CommandError, ExecutorError};
pub use events::ExecutorEvent;
pub use services::{ExecutorDeps, ExecutorFacade};
pub use types::{OrderRequest, OrderResult, PriceMode, Side};
