//! Automation runner
//!
//! Loads connection settings from the environment, keeps a keyed registry of
//! automations, and pumps `state_changed` events from the hub through them.

pub mod builtin;
pub mod config;
pub mod error;
pub mod registry;
pub mod runner;

pub use config::RunnerConfig;
pub use error::{ConfigError, ConfigResult};
pub use registry::AutomationRegistry;
pub use runner::{RunSummary, Runner};
