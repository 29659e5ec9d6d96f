//! CLI command implementations.
//!
//! - [`record`] - single-object deposit / verify / forget / status
//! - [`sweep`] - batch re-verification
//! - [`serve`] - the daemon
//! - [`check_config`] - configuration validation

pub mod check_config;
pub mod record;
pub mod serve;
pub mod sweep;

use anyhow::{Context, Result};

use crate::config::FixityConfig;
use crate::engine::Engine;

/// Build an engine, validating the configuration first.
pub(crate) fn open_engine(config: &FixityConfig) -> Result<Engine> {
    let validation = config.validate().context("Invalid configuration")?;
    for warning in &validation.warnings {
        tracing::warn!("{warning}");
    }
    Engine::from_config(config)
}
