//! `fixity serve`

use anyhow::Result;

use super::open_engine;
use crate::config::FixityConfig;
use crate::daemon::Daemon;

pub async fn execute(config: FixityConfig) -> Result<()> {
    let engine = open_engine(&config)?;
    Daemon::new(config, engine).serve().await
}
