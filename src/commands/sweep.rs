//! `fixity sweep`

use anyhow::{Result, bail};

use super::open_engine;
use crate::config::FixityConfig;
use crate::sweep::SweepFilter;
use crate::ui;

pub async fn execute(config: &FixityConfig, filter: SweepFilter, page_size: usize) -> Result<()> {
    if page_size == 0 {
        bail!("--page-size must be at least 1");
    }
    let engine = open_engine(config)?;

    println!("Sweeping {filter} records...");
    let report = engine.sweeper(page_size).run(filter).await?;
    ui::print_report(&report);

    if report.failed > 0 {
        bail!("{} object(s) failed verification", report.failed);
    }
    Ok(())
}
