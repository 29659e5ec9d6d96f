//! Single-object commands.
//!
//! These run one step of the state machine directly, without the daemon's
//! re-delivery. Ledger changes made by the step are passed through the
//! failure detector so a failed check notifies just as it would under the
//! daemon, and then turns into a non-zero exit.

use anyhow::{Result, bail};
use tokio::sync::broadcast;

use super::open_engine;
use crate::config::FixityConfig;
use crate::engine::Engine;
use crate::ledger::RecordChange;
use crate::object::ObjectRef;
use crate::ui;

/// `fixity deposit <container> <key> [--tag]`
pub async fn deposit(
    config: &FixityConfig,
    container: &str,
    key: &str,
    tag: Option<&str>,
) -> Result<()> {
    let object = ObjectRef::new(container, key)?;
    let engine = open_engine(config)?;
    let mut changes = engine.verifier().ledger().subscribe();

    let record = engine.verifier().deposit(&object, tag).await?;
    report_failures(&engine, &mut changes).await;
    ui::print_record(&record);

    if !record.is_ok() {
        bail!("Deposit of {object} failed: {}", record.message());
    }
    Ok(())
}

/// `fixity verify <container> <key>`
pub async fn verify(config: &FixityConfig, container: &str, key: &str) -> Result<()> {
    let object = ObjectRef::new(container, key)?;
    let engine = open_engine(config)?;
    let mut changes = engine.verifier().ledger().subscribe();

    let verification = engine.verifier().verify(&object).await?;
    report_failures(&engine, &mut changes).await;
    ui::print_record(&verification.record);

    if !verification.passed {
        bail!("Checksum verification failed for {object}");
    }
    Ok(())
}

/// `fixity forget <container> <key>`
pub async fn forget(config: &FixityConfig, container: &str, key: &str) -> Result<()> {
    let object = ObjectRef::new(container, key)?;
    let engine = open_engine(config)?;
    engine.verifier().forget(&object).await?;
    println!("No longer tracking {object}");
    Ok(())
}

/// `fixity status <container> <key>`
pub async fn status(config: &FixityConfig, container: &str, key: &str) -> Result<()> {
    let object = ObjectRef::new(container, key)?;
    let engine = open_engine(config)?;
    let record = engine.verifier().ledger().get(&object).await?;
    ui::print_record(&record);

    match engine.verifier().schedule().get(&object).await? {
        Some(entry) => println!("Scheduled:     {}", entry.expiry().to_rfc3339()),
        None => println!("Scheduled:     (not scheduled)"),
    }
    Ok(())
}

async fn report_failures(engine: &Engine, changes: &mut broadcast::Receiver<RecordChange>) {
    let detector = engine.failure_detector();
    while let Ok(change) = changes.try_recv() {
        detector.handle(&change).await;
    }
}
