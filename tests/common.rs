//! Shared fixtures for the integration suite.

#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use std::path::Path;
use std::sync::Arc;

use fixity::config::{FixityConfig, LogFormat};
use fixity::engine::Engine;
use fixity::failure::{ChannelNotifier, Notification};
use fixity::schedule::FixedClock;
use tokio::sync::mpsc;

/// md5("hello world")
pub const HELLO_MD5: &str = "5eb63bbbe01eeed093cb22bb8f5acdc3";

pub fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
}

/// Filesystem object store and redb state below `dir`.
pub fn config_in(dir: &Path) -> FixityConfig {
    let mut config = FixityConfig::default();
    config.storage.root = dir.join("objects");
    config.ledger.path = dir.join("state").join("ledger.redb");
    config.schedule.path = dir.join("state").join("schedule.redb");
    config.notifications.deployment = Some("test".to_string());
    config.logging.format = LogFormat::Pretty;
    config
}

pub struct TestEngine {
    pub engine: Engine,
    pub clock: Arc<FixedClock>,
    pub notifications: mpsc::Receiver<Notification>,
}

/// Opens an engine from `config` with a fixed clock and a channel notifier.
pub fn open(config: &FixityConfig) -> TestEngine {
    std::fs::create_dir_all(&config.storage.root).unwrap();
    let clock = Arc::new(FixedClock::new(start_time()));
    let (notifier, notifications) = ChannelNotifier::channel(16);
    let engine = Engine::from_config(config)
        .unwrap()
        .with_clock(clock.clone())
        .with_notifier(Arc::new(notifier));
    TestEngine {
        engine,
        clock,
        notifications,
    }
}
