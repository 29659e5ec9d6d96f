//! Scheduling of recurring verification.
//!
//! The [`JitteredScheduler`] picks the next due date, a [`ScheduleStore`]
//! holds one expiring [`ScheduleEntry`] per object, and the
//! [`ExpiryWatcher`] converts expiry into "verification due" signals.
//! There is no other wake-up mechanism.

mod clock;
mod entry;
mod memory;
mod redb;
mod scheduler;
mod store;
mod watcher;

pub use clock::{Clock, FixedClock, SystemClock};
pub use entry::ScheduleEntry;
pub use memory::MemoryScheduleStore;
pub use redb::RedbScheduleStore;
pub use scheduler::{
    DEFAULT_BASE_DAYS, DEFAULT_BASE_MONTHS, DEFAULT_JITTER_DAYS, Jitter, JitteredScheduler,
};
pub use store::ScheduleStore;
pub use watcher::ExpiryWatcher;
