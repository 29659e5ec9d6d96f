//! Fixity verification for long-term preservation storage.
//!
//! `fixity` computes content digests of stored objects, keeps per-object
//! verification state in a ledger, re-checks every object on a jittered
//! schedule and reports objects whose bytes no longer match.
//!
//! # Layout
//!
//! - [`checksum`] - streaming digest calculator
//! - [`ledger`] - durable checksum records and their change feed
//! - [`schedule`] - jittered scheduling, delayed-delivery stores, expiry watcher
//! - [`verifier`] - the deposit / verify / forget state machine
//! - [`failure`] - failure detection and notification delivery
//! - [`sweep`] - paged batch re-verification
//! - [`daemon`] - trigger dispatch and the HTTP trigger API
//!
//! [`engine::Engine`] wires all of it together from a [`config::FixityConfig`].

pub mod checksum;
pub mod commands;
pub mod config;
pub mod daemon;
pub mod engine;
pub mod error;
pub mod failure;
pub mod kv;
pub mod ledger;
pub mod logging;
pub mod metrics;
pub mod object;
pub mod reliability;
pub mod schedule;
pub mod store;
pub mod sweep;
pub mod ui;
pub mod verifier;

pub use error::{Error, Result};
pub use object::ObjectRef;
