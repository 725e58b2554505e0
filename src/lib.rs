// src/lib.rs
// Public library surface for the binary, the dry-run tool and integration tests.

pub mod api;
pub mod config;
pub mod feed;
pub mod filter;
pub mod metrics;
pub mod notify;
pub mod poller;
pub mod sanitize;

pub use crate::api::router;
pub use crate::poller::{CycleReport, PollSettings, Poller};
