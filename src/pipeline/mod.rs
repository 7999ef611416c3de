//! Pipeline entry points for the relay.
//!
//! - `Crawler::run_cycle`: one pass over every subscribed board
//! - `Poller::run_until`: trigger cycles on a fixed interval

pub mod cycle;
pub mod poller;

pub use cycle::{Crawler, CycleReport, CycleSettings};
pub use poller::Poller;
