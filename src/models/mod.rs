// src/models/mod.rs

//! Domain models for the relay.
//!
//! This module contains all data structures used throughout the application,
//! organized by their primary purpose.

mod board;
mod config;
mod subscription;

// Re-export all public types
pub use board::{File, Post, Thread, ThreadData, ThreadList, ThreadPosts};
pub use config::{
    ApiConfig, Config, CrawlerConfig, DeliveryConfig, LoggingConfig, PollerConfig,
    StagingConfig, StorageConfig,
};
pub use subscription::{Subscription, User};
