// src/lib.rs

//! threadwatch: imageboard subscription relay
//!
//! Polls imageboard boards, matches thread text against users' tag
//! expressions and forwards new media files to the subscribed chats.

pub mod config;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod query;
pub mod services;
pub mod staging;
pub mod storage;
pub mod utils;
