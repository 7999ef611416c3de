//! Service layer for the relay.
//!
//! This module contains the collaborators a sync cycle talks to:
//! - Imageboard access (`Requester`, `ApiRequester`)
//! - Delivery (`Sink`, `LogSink`, `WebhookSink`, `ConvertingSink`)
//! - Media conversion (`Transcoder`, `FfmpegTranscoder`)

mod delivery;
mod requester;
mod transcode;

pub use delivery::{ConvertingSink, LogSink, Sink, WebhookSink};
pub use requester::{ApiRequester, Requester};
pub use transcode::{FfmpegTranscoder, Transcoder};
