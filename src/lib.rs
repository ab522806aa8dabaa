//! A local, append-only message broker: an embeddable storage engine that
//! accepts byte-string messages on named channels, assigns each a
//! monotonically increasing offset, and durably persists them to disk in
//! segmented files.
//!
//! The core — [`segment`], [`channel`], [`channel_map`], [`recovery`] — is
//! a small synchronous API (`find_channel`, `append`, `fetch`, `commit`);
//! the HTTP front-end in [`server`] is one possible caller of it.

pub mod channel;
pub mod channel_map;
pub mod config;
pub mod error;
pub mod header;
pub mod lock;
pub mod record;
pub mod recovery;
pub mod segment;
pub mod server;

pub use channel::Channel;
pub use channel_map::ChannelMap;
pub use config::Config;
pub use error::{Error, Result};
