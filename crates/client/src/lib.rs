//! Client-side outbox, cursor puller, and WS listener for an ELN client.
//!
//! This crate carries no UI and no local persistence opinion: it is the
//! replay/sync engine a native or web client embeds, talking to the server
//! surface described by `eln-api`. Storage for the outbox is pluggable via
//! the [`outbox::Outbox`] trait; [`outbox::InMemoryOutbox`] is the only
//! implementation this crate ships.

pub mod error;
pub mod http;
pub mod outbox;
pub mod puller;
pub mod types;
pub mod ws;
pub mod wire;

pub use error::ClientError;
pub use http::SyncClient;
pub use outbox::{InMemoryOutbox, Outbox, OutboxError};
pub use puller::Puller;
pub use types::{OutboxOperation, OutboxStatus, QueuedOperation};
