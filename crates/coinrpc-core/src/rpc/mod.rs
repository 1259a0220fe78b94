//! JSON-RPC client runtime for Bitcoin-family nodes.
//!
//! [`Client`] assigns request IDs, keeps every outstanding call in a
//! registry keyed by ID and resolves each call's [`ResponseFuture`] exactly
//! once: with the node's reply, with a transport or context error, or with
//! `ClientShutdown` when the client stops. Two transports are supported:
//! independent HTTP POSTs serviced by a worker pool, and an externally
//! managed persistent connection (see [`stream`]).

mod client;
pub mod command;
pub mod context;
mod decoder;
pub mod future;
mod http_adapter;
pub mod methods;
#[cfg(test)]
pub mod mock;
mod protocol;
mod registry;
pub mod stream;
pub mod types;

pub use client::Client;
pub use command::{Command, RawCommand};
pub use context::CallContext;
pub use decoder::DropReason;
pub use future::{Reply, ResponseFuture};
pub use methods::TypedFuture;
pub use stream::{NotificationHandler, StreamSender};
pub use types::ChainInfo;
