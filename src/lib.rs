//! IRC server with a poll-driven, single-threaded event engine.
//!
//! All client and channel state is owned by [`server::Server`] and mutated
//! from one readiness loop; there are no background tasks and no locks.

pub mod channel;
pub mod client;
pub mod config;
pub mod framer;
pub mod handlers;
pub mod message;
pub mod replies;
pub mod server;
