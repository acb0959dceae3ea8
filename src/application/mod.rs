//! Application layer orchestrating smoke sessions.
//!
//! `SmokeEngine` is the entry point. It composes the registry, dispatcher, correlator,
//! status poller, mock controller and load scheduler, all of which run their request
//! batches as joined `tokio` task sets.

pub mod batch;
pub mod correlator;
pub mod dispatcher;
pub mod engine;
pub mod mock;
pub mod poller;
pub mod registry;
pub mod report;
pub mod scheduler;
