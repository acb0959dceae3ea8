//! Domain types of the exerciser: flows and their run results, status snapshots,
//! downstream service conventions, and the ports the application layer talks through.

pub mod flow;
pub mod ports;
pub mod service;
pub mod status;
