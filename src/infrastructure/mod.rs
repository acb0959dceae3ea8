//! Adapters behind the domain ports: the HTTP gateway to the live services, a scripted
//! in-process gateway, and the in-memory run store.

pub mod http;
pub mod in_memory;
pub mod scripted;
