//! Adapters between the engine and the file system: template input, report output.

pub mod json;
pub mod report;
