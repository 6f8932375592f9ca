//! Storage for fragkit
//!
//! - `json`: JSON files for configuration and exported state snapshots

mod json;

pub use json::JsonStore;
