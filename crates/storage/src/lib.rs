#![forbid(unsafe_code)]

//! SQLite persistence for stories: permissions, timelines, tag counters and collaboration.

mod config;
mod store;

pub use config::StoreConfig;
pub use store::*;
