//! tkt - Ticket workflow CLI for JIRA-compatible trackers
//!
//! The library surface exists so integration tests and future consumers
//! can drive field discovery and payload construction directly.

pub mod api;
pub mod config;
pub mod fields;
pub mod issue;
pub mod logging;
pub mod session;
pub mod store;
