//! Shared primitives: configuration, errors, logging and the event store.

pub mod config;
pub mod db;
pub mod error;
pub mod lock;
pub mod logging;
pub mod migration;
pub mod model;
pub mod output;
pub mod schemas;
pub mod store;
pub mod time;
