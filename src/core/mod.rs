//! Core dispatch engine module

pub mod batch;
pub mod catalog;
pub mod client;
pub mod config;
pub mod debug_log;
pub mod errors;
pub(crate) mod lock_utils;
pub mod fallback;
pub mod models;
pub mod notify;
pub mod prompt;
pub mod retry;
pub mod store;
pub mod transport;
