pub mod alert;
pub mod analyzer;
pub mod api;
pub mod chain;
pub mod config;
pub mod monitor;
pub mod signal;
