pub mod app;
pub mod cache;
pub mod cli;
pub mod config;
pub mod errors;
pub mod gmail;
pub mod list;
pub mod oauth;
pub mod sanitize;
pub mod sync;
pub mod tui;
pub mod types;
