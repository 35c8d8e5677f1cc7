pub mod app;
pub mod clock;
pub mod config;
pub mod error;
pub mod format;
pub mod history;
pub mod models;
pub mod source;
pub mod valuation;
