pub mod cli;
pub mod config;
pub mod context;
pub mod error;
pub mod jobs;
pub mod logging;
