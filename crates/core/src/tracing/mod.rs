//! Tracing setup shared by applications embedding the portal client

pub mod config;
pub mod init;

pub use config::InstrumentationConfig;
pub use init::{init_default, init_tracing};
