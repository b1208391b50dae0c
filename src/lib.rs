pub mod commands;
pub mod config;
pub mod core;
pub mod error;
pub mod id;
pub mod status;
pub mod store;
pub mod types;

#[cfg(test)]
pub mod testutil;
