pub mod config;
pub mod file_sd;

#[macro_use]
extern crate tracing;
