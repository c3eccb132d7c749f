//! IceTea module host
//!
//! Glue between the resolver in `icetea_module`, the native registry in
//! `icetea_ffi` and a VM, plus the `icetea` diagnostic command.

pub mod cli;
pub mod host;
pub mod utils;

pub use host::{HostError, ModuleHost};
