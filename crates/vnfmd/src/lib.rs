//! vnfmd: the Docker VNF manager daemon.
//!
//! Wires a [`vnfm_driver::LifecycleController`] to a record store and a
//! Docker connector and serves the lifecycle contract over HTTP.

pub mod api;
pub mod config;

pub use api::{AppState, build_router};
pub use config::{DaemonConfig, Overrides, VnfmConfig};
