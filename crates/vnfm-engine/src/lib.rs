//! vnfm-engine: the container engine capability.
//!
//! The lifecycle driver never talks HTTP itself. It asks an
//! [`EngineConnector`] for an [`Engine`] handle bound to one venue
//! credential and calls the operations below on it.
//!
//! # Architecture
//!
//! ```text
//! EngineConnector::connect(&VimInstance)
//!   └── Arc<dyn Engine>
//!         ├── DockerEngine   (REST over unix socket, TCP or TLS)
//!         └── MockEngine     (in-process double, `mock` feature)
//! ```
//!
//! Every engine call opens one HTTP/1.1 connection, sends one request and
//! decodes the JSON reply into the types in [`model`]. A 404 becomes
//! [`EngineError::NotFound`], a stale service version becomes
//! [`EngineError::VersionConflict`].

pub mod connector;
pub mod docker;
pub mod engine;
pub mod error;
pub mod logs;
pub mod model;
pub mod tls;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use connector::{DockerConnector, EngineConnector};
pub use docker::{DockerEngine, Endpoint};
pub use engine::{Engine, EngineFuture, LogStream};
pub use error::{EngineError, EngineResult};
pub use model::*;
