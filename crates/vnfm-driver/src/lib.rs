//! vnfm-driver: drives VNF records onto a container engine.
//!
//! The [`LifecycleController`] implements the [`VnfmHandler`] contract.
//! Each record is realized by one of two strategies, picked at
//! instantiation and stored in the record:
//!
//! - containers: one container per component instance, secondary
//!   networks attached after start, output relayed by a log follower
//! - services: one replicated service per deployment unit, created with
//!   zero replicas and scaled at start
//!
//! # Architecture
//!
//! ```text
//! LifecycleController
//!   ├── RecordStore (load / save InstanceConfig)
//!   ├── RecordLocks (one async mutex per record)
//!   ├── EngineConnector (venue credential → Engine)
//!   └── BackendDriver
//!       ├── ContainerBackend ── ContainerDriver ── LogFollowers
//!       └── ServiceBackend ──── ServiceDriver
//! ```
//!
//! Parameter extraction ([`extract`]), environment derivation ([`env`]) and
//! network resolution ([`network`]) are shared by both strategies.

pub mod backend;
pub mod container;
pub mod env;
pub mod error;
pub mod extract;
pub mod followers;
pub mod handler;
pub mod lifecycle;
pub mod locks;
pub mod network;
pub mod service;
pub mod settings;

pub use backend::{BackendDriver, ContainerBackend, ServiceBackend, UnitContext};
pub use error::{DriverError, DriverResult, ErrorKind};
pub use handler::{HandlerFuture, VnfmHandler};
pub use lifecycle::LifecycleController;
pub use settings::DriverSettings;
