//! vnfm-state: durable per-record instance configuration.
//!
//! Backed by [redb](https://docs.rs/redb). One record per VNF-record ID;
//! the value is the JSON-serialized [`InstanceConfig`]. Deleted IDs leave a
//! tombstone so an identifier is never handed out twice.
//!
//! The `RecordStore` is `Clone` + `Send` + `Sync` (backed by `Arc<Database>`)
//! and is opened once per process, then shared by every lifecycle call.

pub mod error;
pub mod store;
pub mod tables;
pub mod types;

pub use error::{StateError, StateResult};
pub use store::RecordStore;
pub use types::*;
