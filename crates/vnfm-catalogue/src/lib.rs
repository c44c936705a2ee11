//! vnfm-catalogue: the orchestrator's VNF record model.
//!
//! These are the shapes the orchestration framework hands to the lifecycle
//! handler: a VNF record with its deployment units, components, connection
//! points and configuration parameters, the dependency records delivered by
//! `Modify`, and the execution-venue credentials offered at `Instantiate`.
//!
//! All collection fields default to empty when absent from the wire so that
//! callers never have to special-case missing optional data.

pub mod dependency;
pub mod record;
pub mod scale;
pub mod venue;

pub use dependency::*;
pub use record::*;
pub use scale::*;
pub use venue::*;
