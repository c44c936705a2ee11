//! Driver error types.

use thiserror::Error;
use vnfm_engine::EngineError;
use vnfm_state::StateError;

/// Result type alias for lifecycle operations.
pub type DriverResult<T> = Result<T, DriverError>;

/// Errors that can occur while driving a record's lifecycle.
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("record {0} has no deployment units")]
    NoDeploymentUnits(String),

    #[error("no image in {requested:?} is available for deployment unit {unit}")]
    ImageNotFound { unit: String, requested: Vec<String> },

    #[error("invalid scale target: {0}")]
    InvalidScaleTarget(String),

    #[error("no venue offered for deployment unit {0}")]
    NoVenue(String),

    #[error("record not found: {0}")]
    RecordNotFound(String),

    #[error("deployment unit {0} is not bound in the instance record")]
    UnknownDeploymentUnit(String),

    #[error("invalid port spec: {0}")]
    InvalidPort(String),

    /// The unit has no backend object to operate on yet.
    #[error("deployment unit {0} has not been provisioned")]
    NotProvisioned(String),

    #[error("network not found: {0}")]
    NetworkNotFound(String),

    #[error("cannot reach venue {venue}: {source}")]
    Connect {
        venue: String,
        #[source]
        source: EngineError,
    },

    #[error("service {service} has no address after {attempts} polls")]
    Timeout { service: String, attempts: u32 },

    #[error("update conflict: {0}")]
    Conflict(String),

    #[error("state store error: {0}")]
    State(#[from] StateError),

    #[error("engine error: {0}")]
    Engine(#[from] EngineError),
}

/// Coarse classification of a [`DriverError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The request itself is unusable; nothing was changed.
    Input,
    /// The record does not exist.
    Missing,
    /// The request collides with existing state.
    Conflict,
    /// A network or venue could not be resolved.
    Resolution,
    Timeout,
    Backend,
    Store,
}

impl DriverError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DriverError::NoDeploymentUnits(_)
            | DriverError::ImageNotFound { .. }
            | DriverError::InvalidScaleTarget(_)
            | DriverError::NoVenue(_)
            | DriverError::UnknownDeploymentUnit(_)
            | DriverError::InvalidPort(_) => ErrorKind::Input,
            DriverError::RecordNotFound(_) | DriverError::State(StateError::NotFound(_)) => {
                ErrorKind::Missing
            }
            DriverError::NotProvisioned(_)
            | DriverError::Conflict(_)
            | DriverError::State(StateError::AlreadyExists(_) | StateError::Retired(_)) => {
                ErrorKind::Conflict
            }
            DriverError::NetworkNotFound(_) | DriverError::Connect { .. } => ErrorKind::Resolution,
            DriverError::Timeout { .. } => ErrorKind::Timeout,
            DriverError::Engine(_) => ErrorKind::Backend,
            DriverError::State(_) => ErrorKind::Store,
        }
    }
}
