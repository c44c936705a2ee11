//! Execution-venue credentials.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Endpoint and image catalogue of one container engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VimInstance {
    pub id: String,
    #[serde(default)]
    pub name: String,
    /// Engine endpoint: `unix:///var/run/docker.sock`, `tcp://host:2376`, ...
    pub auth_url: String,
    #[serde(default)]
    pub tenant: String,
    #[serde(default)]
    pub images: Vec<VimImage>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct VimImage {
    pub id: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl VimImage {
    /// Whether this image is designated by `reference` (ID or tag).
    pub fn matches(&self, reference: &str) -> bool {
        self.id == reference || self.tags.iter().any(|t| t == reference)
    }
}

/// Candidate venues keyed by parent deployment-unit ID.
pub type VenuePool = HashMap<String, Vec<VimInstance>>;
