//! Dependency records delivered by `Modify`.
//!
//! A dependency carries the parameters published by the records this one
//! depends on, keyed by the foreign record's name.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VnfRecordDependency {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub target: String,
    /// Record-level parameters per foreign name.
    #[serde(default)]
    pub parameters: BTreeMap<String, DependencyParameters>,
    /// Per-component parameters per foreign name.
    #[serde(default)]
    pub vnfc_parameters: BTreeMap<String, VnfcDependencyParameters>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DependencyParameters {
    #[serde(default)]
    pub parameters: BTreeMap<String, String>,
}

impl DependencyParameters {
    pub fn from_pairs(pairs: &[(&str, &str)]) -> Self {
        Self {
            parameters: pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }
}

/// Component parameters keyed by component instance ID.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct VnfcDependencyParameters {
    #[serde(default)]
    pub parameters: BTreeMap<String, DependencyParameters>,
}

impl VnfRecordDependency {
    /// Dependency carrying one record-level parameter group for `foreign`.
    pub fn single(foreign: &str, pairs: &[(&str, &str)]) -> Self {
        let mut parameters = BTreeMap::new();
        parameters.insert(foreign.to_string(), DependencyParameters::from_pairs(pairs));
        Self {
            parameters,
            ..Default::default()
        }
    }
}
