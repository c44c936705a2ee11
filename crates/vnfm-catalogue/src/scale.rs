//! Scale requests.

use serde::{Deserialize, Serialize};

use crate::record::{VnfComponent, VnfcInstance};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScaleDirection {
    Out,
    In,
}

/// What a scale call operates on.
///
/// Scale-out adds a replica built from a component template that the
/// orchestrator has not allocated yet; scale-in removes a replica that
/// already runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScaleTarget {
    NewComponent(VnfComponent),
    ExistingInstance(VnfcInstance),
}

impl ScaleTarget {
    pub fn label(&self) -> &'static str {
        match self {
            ScaleTarget::NewComponent(_) => "new_component",
            ScaleTarget::ExistingInstance(_) => "existing_instance",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_is_tagged_on_the_wire() {
        let target = ScaleTarget::NewComponent(VnfComponent {
            id: "c1".into(),
            connection_points: vec![],
        });
        let json = serde_json::to_value(&target).unwrap();
        assert_eq!(json["kind"], "new_component");
        assert_eq!(json["id"], "c1");

        let back: ScaleTarget = serde_json::from_value(json).unwrap();
        assert_eq!(back, target);
    }
}
