//! VNF record, deployment units, components and connection points.

use serde::{Deserialize, Serialize};

/// Declarative description of one running network function.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VirtualNetworkFunctionRecord {
    pub id: String,
    pub name: String,
    #[serde(default, rename = "vdu")]
    pub vdus: Vec<VirtualDeploymentUnit>,
    #[serde(default)]
    pub configurations: Configuration,
}

/// Free-form key/value configuration attached to a record.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Configuration {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub configuration_parameters: Vec<ConfigurationParameter>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConfigurationParameter {
    pub conf_key: String,
    #[serde(default)]
    pub value: String,
}

impl ConfigurationParameter {
    pub fn new(key: &str, value: &str) -> Self {
        Self {
            conf_key: key.to_string(),
            value: value.to_string(),
        }
    }
}

/// A group of components sharing one execution venue.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VirtualDeploymentUnit {
    pub id: String,
    /// Key into the venue pool offered at instantiation.
    #[serde(default)]
    pub parent_vdu: String,
    /// Requested image names or IDs, in preference order.
    #[serde(default, rename = "vm_image")]
    pub vm_images: Vec<String>,
    #[serde(default, rename = "vnfc")]
    pub vnfcs: Vec<VnfComponent>,
    #[serde(default, rename = "vnfc_instance")]
    pub vnfc_instances: Vec<VnfcInstance>,
}

impl VirtualDeploymentUnit {
    /// Whether this unit declares the component with the given ID.
    pub fn declares_component(&self, component_id: &str) -> bool {
        self.vnfcs.iter().any(|c| c.id == component_id)
    }
}

/// Template for one replica of a deployment unit.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VnfComponent {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub connection_points: Vec<VnfdConnectionPoint>,
}

/// A component's attachment to one virtual network.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VnfdConnectionPoint {
    /// Virtual-link name as declared in the descriptor.
    pub virtual_link_reference: String,
    /// Backend network identifier, empty until resolved.
    #[serde(default)]
    pub virtual_link_reference_id: String,
    #[serde(default, rename = "interfaceId")]
    pub interface_id: u32,
    #[serde(default)]
    pub fixed_ip: String,
    #[serde(default)]
    pub chosen_pool: String,
    #[serde(default, rename = "floatingIp")]
    pub floating_ip: String,
    #[serde(default, rename = "type")]
    pub cp_type: String,
}

/// A concrete running replica.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VnfcInstance {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub vim_id: String,
    /// Backend object (container or service) identifier.
    #[serde(default)]
    pub vc_id: String,
    #[serde(default)]
    pub hostname: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub connection_points: Vec<VnfdConnectionPoint>,
    #[serde(default, rename = "vnfComponent")]
    pub vnf_component: VnfComponent,
    #[serde(default, rename = "floatingIps")]
    pub floating_ips: Vec<Ip>,
    #[serde(default)]
    pub ips: Vec<Ip>,
}

impl VnfcInstance {
    /// Whether `other` designates the same replica (by ID, falling back to
    /// the backend identifier when the orchestrator has not assigned one).
    pub fn same_replica(&self, other: &VnfcInstance) -> bool {
        if !self.id.is_empty() && !other.id.is_empty() {
            return self.id == other.id;
        }
        !self.vc_id.is_empty() && self.vc_id == other.vc_id
    }
}

/// An address on a named network.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Ip {
    pub net_name: String,
    pub ip: String,
}

impl Ip {
    pub fn new(net_name: &str, ip: &str) -> Self {
        Self {
            net_name: net_name.to_string(),
            ip: ip.to_string(),
        }
    }
}
