//! Engine object model.
//!
//! Field names follow the Docker Engine API JSON (PascalCase). Only the
//! fields the lifecycle driver reads or writes are modelled; everything else
//! in a reply is ignored on decode.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};

/// Decode `null` as the type's default.
fn nullable<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Serializes as `{}`; used for port sets.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Empty {}

// ── Networks & images ──────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase", default)]
pub struct Network {
    #[serde(rename = "Id")]
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase", default)]
pub struct ImageSummary {
    #[serde(rename = "Id")]
    pub id: String,
    #[serde(deserialize_with = "nullable")]
    pub repo_tags: Vec<String>,
}

impl ImageSummary {
    /// Whether `reference` names this image by ID or by one of its tags.
    pub fn matches(&self, reference: &str) -> bool {
        self.id == reference || self.repo_tags.iter().any(|tag| tag == reference)
    }
}

// ── Containers ─────────────────────────────────────────────────────

/// Body of `POST /containers/create`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase", default)]
pub struct ContainerConfig {
    pub hostname: String,
    pub image: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub cmd: Vec<String>,
    pub env: Vec<String>,
    pub exposed_ports: BTreeMap<String, Empty>,
    pub host_config: HostConfig,
    pub networking_config: NetworkingConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase", default)]
pub struct HostConfig {
    pub cap_add: Vec<String>,
    pub dns: Vec<String>,
    pub mounts: Vec<Mount>,
    /// `"80/tcp"` → host bindings.
    pub port_bindings: BTreeMap<String, Vec<PortBinding>>,
    pub publish_all_ports: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase", default)]
pub struct PortBinding {
    pub host_ip: String,
    pub host_port: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase", default)]
pub struct Mount {
    #[serde(rename = "Type")]
    pub kind: String,
    pub source: String,
    pub target: String,
    pub read_only: bool,
}

impl Mount {
    pub fn bind(source: &str, target: &str, read_only: bool) -> Self {
        Self {
            kind: "bind".to_string(),
            source: source.to_string(),
            target: target.to_string(),
            read_only,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase", default)]
pub struct NetworkingConfig {
    /// Network name → endpoint settings. The engine accepts one entry at
    /// creation time.
    pub endpoints_config: BTreeMap<String, EndpointSettings>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase", default)]
pub struct EndpointSettings {
    #[serde(rename = "IPAMConfig", skip_serializing_if = "Option::is_none")]
    pub ipam_config: Option<IpamConfig>,
    #[serde(deserialize_with = "nullable")]
    pub aliases: Vec<String>,
    #[serde(rename = "NetworkID")]
    pub network_id: String,
    #[serde(rename = "IPAddress")]
    pub ip_address: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct IpamConfig {
    #[serde(rename = "IPv4Address")]
    pub ipv4_address: String,
}

/// Body of `POST /networks/{id}/connect`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct ConnectRequest {
    pub container: String,
    pub endpoint_config: EndpointSettings,
}

/// Reply of `POST /containers/create` and `POST /services/create`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Created {
    #[serde(alias = "Id", alias = "ID")]
    pub id: String,
    #[serde(rename = "Warnings", deserialize_with = "nullable")]
    pub warnings: Vec<String>,
}

/// Reply of `GET /containers/{id}/json`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase", default)]
pub struct ContainerDetails {
    #[serde(rename = "Id")]
    pub id: String,
    /// Engine-side name, with a leading `/`.
    pub name: String,
    pub network_settings: NetworkSettings,
}

impl ContainerDetails {
    /// Name without the engine's leading slash.
    pub fn display_name(&self) -> &str {
        self.name.strip_prefix('/').unwrap_or(&self.name)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase", default)]
pub struct NetworkSettings {
    /// Network name → attached endpoint.
    #[serde(deserialize_with = "nullable")]
    pub networks: BTreeMap<String, EndpointSettings>,
}

// ── Services ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase", default)]
pub struct ServiceSpec {
    pub name: String,
    pub task_template: TaskSpec,
    pub mode: ServiceMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint_spec: Option<EndpointSpec>,
}

impl ServiceSpec {
    pub fn replicas(&self) -> u64 {
        self.mode.replicated.as_ref().map_or(0, |r| r.replicas)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase", default)]
pub struct TaskSpec {
    pub container_spec: ServiceContainerSpec,
    #[serde(deserialize_with = "nullable")]
    pub networks: Vec<NetworkAttachment>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub placement: Option<Placement>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub restart_policy: Option<RestartPolicySpec>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase", default)]
pub struct ServiceContainerSpec {
    pub image: String,
    pub hostname: String,
    #[serde(deserialize_with = "nullable")]
    pub command: Vec<String>,
    #[serde(deserialize_with = "nullable")]
    pub env: Vec<String>,
    #[serde(deserialize_with = "nullable")]
    pub mounts: Vec<Mount>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase", default)]
pub struct NetworkAttachment {
    pub target: String,
    #[serde(deserialize_with = "nullable")]
    pub aliases: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase", default)]
pub struct Placement {
    #[serde(deserialize_with = "nullable")]
    pub constraints: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase", default)]
pub struct RestartPolicySpec {
    /// `none`, `on-failure` or `any`.
    pub condition: String,
    pub max_attempts: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase", default)]
pub struct ServiceMode {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub replicated: Option<ReplicatedService>,
}

impl ServiceMode {
    pub fn replicated(replicas: u64) -> Self {
        Self {
            replicated: Some(ReplicatedService { replicas }),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase", default)]
pub struct ReplicatedService {
    pub replicas: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase", default)]
pub struct EndpointSpec {
    #[serde(deserialize_with = "nullable")]
    pub ports: Vec<PortConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase", default)]
pub struct PortConfig {
    pub protocol: String,
    pub target_port: u32,
    /// Zero lets the engine pick.
    #[serde(skip_serializing_if = "is_zero")]
    pub published_port: u32,
}

fn is_zero(port: &u32) -> bool {
    *port == 0
}

/// Reply of `GET /services/{id}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase", default)]
pub struct Service {
    #[serde(rename = "ID")]
    pub id: String,
    pub version: ObjectVersion,
    pub spec: ServiceSpec,
    pub endpoint: ServiceEndpoint,
}

impl Service {
    /// Whether the engine has assigned at least one non-empty virtual address.
    pub fn has_address(&self) -> bool {
        self.endpoint.virtual_ips.iter().any(|vip| !vip.ip().is_empty())
    }
}

/// Optimistic-concurrency token of an engine object.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase", default)]
pub struct ObjectVersion {
    pub index: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase", default)]
pub struct ServiceEndpoint {
    #[serde(rename = "VirtualIPs", deserialize_with = "nullable")]
    pub virtual_ips: Vec<VirtualIp>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase", default)]
pub struct VirtualIp {
    #[serde(rename = "NetworkID")]
    pub network_id: String,
    /// CIDR notation, e.g. `10.0.0.5/24`.
    pub addr: String,
}

impl VirtualIp {
    /// Address without its prefix length.
    pub fn ip(&self) -> &str {
        self.addr.split('/').next().unwrap_or_default()
    }
}

/// Error body returned by the engine on non-2xx replies.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub(crate) struct ApiMessage {
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn network_list_decodes() {
        let json = r#"[{"Name":"mgmt_default","Id":"n1","Driver":"overlay"}]"#;
        let nets: Vec<Network> = serde_json::from_str(json).unwrap();
        assert_eq!(nets[0].id, "n1");
        assert_eq!(nets[0].name, "mgmt_default");
    }

    #[test]
    fn image_with_null_tags() {
        let json = r#"{"Id":"sha256:abc","RepoTags":null}"#;
        let img: ImageSummary = serde_json::from_str(json).unwrap();
        assert!(img.repo_tags.is_empty());
        assert!(img.matches("sha256:abc"));
        assert!(!img.matches("nginx"));
    }

    #[test]
    fn container_details_decode() {
        let json = r#"{
            "Id": "c1",
            "Name": "/web-1234",
            "NetworkSettings": {
                "Networks": {
                    "mgmt_default": {"NetworkID": "n1", "IPAddress": "10.0.0.2", "Aliases": null, "IPAMConfig": null}
                }
            }
        }"#;
        let details: ContainerDetails = serde_json::from_str(json).unwrap();
        assert_eq!(details.display_name(), "web-1234");
        assert_eq!(
            details.network_settings.networks["mgmt_default"].ip_address,
            "10.0.0.2"
        );
    }

    #[test]
    fn service_decode_and_address() {
        let json = r#"{
            "ID": "s1",
            "Version": {"Index": 11},
            "Spec": {"Name": "web", "Mode": {"Replicated": {"Replicas": 2}}},
            "Endpoint": {"VirtualIPs": [{"NetworkID": "n1", "Addr": "10.0.0.5/24"}]}
        }"#;
        let svc: Service = serde_json::from_str(json).unwrap();
        assert_eq!(svc.version.index, 11);
        assert_eq!(svc.spec.replicas(), 2);
        assert!(svc.has_address());
        assert_eq!(svc.endpoint.virtual_ips[0].ip(), "10.0.0.5");
    }

    #[test]
    fn service_without_endpoint_has_no_address() {
        let svc: Service = serde_json::from_str(r#"{"ID":"s1","Endpoint":{}}"#).unwrap();
        assert!(!svc.has_address());

        let blank = Service {
            endpoint: ServiceEndpoint {
                virtual_ips: vec![VirtualIp {
                    network_id: "n1".into(),
                    addr: String::new(),
                }],
            },
            ..Default::default()
        };
        assert!(!blank.has_address());
    }

    #[test]
    fn container_config_wire_shape() {
        let mut config = ContainerConfig {
            image: "nginx".into(),
            ..Default::default()
        };
        config.exposed_ports.insert("80/tcp".into(), Empty {});
        config.networking_config.endpoints_config.insert(
            "mgmt_default".into(),
            EndpointSettings {
                ipam_config: Some(IpamConfig {
                    ipv4_address: "10.0.0.9".into(),
                }),
                ..Default::default()
            },
        );

        let value = serde_json::to_value(&config).unwrap();
        assert_eq!(value["ExposedPorts"]["80/tcp"], serde_json::json!({}));
        assert!(value.get("Cmd").is_none());
        assert_eq!(
            value["NetworkingConfig"]["EndpointsConfig"]["mgmt_default"]["IPAMConfig"]["IPv4Address"],
            "10.0.0.9"
        );
    }

    #[test]
    fn created_accepts_both_id_spellings() {
        let c: Created = serde_json::from_str(r#"{"Id":"c1","Warnings":null}"#).unwrap();
        assert_eq!(c.id, "c1");
        let s: Created = serde_json::from_str(r#"{"ID":"s1"}"#).unwrap();
        assert_eq!(s.id, "s1");
    }
}
