//! Persisted instance configuration.
//!
//! An [`InstanceConfig`] is the single source of truth for which backend
//! objects belong to a VNF record. It is created at instantiation, rewritten
//! by start/modify/scale and deleted by terminate.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use vnfm_catalogue::VimInstance;

/// Unique identifier of a VNF record.
pub type RecordId = String;

/// Unique identifier of a deployment unit within a record.
pub type UnitId = String;

/// Environment values received from one foreign record, one map per update.
pub type ForeignGroups = Vec<BTreeMap<String, String>>;

// ── Instance config ────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct InstanceConfig {
    pub vnfr_id: RecordId,
    pub name: String,
    pub base_hostname: String,
    /// Backend strategy chosen at instantiation.
    pub backend: BackendKind,
    pub settings: DeploymentSettings,
    /// Backend network ID → fixed-IP configuration.
    pub networks: BTreeMap<String, NetConf>,
    /// Network name → alias override list.
    pub aliases: BTreeMap<String, Vec<String>>,
    /// Foreign record name → dependency updates, oldest first.
    pub foreign: BTreeMap<String, ForeignGroups>,
    pub units: BTreeMap<UnitId, UnitBinding>,
}

/// Which backend realizes the record's deployment units.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    #[default]
    Container,
    Service,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Container => "container",
            BackendKind::Service => "service",
        }
    }
}

/// Fixed-IP configuration for one network.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct NetConf {
    pub ipv4_address: String,
}

// ── Settings ───────────────────────────────────────────────────────

/// Typed settings extracted from the record's configuration parameters.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DeploymentSettings {
    pub command: Vec<String>,
    pub published_ports: Vec<PortSpec>,
    pub exposed_ports: Vec<String>,
    pub restart_policy: RestartPolicy,
    pub constraints: Vec<String>,
    /// `source:target[:ro]` specs.
    pub mounts: Vec<String>,
    pub dns: Vec<String>,
    pub hostname: Option<String>,
    /// Free-form environment entries, keyed verbatim.
    pub own: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RestartPolicy {
    OnFailure,
    Any,
    #[default]
    None,
}

impl RestartPolicy {
    /// Anything other than `on-failure` or `any` means no restarts.
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "on-failure" => RestartPolicy::OnFailure,
            "any" => RestartPolicy::Any,
            _ => RestartPolicy::None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RestartPolicy::OnFailure => "on-failure",
            RestartPolicy::Any => "any",
            RestartPolicy::None => "none",
        }
    }
}

/// A publish spec as split from its configuration value.
///
/// `8080:80` → published 8080, target 80. `80` → target 80 on an
/// engine-chosen host port. A trailing alphabetic part (`8080:80/udp`)
/// is the protocol.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct PortSpec(pub Vec<String>);

impl PortSpec {
    fn split(&self) -> (Vec<&str>, Option<&str>) {
        let mut ports: Vec<&str> = self.0.iter().map(String::as_str).collect();
        let has_protocol = ports
            .last()
            .is_some_and(|last| !last.is_empty() && last.chars().all(|c| c.is_ascii_alphabetic()));
        let protocol = if has_protocol { ports.pop() } else { None };
        (ports, protocol)
    }

    /// Host-side port, when one was given.
    pub fn published(&self) -> Option<&str> {
        let (ports, _) = self.split();
        if ports.len() >= 2 { Some(ports[0]) } else { None }
    }

    /// Container-side port.
    pub fn target(&self) -> Option<&str> {
        let (ports, _) = self.split();
        match ports.len() {
            0 => None,
            1 => Some(ports[0]),
            _ => Some(ports[1]),
        }
    }

    pub fn protocol(&self) -> &str {
        self.split().1.unwrap_or("tcp")
    }
}

/// A parsed `source:target[:ro]` bind mount.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountSpec {
    pub source: String,
    pub target: String,
    pub read_only: bool,
}

impl MountSpec {
    /// Returns `None` for a spec without a target.
    pub fn parse(spec: &str) -> Option<Self> {
        let mut parts = spec.split(':');
        let source = parts.next()?.trim();
        let target = parts.next()?.trim();
        if source.is_empty() || target.is_empty() {
            return None;
        }
        let read_only = parts.next().is_some_and(|mode| mode.trim() == "ro");
        Some(Self {
            source: source.to_string(),
            target: target.to_string(),
            read_only,
        })
    }
}

// ── Runtime bindings ───────────────────────────────────────────────

/// Everything bound to one deployment unit for the record's lifetime.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct UnitBinding {
    pub venue: VimInstance,
    pub image: String,
    /// Container or service identifiers created for this unit.
    pub backend_ids: Vec<String>,
    /// Present when the unit is realized as a replicated service.
    pub service: Option<ServiceState>,
}

impl UnitBinding {
    pub fn new(venue: VimInstance, image: &str) -> Self {
        Self {
            venue,
            image: image.to_string(),
            backend_ids: Vec::new(),
            service: None,
        }
    }

    /// The service backing this unit, if it has been created.
    pub fn service_id(&self) -> Option<&str> {
        self.service.as_ref()?;
        self.backend_ids.first().map(String::as_str)
    }

    /// Forget a backend identifier. Returns true if it was recorded.
    pub fn forget(&mut self, backend_id: &str) -> bool {
        let before = self.backend_ids.len();
        self.backend_ids.retain(|id| id != backend_id);
        before != self.backend_ids.len()
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServiceState {
    pub replicas: u64,
    pub phase: ServicePhase,
}

/// Lifecycle of a managed service.
///
/// `Created → Addressed → Scaled* → Removed`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServicePhase {
    #[default]
    Created,
    Addressed,
    Scaled,
    Removed,
}

impl ServicePhase {
    /// Whether `next` is a legal successor of this phase.
    pub fn can_advance_to(self, next: ServicePhase) -> bool {
        use ServicePhase::*;
        matches!(
            (self, next),
            (Created, Addressed)
                | (Addressed, Scaled)
                | (Scaled, Scaled)
                | (Created | Addressed | Scaled, Removed)
        )
    }
}

// ── Helpers ────────────────────────────────────────────────────────

impl InstanceConfig {
    /// Fresh record for `vnfr_id` realized with `backend`.
    pub fn new(vnfr_id: &str, name: &str, backend: BackendKind) -> Self {
        Self {
            vnfr_id: vnfr_id.to_string(),
            name: name.to_string(),
            base_hostname: name.to_string(),
            backend,
            ..Default::default()
        }
    }

    /// Bind a unit to a venue. An existing binding is never replaced.
    pub fn bind_unit(&mut self, unit_id: &str, binding: UnitBinding) -> &mut UnitBinding {
        self.units.entry(unit_id.to_string()).or_insert(binding)
    }

    pub fn unit(&self, unit_id: &str) -> Option<&UnitBinding> {
        self.units.get(unit_id)
    }

    pub fn unit_mut(&mut self, unit_id: &str) -> Option<&mut UnitBinding> {
        self.units.get_mut(unit_id)
    }

    /// Append one dependency update for `foreign`. Prior groups are kept.
    pub fn append_foreign(&mut self, foreign: &str, group: BTreeMap<String, String>) {
        self.foreign.entry(foreign.to_string()).or_default().push(group);
    }

    /// Every backend identifier recorded across all units.
    pub fn all_backend_ids(&self) -> impl Iterator<Item = (&str, &str)> {
        self.units.iter().flat_map(|(unit, binding)| {
            binding
                .backend_ids
                .iter()
                .map(move |id| (unit.as_str(), id.as_str()))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn port_spec_two_parts_is_published_target() {
        let spec = PortSpec(vec!["8080".into(), "80".into()]);
        assert_eq!(spec.published(), Some("8080"));
        assert_eq!(spec.target(), Some("80"));
        assert_eq!(spec.protocol(), "tcp");
    }

    #[test]
    fn port_spec_single_part_is_target_only() {
        let spec = PortSpec(vec!["80".into()]);
        assert_eq!(spec.published(), None);
        assert_eq!(spec.target(), Some("80"));
    }

    #[test]
    fn port_spec_trailing_protocol() {
        let spec = PortSpec(vec!["53".into(), "53".into(), "udp".into()]);
        assert_eq!(spec.published(), Some("53"));
        assert_eq!(spec.target(), Some("53"));
        assert_eq!(spec.protocol(), "udp");

        let spec = PortSpec(vec!["80".into(), "tcp".into()]);
        assert_eq!(spec.published(), None);
        assert_eq!(spec.target(), Some("80"));
    }

    #[test]
    fn mount_spec_parsing() {
        let m = MountSpec::parse("/data:/var/lib/data:ro").unwrap();
        assert_eq!(m.source, "/data");
        assert_eq!(m.target, "/var/lib/data");
        assert!(m.read_only);

        let m = MountSpec::parse("/a:/b").unwrap();
        assert!(!m.read_only);

        assert!(MountSpec::parse("/only-source").is_none());
        assert!(MountSpec::parse("").is_none());
    }

    #[test]
    fn restart_policy_parse() {
        assert_eq!(RestartPolicy::parse("on-failure"), RestartPolicy::OnFailure);
        assert_eq!(RestartPolicy::parse("ANY"), RestartPolicy::Any);
        assert_eq!(RestartPolicy::parse("always"), RestartPolicy::None);
    }

    #[test]
    fn bind_unit_keeps_first_binding() {
        let mut cfg = InstanceConfig::new("r1", "web", BackendKind::Container);
        let first = VimInstance {
            id: "vim-a".into(),
            auth_url: "unix:///var/run/docker.sock".into(),
            ..Default::default()
        };
        let second = VimInstance {
            id: "vim-b".into(),
            ..Default::default()
        };
        cfg.bind_unit("vdu-1", UnitBinding::new(first, "nginx"));
        cfg.bind_unit("vdu-1", UnitBinding::new(second, "redis"));

        let unit = cfg.unit("vdu-1").unwrap();
        assert_eq!(unit.venue.id, "vim-a");
        assert_eq!(unit.image, "nginx");
    }

    #[test]
    fn append_foreign_keeps_history() {
        let mut cfg = InstanceConfig::default();
        let mut g1 = BTreeMap::new();
        g1.insert("ip".to_string(), "10.0.0.1".to_string());
        let mut g2 = BTreeMap::new();
        g2.insert("ip".to_string(), "10.0.0.2".to_string());

        cfg.append_foreign("db", g1.clone());
        cfg.append_foreign("db", g2.clone());

        assert_eq!(cfg.foreign["db"], vec![g1, g2]);
    }

    #[test]
    fn service_phase_transitions() {
        use ServicePhase::*;
        assert!(Created.can_advance_to(Addressed));
        assert!(Addressed.can_advance_to(Scaled));
        assert!(Scaled.can_advance_to(Scaled));
        assert!(Scaled.can_advance_to(Removed));
        assert!(!Created.can_advance_to(Scaled));
        assert!(!Removed.can_advance_to(Addressed));
    }

    #[test]
    fn service_id_requires_service_state() {
        let mut unit = UnitBinding::new(VimInstance::default(), "img");
        unit.backend_ids.push("svc-1".into());
        assert_eq!(unit.service_id(), None);

        unit.service = Some(ServiceState::default());
        assert_eq!(unit.service_id(), Some("svc-1"));
        assert!(unit.forget("svc-1"));
        assert!(!unit.forget("svc-1"));
    }
}
