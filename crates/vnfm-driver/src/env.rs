//! Environment derivation and dependency merging.

use std::collections::BTreeMap;

use tracing::debug;
use vnfm_catalogue::VnfRecordDependency;
use vnfm_state::InstanceConfig;

/// Environment variables for a running instance.
///
/// Every `own` entry verbatim as `KEY=VALUE`, then one
/// `FOREIGN_KEY=VALUE` per entry of every foreign dependency group, both
/// name segments upper-cased, groups in arrival order.
pub fn environment(config: &InstanceConfig) -> Vec<String> {
    let mut env: Vec<String> = config
        .settings
        .own
        .iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect();

    for (foreign, groups) in &config.foreign {
        let prefix = foreign.to_uppercase();
        for group in groups {
            for (key, value) in group {
                env.push(format!("{prefix}_{}={value}", key.to_uppercase()));
            }
        }
    }
    env
}

/// Append the groups carried by `dependency` to the foreign map.
///
/// Component-level groups come first, then record-level ones. Empty values
/// are dropped and a group left empty is not recorded. Returns the number
/// of groups appended.
pub fn merge_dependency(config: &mut InstanceConfig, dependency: &VnfRecordDependency) -> usize {
    let mut appended = 0;

    let component_groups = dependency
        .vnfc_parameters
        .iter()
        .flat_map(|(foreign, per_instance)| {
            per_instance
                .parameters
                .values()
                .map(move |params| (foreign, &params.parameters))
        });
    let record_groups = dependency
        .parameters
        .iter()
        .map(|(foreign, params)| (foreign, &params.parameters));

    for (foreign, params) in component_groups.chain(record_groups) {
        let group: BTreeMap<String, String> = params
            .iter()
            .filter(|(_, value)| !value.is_empty())
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        if group.is_empty() {
            continue;
        }
        config.append_foreign(foreign, group);
        appended += 1;
    }

    debug!(vnfr_id = %config.vnfr_id, appended, "dependency merged");
    appended
}

#[cfg(test)]
mod tests {
    use super::*;
    use vnfm_catalogue::{DependencyParameters, VnfcDependencyParameters};
    use vnfm_state::BackendKind;

    #[test]
    fn own_then_foreign() {
        let mut config = InstanceConfig::new("r1", "web", BackendKind::Container);
        config.settings.own.insert("Mode".into(), "fast".into());
        config.settings.own.insert("MGMT".into(), "10.0.0.2".into());
        config.append_foreign(
            "db",
            BTreeMap::from([("ip".to_string(), "10.0.0.9".to_string())]),
        );
        config.append_foreign(
            "db",
            BTreeMap::from([("port".to_string(), "5432".to_string())]),
        );

        assert_eq!(
            environment(&config),
            vec!["MGMT=10.0.0.2", "Mode=fast", "DB_IP=10.0.0.9", "DB_PORT=5432"]
        );
    }

    #[test]
    fn empty_config_has_no_environment() {
        assert!(environment(&InstanceConfig::default()).is_empty());
    }

    #[test]
    fn modify_accumulates_groups_in_order() {
        let mut config = InstanceConfig::new("r1", "web", BackendKind::Container);
        for ip in ["10.0.0.1", "10.0.0.2", "10.0.0.3"] {
            let dep = VnfRecordDependency::single("db", &[("ip", ip)]);
            assert_eq!(merge_dependency(&mut config, &dep), 1);
        }

        let groups = &config.foreign["db"];
        assert_eq!(groups.len(), 3);
        let ips: Vec<&str> = groups.iter().map(|g| g["ip"].as_str()).collect();
        assert_eq!(ips, vec!["10.0.0.1", "10.0.0.2", "10.0.0.3"]);
    }

    #[test]
    fn empty_values_and_groups_are_dropped() {
        let mut config = InstanceConfig::default();
        let dep = VnfRecordDependency::single("db", &[("ip", ""), ("user", "")]);
        assert_eq!(merge_dependency(&mut config, &dep), 0);
        assert!(config.foreign.is_empty());

        let dep = VnfRecordDependency::single("db", &[("ip", "10.0.0.1"), ("user", "")]);
        merge_dependency(&mut config, &dep);
        assert_eq!(config.foreign["db"][0].len(), 1);
    }

    #[test]
    fn component_groups_precede_record_groups() {
        let mut dep = VnfRecordDependency::single("db", &[("role", "primary")]);
        dep.vnfc_parameters.insert(
            "db".into(),
            VnfcDependencyParameters {
                parameters: BTreeMap::from([
                    ("vnfc-1".to_string(), DependencyParameters::from_pairs(&[("ip", "10.0.0.1")])),
                    ("vnfc-2".to_string(), DependencyParameters::from_pairs(&[("ip", "10.0.0.2")])),
                ]),
            },
        );

        let mut config = InstanceConfig::default();
        assert_eq!(merge_dependency(&mut config, &dep), 3);
        let groups = &config.foreign["db"];
        assert_eq!(groups[0]["ip"], "10.0.0.1");
        assert_eq!(groups[1]["ip"], "10.0.0.2");
        assert_eq!(groups[2]["role"], "primary");
    }
}
