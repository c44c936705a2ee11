//! Configuration extraction.
//!
//! Turns the free-form `(key, value)` parameters of a record into typed
//! [`DeploymentSettings`] and a per-network alias table. Keys are matched
//! case-insensitively by substring, `-` and `_` being interchangeable, and
//! the first matching fragment wins:
//!
//! | Fragment                   | Effect                                   |
//! |----------------------------|------------------------------------------|
//! | `cmd`, `command`           | command, split on whitespace             |
//! | `publish`                  | one port spec, split on `:` and `/`      |
//! | `aliases`                  | `net:a,b;net2:c`                         |
//! | `expose`                   | one exposed port                         |
//! | `restart_policy_condition` | restart policy                           |
//! | `constraints`              | placement constraints, `;`-separated     |
//! | `volumes`                  | `source:target[:ro]` mounts, `;`-separated |
//! | `dns`                      | one DNS server                           |
//! | `hostname`                 | base hostname                            |
//!
//! A repeated `constraints` or `volumes` key replaces the earlier list, and
//! a repeated network in `aliases` replaces that network's names. Ports
//! and DNS servers accumulate.
//!
//! Anything else becomes an `own` environment entry under its key as given.
//! Malformed values never fail extraction; they yield whatever partial
//! result can be read from them.

use std::collections::BTreeMap;

use tracing::debug;
use vnfm_catalogue::ConfigurationParameter;
use vnfm_state::{DeploymentSettings, PortSpec, RestartPolicy};

/// Output of [`extract`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Extracted {
    pub settings: DeploymentSettings,
    /// Network name → explicit alias list.
    pub aliases: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Command,
    Publish,
    Aliases,
    Expose,
    RestartPolicy,
    Constraints,
    Volumes,
    Dns,
    Hostname,
}

const FRAGMENTS: &[(&str, Field)] = &[
    ("cmd", Field::Command),
    ("command", Field::Command),
    ("publish", Field::Publish),
    ("aliases", Field::Aliases),
    ("expose", Field::Expose),
    ("restart_policy_condition", Field::RestartPolicy),
    ("constraints", Field::Constraints),
    ("volumes", Field::Volumes),
    ("dns", Field::Dns),
    ("hostname", Field::Hostname),
];

fn classify(key: &str) -> Option<Field> {
    let key = key.to_ascii_lowercase().replace('-', "_");
    FRAGMENTS
        .iter()
        .find(|(fragment, _)| key.contains(fragment))
        .map(|(_, field)| *field)
}

/// Extract typed settings from configuration parameters, in order.
pub fn extract(params: &[ConfigurationParameter]) -> Extracted {
    let mut out = Extracted::default();
    let settings = &mut out.settings;

    for param in params {
        let value = param.value.as_str();
        match classify(&param.conf_key) {
            Some(Field::Command) => {
                settings.command = value.split_whitespace().map(str::to_string).collect();
            }
            Some(Field::Publish) => {
                let parts: Vec<String> = value
                    .split([':', '/'])
                    .map(str::trim)
                    .filter(|p| !p.is_empty())
                    .map(str::to_string)
                    .collect();
                if !parts.is_empty() {
                    settings.published_ports.push(PortSpec(parts));
                }
            }
            Some(Field::Aliases) => {
                for (network, names) in parse_aliases(value) {
                    out.aliases.insert(network, names);
                }
            }
            Some(Field::Expose) => settings.exposed_ports.push(value.trim().to_string()),
            Some(Field::RestartPolicy) => settings.restart_policy = RestartPolicy::parse(value),
            Some(Field::Constraints) => settings.constraints = split_packed(value).collect(),
            Some(Field::Volumes) => settings.mounts = split_packed(value).collect(),
            Some(Field::Dns) => settings.dns.push(value.trim().to_string()),
            Some(Field::Hostname) => {
                let hostname = value.trim();
                if !hostname.is_empty() {
                    settings.hostname = Some(hostname.to_string());
                }
            }
            None => {
                settings.own.insert(param.conf_key.clone(), param.value.clone());
            }
        }
    }

    debug!(
        params = params.len(),
        own = out.settings.own.len(),
        aliases = out.aliases.len(),
        "configuration extracted"
    );
    out
}

/// `a;b;c` → `[a, b, c]`, empty segments dropped.
fn split_packed(value: &str) -> impl Iterator<Item = String> + '_ {
    value
        .split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// `mgmt:a,b;data:c` → `[(mgmt, [a, b]), (data, [c])]`.
///
/// Segments without a `:` or without any name are skipped.
fn parse_aliases(value: &str) -> Vec<(String, Vec<String>)> {
    value
        .split(';')
        .filter_map(|segment| {
            let (network, names) = segment.split_once(':')?;
            let network = network.trim();
            let names: Vec<String> = names
                .split(',')
                .map(str::trim)
                .filter(|n| !n.is_empty())
                .map(str::to_string)
                .collect();
            if network.is_empty() || names.is_empty() {
                None
            } else {
                Some((network.to_string(), names))
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> Vec<ConfigurationParameter> {
        pairs
            .iter()
            .map(|(k, v)| ConfigurationParameter::new(k, v))
            .collect()
    }

    #[test]
    fn recognized_fragments() {
        let out = extract(&params(&[
            ("CMD", "nginx -g daemon off;"),
            ("publish", "8080:80"),
            ("publish-udp", "53:53/udp"),
            ("expose", "9000"),
            ("restart-policy-condition", "on-failure"),
            ("constraints", "node.role==worker;engine.labels.zone==a"),
            ("volumes", "/data:/var/lib/data:ro;/logs:/var/log"),
            ("dns", "8.8.8.8"),
            ("dns2", "1.1.1.1"),
            ("hostname", "edge"),
        ]));
        let s = &out.settings;

        assert_eq!(s.command, vec!["nginx", "-g", "daemon", "off;"]);
        assert_eq!(
            s.published_ports,
            vec![
                PortSpec(vec!["8080".into(), "80".into()]),
                PortSpec(vec!["53".into(), "53".into(), "udp".into()]),
            ]
        );
        assert_eq!(s.exposed_ports, vec!["9000"]);
        assert_eq!(s.restart_policy, RestartPolicy::OnFailure);
        assert_eq!(
            s.constraints,
            vec!["node.role==worker", "engine.labels.zone==a"]
        );
        assert_eq!(s.mounts, vec!["/data:/var/lib/data:ro", "/logs:/var/log"]);
        assert_eq!(s.dns, vec!["8.8.8.8", "1.1.1.1"]);
        assert_eq!(s.hostname.as_deref(), Some("edge"));
        assert!(s.own.is_empty());
    }

    #[test]
    fn unmatched_keys_become_own_entries_verbatim() {
        let out = extract(&params(&[("Db_Password", "secret"), ("port", "5432")]));
        assert_eq!(out.settings.own["Db_Password"], "secret");
        assert_eq!(out.settings.own["port"], "5432");
    }

    #[test]
    fn first_fragment_in_priority_order_wins() {
        // "command" beats "hostname"; "dns" beats "hostname".
        let out = extract(&params(&[
            ("hostname_command", "run"),
            ("dns_hostname", "10.0.0.53"),
        ]));
        assert_eq!(out.settings.command, vec!["run"]);
        assert_eq!(out.settings.dns, vec!["10.0.0.53"]);
        assert_eq!(out.settings.hostname, None);
    }

    #[test]
    fn alias_table() {
        let out = extract(&params(&[("aliases", "mgmt:web,www;data:store")]));
        assert_eq!(out.aliases["mgmt"], vec!["web", "www"]);
        assert_eq!(out.aliases["data"], vec!["store"]);
    }

    #[test]
    fn repeated_list_keys_replace() {
        let out = extract(&params(&[
            ("constraints", "node.role==worker"),
            ("constraints", "node.role==manager;zone==b"),
            ("volumes", "/a:/a"),
            ("volumes", "/b:/b"),
            ("aliases", "mgmt:old;data:keep"),
            ("aliases", "mgmt:new"),
            ("dns", "8.8.8.8"),
            ("dns", "1.1.1.1"),
        ]));
        assert_eq!(out.settings.constraints, vec!["node.role==manager", "zone==b"]);
        assert_eq!(out.settings.mounts, vec!["/b:/b"]);
        assert_eq!(out.aliases["mgmt"], vec!["new"]);
        assert_eq!(out.aliases["data"], vec!["keep"]);
        assert_eq!(out.settings.dns, vec!["8.8.8.8", "1.1.1.1"]);
    }

    #[test]
    fn malformed_values_degrade() {
        let out = extract(&params(&[
            ("aliases", "mgmt;data:;:x;ok:one"),
            ("publish", "8080"),
            ("publish", "::"),
            ("volumes", "/only"),
        ]));
        assert_eq!(out.aliases.len(), 1);
        assert_eq!(out.aliases["ok"], vec!["one"]);
        assert_eq!(
            out.settings.published_ports,
            vec![PortSpec(vec!["8080".into()])]
        );
        assert_eq!(out.settings.mounts, vec!["/only"]);
    }

    #[test]
    fn extraction_is_deterministic() {
        let input = params(&[
            ("command", "run --fast"),
            ("zeta", "1"),
            ("alpha", "2"),
            ("aliases", "b:x;a:y"),
            ("publish", "1:2"),
        ]);
        let first = extract(&input);
        let second = extract(&input);
        assert_eq!(first, second);
        assert_eq!(format!("{first:?}"), format!("{second:?}"));
    }
}
