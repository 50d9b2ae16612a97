//! Firewalld zones
//!
//! Queries `firewalld.list_all`, which reports every zone as a mapping of
//! `firewall-cmd --list-all` keys to lists of strings:
//!
//! ```yaml
//! public:
//!   target: [default]
//!   services: [dhcpv6-client ssh]
//!   ports: [""]
//!   forward-ports: ["port=80:proto=tcp:toport=8080:toaddr="]
//!   rich rules: ['rule family="ipv4" source address="10.0.0.0/8" accept']
//! ```
//!
//! Every zone becomes one `firewalld.present` state (Salt) or a zone task
//! followed by one `ansible.posix.firewalld` task per rule (Ansible). Keys without a counterpart
//! in those modules (`target`, `protocols`, `forward`, `source-ports`,
//! `icmp-block-inversion`) are not carried over.

use anyhow::{bail, Result};
use serde_yaml::{Mapping, Value};

use super::{
    ansible_playbook, ansible_task, kind, mapping, single, string, strings, Describer,
    FormatOptions,
};

/// List-valued zone keys and the `firewalld.present` argument they map to
const SALT_LIST_ARGS: &[(&str, &str)] = &[
    ("services", "services"),
    ("ports", "ports"),
    ("interfaces", "interfaces"),
    ("sources", "sources"),
    ("icmp-blocks", "block_icmp"),
];

/// Zone keys mapped to one `ansible.posix.firewalld` task per entry
const ANSIBLE_ITEM_ARGS: &[(&str, &str)] = &[
    ("services", "service"),
    ("ports", "port"),
    ("interfaces", "interface"),
    ("sources", "source"),
    ("icmp-blocks", "icmp_block"),
];

/// Describes firewalld zone configuration
pub struct FirewalldDescriber;

/// A `forward-ports` entry as printed by firewall-cmd
#[derive(Debug, Clone, PartialEq, Eq, Default)]
struct PortForward {
    port: String,
    proto: String,
    toport: String,
    toaddr: String,
}

impl PortForward {
    /// Parse `port=80:proto=tcp:toport=8080:toaddr=`
    fn parse(entry: &str) -> Option<Self> {
        let mut forward = PortForward::default();
        for part in entry.split(':') {
            let (key, value) = part.split_once('=')?;
            match key.trim() {
                "port" => forward.port = value.trim().to_string(),
                "proto" => forward.proto = value.trim().to_string(),
                "toport" => forward.toport = value.trim().to_string(),
                "toaddr" => forward.toaddr = value.trim().to_string(),
                _ => {}
            }
        }
        if forward.port.is_empty() || forward.proto.is_empty() {
            return None;
        }
        if forward.toport.is_empty() {
            forward.toport = forward.port.clone();
        }
        Some(forward)
    }

    /// Salt's `src:dest:proto[:dstaddr]` form
    fn salt_spec(&self) -> String {
        let mut spec = format!("{}:{}:{}", self.port, self.toport, self.proto);
        if !self.toaddr.is_empty() {
            spec.push(':');
            spec.push_str(&self.toaddr);
        }
        spec
    }

    fn ansible_spec(&self) -> String {
        let mut spec = format!("{}/{}/{}", self.port, self.proto, self.toport);
        if !self.toaddr.is_empty() {
            spec.push('/');
            spec.push_str(&self.toaddr);
        }
        spec
    }
}

impl FirewalldDescriber {
    fn zones(value: &Value) -> Result<&Mapping> {
        match value.as_mapping() {
            Some(zones) => Ok(zones),
            None => bail!(
                "firewalld.list_all should return a mapping of zones, got {}",
                kind(value)
            ),
        }
    }

    /// Raw strings reported for a zone key
    fn raw_entries<'a>(rules: &'a Value, key: &str) -> Vec<&'a str> {
        match rules.get(key) {
            Some(Value::Sequence(items)) => items.iter().filter_map(Value::as_str).collect(),
            Some(Value::String(item)) => vec![item.as_str()],
            _ => Vec::new(),
        }
    }

    /// Whitespace separated entries for a zone key, empty strings dropped
    fn entries(rules: &Value, key: &str) -> Vec<String> {
        Self::raw_entries(rules, key)
            .into_iter()
            .flat_map(|entry| entry.split_whitespace())
            .map(str::to_string)
            .collect()
    }

    /// Rich rules contain spaces, so each reported line is one rule
    fn rich_rules(rules: &Value) -> Vec<String> {
        Self::raw_entries(rules, "rich rules")
            .into_iter()
            .map(str::trim)
            .filter(|rule| !rule.is_empty())
            .map(str::to_string)
            .collect()
    }

    fn port_forwards(rules: &Value) -> Vec<PortForward> {
        Self::entries(rules, "forward-ports")
            .iter()
            .filter_map(|entry| PortForward::parse(entry))
            .collect()
    }

    fn masquerade(rules: &Value) -> bool {
        Self::entries(rules, "masquerade")
            .first()
            .is_some_and(|flag| flag == "yes")
    }

    fn zone_name(zone: &Value) -> Result<String> {
        match super::scalar_text(zone) {
            Some(name) => Ok(name),
            None => bail!("firewalld zone name should be a string, got {}", kind(zone)),
        }
    }
}

impl Describer for FirewalldDescriber {
    fn name(&self) -> &'static str {
        "firewalld"
    }

    fn description(&self) -> &'static str {
        "Firewalld zones (firewalld.list_all)"
    }

    fn function(&self) -> &'static str {
        "firewalld.list_all"
    }

    fn parse_salt(&self, _minion: &str, value: &Value, _opts: &FormatOptions) -> Result<Value> {
        let mut states = Mapping::new();

        for (count, (zone, rules)) in Self::zones(value)?.iter().enumerate() {
            let mut args = vec![single("name", string(Self::zone_name(zone)?))];

            for &(key, arg) in SALT_LIST_ARGS {
                let entries = Self::entries(rules, key);
                if !entries.is_empty() {
                    args.push(single(arg, strings(entries)));
                }
            }

            let forwards: Vec<String> = Self::port_forwards(rules)
                .iter()
                .map(PortForward::salt_spec)
                .collect();
            if !forwards.is_empty() {
                args.push(single("port_fwd", strings(forwards)));
            }

            let rich_rules = Self::rich_rules(rules);
            if !rich_rules.is_empty() {
                args.push(single("rich_rules", strings(rich_rules)));
            }

            if Self::masquerade(rules) {
                args.push(single("masquerade", Value::Bool(true)));
            }

            states.insert(
                string(format!("add_firewalld_rule_{}", count)),
                single("firewalld.present", Value::Sequence(args)),
            );
        }

        Ok(Value::Mapping(states))
    }

    fn parse_ansible(&self, _minion: &str, value: &Value, opts: &FormatOptions) -> Result<Value> {
        let mut tasks = Vec::new();

        for (zone, rules) in Self::zones(value)? {
            let zone = Self::zone_name(zone)?;
            let task = |what: String, arg: &str, item: Value| {
                ansible_task(
                    format!("Enable {} in zone {}", what, zone),
                    "ansible.posix.firewalld",
                    mapping([
                        ("zone", string(zone.clone())),
                        (arg, item),
                        ("permanent", Value::Bool(true)),
                        ("state", string("enabled")),
                    ]),
                )
            };

            tasks.push(ansible_task(
                format!("Ensure zone {} is present", zone),
                "ansible.posix.firewalld",
                mapping([
                    ("zone", string(zone.clone())),
                    ("permanent", Value::Bool(true)),
                    ("state", string("present")),
                ]),
            ));

            for &(key, arg) in ANSIBLE_ITEM_ARGS {
                for entry in Self::entries(rules, key) {
                    tasks.push(task(format!("{} {}", arg, entry), arg, string(entry)));
                }
            }

            for forward in Self::port_forwards(rules) {
                let spec = forward.ansible_spec();
                tasks.push(task(format!("port_forward {}", spec), "port_forward", {
                    let mut entry = vec![
                        ("port", string(forward.port.clone())),
                        ("proto", string(forward.proto.clone())),
                        ("toport", string(forward.toport.clone())),
                    ];
                    if !forward.toaddr.is_empty() {
                        entry.push(("toaddr", string(forward.toaddr.clone())));
                    }
                    Value::Sequence(vec![mapping(entry)])
                }));
            }

            for rule in Self::rich_rules(rules) {
                tasks.push(task("rich_rule".to_string(), "rich_rule", string(rule)));
            }

            if Self::masquerade(rules) {
                tasks.push(task("masquerade".to_string(), "masquerade", Value::Bool(true)));
            }
        }

        Ok(ansible_playbook(tasks, opts))
    }
}
