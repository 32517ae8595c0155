// Copyright 2025 Lablup Inc. and Jeongkyu Shin
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Ansible INI inventory support.
//!
//! Only the parts needed to turn host and group names into `host:port`
//! addresses are understood:
//!
//! ```ini
//! standalone.example.com
//!
//! [web]
//! web1.example.com
//! web2.example.com:2222
//! web3.example.com ansible_port=2200
//!
//! [db]
//! db1.example.com
//!
//! [prod:children]
//! web
//! db
//! ```
//!
//! Host names may carry ranges (`web[01:03]`, `db-[a:c]`), which expand to
//! one host per value. `[group:vars]` sections are skipped. The inventory name is used as the
//! address; `ansible_host` is not consulted.

use anyhow::{Context, Result};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use tokio::fs;

const ALL_GROUP: &str = "all";
const UNGROUPED_GROUP: &str = "ungrouped";
const DEFAULT_INVENTORY_PORT: u16 = 22;
const MAX_RANGE_EXPANSION: usize = 100_000;

/// A host entry from the inventory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InventoryHost {
    pub name: String,
    pub port: u16,
}

impl InventoryHost {
    pub fn address(&self) -> String {
        format!("{}:{}", self.name, self.port)
    }
}

#[derive(Debug, Default, Clone)]
struct Group {
    hosts: Vec<String>,
    children: Vec<String>,
}

enum Section {
    Hosts(String),
    Children(String),
    Vars,
}

/// Parsed inventory.
#[derive(Debug, Default, Clone)]
pub struct Inventory {
    hosts: Vec<InventoryHost>,
    groups: HashMap<String, Group>,
}

impl Inventory {
    /// Read and parse an inventory file.
    pub async fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read inventory file {}", path.display()))?;
        Self::parse(&content)
            .with_context(|| format!("Failed to parse inventory file {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        let mut inventory = Inventory::default();
        let mut section = Section::Hosts(UNGROUPED_GROUP.to_string());

        for (idx, raw_line) in content.lines().enumerate() {
            let line = raw_line.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }

            if let Some(header) = line.strip_prefix('[') {
                let header = header
                    .strip_suffix(']')
                    .with_context(|| format!("line {}: unterminated section header", idx + 1))?
                    .trim();
                section = match header.split_once(':') {
                    Some((name, "children")) => Section::Children(name.to_string()),
                    Some((_, "vars")) => Section::Vars,
                    Some((_, kind)) => {
                        anyhow::bail!("line {}: unknown section type '{kind}'", idx + 1)
                    }
                    None => Section::Hosts(header.to_string()),
                };
                if let Section::Hosts(name) | Section::Children(name) = &section {
                    inventory.groups.entry(name.clone()).or_default();
                }
                continue;
            }

            match &section {
                Section::Hosts(group) => {
                    let hosts = parse_host_line(line)
                        .with_context(|| format!("line {}: invalid host entry", idx + 1))?;
                    for host in hosts {
                        inventory.add_host(group, host);
                    }
                }
                Section::Children(group) => {
                    let child = line.split_whitespace().next().unwrap_or(line).to_string();
                    inventory.groups.entry(child.clone()).or_default();
                    let entry = inventory.groups.entry(group.clone()).or_default();
                    if !entry.children.contains(&child) {
                        entry.children.push(child);
                    }
                }
                Section::Vars => {}
            }
        }

        Ok(inventory)
    }

    fn add_host(&mut self, group: &str, host: InventoryHost) {
        match self.hosts.iter_mut().find(|h| h.name == host.name) {
            Some(existing) => {
                if host.port != DEFAULT_INVENTORY_PORT {
                    existing.port = host.port;
                }
            }
            None => self.hosts.push(host.clone()),
        }

        let entry = self.groups.entry(group.to_string()).or_default();
        if !entry.hosts.contains(&host.name) {
            entry.hosts.push(host.name);
        }
    }

    pub fn host(&self, name: &str) -> Option<&InventoryHost> {
        self.hosts.iter().find(|h| h.name == name)
    }

    /// Hosts of a group and all of its children, in file order, without duplicates.
    pub fn group_hosts(&self, name: &str) -> Option<Vec<&InventoryHost>> {
        if name == ALL_GROUP && !self.groups.contains_key(ALL_GROUP) {
            return Some(self.hosts.iter().collect());
        }

        self.groups.get(name)?;

        let mut names = Vec::new();
        let mut visited = HashSet::new();
        self.collect_group(name, &mut visited, &mut names);

        let seen: HashSet<&str> = names.iter().map(String::as_str).collect();
        Some(
            self.hosts
                .iter()
                .filter(|h| seen.contains(h.name.as_str()))
                .collect(),
        )
    }

    fn collect_group(&self, name: &str, visited: &mut HashSet<String>, out: &mut Vec<String>) {
        if !visited.insert(name.to_string()) {
            return;
        }
        let Some(group) = self.groups.get(name) else {
            return;
        };
        out.extend(group.hosts.iter().cloned());
        for child in &group.children {
            self.collect_group(child, visited, out);
        }
    }

    /// Turn host and group names into addresses.
    ///
    /// A name that matches a host wins over a group with the same name.
    /// Unknown names are skipped.
    pub fn resolve(&self, keys: &[String]) -> Vec<String> {
        let mut addrs = Vec::new();
        for key in keys {
            if let Some(host) = self.host(key) {
                addrs.push(host.address());
            } else if let Some(hosts) = self.group_hosts(key) {
                addrs.extend(hosts.into_iter().map(InventoryHost::address));
            } else {
                tracing::warn!("'{}' is neither a host nor a group in the inventory", key);
            }
        }
        addrs
    }
}

/// Parse one host line. A line with range patterns yields several hosts.
fn parse_host_line(line: &str) -> Result<Vec<InventoryHost>> {
    let mut tokens = line.split_whitespace();
    let spec = tokens.next().context("empty host entry")?;

    // Colons inside `[a:b]` ranges are not port separators.
    let port_search_from = spec.rfind(']').map_or(0, |idx| idx + 1);
    let (pattern, mut port) = match spec[port_search_from..].rfind(':') {
        Some(offset) => {
            let idx = port_search_from + offset;
            let (pattern, port) = (&spec[..idx], &spec[idx + 1..]);
            (
                pattern,
                port.parse::<u16>()
                    .with_context(|| format!("invalid port '{port}' for host '{pattern}'"))?,
            )
        }
        None => (spec, DEFAULT_INVENTORY_PORT),
    };

    for token in tokens {
        if let Some((key, value)) = token.split_once('=') {
            if key == "ansible_port" || key == "ansible_ssh_port" {
                port = value
                    .parse::<u16>()
                    .with_context(|| format!("invalid {key} '{value}' for host '{pattern}'"))?;
            }
        }
    }

    Ok(expand_host_pattern(pattern)?
        .into_iter()
        .map(|name| InventoryHost { name, port })
        .collect())
}

/// Expand host ranges such as `web[01:03]`, `db-[a:c]` or `n[0:10:5]`.
///
/// Several ranges in one name expand to their cartesian product.
fn expand_host_pattern(pattern: &str) -> Result<Vec<String>> {
    let mut names = vec![String::new()];
    let mut rest = pattern;

    while let Some(open) = rest.find('[') {
        let close = rest[open..]
            .find(']')
            .map(|idx| open + idx)
            .with_context(|| format!("unterminated range in host '{pattern}'"))?;
        let literal = &rest[..open];
        let values = range_values(&rest[open + 1..close])
            .with_context(|| format!("invalid range in host '{pattern}'"))?;

        let count = names.len().saturating_mul(values.len());
        if count > MAX_RANGE_EXPANSION {
            anyhow::bail!(
                "host '{pattern}' expands to {count} hosts, more than {MAX_RANGE_EXPANSION}"
            );
        }

        names = names
            .iter()
            .flat_map(|prefix| {
                values
                    .iter()
                    .map(move |value| format!("{prefix}{literal}{value}"))
            })
            .collect();
        rest = &rest[close + 1..];
    }

    for name in &mut names {
        name.push_str(rest);
    }
    Ok(names)
}

/// Values of one `start:end[:stride]` range body, numeric or single letters.
fn range_values(body: &str) -> Result<Vec<String>> {
    let parts: Vec<&str> = body.split(':').collect();
    let (start, end, stride) = match parts.as_slice() {
        [start, end] => (*start, *end, 1),
        [start, end, stride] => (
            *start,
            *end,
            stride
                .parse::<usize>()
                .with_context(|| format!("invalid stride '{stride}'"))?,
        ),
        _ => anyhow::bail!("expected [start:end] or [start:end:stride], got '[{body}]'"),
    };
    if stride == 0 {
        anyhow::bail!("stride must be positive");
    }
    let start = if start.is_empty() { "0" } else { start };

    if let (Ok(first), Ok(last)) = (start.parse::<u64>(), end.parse::<u64>()) {
        if first > last {
            anyhow::bail!("range start {first} is after end {last}");
        }
        let count = (last - first) / stride as u64 + 1;
        if count > MAX_RANGE_EXPANSION as u64 {
            anyhow::bail!("range [{body}] has {count} values, more than {MAX_RANGE_EXPANSION}");
        }
        // A leading zero fixes the width, as in `[01:10]`.
        let width = if start.len() > 1 && start.starts_with('0') {
            start.len()
        } else {
            0
        };
        return Ok((first..=last)
            .step_by(stride)
            .map(|n| format!("{n:0width$}"))
            .collect());
    }

    let mut start_chars = start.chars();
    let mut end_chars = end.chars();
    match (
        start_chars.next(),
        start_chars.next(),
        end_chars.next(),
        end_chars.next(),
    ) {
        (Some(first), None, Some(last), None)
            if first.is_ascii_alphabetic() && last.is_ascii_alphabetic() && first <= last =>
        {
            Ok((first..=last).step_by(stride).map(String::from).collect())
        }
        _ => anyhow::bail!("'[{body}]' is neither a numeric nor a letter range"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
# top-level hosts
standalone.example.com

[web]
web1.example.com
web2.example.com:2222
web3.example.com ansible_port=2200 ansible_host=10.0.0.3

[db]
db1.example.com ansible_ssh_port=5022
web1.example.com

[prod:children]
web
db

[prod:vars]
ansible_user=deploy
"#;

    fn keys(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_resolve_single_host() {
        let inv = Inventory::parse(SAMPLE).unwrap();
        assert_eq!(
            inv.resolve(&keys(&["web2.example.com"])),
            vec!["web2.example.com:2222"]
        );
        assert_eq!(
            inv.resolve(&keys(&["standalone.example.com"])),
            vec!["standalone.example.com:22"]
        );
    }

    #[test]
    fn test_ansible_port_variables() {
        let inv = Inventory::parse(SAMPLE).unwrap();
        assert_eq!(inv.host("web3.example.com").unwrap().port, 2200);
        assert_eq!(inv.host("db1.example.com").unwrap().port, 5022);
    }

    #[test]
    fn test_resolve_group() {
        let inv = Inventory::parse(SAMPLE).unwrap();
        assert_eq!(
            inv.resolve(&keys(&["web"])),
            vec![
                "web1.example.com:22",
                "web2.example.com:2222",
                "web3.example.com:2200"
            ]
        );
    }

    #[test]
    fn test_resolve_children_deduplicated_in_file_order() {
        let inv = Inventory::parse(SAMPLE).unwrap();
        assert_eq!(
            inv.resolve(&keys(&["prod"])),
            vec![
                "web1.example.com:22",
                "web2.example.com:2222",
                "web3.example.com:2200",
                "db1.example.com:5022"
            ]
        );
    }

    #[test]
    fn test_all_and_ungrouped() {
        let inv = Inventory::parse(SAMPLE).unwrap();
        assert_eq!(inv.resolve(&keys(&["all"])).len(), 5);
        assert_eq!(
            inv.resolve(&keys(&["ungrouped"])),
            vec!["standalone.example.com:22"]
        );
    }

    #[test]
    fn test_unknown_keys_are_skipped() {
        let inv = Inventory::parse(SAMPLE).unwrap();
        assert_eq!(
            inv.resolve(&keys(&["nope", "db1.example.com"])),
            vec!["db1.example.com:5022"]
        );
        assert!(inv.resolve(&keys(&["nope"])).is_empty());
    }

    #[test]
    fn test_cyclic_children_terminate() {
        let inv = Inventory::parse("[a]\nh1\n[a:children]\nb\n[b:children]\na\n").unwrap();
        assert_eq!(inv.resolve(&keys(&["b"])), vec!["h1:22"]);
    }

    #[test]
    fn test_invalid_port_is_an_error() {
        let err = Inventory::parse("[web]\nweb1:http\n").unwrap_err();
        assert!(format!("{err:#}").contains("invalid port"));
    }

    #[test]
    fn test_numeric_range_keeps_padding() {
        let inv = Inventory::parse("[web]\nweb[01:03].example.com\n").unwrap();
        assert_eq!(
            inv.resolve(&keys(&["web"])),
            vec![
                "web01.example.com:22",
                "web02.example.com:22",
                "web03.example.com:22"
            ]
        );
    }

    #[test]
    fn test_range_with_port_and_stride() {
        let inv =
            Inventory::parse("[nodes]\nnode[0:10:5]:2222\ndb-[a:c] ansible_port=5432\n").unwrap();
        assert_eq!(
            inv.resolve(&keys(&["nodes"])),
            vec![
                "node0:2222",
                "node5:2222",
                "node10:2222",
                "db-a:5432",
                "db-b:5432",
                "db-c:5432"
            ]
        );
    }

    #[test]
    fn test_multiple_ranges_expand_to_product() {
        let inv = Inventory::parse("rack[1:2]-n[a:b]\n").unwrap();
        assert_eq!(
            inv.resolve(&keys(&["ungrouped"])),
            vec!["rack1-na:22", "rack1-nb:22", "rack2-na:22", "rack2-nb:22"]
        );
    }

    #[test]
    fn test_invalid_ranges_are_errors() {
        assert!(Inventory::parse("[web]\nweb[3:1]\n").is_err());
        assert!(Inventory::parse("[web]\nweb[1:x]\n").is_err());
        assert!(Inventory::parse("[web]\nweb[1:3\n").is_err());
        assert!(Inventory::parse("[web]\nweb[1:3:0]\n").is_err());
    }

    #[test]
    fn test_unterminated_header_is_an_error() {
        assert!(Inventory::parse("[web\nweb1\n").is_err());
    }

    #[tokio::test]
    async fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hosts.ini");
        std::fs::write(&path, SAMPLE).unwrap();

        let inv = Inventory::load(&path).await.unwrap();
        assert_eq!(inv.resolve(&keys(&["db"])).len(), 2);
    }

    #[tokio::test]
    async fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Inventory::load(&dir.path().join("missing.ini")).await.is_err());
    }
}
