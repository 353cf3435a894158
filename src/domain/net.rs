//! Electrical nets and their aliases.
//!
//! A net-list is a sequence of tokens such as `"GPS_TX, U33.4"`. Every token
//! names one physical connection under one or more aliases. Tokens that share
//! an alias describe the same net, so their alias sets are merged.

use std::{collections::HashMap, path::Path};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::instrument;

use crate::domain::template::{self, TemplateError};

/// Separator between the aliases of a single net token.
pub const ALIAS_SEPARATOR: char = ',';

/// Separator between the segments of a qualified name.
pub const QUALIFIED_NAME_SEPARATOR: &str = ".";

/// A set of aliases referring to the same physical connection.
///
/// Aliases are kept in insertion order without duplicates, so the first alias
/// is stable and can be used as the canonical display name.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Net {
    refs: Vec<String>,
}

impl Net {
    fn new(refs: Vec<String>) -> Self {
        let mut net = Self::default();
        net.extend(refs);
        net
    }

    fn extend(&mut self, refs: impl IntoIterator<Item = String>) {
        for alias in refs {
            if !self.refs.contains(&alias) {
                self.refs.push(alias);
            }
        }
    }

    /// The aliases of this net, in insertion order.
    #[must_use]
    pub fn refs(&self) -> &[String] {
        &self.refs
    }

    /// Whether the net is known under the given alias.
    #[must_use]
    pub fn contains(&self, alias: &str) -> bool {
        self.refs.iter().any(|r| r == alias)
    }

    /// The canonical alias of the net.
    #[must_use]
    pub fn first_alias(&self) -> &str {
        self.refs.first().map_or("", String::as_str)
    }

    /// The net's name qualified by a component prefix, e.g. `root.gps.GPS_TX`.
    #[must_use]
    pub fn qualified_name(&self, prefix: &str) -> String {
        [prefix, self.first_alias()].join(QUALIFIED_NAME_SEPARATOR)
    }
}

/// Splits a net token into its aliases, trimming whitespace around each one.
///
/// An empty token yields a single empty alias.
#[must_use]
pub fn parse_net_token(token: &str) -> Vec<String> {
    token
        .split(ALIAS_SEPARATOR)
        .map(|alias| alias.trim().to_string())
        .collect()
}

/// How a token whose aliases touch several existing nets is resolved.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum MergePolicy {
    /// All touched nets are folded into one.
    #[default]
    Union,
    /// The last touched net absorbs the token; the other nets keep their
    /// identity and only lose the aliases named by the token.
    LastMatch,
}

/// A mapping from alias to net.
///
/// Nets are stored once; aliases index into them, so every alias of a merged
/// net resolves to the same [`Net`].
#[derive(Debug, Clone, Default)]
pub struct NetMap {
    nets: Vec<Net>,
    by_alias: HashMap<String, usize>,
    policy: MergePolicy,
}

impl NetMap {
    /// Creates an empty map using the given merge policy.
    #[must_use]
    pub fn with_policy(policy: MergePolicy) -> Self {
        Self {
            policy,
            ..Self::default()
        }
    }

    /// Merges a net token into the map and returns the resulting net.
    ///
    /// Every alias in the token is (re-)pointed at the returned net.
    pub fn merge(&mut self, token: &str) -> &Net {
        let refs = parse_net_token(token);

        let touched: Vec<usize> = refs
            .iter()
            .filter_map(|alias| self.by_alias.get(alias).copied())
            .fold(Vec::new(), |mut acc, index| {
                if !acc.contains(&index) {
                    acc.push(index);
                }
                acc
            });

        let target = match (self.policy, touched.as_slice()) {
            (_, []) => {
                self.nets.push(Net::new(refs.clone()));
                self.nets.len() - 1
            }
            (MergePolicy::LastMatch, [.., last]) => {
                if touched.len() > 1 {
                    tracing::warn!(
                        token,
                        nets = touched.len(),
                        "net token spans several nets; keeping the last match"
                    );
                }
                self.nets[*last].extend(refs.iter().cloned());
                *last
            }
            (MergePolicy::Union, [first, rest @ ..]) => {
                for &other in rest {
                    let absorbed = std::mem::take(&mut self.nets[other].refs);
                    for alias in &absorbed {
                        self.by_alias.insert(alias.clone(), *first);
                    }
                    self.nets[*first].extend(absorbed);
                }
                self.nets[*first].extend(refs.iter().cloned());
                *first
            }
        };

        for alias in refs {
            self.by_alias.insert(alias, target);
        }

        &self.nets[target]
    }

    /// Looks up the net known under an alias.
    #[must_use]
    pub fn get(&self, alias: &str) -> Option<&Net> {
        self.by_alias.get(alias).map(|&index| &self.nets[index])
    }

    /// Whether two aliases resolve to the same net.
    #[must_use]
    pub fn same_net(&self, a: &str, b: &str) -> bool {
        match (self.by_alias.get(a), self.by_alias.get(b)) {
            (Some(x), Some(y)) => x == y,
            _ => false,
        }
    }

    /// The number of distinct aliases.
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_alias.len()
    }

    /// Whether the map holds no aliases.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_alias.is_empty()
    }

    /// Iterates over every alias known to the map.
    pub fn aliases(&self) -> impl Iterator<Item = &str> {
        self.by_alias.keys().map(String::as_str)
    }

    /// Iterates over the distinct nets that are still referenced by an alias.
    pub fn nets(&self) -> impl Iterator<Item = &Net> {
        self.nets.iter().enumerate().filter_map(|(index, net)| {
            self.by_alias
                .values()
                .any(|&i| i == index)
                .then_some(net)
        })
    }
}

/// Builds a net map from a list of tokens.
#[must_use]
pub fn load_nets<I, S>(tokens: I, policy: MergePolicy) -> NetMap
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut nets = NetMap::with_policy(policy);
    for token in tokens {
        nets.merge(token.as_ref());
    }
    nets
}

/// Errors that can occur while loading a net-list document.
#[derive(Debug, Error)]
pub enum NetLoadError {
    /// The file could not be read.
    #[error("failed to read net-list: {0}")]
    Io(#[from] std::io::Error),

    /// The template pass failed.
    #[error(transparent)]
    Template(#[from] TemplateError),

    /// The rendered document is not valid YAML.
    #[error("failed to parse net-list YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// The document has no `nets` sequence.
    #[error("net-list document has no 'nets' sequence")]
    MissingNets,

    /// A `nets` entry is not a string.
    #[error("net entry {index} is not a string")]
    InvalidEntry {
        /// Position of the entry in the `nets` sequence.
        index: usize,
    },
}

/// Renders and parses a YAML net-list document with a top-level `nets` key.
///
/// # Errors
///
/// Returns an error if the template pass fails, the YAML is malformed, or the
/// `nets` key is missing or contains non-string entries.
#[instrument(level = "debug", skip(text))]
pub fn load_nets_yml(text: &str, policy: MergePolicy) -> Result<NetMap, NetLoadError> {
    let rendered = template::render(text, &serde_yaml::Mapping::new())?;
    let document: serde_yaml::Value = serde_yaml::from_str(&rendered)?;

    let entries = document
        .get("nets")
        .and_then(serde_yaml::Value::as_sequence)
        .ok_or(NetLoadError::MissingNets)?;

    let tokens = entries
        .iter()
        .enumerate()
        .map(|(index, entry)| entry.as_str().ok_or(NetLoadError::InvalidEntry { index }))
        .collect::<Result<Vec<_>, _>>()?;

    let nets = load_nets(tokens, policy);
    tracing::debug!(aliases = nets.len(), "loaded net-list");
    Ok(nets)
}

/// Reads a net-list document from disk. See [`load_nets_yml`].
///
/// # Errors
///
/// Returns an error if the file cannot be read or [`load_nets_yml`] fails.
pub fn load_nets_yml_file(path: &Path, policy: MergePolicy) -> Result<NetMap, NetLoadError> {
    let text = std::fs::read_to_string(path)?;
    load_nets_yml(&text, policy)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use test_case::test_case;

    use super::*;

    #[test_case("A", &["A"]; "single alias")]
    #[test_case("A,E", &["A", "E"]; "two aliases")]
    #[test_case(" GPS_TX ,  U33.4", &["GPS_TX", "U33.4"]; "whitespace around separators")]
    #[test_case("", &[""]; "empty token")]
    fn parses_tokens(token: &str, expected: &[&str]) {
        assert_eq!(parse_net_token(token), expected);
    }

    #[test_case(MergePolicy::Union; "union")]
    #[test_case(MergePolicy::LastMatch; "last match")]
    fn merges_shared_aliases(policy: MergePolicy) {
        let nets = load_nets(["A", "B", "C", "A,E"], policy);

        assert_eq!(nets.len(), 4);
        assert!(nets.same_net("A", "E"));
        assert!(!nets.same_net("A", "B"));

        let a = nets.get("A").unwrap();
        assert!(a.contains("A"));
        assert!(a.contains("E"));
        assert_eq!(a, nets.get("E").unwrap());
        assert_eq!(nets.nets().count(), 3);
    }

    #[test]
    fn first_alias_follows_insertion_order() {
        let nets = load_nets(["VCC_3V3, 3V3", "3V3, P3V3"], MergePolicy::Union);
        let net = nets.get("P3V3").unwrap();

        assert_eq!(net.refs(), ["VCC_3V3", "3V3", "P3V3"]);
        assert_eq!(net.first_alias(), "VCC_3V3");
        assert_eq!(net.qualified_name("root.power"), "root.power.VCC_3V3");
    }

    #[test]
    fn union_folds_every_touched_net() {
        let nets = load_nets(["A", "B", "A,B"], MergePolicy::Union);

        assert!(nets.same_net("A", "B"));
        assert_eq!(nets.nets().count(), 1);
        assert_eq!(nets.get("B").unwrap().refs(), ["A", "B"]);
    }

    #[test]
    fn last_match_keeps_other_net_identity() {
        let nets = load_nets(["A,X", "B", "A,B"], MergePolicy::LastMatch);

        // "A" is re-pointed at B's net, but "X" still resolves to the old one.
        assert!(nets.same_net("A", "B"));
        assert!(!nets.same_net("X", "B"));
        assert_eq!(nets.get("X").unwrap().refs(), ["A", "X"]);
        assert_eq!(nets.nets().count(), 2);
    }

    #[test]
    fn loads_templated_net_list() {
        let text = "nets:\n{% for i in range(4) %}\n  - A{{ i }}\n{% endfor %}\n";
        let nets = load_nets_yml(text, MergePolicy::default()).unwrap();

        assert_eq!(nets.len(), 4);
        assert_eq!(nets.nets().count(), 4);
        for alias in ["A0", "A1", "A2", "A3"] {
            assert_eq!(nets.get(alias).unwrap().first_alias(), alias);
        }
    }

    #[test]
    fn missing_nets_key_is_an_error() {
        let error = load_nets_yml("components: []\n", MergePolicy::default()).unwrap_err();
        assert!(matches!(error, NetLoadError::MissingNets));
    }

    #[test]
    fn non_string_entry_is_an_error() {
        let error = load_nets_yml("nets:\n  - A\n  - [B]\n", MergePolicy::default()).unwrap_err();
        assert!(matches!(error, NetLoadError::InvalidEntry { index: 1 }));
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"nets:\n  - GPS_UART, U33.4\n  - PPS_OUTPUT\n")
            .unwrap();

        let nets = load_nets_yml_file(file.path(), MergePolicy::default()).unwrap();
        assert_eq!(nets.len(), 3);
        assert!(nets.same_net("GPS_UART", "U33.4"));
    }
}
