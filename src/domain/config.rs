use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_yaml::Mapping;

use crate::domain::{interface::Domain, net::MergePolicy, node::DEFAULT_ROOT_NAME};

/// Configuration for loading component trees and net-lists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Versions", into = "Versions")]
pub struct Config {
    /// Which domain interface reads the tree documents.
    pub domain: Domain,

    /// How net tokens spanning several existing nets are merged.
    pub merge_policy: MergePolicy,

    /// Whether documents are expanded by the template pass before parsing.
    pub render_templates: bool,

    /// The name given to a root node that does not declare one.
    pub root_name: String,

    /// Variables available to the template pass.
    pub render_context: Mapping,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            domain: Domain::default(),
            merge_policy: MergePolicy::default(),
            render_templates: true,
            root_name: default_root_name(),
            render_context: Mapping::new(),
        }
    }
}

impl Config {
    /// Loads the configuration from a TOML file at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or if the TOML content is
    /// invalid.
    pub fn load(path: &Path) -> Result<Self, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file: {e}"))?;
        toml::from_str(&content).map_err(|e| format!("Failed to parse config file: {e}"))
    }

    /// Saves the configuration to a TOML file at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration cannot be serialized to TOML or if
    /// the file cannot be written.
    pub fn save(&self, path: &Path) -> Result<(), String> {
        let content =
            toml::to_string_pretty(self).map_err(|e| format!("Failed to serialize config: {e}"))?;
        std::fs::write(path, content).map_err(|e| format!("Failed to write config file: {e}"))
    }
}

fn default_root_name() -> String {
    DEFAULT_ROOT_NAME.to_string()
}

const fn default_render_templates() -> bool {
    true
}

/// The serialized versions of the configuration.
/// This allows for future changes to the configuration format and to the domain
/// type without breaking compatibility.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "_version")]
enum Versions {
    #[serde(rename = "1")]
    V1 {
        #[serde(default)]
        domain: Domain,

        #[serde(default)]
        merge_policy: MergePolicy,

        #[serde(default = "default_render_templates")]
        render_templates: bool,

        #[serde(default = "default_root_name")]
        root_name: String,

        #[serde(default, skip_serializing_if = "Mapping::is_empty")]
        render_context: Mapping,
    },
}

impl From<Versions> for Config {
    fn from(versions: Versions) -> Self {
        match versions {
            Versions::V1 {
                domain,
                merge_policy,
                render_templates,
                root_name,
                render_context,
            } => Self {
                domain,
                merge_policy,
                render_templates,
                root_name,
                render_context,
            },
        }
    }
}

impl From<Config> for Versions {
    fn from(config: Config) -> Self {
        Self::V1 {
            domain: config.domain,
            merge_policy: config.merge_policy,
            render_templates: config.render_templates,
            root_name: config.root_name,
            render_context: config.render_context,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn load_reads_valid_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(
            b"_version = \"1\"\ndomain = \"generic\"\nmerge_policy = \"last-match\"\nrender_templates = false\nroot_name = \"board\"\n\n[render_context]\nlanes = 4\n",
        )
        .unwrap();

        let config = Config::load(file.path()).unwrap();

        assert_eq!(config.domain, Domain::Generic);
        assert_eq!(config.merge_policy, MergePolicy::LastMatch);
        assert!(!config.render_templates);
        assert_eq!(config.root_name, "board");
        assert_eq!(
            config.render_context.get("lanes").and_then(serde_yaml::Value::as_i64),
            Some(4)
        );
    }

    #[test]
    fn load_missing_file_returns_error() {
        let tmp = tempfile::tempdir().unwrap();
        let missing = tmp.path().join("missing.toml");

        let error = Config::load(&missing).unwrap_err();
        assert!(error.starts_with("Failed to read config file:"));
    }

    #[test]
    fn load_invalid_toml_returns_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"_version = \"1\"\ndomain = \"optical\"\n")
            .unwrap();

        let error = Config::load(file.path()).unwrap_err();
        assert!(error.starts_with("Failed to parse config file:"));
    }

    #[test]
    fn empty_file_returns_default() {
        let expected = Config::default();
        let actual: Config = toml::from_str(r#"_version = "1""#).unwrap();
        assert_eq!(actual, expected);
    }

    #[test]
    fn save_then_load_preserves_settings() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("covgraph.toml");
        let config = Config {
            domain: Domain::Generic,
            root_name: "carrier".to_string(),
            ..Config::default()
        };

        config.save(&path).unwrap();
        assert_eq!(Config::load(&path).unwrap(), config);
    }
}
