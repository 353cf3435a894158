//! Domain interfaces read node fields out of declarative YAML mappings.
//!
//! Different domains spell the same concepts differently: a generic tree uses
//! `nodes` and `edges`, an electrical description uses `components` and
//! `testpoints`. A [`DomainInterface`] hides those differences from the
//! parser.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};
use thiserror::Error;

/// A node field that is present but has the wrong shape.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("field '{field}' must be {expected}")]
pub struct FieldError {
    /// The offending key.
    pub field: String,
    /// A description of the accepted shape.
    pub expected: &'static str,
}

impl FieldError {
    fn new(field: &str, expected: &'static str) -> Self {
        Self {
            field: field.to_string(),
            expected,
        }
    }
}

/// Reads the fields of one declarative node.
///
/// Every accessor has a default that reads the generic key of the same name
/// and falls back to an empty value when the key is absent. Implementations
/// override the accessors whose keys differ in their domain.
pub trait DomainInterface: fmt::Debug + Send + Sync {
    /// The local (unqualified) node name. Defaults to `""`.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is not a scalar.
    fn name(&self, node: &Mapping) -> Result<String, FieldError> {
        scalar_field(node, "name")
    }

    /// A free-form description. Defaults to `""`.
    ///
    /// # Errors
    ///
    /// Returns an error if the description is not a scalar.
    fn description(&self, node: &Mapping) -> Result<String, FieldError> {
        scalar_field(node, "description")
    }

    /// The declarative children of the node.
    ///
    /// # Errors
    ///
    /// Returns an error if the children are not a sequence.
    fn nodes<'a>(&self, node: &'a Mapping) -> Result<&'a [Value], FieldError> {
        sequence_field(node, "nodes")
    }

    /// The shared identifiers used to cross-link nodes, flattened one level.
    ///
    /// # Errors
    ///
    /// Returns an error if the entries are not scalars or sequences of
    /// scalars.
    fn edges(&self, node: &Mapping) -> Result<Vec<String>, FieldError> {
        flattened_field(node, "edges")
    }

    /// Whether the parent depends on this node rather than the reverse.
    ///
    /// # Errors
    ///
    /// Returns an error if the value is not a boolean.
    fn required(&self, node: &Mapping) -> Result<bool, FieldError> {
        bool_field(node, "required")
    }

    /// Qualified names this node additionally depends on.
    ///
    /// # Errors
    ///
    /// Returns an error if the value is not a sequence of scalars.
    fn implies(&self, node: &Mapping) -> Result<Vec<String>, FieldError> {
        flattened_field(node, "implies")
    }

    /// Whether the node is directly verifiable.
    ///
    /// # Errors
    ///
    /// Returns an error if the value is not a boolean.
    fn testable(&self, node: &Mapping) -> Result<bool, FieldError> {
        bool_field(node, "testable")
    }

    /// Domain specific payload attached to the node.
    fn data(&self, _node: &Mapping) -> Mapping {
        Mapping::new()
    }
}

/// Reads the generic keys: `nodes`, `edges`, `testable`.
#[derive(Debug, Clone, Copy, Default)]
pub struct GenericInterface;

impl DomainInterface for GenericInterface {}

/// Reads electrical descriptions: children under `components`, shared nets
/// under `testpoints`.
///
/// Components are never testable on their own; only the synthetic nodes
/// created for shared testpoints are. Keys the interface does not consume,
/// such as `refdes` or `type`, are kept as the node's data.
#[derive(Debug, Clone, Copy, Default)]
pub struct ElectricalInterface;

impl ElectricalInterface {
    const CONSUMED: [&'static str; 7] = [
        "name",
        "description",
        "components",
        "testpoints",
        "required",
        "implies",
        "testable",
    ];
}

impl DomainInterface for ElectricalInterface {
    fn nodes<'a>(&self, node: &'a Mapping) -> Result<&'a [Value], FieldError> {
        sequence_field(node, "components")
    }

    fn edges(&self, node: &Mapping) -> Result<Vec<String>, FieldError> {
        flattened_field(node, "testpoints")
    }

    fn testable(&self, _node: &Mapping) -> Result<bool, FieldError> {
        Ok(false)
    }

    fn data(&self, node: &Mapping) -> Mapping {
        node.iter()
            .filter(|(key, _)| {
                key.as_str()
                    .is_none_or(|key| !Self::CONSUMED.contains(&key))
            })
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }
}

/// The built-in domains, selectable from configuration.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
pub enum Domain {
    /// `nodes` / `edges` keys.
    Generic,
    /// `components` / `testpoints` keys.
    #[default]
    Electrical,
}

impl Domain {
    /// The interface that reads this domain.
    #[must_use]
    pub fn interface(self) -> Box<dyn DomainInterface> {
        match self {
            Self::Generic => Box::new(GenericInterface),
            Self::Electrical => Box::new(ElectricalInterface),
        }
    }
}

fn scalar(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn scalar_field(node: &Mapping, field: &str) -> Result<String, FieldError> {
    match node.get(field) {
        None | Some(Value::Null) => Ok(String::new()),
        Some(value) => scalar(value).ok_or_else(|| FieldError::new(field, "a scalar")),
    }
}

fn bool_field(node: &Mapping, field: &str) -> Result<bool, FieldError> {
    match node.get(field) {
        None | Some(Value::Null) => Ok(false),
        Some(value) => value
            .as_bool()
            .ok_or_else(|| FieldError::new(field, "a boolean")),
    }
}

fn sequence_field<'a>(node: &'a Mapping, field: &str) -> Result<&'a [Value], FieldError> {
    match node.get(field) {
        None | Some(Value::Null) => Ok(&[]),
        Some(value) => value
            .as_sequence()
            .map(Vec::as_slice)
            .ok_or_else(|| FieldError::new(field, "a sequence")),
    }
}

/// Reads a sequence of names where an entry may itself be a sequence of
/// names; nested sequences are spliced into the result.
fn flattened_field(node: &Mapping, field: &str) -> Result<Vec<String>, FieldError> {
    let invalid = || FieldError::new(field, "a sequence of names or name lists");

    let mut names = Vec::new();
    for entry in sequence_field(node, field)? {
        match entry {
            Value::Sequence(inner) => {
                for name in inner {
                    names.push(scalar(name).ok_or_else(invalid)?);
                }
            }
            other => names.push(scalar(other).ok_or_else(invalid)?),
        }
    }
    Ok(names)
}
