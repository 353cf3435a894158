//! The component tree.
//!
//! A declarative description is parsed into a [`NodeTree`], an arena of
//! [`Node`]s addressed by [`NodeId`]. Children are attached to their parent
//! once, while the tree is built, so the parent links always form a tree.

use std::{fmt, path::Path};

use serde_yaml::{Mapping, Value};
use thiserror::Error;
use tracing::instrument;

use crate::domain::{
    interface::{DomainInterface, FieldError},
    net::QUALIFIED_NAME_SEPARATOR,
    template::{self, TemplateError},
    Config,
};

/// The name given to a root node that does not declare one.
pub const DEFAULT_ROOT_NAME: &str = "root";

/// Index of a node within its [`NodeTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(usize);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A hardware component, sub-component or interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    /// Local, unqualified name.
    pub name: String,
    /// Free-form description.
    pub description: String,
    /// When set, the parent must be established before this node, instead of
    /// this node being a precondition of the parent.
    pub required: bool,
    /// Whether the node is directly verifiable.
    pub testable: bool,
    /// Qualified names this node additionally depends on.
    pub implies: Vec<String>,
    /// Shared identifiers (nets, testpoints) linking this node to others.
    pub edges: Vec<String>,
    /// Domain specific payload.
    pub data: Mapping,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

impl Node {
    /// The node's parent, if any.
    #[must_use]
    pub const fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// The node's children, in declaration order.
    #[must_use]
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }
}

/// Errors that can occur while parsing a declarative tree.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    /// A node entry is not a mapping.
    #[error("node at '{path}' is not a mapping")]
    NotAMapping {
        /// Qualified path of the offending entry.
        path: String,
    },

    /// A node field has the wrong shape.
    #[error("node '{path}': {source}")]
    Field {
        /// Qualified path of the offending node.
        path: String,
        /// The field error.
        #[source]
        source: FieldError,
    },
}

/// An arena-backed tree of [`Node`]s.
#[derive(Debug, Clone)]
pub struct NodeTree {
    nodes: Vec<Node>,
}

impl NodeTree {
    /// Parses a declarative root node.
    ///
    /// A root without a name is called [`DEFAULT_ROOT_NAME`].
    ///
    /// # Errors
    ///
    /// Returns an error if any node is not a mapping or has a wrongly typed
    /// field.
    pub fn parse(root: &Value, interface: &dyn DomainInterface) -> Result<Self, ParseError> {
        Self::parse_with_root_name(root, interface, DEFAULT_ROOT_NAME)
    }

    /// Parses a declarative root node, naming an unnamed root `root_name`.
    ///
    /// # Errors
    ///
    /// See [`NodeTree::parse`].
    pub fn parse_with_root_name(
        root: &Value,
        interface: &dyn DomainInterface,
        root_name: &str,
    ) -> Result<Self, ParseError> {
        let mut tree = Self { nodes: Vec::new() };
        tree.parse_node(root, interface, None, root_name)?;
        Ok(tree)
    }

    fn parse_node(
        &mut self,
        value: &Value,
        interface: &dyn DomainInterface,
        parent: Option<NodeId>,
        default_name: &str,
    ) -> Result<NodeId, ParseError> {
        let path_of = |tree: &Self, name: &str| {
            parent.map_or_else(|| name.to_string(), |parent| tree.child_qualname(parent, name))
        };

        let Some(mapping) = value.as_mapping() else {
            return Err(ParseError::NotAMapping {
                path: path_of(self, "?"),
            });
        };

        let mut name = interface.name(mapping).map_err(|source| ParseError::Field {
            path: path_of(self, "?"),
            source,
        })?;
        if name.is_empty() {
            name = default_name.to_string();
        }
        let field_error = |tree: &Self| {
            let path = path_of(tree, &name);
            move |source| ParseError::Field { path, source }
        };

        let children = interface.nodes(mapping).map_err(field_error(self))?;
        let node = Node {
            description: interface.description(mapping).map_err(field_error(self))?,
            required: interface.required(mapping).map_err(field_error(self))?,
            testable: interface.testable(mapping).map_err(field_error(self))?,
            implies: interface.implies(mapping).map_err(field_error(self))?,
            edges: interface.edges(mapping).map_err(field_error(self))?,
            data: interface.data(mapping),
            name,
            parent: None,
            children: Vec::new(),
        };

        let id = self.push(node);
        if let Some(parent) = parent {
            self.attach(id, parent);
        }

        for child in children {
            self.parse_node(child, interface, Some(id), "")?;
        }

        Ok(id)
    }

    fn push(&mut self, node: Node) -> NodeId {
        self.nodes.push(node);
        NodeId(self.nodes.len() - 1)
    }

    fn attach(&mut self, child: NodeId, parent: NodeId) {
        debug_assert!(
            self.nodes[child.0].parent.is_none(),
            "node {child} is already attached"
        );
        self.nodes[child.0].parent = Some(parent);
        self.nodes[parent.0].children.push(child);
    }

    /// The root of the tree.
    #[must_use]
    pub const fn root(&self) -> NodeId {
        NodeId(0)
    }

    /// Retrieves a node by id.
    ///
    /// # Panics
    ///
    /// Panics if the id belongs to another tree.
    #[must_use]
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    /// The number of nodes in the tree.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the tree is empty. A parsed tree always holds its root.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// The parent of a node.
    #[must_use]
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).parent
    }

    /// The children of a node, in declaration order.
    pub fn children(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.node(id).children.iter().copied()
    }

    /// Whether a node has a direct child with the given name.
    #[must_use]
    pub fn contains(&self, id: NodeId, name: &str) -> bool {
        self.children(id).any(|child| self.node(child).name == name)
    }

    /// The dot-joined path from the root to a node.
    #[must_use]
    pub fn qualname(&self, id: NodeId) -> String {
        let mut names = vec![self.node(id).name.as_str()];
        let mut current = id;
        while let Some(parent) = self.parent(current) {
            names.push(&self.node(parent).name);
            current = parent;
        }
        names.reverse();
        names.join(QUALIFIED_NAME_SEPARATOR)
    }

    fn child_qualname(&self, parent: NodeId, name: &str) -> String {
        [self.qualname(parent).as_str(), name].join(QUALIFIED_NAME_SEPARATOR)
    }

    /// Finds the first node (in pre-order) with the given qualified name.
    #[must_use]
    pub fn find(&self, qualname: &str) -> Option<NodeId> {
        self.iter().find(|&id| self.qualname(id) == qualname)
    }

    /// Iterates over every node in pre-order, root first.
    #[must_use]
    pub fn iter(&self) -> PreOrder<'_> {
        PreOrder {
            tree: self,
            stack: if self.nodes.is_empty() {
                Vec::new()
            } else {
                vec![self.root()]
            },
        }
    }
}

impl<'a> IntoIterator for &'a NodeTree {
    type Item = NodeId;
    type IntoIter = PreOrder<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Pre-order traversal of a [`NodeTree`].
#[derive(Debug)]
pub struct PreOrder<'a> {
    tree: &'a NodeTree,
    stack: Vec<NodeId>,
}

impl Iterator for PreOrder<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.stack.pop()?;
        self.stack
            .extend(self.tree.node(id).children.iter().rev().copied());
        Some(id)
    }
}

/// Errors that can occur while loading a tree document.
#[derive(Debug, Error)]
pub enum LoadError {
    /// The file could not be read.
    #[error("failed to read tree document: {0}")]
    Io(#[from] std::io::Error),

    /// The template pass failed.
    #[error(transparent)]
    Template(#[from] TemplateError),

    /// The rendered document is not valid YAML.
    #[error("failed to parse tree YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// The document does not describe a valid tree.
    #[error(transparent)]
    Parse(#[from] ParseError),
}

/// Renders (when enabled) and parses a YAML tree document.
///
/// # Errors
///
/// Returns an error if the template pass fails, the YAML is malformed, or the
/// document is not a valid tree.
#[instrument(level = "debug", skip(text, config))]
pub fn load_tree_yml(text: &str, config: &Config) -> Result<NodeTree, LoadError> {
    let rendered = if config.render_templates {
        template::render(text, &config.render_context)?
    } else {
        text.to_string()
    };
    let document: Value = serde_yaml::from_str(&rendered)?;
    let tree = NodeTree::parse_with_root_name(
        &document,
        config.domain.interface().as_ref(),
        &config.root_name,
    )?;
    tracing::debug!(nodes = tree.len(), "parsed component tree");
    Ok(tree)
}

/// Reads a YAML tree document from disk. See [`load_tree_yml`].
///
/// # Errors
///
/// Returns an error if the file cannot be read or [`load_tree_yml`] fails.
pub fn load_tree_yml_file(path: &Path, config: &Config) -> Result<NodeTree, LoadError> {
    let text = std::fs::read_to_string(path)?;
    load_tree_yml(&text, config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::interface::{ElectricalInterface, GenericInterface};

    fn parse_generic(yaml: &str) -> NodeTree {
        let value: Value = serde_yaml::from_str(yaml).unwrap();
        NodeTree::parse(&value, &GenericInterface).unwrap()
    }

    #[test]
    fn unnamed_root_defaults_to_root() {
        let tree = parse_generic("nodes: []\n");
        assert_eq!(tree.node(tree.root()).name, "root");
        assert_eq!(tree.qualname(tree.root()), "root");
    }

    #[test]
    fn named_root_keeps_its_name() {
        let tree = parse_generic("name: board\n");
        assert_eq!(tree.qualname(tree.root()), "board");
    }

    #[test]
    fn children_are_attached_and_qualified() {
        let tree = parse_generic(
            "nodes:\n  - name: power\n    nodes:\n      - name: 5V\n      - name: 3V\n  - name: gps\n",
        );

        let qualnames: Vec<_> = tree.iter().map(|id| tree.qualname(id)).collect();
        assert_eq!(
            qualnames,
            ["root", "root.power", "root.power.5V", "root.power.3V", "root.gps"]
        );

        let power = tree.find("root.power").unwrap();
        assert_eq!(tree.parent(power), Some(tree.root()));
        assert!(tree.contains(power, "5V"));
        assert!(!tree.contains(power, "gps"));
        assert_eq!(tree.children(power).count(), 2);
        assert!(tree.find("root.power.12V").is_none());
    }

    #[test]
    fn fields_default_when_absent() {
        let tree = parse_generic("nodes:\n  - name: a\n");
        let node = tree.node(tree.find("root.a").unwrap());

        assert_eq!(node.description, "");
        assert!(!node.required);
        assert!(!node.testable);
        assert!(node.implies.is_empty());
        assert!(node.edges.is_empty());
        assert!(node.data.is_empty());
    }

    #[test]
    fn fields_are_read() {
        let tree = parse_generic(
            "nodes:\n  - name: a\n    description: first\n    required: true\n    testable: true\n    implies: [root.b]\n    edges: [NET1, [NET2, NET3]]\n",
        );
        let node = tree.node(tree.find("root.a").unwrap());

        assert_eq!(node.description, "first");
        assert!(node.required);
        assert!(node.testable);
        assert_eq!(node.implies, ["root.b"]);
        assert_eq!(node.edges, ["NET1", "NET2", "NET3"]);
    }

    #[test]
    fn borrowed_tree_iterates_in_pre_order() {
        let tree = parse_generic("nodes:\n  - name: a\n    nodes:\n      - name: b\n  - name: c\n");

        let mut names = Vec::new();
        for id in &tree {
            names.push(tree.node(id).name.as_str());
        }
        assert_eq!(names, ["root", "a", "b", "c"]);
        assert!(tree.iter().eq(&tree));
    }

    #[test]
    fn parses_are_independent() {
        let first = parse_generic("nodes:\n  - name: a\n    edges: [X]\n");
        let second = parse_generic("nodes:\n  - name: b\n");

        assert_eq!(first.node(first.find("root.a").unwrap()).edges, ["X"]);
        assert!(second.node(second.find("root.b").unwrap()).edges.is_empty());
    }

    #[test]
    fn electrical_tree_uses_components() {
        let value: Value = serde_yaml::from_str(
            "components:\n  - name: gps\n    refdes: U33\n    testable: true\n    components:\n      - name: uart\n        testpoints: [GPS_UART]\n",
        )
        .unwrap();
        let tree = NodeTree::parse(&value, &ElectricalInterface).unwrap();

        let gps = tree.node(tree.find("root.gps").unwrap());
        assert!(!gps.testable);
        assert_eq!(gps.data.get("refdes").and_then(Value::as_str), Some("U33"));

        let uart = tree.node(tree.find("root.gps.uart").unwrap());
        assert_eq!(uart.edges, ["GPS_UART"]);
    }

    #[test]
    fn non_mapping_child_is_rejected() {
        let value: Value = serde_yaml::from_str("nodes:\n  - name: a\n    nodes: [oops]\n").unwrap();
        let error = NodeTree::parse(&value, &GenericInterface).unwrap_err();

        assert_eq!(
            error,
            ParseError::NotAMapping {
                path: "root.a.?".to_string()
            }
        );
    }

    #[test]
    fn wrongly_typed_field_reports_path() {
        let value: Value = serde_yaml::from_str("nodes:\n  - name: a\n    required: maybe\n").unwrap();
        let error = NodeTree::parse(&value, &GenericInterface).unwrap_err();

        assert!(matches!(error, ParseError::Field { ref path, .. } if path == "root.a"));
    }

    #[test]
    fn load_applies_config() {
        let config = Config {
            domain: crate::domain::Domain::Generic,
            root_name: "board".to_string(),
            ..Config::default()
        };
        let tree = load_tree_yml(
            "nodes:\n{% for i in range(3) %}\n  - name: gpio{{ i }}\n{% endfor %}\n",
            &config,
        )
        .unwrap();

        assert_eq!(tree.len(), 4);
        assert!(tree.find("board.gpio2").is_some());
    }

    #[test]
    fn load_without_templates_keeps_braces() {
        let config = Config {
            domain: crate::domain::Domain::Generic,
            render_templates: false,
            ..Config::default()
        };
        let tree = load_tree_yml("nodes:\n  - name: \"{{ raw }}\"\n", &config).unwrap();
        assert!(tree.find("root.{{ raw }}").is_some());
    }
}
