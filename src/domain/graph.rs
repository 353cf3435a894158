//! The coverage dependency graph.
//!
//! A [`Context`] parses a declarative tree and builds a [`DependencyGraph`] over
//! qualified names. The build has two phases:
//!
//! 1. Implied dependencies, from the tree shape and `implies` lists. A child
//!    that is not `required` must be verified before its parent (child →
//!    parent). A `required` child inverts the relationship (parent → child).
//!    Every `implies` entry adds node → implied.
//! 2. Testable dependencies, from shared edge names. For every pair of nodes
//!    declaring the same edge name a synthetic testable vertex
//!    `"{u}/{edge}/{v}"` is added, pointing at both.
//!
//! The builder does not validate the result: `implies` targets may not exist
//! and cycles are legal. [`DependencyGraph::dangling_references`] and
//! [`DependencyGraph::cycles`] are available as separate checks.

use std::{
    collections::{BTreeMap, HashMap},
    fmt,
};

use petgraph::{
    algo::{is_cyclic_directed, tarjan_scc},
    dot::{Config as DotConfig, Dot},
    graph::{DiGraph, NodeIndex},
    visit::EdgeRef,
};
use serde::Serialize;
use serde_yaml::Value;
use thiserror::Error;
use tracing::instrument;

use crate::domain::{
    interface::DomainInterface,
    net::QUALIFIED_NAME_SEPARATOR,
    node::{Node, NodeId, NodeTree, ParseError, DEFAULT_ROOT_NAME},
    Config,
};

/// Separator between the parts of a synthetic testable vertex name.
pub const TESTABLE_SEPARATOR: char = '/';

/// The reason a dependency edge exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DependencyKind {
    /// Derived from the parent/child relationship.
    Parent,
    /// Declared by an `implies` entry.
    Implies,
    /// From a synthetic testable vertex to one of the nodes sharing an edge.
    Testable,
}

impl fmt::Display for DependencyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Parent => "parent",
            Self::Implies => "implies",
            Self::Testable => "testable",
        };
        f.write_str(label)
    }
}

/// A shared interconnect between two nodes, verifiable only by exercising
/// both of them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestableEdge {
    /// The shared edge name, e.g. a net or testpoint.
    pub link: String,
    /// Qualified name of the node declared first.
    pub u: String,
    /// Qualified name of the node declared second.
    pub v: String,
}

impl TestableEdge {
    /// The vertex name, `"{u}/{link}/{v}"`.
    #[must_use]
    pub fn qualname(&self) -> String {
        format!(
            "{}{TESTABLE_SEPARATOR}{}{TESTABLE_SEPARATOR}{}",
            self.u, self.link, self.v
        )
    }
}

/// Where a vertex came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Origin<'t> {
    /// A node of the parsed tree.
    Node {
        /// The node's id within its tree.
        id: NodeId,
        /// The node itself.
        node: &'t Node,
    },
    /// A synthetic vertex for a shared edge.
    Testable(TestableEdge),
    /// Only referenced as the target of an `implies` edge.
    Dangling,
}

impl Origin<'_> {
    /// Whether the vertex is directly verifiable.
    #[must_use]
    pub const fn is_testable(&self) -> bool {
        match self {
            Self::Node { node, .. } => node.testable,
            Self::Testable(_) => true,
            Self::Dangling => false,
        }
    }

    /// A short label for the kind of origin.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Node { .. } => "node",
            Self::Testable(_) => "testable",
            Self::Dangling => "dangling",
        }
    }
}

/// A vertex of the dependency graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Vertex<'t> {
    /// The vertex key.
    pub qualname: String,
    /// Where the vertex came from.
    pub origin: Origin<'t>,
}

impl fmt::Display for Vertex<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.qualname)
    }
}

/// The single fatal build condition.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BuildError {
    /// A `required` node has no parent to depend on.
    #[error("node '{qualname}' is required but has no parent")]
    RequiredWithoutParent {
        /// Qualified name of the offending node.
        qualname: String,
    },
}

/// Receives notifications while a graph is built.
pub trait BuildObserver {
    /// A vertex was added, or an existing vertex was overwritten.
    fn vertex_added(&mut self, _qualname: &str) {}

    /// An edge was added.
    fn edge_added(&mut self, _from: &str, _to: &str, _kind: DependencyKind) {}
}

/// Emits build notifications as `tracing` events.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl BuildObserver for TracingObserver {
    fn vertex_added(&mut self, qualname: &str) {
        tracing::debug!(qualname, "add vertex");
    }

    fn edge_added(&mut self, from: &str, to: &str, kind: DependencyKind) {
        tracing::debug!(from, to, %kind, "add edge");
    }
}

/// A build notification recorded by [`EventLog`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildEvent {
    /// See [`BuildObserver::vertex_added`].
    VertexAdded(String),
    /// See [`BuildObserver::edge_added`].
    EdgeAdded {
        /// Source qualname.
        from: String,
        /// Destination qualname.
        to: String,
        /// Edge kind.
        kind: DependencyKind,
    },
}

/// Records build notifications in order.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    /// The recorded events.
    pub events: Vec<BuildEvent>,
}

impl BuildObserver for EventLog {
    fn vertex_added(&mut self, qualname: &str) {
        self.events.push(BuildEvent::VertexAdded(qualname.to_string()));
    }

    fn edge_added(&mut self, from: &str, to: &str, kind: DependencyKind) {
        self.events.push(BuildEvent::EdgeAdded {
            from: from.to_string(),
            to: to.to_string(),
            kind,
        });
    }
}

/// A tree that has not been parsed yet.
#[derive(Debug)]
pub struct Unparsed {
    interface: Box<dyn DomainInterface>,
}

/// A parsed tree, ready to build graphs from.
#[derive(Debug, Clone)]
pub struct Parsed {
    tree: NodeTree,
}

/// Parses declarative trees and builds dependency graphs from them.
///
/// The state parameter tracks progress: only a `Context<Parsed>` can build a
/// graph.
#[derive(Debug)]
pub struct Context<S> {
    root_name: String,
    state: S,
}

impl Context<Unparsed> {
    /// Creates a context reading nodes through the given interface.
    #[must_use]
    pub fn new(interface: impl DomainInterface + 'static) -> Self {
        Self::with_interface(Box::new(interface))
    }

    /// Creates a context from a boxed interface.
    #[must_use]
    pub fn with_interface(interface: Box<dyn DomainInterface>) -> Self {
        Self {
            root_name: DEFAULT_ROOT_NAME.to_string(),
            state: Unparsed { interface },
        }
    }

    /// Creates a context using the configured domain and root name.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            root_name: config.root_name.clone(),
            state: Unparsed {
                interface: config.domain.interface(),
            },
        }
    }

    /// Parses a declarative root node.
    ///
    /// # Errors
    ///
    /// Returns an error if the document is not a valid tree.
    pub fn parse(self, root: &Value) -> Result<Context<Parsed>, ParseError> {
        let tree = NodeTree::parse_with_root_name(
            root,
            self.state.interface.as_ref(),
            &self.root_name,
        )?;
        Ok(Context {
            root_name: self.root_name,
            state: Parsed { tree },
        })
    }
}

impl From<NodeTree> for Context<Parsed> {
    fn from(tree: NodeTree) -> Self {
        let root_name = tree.node(tree.root()).name.clone();
        Self {
            root_name,
            state: Parsed { tree },
        }
    }
}

impl Context<Parsed> {
    /// The parsed tree.
    #[must_use]
    pub const fn tree(&self) -> &NodeTree {
        &self.state.tree
    }

    /// The name of the tree's root.
    #[must_use]
    pub fn root_name(&self) -> &str {
        &self.root_name
    }

    /// Builds the dependency graph, reporting progress as `tracing` events.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::RequiredWithoutParent`] if a `required` node has
    /// no parent. No partial graph is returned.
    pub fn build_graph(&self) -> Result<DependencyGraph<'_>, BuildError> {
        self.build_graph_with(&mut TracingObserver)
    }

    /// Builds the dependency graph, reporting progress to `observer`.
    ///
    /// # Errors
    ///
    /// See [`Context::build_graph`].
    #[instrument(level = "debug", skip_all, fields(root = %self.root_name))]
    pub fn build_graph_with(
        &self,
        observer: &mut dyn BuildObserver,
    ) -> Result<DependencyGraph<'_>, BuildError> {
        let tree = &self.state.tree;
        let mut builder = Builder {
            graph: DependencyGraph::default(),
            observer,
        };

        // Edge name -> qualnames declaring it, in declaration order.
        let mut links: BTreeMap<&str, Vec<String>> = BTreeMap::new();
        let mut qualnames: HashMap<NodeId, String> = HashMap::with_capacity(tree.len());

        for id in tree.iter() {
            let node = tree.node(id);
            let qualname = tree.parent(id).map_or_else(
                || node.name.clone(),
                |parent| {
                    format!("{}{QUALIFIED_NAME_SEPARATOR}{}", qualnames[&parent], node.name)
                },
            );
            builder.add_vertex(&qualname, Origin::Node { id, node });

            for link in &node.edges {
                let declared = links.entry(link.as_str()).or_default();
                if !declared.contains(&qualname) {
                    declared.push(qualname.clone());
                }
            }

            match (tree.parent(id), node.required) {
                (Some(parent), true) => {
                    builder.add_edge(&qualnames[&parent], &qualname, DependencyKind::Parent);
                }
                (Some(parent), false) => {
                    builder.add_edge(&qualname, &qualnames[&parent], DependencyKind::Parent);
                }
                (None, true) => {
                    return Err(BuildError::RequiredWithoutParent { qualname });
                }
                (None, false) => {}
            }

            for implied in &node.implies {
                builder.add_edge(&qualname, implied, DependencyKind::Implies);
            }

            qualnames.insert(id, qualname);
        }

        for (link, declared) in links {
            for (i, u) in declared.iter().enumerate() {
                for v in &declared[i + 1..] {
                    builder.add_testable(TestableEdge {
                        link: link.to_string(),
                        u: u.clone(),
                        v: v.clone(),
                    });
                }
            }
        }

        let graph = builder.graph;
        tracing::debug!(
            vertices = graph.vertex_count(),
            edges = graph.edge_count(),
            "built dependency graph"
        );
        Ok(graph)
    }
}

struct Builder<'t, 'o> {
    graph: DependencyGraph<'t>,
    observer: &'o mut dyn BuildObserver,
}

impl<'t> Builder<'t, '_> {
    fn add_vertex(&mut self, qualname: &str, origin: Origin<'t>) -> NodeIndex {
        self.observer.vertex_added(qualname);
        let vertex = Vertex {
            qualname: qualname.to_string(),
            origin,
        };
        if let Some(&index) = self.graph.index.get(qualname) {
            if matches!(self.graph.graph[index].origin, Origin::Node { .. })
                && matches!(vertex.origin, Origin::Node { .. })
            {
                tracing::warn!(qualname, "duplicate qualified name overwrites vertex");
            }
            self.graph.graph[index] = vertex;
            return index;
        }
        let index = self.graph.graph.add_node(vertex);
        self.graph.index.insert(qualname.to_string(), index);
        index
    }

    fn vertex_or_dangling(&mut self, qualname: &str) -> NodeIndex {
        if let Some(&index) = self.graph.index.get(qualname) {
            return index;
        }
        self.add_vertex(qualname, Origin::Dangling)
    }

    fn add_edge(&mut self, from: &str, to: &str, kind: DependencyKind) {
        self.observer.edge_added(from, to, kind);
        let a = self.vertex_or_dangling(from);
        let b = self.vertex_or_dangling(to);
        self.graph.graph.update_edge(a, b, kind);
    }

    fn add_testable(&mut self, edge: TestableEdge) {
        let qualname = edge.qualname();
        let (u, v) = (edge.u.clone(), edge.v.clone());
        self.add_vertex(&qualname, Origin::Testable(edge));
        self.add_edge(&qualname, &u, DependencyKind::Testable);
        self.add_edge(&qualname, &v, DependencyKind::Testable);
    }
}

/// A directed dependency graph over qualified names.
///
/// An edge `a → b` means `a` must be verified before `b` can be considered
/// covered. Parallel edges collapse to one.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph<'t> {
    graph: DiGraph<Vertex<'t>, DependencyKind>,
    index: HashMap<String, NodeIndex>,
}

impl<'t> DependencyGraph<'t> {
    /// The number of vertices.
    #[must_use]
    pub fn vertex_count(&self) -> usize {
        self.graph.node_count()
    }

    /// The number of edges.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Iterates over every vertex, in insertion order.
    pub fn vertices(&self) -> impl Iterator<Item = &Vertex<'t>> {
        self.graph.node_weights()
    }

    /// Iterates over every edge as `(from, to, kind)`.
    pub fn edges(&self) -> impl Iterator<Item = (&str, &str, DependencyKind)> {
        self.graph.edge_references().map(|edge| {
            (
                self.graph[edge.source()].qualname.as_str(),
                self.graph[edge.target()].qualname.as_str(),
                *edge.weight(),
            )
        })
    }

    /// Looks up a vertex by qualified name.
    #[must_use]
    pub fn vertex(&self, qualname: &str) -> Option<&Vertex<'t>> {
        self.index.get(qualname).map(|&index| &self.graph[index])
    }

    /// Looks up the tree node a vertex originates from.
    #[must_use]
    pub fn node(&self, qualname: &str) -> Option<&'t Node> {
        match self.vertex(qualname)?.origin {
            Origin::Node { node, .. } => Some(node),
            _ => None,
        }
    }

    /// Whether the graph holds a vertex with this qualified name.
    #[must_use]
    pub fn contains(&self, qualname: &str) -> bool {
        self.index.contains_key(qualname)
    }

    /// The kind of the edge `from → to`, if present.
    #[must_use]
    pub fn edge(&self, from: &str, to: &str) -> Option<DependencyKind> {
        let a = *self.index.get(from)?;
        let b = *self.index.get(to)?;
        self.graph.find_edge(a, b).map(|edge| self.graph[edge])
    }

    /// Whether the edge `from → to` exists.
    #[must_use]
    pub fn has_edge(&self, from: &str, to: &str) -> bool {
        self.edge(from, to).is_some()
    }

    /// Qualified names this vertex points at.
    pub fn successors<'a>(&'a self, qualname: &str) -> impl Iterator<Item = &'a str> + 'a {
        self.index
            .get(qualname)
            .into_iter()
            .flat_map(move |&index| self.graph.neighbors(index))
            .map(move |index| self.graph[index].qualname.as_str())
    }

    /// Qualified names pointing at this vertex.
    pub fn predecessors<'a>(&'a self, qualname: &str) -> impl Iterator<Item = &'a str> + 'a {
        self.index
            .get(qualname)
            .into_iter()
            .flat_map(move |&index| {
                self.graph
                    .neighbors_directed(index, petgraph::Direction::Incoming)
            })
            .map(move |index| self.graph[index].qualname.as_str())
    }

    /// Vertices that are only known as `implies` targets.
    pub fn dangling_references(&self) -> impl Iterator<Item = &str> {
        self.vertices()
            .filter(|vertex| vertex.origin == Origin::Dangling)
            .map(|vertex| vertex.qualname.as_str())
    }

    /// Directly verifiable vertices.
    pub fn testable_vertices(&self) -> impl Iterator<Item = &Vertex<'t>> {
        self.vertices().filter(|vertex| vertex.origin.is_testable())
    }

    /// Whether the graph contains a cycle.
    #[must_use]
    pub fn has_cycles(&self) -> bool {
        is_cyclic_directed(&self.graph)
    }

    /// Groups of vertices that depend on each other, including self-loops.
    #[must_use]
    pub fn cycles(&self) -> Vec<Vec<&str>> {
        tarjan_scc(&self.graph)
            .into_iter()
            .filter(|component| match component.as_slice() {
                [single] => self.graph.contains_edge(*single, *single),
                _ => true,
            })
            .map(|component| {
                let mut names: Vec<_> = component
                    .into_iter()
                    .map(|index| self.graph[index].qualname.as_str())
                    .collect();
                names.sort_unstable();
                names
            })
            .collect()
    }

    /// Renders the graph in Graphviz DOT format.
    #[must_use]
    pub fn to_dot(&self) -> String {
        let escape = |s: &str| s.replace('\\', "\\\\").replace('"', "\\\"");
        format!(
            "{:?}",
            Dot::with_attr_getters(
                &self.graph,
                &[DotConfig::NodeNoLabel, DotConfig::EdgeNoLabel],
                &|_, edge| format!("label = \"{}\"", edge.weight()),
                &|_, (_, vertex)| {
                    let shape = match vertex.origin {
                        Origin::Node { .. } => "box",
                        Origin::Testable(_) => "ellipse",
                        Origin::Dangling => "plaintext",
                    };
                    format!("label = \"{}\" shape = {shape}", escape(&vertex.qualname))
                },
            )
        )
    }

    /// A serialisable snapshot of vertices and edges.
    #[must_use]
    pub fn export(&self) -> GraphExport {
        GraphExport {
            vertices: self
                .vertices()
                .map(|vertex| VertexExport {
                    qualname: vertex.qualname.clone(),
                    origin: vertex.origin.label(),
                    testable: vertex.origin.is_testable(),
                    description: match vertex.origin {
                        Origin::Node { node, .. } => node.description.clone(),
                        _ => String::new(),
                    },
                })
                .collect(),
            edges: self
                .edges()
                .map(|(from, to, kind)| EdgeExport {
                    from: from.to_string(),
                    to: to.to_string(),
                    kind,
                })
                .collect(),
        }
    }
}

/// A serialisable snapshot of a [`DependencyGraph`].
#[derive(Debug, Clone, Serialize)]
pub struct GraphExport {
    /// Every vertex.
    pub vertices: Vec<VertexExport>,
    /// Every edge.
    pub edges: Vec<EdgeExport>,
}

/// A vertex of a [`GraphExport`].
#[derive(Debug, Clone, Serialize)]
pub struct VertexExport {
    /// The vertex key.
    pub qualname: String,
    /// `node`, `testable` or `dangling`.
    pub origin: &'static str,
    /// Whether the vertex is directly verifiable.
    pub testable: bool,
    /// The originating node's description.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub description: String,
}

/// An edge of a [`GraphExport`].
#[derive(Debug, Clone, Serialize)]
pub struct EdgeExport {
    /// Source qualname.
    pub from: String,
    /// Destination qualname.
    pub to: String,
    /// Edge kind.
    pub kind: DependencyKind,
}
