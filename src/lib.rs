//! Hardware Test-Coverage Dependency Graphs
//!
//! A hardware description (components, nets, testpoints and `implies`
//! relationships) is parsed into a tree and turned into a directed graph that
//! records which nodes must be verified before others.

pub mod domain;
pub use domain::{
    BuildError, Config, Context, DependencyGraph, DependencyKind, Domain, DomainInterface,
    MergePolicy, Net, NetMap, Node, NodeTree, Origin, Vertex,
};
