//! Domain models for coverage dependency graphs.
//!
//! This module contains the net model, the component tree and its parser, the
//! dependency-graph builder, and configuration.

mod config;
pub use config::Config;

/// Dependency-graph construction and post-build checks.
pub mod graph;
pub use graph::{BuildError, Context, DependencyGraph, DependencyKind, Origin, Vertex};

/// Domain interfaces reading declarative node fields.
pub mod interface;
pub use interface::{Domain, DomainInterface, ElectricalInterface, GenericInterface};

/// Nets and alias merging.
pub mod net;
pub use net::{MergePolicy, Net, NetMap};

pub mod node;
pub use node::{Node, NodeId, NodeTree, ParseError};

/// Template expansion applied to documents before parsing.
pub mod template;
