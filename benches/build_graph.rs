//! This bench builds the dependency graph of a wide board where many
//! components share a handful of buses, which exercises the pairwise
//! testable-vertex phase.

#![allow(missing_docs)]

use std::fmt::Write;

use covgraph::{domain::GenericInterface, Context};
use criterion::{criterion_group, criterion_main, Criterion};

/// Generates a tree of `width` chips, each with a few pins on shared buses.
fn wide_board(width: usize) -> serde_yaml::Value {
    let mut yaml = String::from("name: board\nnodes:\n");
    for chip in 0..width {
        writeln!(yaml, "  - name: chip{chip}").unwrap();
        writeln!(yaml, "    implies: [board.chip{}]", (chip + 1) % width).unwrap();
        yaml.push_str("    nodes:\n");
        for pin in 0..4 {
            writeln!(yaml, "      - name: pin{pin}").unwrap();
            writeln!(yaml, "        edges: [BUS{}]", (chip + pin) % 8).unwrap();
        }
    }
    serde_yaml::from_str(&yaml).unwrap()
}

fn build_graph(c: &mut Criterion) {
    let value = wide_board(64);
    let context = Context::new(GenericInterface).parse(&value).unwrap();

    c.bench_function("build graph", |b| {
        b.iter(|| context.build_graph().unwrap());
    });
}

criterion_group!(benches, build_graph);
criterion_main!(benches);
