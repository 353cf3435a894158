use std::path::PathBuf;

use anyhow::Context as _;
use clap::Parser;
use covgraph::{domain::node::load_tree_yml_file, Config, Context, DependencyGraph, Origin};
use tracing::instrument;

use super::terminal::Paint;

#[derive(Debug, Parser)]
pub struct Graph {
    /// The YAML component tree
    file: PathBuf,

    /// Output format
    #[arg(long, value_name = "FORMAT", default_value = "text")]
    output: OutputFormat,
}

#[derive(Debug, Clone, Copy, Default, clap::ValueEnum)]
enum OutputFormat {
    #[default]
    Text,
    Dot,
    Json,
}

impl Graph {
    #[instrument(level = "debug", skip(config))]
    pub fn run(self, config: &Config) -> anyhow::Result<()> {
        let tree = load_tree_yml_file(&self.file, config)
            .with_context(|| format!("failed to load {}", self.file.display()))?;
        let context = Context::from(tree);
        let graph = context.build_graph()?;

        match self.output {
            OutputFormat::Text => print_text(&graph),
            OutputFormat::Dot => println!("{}", graph.to_dot()),
            OutputFormat::Json => println!("{}", render_json(&graph)?),
        }
        Ok(())
    }
}

fn render_json(graph: &DependencyGraph<'_>) -> serde_json::Result<String> {
    serde_json::to_string_pretty(&graph.export())
}

fn print_text(graph: &DependencyGraph<'_>) {
    for vertex in graph.vertices() {
        let name = match vertex.origin {
            Origin::Node { .. } => vertex.qualname.node(),
            Origin::Testable(_) => vertex.qualname.testable(),
            Origin::Dangling => vertex.qualname.warning(),
        };
        println!("{name} {}", format!("({})", vertex.origin.label()).dim());

        for target in graph.successors(&vertex.qualname) {
            let kind = graph
                .edge(&vertex.qualname, target)
                .map_or_else(String::new, |kind| kind.to_string());
            println!("  -> {target} {}", format!("[{kind}]").dim());
        }
    }

    println!();
    println!(
        "{} vertices, {} edges",
        graph.vertex_count(),
        graph.edge_count()
    );
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use covgraph::Domain;
    use serde_json::{json, Value};
    use tempfile::NamedTempFile;
    use test_case::test_case;

    use super::*;

    const BOARD: &str = "name: board\nnodes:\n  - name: gps\n    description: receiver\n    edges: [UART]\n  - name: fpga\n    edges: [UART]\n    implies: [board.clock]\n";

    fn fixture(yaml: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(yaml.as_bytes()).unwrap();
        file
    }

    fn generic() -> Config {
        Config {
            domain: Domain::Generic,
            ..Config::default()
        }
    }

    #[test_case(OutputFormat::Text; "text")]
    #[test_case(OutputFormat::Dot; "dot")]
    #[test_case(OutputFormat::Json; "json")]
    fn prints_every_format(output: OutputFormat) {
        let file = fixture(BOARD);
        let command = Graph {
            file: file.path().to_path_buf(),
            output,
        };
        command.run(&generic()).unwrap();
    }

    #[test]
    fn json_lists_vertices_and_edges() {
        let file = fixture(BOARD);
        let tree = load_tree_yml_file(file.path(), &generic()).unwrap();
        let context = Context::from(tree);
        let graph = context.build_graph().unwrap();

        let json: Value = serde_json::from_str(&render_json(&graph).unwrap()).unwrap();

        let vertices = json["vertices"].as_array().unwrap();
        assert_eq!(vertices.len(), graph.vertex_count());
        assert_eq!(
            vertices[1],
            json!({
                "qualname": "board.gps",
                "origin": "node",
                "testable": false,
                "description": "receiver",
            })
        );
        assert!(vertices.contains(&json!({
            "qualname": "board.clock",
            "origin": "dangling",
            "testable": false,
        })));
        assert!(vertices.contains(&json!({
            "qualname": "board.gps/UART/board.fpga",
            "origin": "testable",
            "testable": true,
        })));

        let edges = json["edges"].as_array().unwrap();
        assert_eq!(edges.len(), graph.edge_count());
        assert!(edges.contains(&json!({
            "from": "board.fpga",
            "to": "board.clock",
            "kind": "implies",
        })));
        assert!(edges.contains(&json!({
            "from": "board.gps/UART/board.fpga",
            "to": "board.gps",
            "kind": "testable",
        })));
    }

    #[test]
    fn required_root_is_an_error() {
        let file = fixture("required: true\n");
        let command = Graph {
            file: file.path().to_path_buf(),
            output: OutputFormat::Json,
        };
        assert!(command.run(&generic()).is_err());
    }
}
