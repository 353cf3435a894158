use std::path::PathBuf;

use anyhow::Context as _;
use clap::Parser;
use covgraph::{domain::node::load_tree_yml_file, Config, Context};
use tracing::instrument;

use super::terminal::Paint;

#[derive(Debug, Parser)]
pub struct Validate {
    /// The YAML component tree
    file: PathBuf,

    /// Treat cycles as errors
    #[arg(long)]
    deny_cycles: bool,

    /// Suppress all output except errors
    #[arg(long, short)]
    quiet: bool,
}

impl Validate {
    #[instrument(level = "debug", skip(config))]
    pub fn run(self, config: &Config) -> anyhow::Result<()> {
        let tree = load_tree_yml_file(&self.file, config)
            .with_context(|| format!("failed to load {}", self.file.display()))?;
        let context = Context::from(tree);
        let graph = context.build_graph()?;

        let dangling: Vec<_> = graph.dangling_references().collect();
        let cycles = graph.cycles();

        if !self.quiet {
            for target in &dangling {
                let sources = graph.predecessors(target).collect::<Vec<_>>().join(", ");
                println!(
                    "{} {target} {}",
                    "dangling reference".warning(),
                    format!("(implied by {sources})").dim()
                );
            }
            for cycle in &cycles {
                println!("{} {}", "cycle".warning(), cycle.join(" <-> "));
            }
            if dangling.is_empty() && cycles.is_empty() {
                println!(
                    "{} ({} vertices, {} testable)",
                    "ok".testable(),
                    graph.vertex_count(),
                    graph.testable_vertices().count()
                );
            }
        }

        if !dangling.is_empty() {
            anyhow::bail!("{} dangling reference(s)", dangling.len());
        }
        if self.deny_cycles && !cycles.is_empty() {
            anyhow::bail!("{} cycle(s)", cycles.len());
        }
        Ok(())
    }
}
