use std::path::PathBuf;

use anyhow::Context as _;
use clap::Parser;
use covgraph::{domain::net::load_nets_yml_file, Config, MergePolicy, NetMap};
use tracing::instrument;

use super::terminal::Paint;

#[derive(Debug, Parser)]
pub struct Nets {
    /// The YAML net-list, with a top-level `nets` sequence
    file: PathBuf,

    /// Override the configured merge policy
    #[arg(long)]
    policy: Option<MergePolicy>,
}

impl Nets {
    #[instrument(level = "debug", skip(config))]
    pub fn run(self, config: &Config) -> anyhow::Result<()> {
        let nets = self.load(config)?;

        let mut listed: Vec<_> = nets.nets().collect();
        listed.sort_by(|a, b| a.first_alias().cmp(b.first_alias()));

        for net in &listed {
            let aliases = net.refs()[1..].join(", ");
            if aliases.is_empty() {
                println!("{}", net.first_alias().node());
            } else {
                println!("{} {}", net.first_alias().node(), format!("({aliases})").dim());
            }
        }

        println!();
        println!("{} nets, {} aliases", listed.len(), nets.len());
        Ok(())
    }

    fn load(&self, config: &Config) -> anyhow::Result<NetMap> {
        let policy = self.policy.unwrap_or(config.merge_policy);
        load_nets_yml_file(&self.file, policy)
            .with_context(|| format!("failed to load {}", self.file.display()))
    }
}
