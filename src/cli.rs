use std::path::PathBuf;

mod graph;
mod nets;
mod terminal;
mod validate;

use clap::ArgAction;
use covgraph::{Config, Domain};
use graph::Graph;
use nets::Nets;
use validate::Validate;

#[derive(Debug, clap::Parser)]
#[command(version, about)]
pub struct Cli {
    /// Verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Path to a TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Override the configured domain
    #[arg(long, global = true)]
    domain: Option<Domain>,

    #[command(subcommand)]
    command: Command,
}

impl Cli {
    pub fn run(self) -> anyhow::Result<()> {
        Self::setup_logging(self.verbose);

        let config = self.load_config()?;
        tracing::debug!(?config, "loaded configuration");

        self.command.run(&config)
    }

    /// The configuration file (or the default), with command-line overrides.
    fn load_config(&self) -> anyhow::Result<Config> {
        let mut config = self
            .config
            .as_deref()
            .map_or_else(|| Ok(Config::default()), Config::load)
            .map_err(|e| anyhow::anyhow!(e))?;
        if let Some(domain) = self.domain {
            config.domain = domain;
        }
        Ok(config)
    }

    fn setup_logging(verbosity: u8) {
        use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

        let level = match verbosity {
            0 => tracing::Level::WARN,
            1 => tracing::Level::INFO,
            2 => tracing::Level::DEBUG,
            _ => tracing::Level::TRACE,
        };

        let filter = tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into());

        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
            .with_thread_names(false)
            .with_line_number(false);

        tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer)
            .init();
    }
}

#[derive(Debug, clap::Subcommand)]
pub enum Command {
    /// Build the dependency graph of a component tree
    Graph(Graph),

    /// Load a net-list and show the merged nets
    Nets(Nets),

    /// Check a component tree for dangling references and cycles
    Validate(Validate),
}

impl Command {
    fn run(self, config: &Config) -> anyhow::Result<()> {
        match self {
            Self::Graph(command) => command.run(config)?,
            Self::Nets(command) => command.run(config)?,
            Self::Validate(command) => command.run(config)?,
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;
    use covgraph::MergePolicy;
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn defaults_without_config_file() {
        let cli = Cli::try_parse_from(["covgraph", "validate", "board.yml"]).unwrap();
        assert_eq!(cli.load_config().unwrap(), Config::default());
    }

    #[test]
    fn domain_flag_overrides_config_file() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("covgraph.toml");
        std::fs::write(
            &path,
            "_version = \"1\"\ndomain = \"electrical\"\nmerge_policy = \"last-match\"\n",
        )
        .unwrap();
        let path = path.to_str().unwrap();

        let cli = Cli::try_parse_from(["covgraph", "-c", path, "nets", "nets.yml"]).unwrap();
        let config = cli.load_config().unwrap();
        assert_eq!(config.domain, Domain::Electrical);
        assert_eq!(config.merge_policy, MergePolicy::LastMatch);

        let cli = Cli::try_parse_from([
            "covgraph",
            "graph",
            "board.yml",
            "--domain",
            "generic",
            "-c",
            path,
        ])
        .unwrap();
        let config = cli.load_config().unwrap();
        assert_eq!(config.domain, Domain::Generic);
        assert_eq!(config.merge_policy, MergePolicy::LastMatch);
    }

    #[test]
    fn missing_config_file_is_an_error() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("missing.toml");
        let cli = Cli::try_parse_from([
            "covgraph",
            "--config",
            path.to_str().unwrap(),
            "validate",
            "board.yml",
        ])
        .unwrap();

        let error = cli.load_config().unwrap_err();
        assert!(error.to_string().starts_with("Failed to read config file:"));
    }

    #[test]
    fn unknown_domain_is_rejected() {
        let parsed = Cli::try_parse_from(["covgraph", "--domain", "optical", "validate", "a.yml"]);
        assert!(parsed.is_err());
    }
}
