use crate::commands::export_blocks::ExportBlocks;
use crate::commands::import_blocks::ImportBlocks;
use crate::commands::info::Info;
use crate::{Error, Result};
use clap::Parser;
use dagchain_consensus::{BlockChain, ChainConfig, ChainParams, Network};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Debug, clap::Subcommand)]
pub enum Command {
    /// Print the best state of the chain.
    Info(Info),

    /// Import blocks from a block file.
    ImportBlocks(ImportBlocks),

    /// Export the ordered blocks into a block file.
    ExportBlocks(ExportBlocks),
}

#[derive(Debug, Parser)]
#[command(name = "dagchain", author, version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Parser)]
pub struct CommonParams {
    /// Specify the chain network.
    ///
    /// Overrides the network of `--config`. Defaults to mainnet.
    #[arg(long, value_name = "NETWORK")]
    pub network: Option<Network>,

    /// Specify custom data directory.
    #[arg(long, short = 'd', value_name = "PATH")]
    pub data_dir: Option<PathBuf>,

    /// JSON file with the chain configuration.
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// JSON file with additional checkpoints.
    #[arg(long, value_name = "PATH")]
    pub checkpoints: Option<PathBuf>,

    /// Ignore every checkpoint.
    #[arg(long)]
    pub disable_checkpoints: bool,

    /// Sets a custom logging filter (syntax: `<target>=<level>`).
    ///
    /// By default, all targets log `info`, or what `RUST_LOG` specifies.
    ///
    /// *Example*: `--log warn,dagchain_consensus=debug`.
    #[arg(short = 'l', long, value_name = "LOG_PATTERN", num_args = 1..)]
    pub log: Vec<String>,
}

impl CommonParams {
    /// Merges the configuration file with the command line arguments.
    pub fn chain_config(&self) -> Result<ChainConfig> {
        let mut config = match &self.config {
            Some(path) => serde_json::from_str(&std::fs::read_to_string(path)?)?,
            None => ChainConfig::default(),
        };

        if let Some(network) = self.network {
            config.network = network;
        }

        match &self.data_dir {
            Some(data_dir) => config.data_dir = data_dir.clone(),
            None if self.config.is_none() => {
                config.data_dir = config.data_dir.join(config.network.to_string());
            }
            None => {}
        }

        if self.checkpoints.is_some() {
            config.checkpoints_file = self.checkpoints.clone();
        }
        config.disable_checkpoints |= self.disable_checkpoints;

        Ok(config)
    }

    /// Opens the chain described by the arguments.
    pub fn open_chain(&self) -> Result<BlockChain> {
        let config = self.chain_config()?;
        let params = ChainParams::new(config.network);
        Ok(BlockChain::new(&config, params)?)
    }

    fn init_logging(&self) -> Result<()> {
        let filter = if self.log.is_empty() {
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
        } else {
            EnvFilter::try_new(self.log.join(","))
                .map_err(|err| Error::LogFilter(err.to_string()))?
        };

        tracing_subscriber::fmt().with_env_filter(filter).init();

        Ok(())
    }
}

/// Parse and run command line arguments
pub fn run() -> Result<()> {
    let Cli { command } = Cli::parse();

    match command {
        Command::Info(cmd) => {
            cmd.common_params.init_logging()?;
            cmd.run()
        }
        Command::ImportBlocks(cmd) => {
            cmd.common_params.init_logging()?;
            cmd.run()
        }
        Command::ExportBlocks(cmd) => {
            cmd.common_params.init_logging()?;
            cmd.run()
        }
    }
}
