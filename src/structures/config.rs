use std::path::{Path, PathBuf};

use clap::Parser;
use serde::Deserialize;

use super::error::ConfigError;
use super::network::{validate_ring_size, Transport};
use super::util_types::DEFAULT_CHANNEL_CAPACITY;

/// Token ring of worker nodes passing a single apple
#[derive(Debug, Parser)]
#[command(version, about)]
pub struct Cli {
    /// Number of nodes in the ring (at least 2). Asked for on stdin when missing.
    #[arg(short, long)]
    pub nodes: Option<String>,
    /// JSON config file, command line flags take precedence
    #[arg(short, long)]
    pub config: Option<PathBuf>,
    /// How the ring channels are realised
    #[arg(long, value_enum)]
    pub transport: Option<Transport>,
    /// Chunks a memory channel buffers before its writer blocks
    #[arg(long)]
    pub channel_capacity: Option<usize>,
    /// Read destinations and messages from a file instead of stdin
    #[arg(short, long)]
    pub input: Option<PathBuf>,
    /// Send this many messages to random nodes instead of prompting
    #[arg(long)]
    pub random: Option<usize>,
    /// Seed for --random
    #[arg(long, requires = "random")]
    pub seed: Option<u64>,
    /// Append every delivery as a JSON line to this file
    #[arg(long)]
    pub deliveries: Option<PathBuf>,
}

/// Settings that may come from a config file
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RingConfig {
    pub ring_size: Option<usize>,
    pub transport: Transport,
    pub channel_capacity: usize,
    pub deliveries: Option<PathBuf>,
}

impl Default for RingConfig {
    fn default() -> Self {
        RingConfig {
            ring_size: None,
            transport: Transport::default(),
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            deliveries: None,
        }
    }
}

impl RingConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)
            .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;
        Self::from_json(&text, path)
    }

    fn from_json(text: &str, path: &Path) -> Result<Self, ConfigError> {
        serde_json::from_str(text).map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
    }

    /// Config file values overridden by whatever was given on the command line
    pub fn merge_cli(mut self, cli: &Cli) -> Self {
        if let Some(transport) = cli.transport {
            self.transport = transport;
        }
        if let Some(capacity) = cli.channel_capacity {
            self.channel_capacity = capacity;
        }
        if let Some(path) = &cli.deliveries {
            self.deliveries = Some(path.clone());
        }
        self
    }

    /// Ring size from the command line, else the config file, else `ask`
    pub fn resolve_ring_size(
        &self,
        cli_nodes: Option<&str>,
        ask: impl FnOnce() -> Option<String>,
    ) -> Result<usize, ConfigError> {
        match (cli_nodes, self.ring_size) {
            (Some(text), _) => parse_ring_size(text),
            (None, Some(size)) => validate_ring_size(size),
            (None, None) => parse_ring_size(&ask().ok_or(ConfigError::Missing)?),
        }
    }
}

pub fn parse_ring_size(text: &str) -> Result<usize, ConfigError> {
    let text = text.trim();
    let size = text.parse::<usize>().map_err(|_| ConfigError::NotANumber(text.to_string()))?;
    validate_ring_size(size)
}
