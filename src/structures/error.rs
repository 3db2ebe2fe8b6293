use std::io;
use std::path::PathBuf;

use thiserror::Error;

use super::util_types::NodeId;

/// Problems with the startup parameters, reported before any channel exists
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("a ring needs at least 2 nodes, got {0}")]
    TooFewNodes(usize),
    #[error("ring size {0} is too large")]
    TooManyNodes(usize),
    #[error("ring size must be an integer, got {0:?}")]
    NotANumber(String),
    #[error("no ring size given")]
    Missing,
    #[error("failed to read config file {path}: {source}")]
    ReadFile { path: PathBuf, source: io::Error },
    #[error("failed to open {path}: {source}")]
    OpenFile { path: PathBuf, source: io::Error },
    #[error("invalid config file {path}: {source}")]
    ParseFile { path: PathBuf, source: serde_json::Error },
    #[error("transport {0} is not available on this platform")]
    UnsupportedTransport(&'static str),
}

/// Fatal errors while bringing the ring up
#[derive(Debug, Error)]
pub enum RingError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("failed to create channel: {0}")]
    Fabric(#[from] io::Error),
    #[error("failed to spawn node {node}: {source}")]
    Spawn { node: NodeId, source: io::Error },
}
