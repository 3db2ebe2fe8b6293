use std::fmt::{self, Display};

use log::debug;
use serde::Deserialize;

use super::channel::{pipe, Inbound, Outbound};
use super::error::{ConfigError, RingError};
use super::util_types::{predecessor, NodeId};

/// How the N channels of the ring are realised
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    /// In-process byte pipes
    #[default]
    Memory,
    /// Connected unix socket pairs
    Socket,
}
impl Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transport::Memory => write!(f, "memory"),
            Transport::Socket => write!(f, "socket"),
        }
    }
}

/// The two channel ends a node owns for its whole lifetime
pub struct NodeEndpoints {
    pub id: NodeId,
    pub ring_size: usize,
    /// Read end of the channel from `predecessor(id)`
    pub inbound: Inbound,
    /// Write end of the channel to `successor(id)`
    pub outbound: Outbound,
}

/// Channel slots indexed by channel id. Channel i carries node i -> node i+1.
struct Arena {
    readers: Vec<Option<Inbound>>,
    writers: Vec<Option<Outbound>>,
}
impl Arena {
    fn with_capacity(ring_size: usize) -> Self {
        Arena {
            readers: Vec::with_capacity(ring_size),
            writers: Vec::with_capacity(ring_size),
        }
    }

    fn push(&mut self, reader: Inbound, writer: Outbound) {
        self.readers.push(Some(reader));
        self.writers.push(Some(writer));
    }

    fn take_reader(&mut self, channel: usize) -> Inbound {
        self.readers[channel].take().expect("channel read end handed out twice")
    }

    fn take_writer(&mut self, channel: usize) -> Outbound {
        self.writers[channel].take().expect("channel write end handed out twice")
    }

    fn is_drained(&self) -> bool {
        self.readers.iter().all(Option::is_none) && self.writers.iter().all(Option::is_none)
    }
}

pub fn validate_ring_size(ring_size: usize) -> Result<usize, ConfigError> {
    if ring_size < 2 {
        return Err(ConfigError::TooFewNodes(ring_size));
    }
    // node ids travel as non-negative i32, negative values are reserved
    if ring_size > i32::MAX as usize {
        return Err(ConfigError::TooManyNodes(ring_size));
    }
    Ok(ring_size)
}

fn open_channel(transport: Transport, capacity: usize) -> Result<(Inbound, Outbound), RingError> {
    match transport {
        Transport::Memory => {
            let (reader, writer) = pipe(capacity);
            Ok((Box::new(reader), Box::new(writer)))
        }
        #[cfg(unix)]
        Transport::Socket => {
            let (reader, writer) = std::os::unix::net::UnixStream::pair()?;
            Ok((Box::new(reader), Box::new(writer)))
        }
        #[cfg(not(unix))]
        Transport::Socket => Err(ConfigError::UnsupportedTransport("socket").into()),
    }
}

/// Creates the N channels of the ring and hands node i the read end of
/// channel `predecessor(i)` and the write end of channel i. Every end is
/// owned by exactly one node, so a channel reaches end-of-stream as soon as
/// its single writer is dropped.
pub fn build_ring(ring_size: usize, transport: Transport, capacity: usize) -> Result<Vec<NodeEndpoints>, RingError> {
    let ring_size = validate_ring_size(ring_size)?;
    let mut arena = Arena::with_capacity(ring_size);
    for channel in 0..ring_size {
        let (reader, writer) = open_channel(transport, capacity)?;
        debug!("Created {} channel {} (node {} -> node {})", transport, channel, channel, (channel + 1) % ring_size);
        arena.push(reader, writer);
    }

    let endpoints = (0..ring_size)
        .map(|id| NodeEndpoints {
            id,
            ring_size,
            inbound: arena.take_reader(predecessor(id, ring_size)),
            outbound: arena.take_writer(id),
        })
        .collect();
    debug_assert!(arena.is_drained());
    Ok(endpoints)
}
