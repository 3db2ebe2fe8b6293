/*
This module defines the token ("apple") that circulates around the ring and
its fixed-size wire record.

Record layout (little endian, MESSAGE_SIZE bytes):

    +--------+-------------+------------------+--------------------------+
    | 0      | 1..5        | 5..9             | 9..265                   |
    | flag   | source i32  | destination i32  | payload, NUL terminated  |
    +--------+-------------+------------------+--------------------------+

Exactly one record is read or written per hop, so no length prefix is needed.
*/
use std::fmt::{self, Debug, Display};

use thiserror::Error;

use super::util_types::{NodeId, CONTROLLER_ID, EMPTY_DESTINATION, MAX_PAYLOAD_LENGTH, MESSAGE_SIZE, PAYLOAD_CAPACITY};

const FLAG_OFFSET: usize = 0;
const SOURCE_OFFSET: usize = 1;
const DESTINATION_OFFSET: usize = 5;
const PAYLOAD_OFFSET: usize = 9;

/// One encoded token, the unit of atomicity on every channel
pub type Record = [u8; MESSAGE_SIZE];

/// Errors while encoding or decoding a token record
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("record truncated: need {need} bytes, have {have}")]
    Truncated { need: usize, have: usize },
    #[error("invalid shutdown flag: 0x{0:02x}")]
    InvalidShutdownFlag(u8),
    #[error("invalid node id on the wire: {0}")]
    InvalidNodeId(i32),
    #[error("node id {0} does not fit in a record")]
    NodeIdOverflow(NodeId),
    #[error("payload is not NUL terminated")]
    UnterminatedPayload,
    #[error("payload is not valid UTF-8")]
    InvalidPayload,
}

/// Where a token is headed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Destination {
    /// No payload pending, the token is just circulating
    Empty,
    Node(NodeId),
}
impl Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Destination::Empty => write!(f, "empty"),
            Destination::Node(id) => write!(f, "{}", id),
        }
    }
}

/// Bounded payload text. Longer input is cut at the last char boundary that fits.
#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct Payload(String);
impl Payload {
    pub fn new(text: &str) -> Self {
        let text = text.split('\0').next().unwrap_or_default();
        let mut end = text.len().min(MAX_PAYLOAD_LENGTH);
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        Payload(text[..end].to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
impl Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.0)
    }
}
impl Display for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Token {
    /// Sticky: once set, every other field is ignored
    pub is_shutdown: bool,
    /// Node that originated the payload, relays never touch it
    pub source: NodeId,
    pub destination: Destination,
    pub payload: Payload,
}
impl Token {
    /// Payload-bearing token from the controller
    pub fn payload(destination: NodeId, payload: Payload) -> Self {
        Token {
            is_shutdown: false,
            source: CONTROLLER_ID,
            destination: Destination::Node(destination),
            payload,
        }
    }

    pub fn idle() -> Self {
        Token {
            is_shutdown: false,
            source: CONTROLLER_ID,
            destination: Destination::Empty,
            payload: Payload::default(),
        }
    }

    pub fn shutdown(source: NodeId) -> Self {
        Token {
            is_shutdown: true,
            source,
            destination: Destination::Empty,
            payload: Payload::default(),
        }
    }

    pub fn is_idle(&self) -> bool {
        !self.is_shutdown && self.destination == Destination::Empty
    }

    pub fn is_addressed_to(&self, id: NodeId) -> bool {
        !self.is_shutdown && self.destination == Destination::Node(id)
    }

    /// Marks the payload as consumed. The source is left as is.
    pub fn clear(&mut self) {
        self.destination = Destination::Empty;
        self.payload = Payload::default();
    }

    pub fn encode(&self) -> Result<Record, CodecError> {
        encode(self)
    }
}

fn node_to_wire(id: NodeId) -> Result<i32, CodecError> {
    i32::try_from(id).map_err(|_| CodecError::NodeIdOverflow(id))
}

fn read_i32(buf: &[u8], offset: usize) -> i32 {
    let mut arr = [0u8; 4];
    arr.copy_from_slice(&buf[offset..offset + 4]);
    i32::from_le_bytes(arr)
}

pub fn encode(token: &Token) -> Result<Record, CodecError> {
    let mut record = [0u8; MESSAGE_SIZE];
    record[FLAG_OFFSET] = token.is_shutdown as u8;
    record[SOURCE_OFFSET..DESTINATION_OFFSET].copy_from_slice(&node_to_wire(token.source)?.to_le_bytes());
    let destination = match token.destination {
        Destination::Empty => EMPTY_DESTINATION,
        Destination::Node(id) => node_to_wire(id)?,
    };
    record[DESTINATION_OFFSET..PAYLOAD_OFFSET].copy_from_slice(&destination.to_le_bytes());
    let payload = token.payload.as_str().as_bytes();
    // Payload::new guarantees len <= MAX_PAYLOAD_LENGTH, the rest stays zero
    record[PAYLOAD_OFFSET..PAYLOAD_OFFSET + payload.len()].copy_from_slice(payload);
    Ok(record)
}

pub fn decode(buf: &[u8]) -> Result<Token, CodecError> {
    if buf.len() < MESSAGE_SIZE {
        return Err(CodecError::Truncated { need: MESSAGE_SIZE, have: buf.len() });
    }
    let is_shutdown = match buf[FLAG_OFFSET] {
        0 => false,
        1 => true,
        other => return Err(CodecError::InvalidShutdownFlag(other)),
    };
    let source = read_i32(buf, SOURCE_OFFSET);
    let source = NodeId::try_from(source).map_err(|_| CodecError::InvalidNodeId(source))?;
    let destination = match read_i32(buf, DESTINATION_OFFSET) {
        EMPTY_DESTINATION => Destination::Empty,
        id if id >= 0 => Destination::Node(id as NodeId),
        id => return Err(CodecError::InvalidNodeId(id)),
    };

    let field = &buf[PAYLOAD_OFFSET..PAYLOAD_OFFSET + PAYLOAD_CAPACITY];
    let len = field.iter().position(|&b| b == 0).ok_or(CodecError::UnterminatedPayload)?;
    let text = std::str::from_utf8(&field[..len]).map_err(|_| CodecError::InvalidPayload)?;

    Ok(Token {
        is_shutdown,
        source,
        destination,
        payload: Payload(text.to_string()),
    })
}
