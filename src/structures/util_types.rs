/// Position of a node in the ring, node 0 is the controller
pub type NodeId = usize;

/// Longest payload (in bytes) a token can carry
pub const MAX_PAYLOAD_LENGTH: usize = 255;
/// Payload field on the wire, including the NUL terminator
pub const PAYLOAD_CAPACITY: usize = MAX_PAYLOAD_LENGTH + 1;
/// Bytes of one token record: flag + source + destination + payload
pub const MESSAGE_SIZE: usize = 1 + 4 + 4 + PAYLOAD_CAPACITY;
/// Wire value of an idle destination
pub const EMPTY_DESTINATION: i32 = -1;

/// Id of the node that originates and retires tokens
pub const CONTROLLER_ID: NodeId = 0;
/// Chunks a memory channel buffers before a writer blocks
pub const DEFAULT_CHANNEL_CAPACITY: usize = 4;

/// Inbound neighbor of `id` in a ring of `ring_size` nodes
pub fn predecessor(id: NodeId, ring_size: usize) -> NodeId {
    (id + ring_size - 1) % ring_size
}

/// Outbound neighbor of `id` in a ring of `ring_size` nodes
pub fn successor(id: NodeId, ring_size: usize) -> NodeId {
    (id + 1) % ring_size
}
