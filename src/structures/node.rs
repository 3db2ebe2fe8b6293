/*
This module defines the `Node` structure: one member of the ring with exactly
one inbound and one outbound channel end.

Every hop a node reads one record, decodes it, consumes it if it is the
addressee and writes it on. Relays (ids 1..N-1) run `run_relay`; node 0 is
driven by the controller, which reuses the same receive/consume/send steps.
*/
use std::fmt::Debug;
use std::sync::Arc;

use log::{debug, error, info};

use super::channel::{read_record, write_record, Inbound, Outbound, ReadOutcome};
use super::delivery::{Delivery, DeliverySink};
use super::message::{decode, Token};
use super::network::NodeEndpoints;
use super::util_types::{predecessor, successor, NodeId, CONTROLLER_ID, MESSAGE_SIZE};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// Node 0: originates payloads and decides when the session ends
    Controller,
    /// Forwards tokens and consumes the ones addressed to it
    Relay,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExitReason {
    /// Relay passed the shutdown token on
    ShutdownForwarded,
    /// Controller saw its shutdown token complete the lap
    ShutdownReturned,
    /// Inbound channel closed cleanly
    EndOfStream,
    ReadFailed,
    WriteFailed,
    /// Record could not be decoded or encoded
    CodecFailed,
    /// The node's thread panicked
    Panicked,
}
impl ExitReason {
    /// Whether the node left through the shutdown protocol
    pub fn is_clean(&self) -> bool {
        matches!(self, ExitReason::ShutdownForwarded | ExitReason::ShutdownReturned)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NodeState {
    /// Waiting for or handling a token
    Running,
    /// DONE. Both channel ends are released on the way out
    Stopped(ExitReason),
}

/// What a node did before it stopped
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeSummary {
    pub id: NodeId,
    pub tokens_received: u64,
    pub tokens_sent: u64,
    pub deliveries: u64,
    pub exit: ExitReason,
}

pub struct Node {
    /// Position in the ring
    pub id: NodeId,
    pub ring_size: usize,
    pub state: NodeState,
    inbound: Inbound,
    outbound: Outbound,
    sink: Arc<dyn DeliverySink>,
    tokens_received: u64,
    tokens_sent: u64,
    deliveries: u64,
}

impl Node {
    pub fn new(endpoints: NodeEndpoints, sink: Arc<dyn DeliverySink>) -> Self {
        let NodeEndpoints { id, ring_size, inbound, outbound } = endpoints;
        Node {
            id,
            ring_size,
            state: NodeState::Running,
            inbound,
            outbound,
            sink,
            tokens_received: 0,
            tokens_sent: 0,
            deliveries: 0,
        }
    }

    pub fn role(&self) -> Role {
        if self.id == CONTROLLER_ID {
            Role::Controller
        } else {
            Role::Relay
        }
    }

    pub fn announce(&self) {
        info!(
            "Node {} started as {:?}, reads from node {} and writes to node {}",
            self.id,
            self.role(),
            predecessor(self.id, self.ring_size),
            successor(self.id, self.ring_size)
        );
    }

    // ----- hop steps ----- //
    /// Blocks for the next record on the inbound channel
    pub fn receive(&mut self) -> Result<Token, ExitReason> {
        let mut record = [0u8; MESSAGE_SIZE];
        match read_record(&mut self.inbound, &mut record) {
            Ok(ReadOutcome::Complete) => {}
            Ok(ReadOutcome::EndOfStream) => {
                info!("Node {} inbound channel closed", self.id);
                return Err(ExitReason::EndOfStream);
            }
            Err(e) => {
                error!("Node {} failed to read from node {}: {}", self.id, predecessor(self.id, self.ring_size), e);
                return Err(ExitReason::ReadFailed);
            }
        }
        self.tokens_received += 1;
        decode(&record).map_err(|e| {
            error!("Node {} received a malformed record: {}", self.id, e);
            ExitReason::CodecFailed
        })
    }

    /// Consumes `token` if it is addressed to this node. Returns whether it did.
    pub fn consume(&mut self, token: &mut Token) -> bool {
        if !token.is_addressed_to(self.id) {
            return false;
        }
        self.sink.deliver(&Delivery {
            observed_at: self.id,
            source: token.source,
            payload: token.payload.as_str().to_string(),
        });
        self.deliveries += 1;
        token.clear();
        true
    }

    /// Writes `token` to the outbound channel
    pub fn send(&mut self, token: &Token) -> Result<(), ExitReason> {
        let record = token.encode().map_err(|e| {
            error!("Node {} cannot encode {:?}: {}", self.id, token, e);
            ExitReason::CodecFailed
        })?;
        write_record(&mut self.outbound, &record).map_err(|e| {
            error!("Node {} failed to write to node {}: {}", self.id, successor(self.id, self.ring_size), e);
            ExitReason::WriteFailed
        })?;
        self.tokens_sent += 1;
        Ok(())
    }

    // ----- run ----- //
    /// Relay loop: forward every token, consume the ones addressed here,
    /// stop after passing on a shutdown token or when the channel ends.
    pub fn run_relay(mut self) -> NodeSummary {
        self.announce();
        while self.state == NodeState::Running {
            self.state = match self.relay_hop() {
                Ok(state) => state,
                Err(reason) => NodeState::Stopped(reason),
            };
        }
        self.finish()
    }

    fn relay_hop(&mut self) -> Result<NodeState, ExitReason> {
        let mut token = self.receive()?;
        debug!("Node {} received apple. Header destination={}", self.id, token.destination);

        if token.is_shutdown {
            info!("Node {} forwarding shutdown token", self.id);
            self.send(&token)?;
            return Ok(NodeState::Stopped(ExitReason::ShutdownForwarded));
        }
        self.consume(&mut token);
        debug!("Node {} forwarding apple to node {}", self.id, successor(self.id, self.ring_size));
        self.send(&token)?;
        Ok(NodeState::Running)
    }

    /// Releases both channel ends and reports what the node did
    pub fn finish(self) -> NodeSummary {
        let exit = match self.state {
            NodeState::Stopped(reason) => reason,
            NodeState::Running => unreachable!("node {} finished while running", self.id),
        };
        info!("Node {} exiting: {:?}", self.id, exit);
        NodeSummary {
            id: self.id,
            tokens_received: self.tokens_received,
            tokens_sent: self.tokens_sent,
            deliveries: self.deliveries,
            exit,
        }
    }
}

impl Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Node id: {}, role: {:?}, state: {:?}", self.id, self.role(), self.state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::structures::channel::{pipe, PipeReader, PipeWriter};
    use crate::structures::delivery::RecordingSink;
    use crate::structures::message::{Destination, Payload};

    struct Harness {
        upstream: PipeWriter,
        downstream: PipeReader,
        sink: Arc<RecordingSink>,
    }

    fn relay(id: NodeId, ring_size: usize) -> (Node, Harness) {
        let (inbound, upstream) = pipe(8);
        let (downstream, outbound) = pipe(8);
        let sink = Arc::new(RecordingSink::new());
        let node = Node::new(
            NodeEndpoints { id, ring_size, inbound: Box::new(inbound), outbound: Box::new(outbound) },
            sink.clone(),
        );
        (node, Harness { upstream, downstream, sink })
    }

    fn push(h: &mut Harness, token: &Token) {
        write_record(&mut h.upstream, &token.encode().unwrap()).unwrap();
    }

    fn pull(h: &mut Harness) -> Option<Token> {
        let mut record = [0u8; MESSAGE_SIZE];
        match read_record(&mut h.downstream, &mut record).unwrap() {
            ReadOutcome::Complete => Some(decode(&record).unwrap()),
            ReadOutcome::EndOfStream => None,
        }
    }

    #[test]
    fn relay_passes_foreign_tokens_unchanged() {
        let (node, mut h) = relay(1, 3);
        let token = Token::payload(2, Payload::new("hi"));
        push(&mut h, &token);
        push(&mut h, &Token::idle());
        drop(std::mem::replace(&mut h.upstream, pipe(1).1));

        let summary = node.run_relay();
        assert_eq!(pull(&mut h), Some(token));
        assert_eq!(pull(&mut h), Some(Token::idle()));
        assert_eq!(pull(&mut h), None);
        assert_eq!(summary.exit, ExitReason::EndOfStream);
        assert_eq!(summary.deliveries, 0);
        assert!(h.sink.deliveries().is_empty());
    }

    #[test]
    fn relay_consumes_and_clears_its_own_tokens() {
        let (node, mut h) = relay(2, 3);
        push(&mut h, &Token::payload(2, Payload::new("hi")));
        push(&mut h, &Token::shutdown(0));

        let summary = node.run_relay();
        let forwarded = pull(&mut h).unwrap();
        assert!(forwarded.is_idle());
        assert_eq!(forwarded.destination, Destination::Empty);
        assert_eq!(forwarded.source, 0);
        assert_eq!(h.sink.deliveries(), vec![Delivery { observed_at: 2, source: 0, payload: "hi".into() }]);
        assert_eq!(summary.deliveries, 1);
        assert_eq!(summary.exit, ExitReason::ShutdownForwarded);
    }

    #[test]
    fn relay_forwards_shutdown_once_and_sends_nothing_after() {
        let (node, mut h) = relay(1, 2);
        push(&mut h, &Token::shutdown(0));
        push(&mut h, &Token::payload(1, Payload::new("late")));

        let summary = node.run_relay();
        assert_eq!(pull(&mut h), Some(Token::shutdown(0)));
        // the node is gone, so its write end is closed
        assert_eq!(pull(&mut h), None);
        assert_eq!(summary.tokens_received, 1);
        assert_eq!(summary.tokens_sent, 1);
        assert!(h.sink.deliveries().is_empty());
    }

    #[test]
    fn relay_stops_without_forwarding_on_end_of_stream() {
        let (node, mut h) = relay(1, 2);
        drop(std::mem::replace(&mut h.upstream, pipe(1).1));
        let summary = node.run_relay();
        assert_eq!(summary.exit, ExitReason::EndOfStream);
        assert_eq!(summary.tokens_sent, 0);
        assert_eq!(pull(&mut h), None);
    }

    #[test]
    fn relay_stops_on_malformed_record() {
        let (node, mut h) = relay(1, 2);
        write_record(&mut h.upstream, &[7u8; MESSAGE_SIZE]).unwrap();
        let summary = node.run_relay();
        assert_eq!(summary.exit, ExitReason::CodecFailed);
        assert_eq!(pull(&mut h), None);
    }

    #[test]
    fn relay_stops_when_downstream_is_gone() {
        let (node, mut h) = relay(1, 2);
        push(&mut h, &Token::idle());
        drop(std::mem::replace(&mut h.downstream, pipe(1).0));
        let summary = node.run_relay();
        assert_eq!(summary.exit, ExitReason::WriteFailed);
    }

    #[test]
    fn cleared_tokens_are_not_consumed_again() {
        let (mut node, _h) = relay(1, 3);
        let mut token = Token::payload(1, Payload::new("once"));
        assert!(node.consume(&mut token));
        assert!(!node.consume(&mut token));
        assert!(token.is_idle());
    }

    #[test]
    fn only_the_shutdown_protocol_is_a_clean_exit() {
        assert!(ExitReason::ShutdownForwarded.is_clean());
        assert!(ExitReason::ShutdownReturned.is_clean());
        for reason in [
            ExitReason::EndOfStream,
            ExitReason::ReadFailed,
            ExitReason::WriteFailed,
            ExitReason::CodecFailed,
            ExitReason::Panicked,
        ] {
            assert!(!reason.is_clean(), "{:?} should not count as clean", reason);
        }
    }

    #[test]
    fn role_follows_id() {
        let (controller, _a) = relay(0, 2);
        let (relay_node, _b) = relay(1, 2);
        assert_eq!(controller.role(), Role::Controller);
        assert_eq!(relay_node.role(), Role::Relay);
    }
}
