use log::{debug, info, warn};

use super::cancel::CancelToken;
use super::message::Token;
use super::node::{ExitReason, Node, NodeState, NodeSummary};
use super::prompt::{OutboundRequest, Prompt};
use super::util_types::{predecessor, CONTROLLER_ID};

/// Node 0: the only node that originates payloads and the only one that
/// decides when the session ends.
///
/// It tells three situations apart when a token comes back: an idle token
/// (ask the prompt for the next request), its own payload completing the lap
/// (consume it, then treat it as idle), and a shutdown token (stop).
pub struct Controller<P: Prompt> {
    node: Node,
    prompt: P,
    cancel: CancelToken,
    /// Set once a shutdown token is out; nothing else is sent after that
    shutdown_sent: bool,
}

impl<P: Prompt> Controller<P> {
    pub fn new(node: Node, prompt: P, cancel: CancelToken) -> Self {
        debug_assert_eq!(node.id, CONTROLLER_ID);
        Controller { node, prompt, cancel, shutdown_sent: false }
    }

    /// Next request with a destination inside the ring; others are skipped
    fn next_request(&mut self) -> Option<OutboundRequest> {
        loop {
            if self.cancel.is_cancelled() {
                return None;
            }
            let request = self.prompt.next_request(self.node.ring_size)?;
            if request.destination < self.node.ring_size {
                return Some(request);
            }
            warn!(
                "Node 0 ignoring request for node {} outside a ring of {}",
                request.destination, self.node.ring_size
            );
        }
    }

    /// Builds the next token to inject, a shutdown token once input runs dry
    fn originate(&mut self) -> Token {
        match self.next_request() {
            Some(OutboundRequest { destination, payload }) => {
                info!("Node 0 sending message to node {}: \"{}\"", destination, payload);
                Token::payload(destination, payload)
            }
            None => {
                info!("Node 0 has no more messages, sending shutdown token");
                Token::shutdown(CONTROLLER_ID)
            }
        }
    }

    fn send(&mut self, token: &Token) -> Result<(), ExitReason> {
        self.node.send(token)?;
        if token.is_shutdown {
            self.shutdown_sent = true;
        }
        Ok(())
    }

    /// Injects the first token and services the ring until the session ends.
    /// Returns once both channel ends are released.
    pub fn run(mut self) -> NodeSummary {
        self.node.announce();
        let first = self.originate();
        self.node.state = match self.send(&first) {
            Ok(()) => NodeState::Running,
            Err(reason) => NodeState::Stopped(reason),
        };
        while self.node.state == NodeState::Running {
            self.node.state = match self.lap() {
                Ok(state) => state,
                Err(reason) => NodeState::Stopped(reason),
            };
        }
        self.node.finish()
    }

    fn lap(&mut self) -> Result<NodeState, ExitReason> {
        let mut token = self.node.receive()?;
        debug!(
            "Node 0 received apple from node {}",
            predecessor(self.node.id, self.node.ring_size)
        );

        if token.is_shutdown {
            // never sent around a second time
            info!("Shutdown token completed its lap");
            return Ok(NodeState::Stopped(ExitReason::ShutdownReturned));
        }
        if self.shutdown_sent {
            warn!("Node 0 dropping {:?} while waiting for the shutdown token", token);
            return Ok(NodeState::Running);
        }

        self.node.consume(&mut token);

        if self.cancel.is_cancelled() {
            info!("Interrupt observed, node 0 sending shutdown token");
            token = Token::shutdown(CONTROLLER_ID);
        } else if token.is_idle() {
            token = self.originate();
        }
        self.send(&token)?;
        Ok(NodeState::Running)
    }
}
