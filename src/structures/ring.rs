use std::sync::Arc;
use std::thread::{self, JoinHandle};

use log::{debug, error, info};

use super::cancel::CancelToken;
use super::controller::Controller;
use super::delivery::DeliverySink;
use super::error::RingError;
use super::network::{build_ring, validate_ring_size, Transport};
use super::node::{ExitReason, Node, NodeSummary};
use super::prompt::Prompt;
use super::util_types::{NodeId, DEFAULT_CHANNEL_CAPACITY};

/// Summaries of every node after the session, ordered by node id
#[derive(Debug, Clone)]
pub struct RingReport {
    pub nodes: Vec<NodeSummary>,
}
impl RingReport {
    /// Every node left through the shutdown protocol
    pub fn is_clean(&self) -> bool {
        self.nodes.iter().all(|node| node.exit.is_clean())
    }

    pub fn deliveries(&self) -> u64 {
        self.nodes.iter().map(|node| node.deliveries).sum()
    }
}

/// Topology bootstrap: one thread per relay, the controller on the caller's thread
#[derive(Debug, Clone)]
pub struct Ring {
    ring_size: usize,
    transport: Transport,
    channel_capacity: usize,
}

impl Ring {
    pub fn new(ring_size: usize) -> Result<Self, RingError> {
        Ok(Ring {
            ring_size: validate_ring_size(ring_size)?,
            transport: Transport::default(),
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        })
    }

    pub fn transport(mut self, transport: Transport) -> Self {
        self.transport = transport;
        self
    }

    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity;
        self
    }

    pub fn ring_size(&self) -> usize {
        self.ring_size
    }

    /// Runs one session: builds the channels, starts the relays, drives the
    /// controller until it stops, then waits for every relay to finish.
    pub fn run<P: Prompt>(
        &self,
        prompt: P,
        sink: Arc<dyn DeliverySink>,
        cancel: CancelToken,
    ) -> Result<RingReport, RingError> {
        info!("Building a ring of {} nodes over {} channels", self.ring_size, self.transport);
        let mut endpoints = build_ring(self.ring_size, self.transport, self.channel_capacity)?;
        let relays = endpoints.split_off(1);
        let controller_endpoints = endpoints.remove(0);

        // An early return drops the controller's write end, so relays that
        // already started see end-of-stream one after another and exit.
        let mut handles: Vec<(NodeId, JoinHandle<NodeSummary>)> = Vec::with_capacity(relays.len());
        for relay in relays {
            let id = relay.id;
            let node = Node::new(relay, Arc::clone(&sink));
            let handle = thread::Builder::new()
                .name(format!("node-{}", id))
                .spawn(move || node.run_relay())
                .map_err(|source| RingError::Spawn { node: id, source })?;
            debug!("Spawned thread for node {}", id);
            handles.push((id, handle));
        }

        let controller = Controller::new(Node::new(controller_endpoints, sink), prompt, cancel);
        let mut nodes = vec![controller.run()];

        for (id, handle) in handles {
            debug!("Waiting for node {}", id);
            let summary = handle.join().unwrap_or_else(|_| {
                error!("Node {} panicked", id);
                NodeSummary { id, tokens_received: 0, tokens_sent: 0, deliveries: 0, exit: ExitReason::Panicked }
            });
            nodes.push(summary);
        }

        let report = RingReport { nodes };
        if report.is_clean() {
            info!("Node 0 exiting cleanly.");
        } else {
            error!("Ring did not shut down cleanly");
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::structures::delivery::{Delivery, RecordingSink};
    use crate::structures::error::ConfigError;
    use crate::structures::prompt::{OutboundRequest, RandomPrompt, ScriptedPrompt};

    fn run_session(ring: &Ring, requests: Vec<OutboundRequest>) -> (RingReport, Vec<Delivery>) {
        let sink = Arc::new(RecordingSink::new());
        let report = ring.run(ScriptedPrompt::new(requests), sink.clone(), CancelToken::new()).unwrap();
        (report, sink.deliveries())
    }

    fn delivery(at: NodeId, payload: &str) -> Delivery {
        Delivery { observed_at: at, source: 0, payload: payload.to_string() }
    }

    #[test]
    fn three_nodes_deliver_to_the_far_relay() {
        let ring = Ring::new(3).unwrap();
        let (report, deliveries) = run_session(&ring, vec![OutboundRequest::new(2, "hi")]);
        assert_eq!(deliveries, vec![delivery(2, "hi")]);
        assert!(report.is_clean());
        assert_eq!(report.nodes.len(), 3);
        // relays: one payload lap plus the shutdown lap
        for node in &report.nodes[1..] {
            assert_eq!(node.tokens_received, 2);
            assert_eq!(node.tokens_sent, 2);
            assert_eq!(node.exit, ExitReason::ShutdownForwarded);
        }
        assert_eq!(report.nodes[0].exit, ExitReason::ShutdownReturned);
        assert_eq!(report.nodes[0].tokens_sent, 2);
    }

    #[test]
    fn four_nodes_return_a_self_addressed_message() {
        let ring = Ring::new(4).unwrap();
        let (report, deliveries) = run_session(&ring, vec![OutboundRequest::new(0, "self")]);
        assert_eq!(deliveries, vec![delivery(0, "self")]);
        assert_eq!(report.nodes[0].deliveries, 1);
        assert!(report.nodes[1..].iter().all(|node| node.deliveries == 0));
        assert!(report.is_clean());
    }

    #[test]
    fn every_destination_is_delivered_exactly_once() {
        for ring_size in 2..=6 {
            let ring = Ring::new(ring_size).unwrap();
            for destination in 0..ring_size {
                let (report, deliveries) = run_session(&ring, vec![OutboundRequest::new(destination, "apple")]);
                assert_eq!(deliveries, vec![delivery(destination, "apple")], "ring of {}", ring_size);
                assert!(report.is_clean());
            }
        }
    }

    #[test]
    fn sequential_messages_arrive_in_order() {
        let ring = Ring::new(5).unwrap();
        let requests: Vec<OutboundRequest> =
            (0..20).map(|i| OutboundRequest::new(i % 5, &format!("message {}", i))).collect();
        let (report, deliveries) = run_session(&ring, requests.clone());
        let expected: Vec<Delivery> = requests
            .iter()
            .map(|r| delivery(r.destination, r.payload.as_str()))
            .collect();
        assert_eq!(deliveries, expected);
        assert_eq!(report.deliveries(), 20);
    }

    #[test]
    fn two_nodes_is_the_smallest_ring() {
        let ring = Ring::new(2).unwrap();
        let (report, deliveries) = run_session(&ring, vec![OutboundRequest::new(1, "a"), OutboundRequest::new(0, "b")]);
        assert_eq!(deliveries, vec![delivery(1, "a"), delivery(0, "b")]);
        assert!(report.is_clean());
    }

    #[test]
    fn no_input_shuts_every_node_down() {
        let ring = Ring::new(4).unwrap();
        let (report, deliveries) = run_session(&ring, vec![]);
        assert!(deliveries.is_empty());
        assert!(report.is_clean());
        assert!(report.nodes.iter().all(|node| node.tokens_sent == 1));
    }

    #[test]
    fn cancelled_session_still_shuts_down_cleanly() {
        let ring = Ring::new(3).unwrap();
        let cancel = CancelToken::new();
        cancel.cancel();
        let sink = Arc::new(RecordingSink::new());
        let report = ring
            .run(ScriptedPrompt::new(vec![OutboundRequest::new(1, "never")]), sink.clone(), cancel)
            .unwrap();
        assert!(sink.deliveries().is_empty());
        assert!(report.is_clean());
    }

    #[test]
    fn random_traffic_is_fully_delivered() {
        let ring = Ring::new(7).unwrap().channel_capacity(1);
        let sink = Arc::new(RecordingSink::new());
        let report = ring.run(RandomPrompt::new(50, Some(42)), sink.clone(), CancelToken::new()).unwrap();
        assert_eq!(sink.deliveries().len(), 50);
        assert_eq!(report.deliveries(), 50);
        assert!(report.is_clean());
    }

    #[cfg(unix)]
    #[test]
    fn socket_transport_runs_the_same_protocol() {
        let ring = Ring::new(3).unwrap().transport(Transport::Socket);
        let (report, deliveries) = run_session(&ring, vec![OutboundRequest::new(2, "hi")]);
        assert_eq!(deliveries, vec![delivery(2, "hi")]);
        assert!(report.is_clean());
    }

    #[test]
    fn invalid_ring_sizes_are_rejected_up_front() {
        for n in [0, 1] {
            assert!(matches!(Ring::new(n), Err(RingError::Config(ConfigError::TooFewNodes(_)))));
        }
    }
}
