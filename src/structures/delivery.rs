use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::sync::Arc;

use log::{error, info};
use parking_lot::Mutex;
use serde::Serialize;

use super::util_types::NodeId;

/// A payload consumed by the node it was addressed to
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Delivery {
    pub observed_at: NodeId,
    pub source: NodeId,
    pub payload: String,
}

/// Output collaborator shared by every node. Fire and forget.
pub trait DeliverySink: Send + Sync {
    fn deliver(&self, delivery: &Delivery);
}

/// Prints deliveries to stdout
pub struct ConsoleSink;
impl DeliverySink for ConsoleSink {
    fn deliver(&self, delivery: &Delivery) {
        println!(
            "Node {} received message: \"{}\" (from node {})",
            delivery.observed_at, delivery.payload, delivery.source
        );
    }
}

/// Appends one JSON object per delivery to a file
pub struct JsonLinesSink {
    writer: Mutex<BufWriter<File>>,
}
impl JsonLinesSink {
    pub fn create(path: &Path) -> io::Result<Self> {
        let file = File::options().create(true).append(true).open(path)?;
        info!("Logging deliveries to {}", path.display());
        Ok(JsonLinesSink { writer: Mutex::new(BufWriter::new(file)) })
    }
}
impl DeliverySink for JsonLinesSink {
    fn deliver(&self, delivery: &Delivery) {
        let mut writer = self.writer.lock();
        let result = serde_json::to_writer(&mut *writer, delivery)
            .map_err(io::Error::from)
            .and_then(|_| writer.write_all(b"\n"))
            .and_then(|_| writer.flush());
        if let Err(e) = result {
            error!("Failed to record delivery at node {}: {}", delivery.observed_at, e);
        }
    }
}

/// Keeps every delivery in memory
#[derive(Default)]
pub struct RecordingSink {
    deliveries: Mutex<Vec<Delivery>>,
}
impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn deliveries(&self) -> Vec<Delivery> {
        self.deliveries.lock().clone()
    }
}
impl DeliverySink for RecordingSink {
    fn deliver(&self, delivery: &Delivery) {
        self.deliveries.lock().push(delivery.clone());
    }
}

/// Hands each delivery to several sinks in order
pub struct FanoutSink {
    sinks: Vec<Arc<dyn DeliverySink>>,
}
impl FanoutSink {
    pub fn new(sinks: Vec<Arc<dyn DeliverySink>>) -> Self {
        FanoutSink { sinks }
    }
}
impl DeliverySink for FanoutSink {
    fn deliver(&self, delivery: &Delivery) {
        for sink in &self.sinks {
            sink.deliver(delivery);
        }
    }
}
