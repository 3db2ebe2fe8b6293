/*
Input collaborators for the controller. Each call yields the next outbound
request or None, which the controller treats as "stop the ring" no matter
whether it came from end of input, a quit command, or an interrupt.
*/
use std::collections::VecDeque;
use std::io::{self, BufRead, Write};
use std::thread;

use crossbeam::channel::{select, unbounded, Receiver};
use log::{debug, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::cancel::CancelToken;
use super::message::Payload;
use super::util_types::NodeId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundRequest {
    pub destination: NodeId,
    pub payload: Payload,
}
impl OutboundRequest {
    pub fn new(destination: NodeId, payload: &str) -> Self {
        OutboundRequest { destination, payload: Payload::new(payload) }
    }
}

pub trait Prompt {
    /// Next message to inject, or None once there is nothing more to send
    fn next_request(&mut self, ring_size: usize) -> Option<OutboundRequest>;
}
impl<P: Prompt + ?Sized> Prompt for Box<P> {
    fn next_request(&mut self, ring_size: usize) -> Option<OutboundRequest> {
        (**self).next_request(ring_size)
    }
}

/// Feeds lines of `input` into a channel from a detached thread, so a
/// blocked read never keeps the controller from seeing a cancellation.
pub fn spawn_line_reader<R: BufRead + Send + 'static>(input: R) -> io::Result<Receiver<String>> {
    let (tx, rx) = unbounded();
    thread::Builder::new().name("line-reader".into()).spawn(move || {
        for line in input.lines() {
            match line {
                Ok(line) => {
                    if tx.send(line).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    warn!("Stopped reading input: {}", e);
                    break;
                }
            }
        }
        debug!("Input reached end of stream");
    })?;
    Ok(rx)
}

/// Waits for the next line unless cancelled first
pub fn next_line(lines: &Receiver<String>, cancel: &CancelToken) -> Option<String> {
    if cancel.is_cancelled() {
        return None;
    }
    select! {
        recv(lines) -> line => line.ok(),
        recv(cancel.notified()) -> _ => None,
    }
}

/// Interactive prompt: a destination line, then a payload line
pub struct LinePrompt {
    lines: Receiver<String>,
    cancel: CancelToken,
    out: Box<dyn Write + Send>,
}
impl LinePrompt {
    pub fn new(lines: Receiver<String>, cancel: CancelToken, out: Box<dyn Write + Send>) -> Self {
        LinePrompt { lines, cancel, out }
    }

    fn say(&mut self, text: &str) {
        let _ = self.out.write_all(text.as_bytes()).and_then(|_| self.out.flush());
    }

    fn parse_destination(line: &str, ring_size: usize) -> Option<NodeId> {
        line.trim().parse::<NodeId>().ok().filter(|&id| id < ring_size)
    }
}
impl Prompt for LinePrompt {
    fn next_request(&mut self, ring_size: usize) -> Option<OutboundRequest> {
        let destination = loop {
            self.say(&format!("\nEnter destination node (0-{}) or q to quit: ", ring_size - 1));
            let line = next_line(&self.lines, &self.cancel)?;
            if line.starts_with('q') || line.starts_with('Q') {
                return None;
            }
            match Self::parse_destination(&line, ring_size) {
                Some(id) => break id,
                None => self.say("Invalid destination node. Try again.\n"),
            }
        };

        self.say("Enter message: ");
        let line = next_line(&self.lines, &self.cancel)?;
        Some(OutboundRequest::new(destination, line.trim_end_matches('\r')))
    }
}

/// A fixed list of requests, handed out in order
#[derive(Debug, Default)]
pub struct ScriptedPrompt {
    requests: VecDeque<OutboundRequest>,
}
impl ScriptedPrompt {
    pub fn new(requests: impl IntoIterator<Item = OutboundRequest>) -> Self {
        ScriptedPrompt { requests: requests.into_iter().collect() }
    }
}
impl Prompt for ScriptedPrompt {
    fn next_request(&mut self, ring_size: usize) -> Option<OutboundRequest> {
        while let Some(request) = self.requests.pop_front() {
            if request.destination < ring_size {
                return Some(request);
            }
            warn!("Skipping request for node {} outside a ring of {}", request.destination, ring_size);
        }
        None
    }
}

/// Random traffic: `remaining` requests to uniformly chosen nodes
pub struct RandomPrompt {
    rng: StdRng,
    remaining: usize,
    sent: usize,
}
impl RandomPrompt {
    pub fn new(count: usize, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        RandomPrompt { rng, remaining: count, sent: 0 }
    }
}
impl Prompt for RandomPrompt {
    fn next_request(&mut self, ring_size: usize) -> Option<OutboundRequest> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        self.sent += 1;
        let destination = self.rng.gen_range(0..ring_size);
        Some(OutboundRequest::new(destination, &format!("apple #{}", self.sent)))
    }
}
