//! Fan-out of accepted messages onto processing lanes.
//!
//! Every lane is an unbounded queue. Nothing pushes back on the network
//! side, so a slow consumer lets its queue grow without limit.

use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};

/// Lane feeding the ingestion worker.
pub const INGEST_LANE: &str = "ingest";

/// Lane feeding the tag watcher.
pub const WATCH_LANE: &str = "watch";

struct Lane {
    name: String,
    sender: UnboundedSender<String>,
}

/// Copies each message onto every registered lane.
#[derive(Default)]
pub struct Dispatcher {
    lanes: Vec<Lane>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a named lane and returns its receiving end.
    pub fn add_lane(&mut self, name: impl Into<String>) -> UnboundedReceiver<String> {
        let (sender, receiver) = unbounded_channel();
        self.lanes.push(Lane {
            name: name.into(),
            sender,
        });
        receiver
    }

    /// Names of the registered lanes, in registration order.
    pub fn lane_names(&self) -> Vec<&str> {
        self.lanes.iter().map(|lane| lane.name.as_str()).collect()
    }

    /// Enqueues `message` on every lane without blocking.
    ///
    /// Returns the number of lanes that accepted the message. A lane whose
    /// consumer has gone away is skipped.
    pub fn dispatch(&self, message: &str) -> usize {
        let mut delivered = 0;
        for lane in &self.lanes {
            match lane.sender.send(message.to_string()) {
                Ok(()) => delivered += 1,
                Err(_) => {
                    tracing::debug!(lane = %lane.name, "lane closed, message not delivered");
                }
            }
        }
        delivered
    }
}
