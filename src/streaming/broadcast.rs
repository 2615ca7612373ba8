//! Pub/sub replay fan-out over a single upstream event sequence.
//!
//! Wraps one upstream [`EventStream`] (typically the orchestrator's) and
//! exposes it to an arbitrary number of independently-paced subscribers.
//! Each subscriber owns a buffered channel, so a slow subscriber cannot
//! stall the primary consumer or its siblings.

use std::sync::{Arc, Mutex};

use futures::StreamExt;
use tokio::sync::mpsc;

use crate::error::UppError;
use crate::streaming::{EventStream, StreamEvent};

type Item = Result<StreamEvent, UppError>;

struct Shared {
    subscribers: Vec<mpsc::UnboundedSender<Item>>,
    /// Everything observed so far, kept only when replay was requested.
    archive: Option<Vec<Item>>,
}

/// Fans a single upstream event sequence out to many subscribers.
///
/// The primary stream (from [`EventBroadcaster::primary`]) must be driven by
/// exactly one consumer; subscribers receive every item the primary sees, in
/// the same order, from the point of attachment onward. With
/// [`EventBroadcaster::with_replay`], a late joiner first receives the full
/// archive, so text reconstructed from any subscriber's stream is
/// byte-identical to the final assembled response.
pub struct EventBroadcaster {
    shared: Arc<Mutex<Shared>>,
    primary: Option<EventStream>,
}

impl EventBroadcaster {
    /// Wrap an upstream stream without history buffering.
    pub fn new(upstream: EventStream) -> Self {
        Self::build(upstream, false)
    }

    /// Wrap an upstream stream, archiving every observed event so late
    /// joiners can replay from the start.
    pub fn with_replay(upstream: EventStream) -> Self {
        Self::build(upstream, true)
    }

    fn build(upstream: EventStream, replay: bool) -> Self {
        let shared = Arc::new(Mutex::new(Shared {
            subscribers: Vec::new(),
            archive: replay.then(Vec::new),
        }));

        let state = Arc::clone(&shared);
        let mut inner = upstream;
        let primary = async_stream::stream! {
            while let Some(item) = inner.next().await {
                {
                    let mut shared = state.lock().expect("broadcast state poisoned");
                    if let Some(archive) = shared.archive.as_mut() {
                        archive.push(item.clone());
                    }
                    // Prune subscribers that dropped their receiver.
                    shared
                        .subscribers
                        .retain(|tx| tx.send(item.clone()).is_ok());
                }
                yield item;
            }
            tracing::debug!("broadcast upstream exhausted, closing subscribers");
            state.lock().expect("broadcast state poisoned").subscribers.clear();
        };

        Self {
            shared,
            primary: Some(Box::pin(primary)),
        }
    }

    /// Take the primary stream. Must be driven for subscribers to observe
    /// anything. Panics if taken twice.
    pub fn primary(&mut self) -> EventStream {
        self.primary
            .take()
            .expect("primary stream already taken")
    }

    /// Attach a new subscriber.
    ///
    /// On a replay broadcaster the subscriber first receives every archived
    /// event; otherwise it observes events from this point onward only.
    pub fn subscribe(&self) -> EventStream {
        let (tx, rx) = mpsc::unbounded_channel();
        {
            let mut shared = self.shared.lock().expect("broadcast state poisoned");
            if let Some(archive) = shared.archive.as_ref() {
                for item in archive {
                    // Receiver is still in scope here, send cannot fail.
                    let _ = tx.send(item.clone());
                }
            }
            shared.subscribers.push(tx);
        }
        let mut rx = rx;
        Box::pin(async_stream::stream! {
            while let Some(item) = rx.recv().await {
                yield item;
            }
        })
    }

    /// Number of currently attached subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.shared
            .lock()
            .expect("broadcast state poisoned")
            .subscribers
            .len()
    }
}
