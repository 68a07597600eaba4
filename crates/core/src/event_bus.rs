//! Per-thread, in-memory fan-out of a live run's events to any number
//! of subscribers, with replay-from-start for subscribers attaching
//! mid-run. Grounded on the teacher's per-run `broadcast::channel` +
//! `subscribe`/`emit` pair, generalized from per-run-id to per-thread
//! (this spec allows only one live run per thread at a time) and
//! extended with the replay buffer design note §9 calls for.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use agentrun_domain::event::Event;
use parking_lot::{Mutex, RwLock};
use tokio::sync::broadcast;

/// Replay buffer is bounded; overflow kicks the slow subscriber with a
/// `Lagged` signal rather than growing without bound, per §9.
const REPLAY_BUFFER_CAPACITY: usize = 4096;
const BROADCAST_CAPACITY: usize = 1024;

struct RunChannel {
    sender: broadcast::Sender<Event>,
    replay: Mutex<VecDeque<Event>>,
}

#[derive(Clone)]
pub struct EventBus {
    channels: Arc<RwLock<HashMap<String, Arc<RunChannel>>>>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            channels: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Open the live sink for a thread's new run. Replaces any
    /// previous (stale) channel for this thread — the single-writer
    /// invariant means there should never be a live one already.
    pub fn start_run(&self, thread_id: &str) -> RunPublisher {
        let (sender, _) = broadcast::channel(BROADCAST_CAPACITY);
        let channel = Arc::new(RunChannel {
            sender,
            replay: Mutex::new(VecDeque::with_capacity(64)),
        });
        self.channels
            .write()
            .insert(thread_id.to_string(), channel.clone());
        RunPublisher {
            thread_id: thread_id.to_string(),
            channel,
            channels: self.channels.clone(),
        }
    }

    /// Attach to the live tail of an active run. Returns `None` if no
    /// run is currently live on this thread — callers fall back to
    /// ThreadStore for historical transcript only.
    pub fn subscribe(&self, thread_id: &str) -> Option<RunSubscription> {
        let channel = self.channels.read().get(thread_id)?.clone();
        // Hold the replay lock across the snapshot *and* the broadcast
        // subscribe so a concurrent `publish` can't land in the gap
        // between them — otherwise its event would be in neither the
        // snapshot (taken before the push) nor the new receiver
        // (subscribed after the send), and would be silently dropped.
        let replay = channel.replay.lock();
        let replayed: Vec<Event> = replay.iter().cloned().collect();
        let receiver = channel.sender.subscribe();
        drop(replay);
        Some(RunSubscription { replayed, receiver })
    }

    pub fn is_live(&self, thread_id: &str) -> bool {
        self.channels.read().contains_key(thread_id)
    }
}

/// The private live sink fed by the run's agent invocation. Dropped
/// (or explicitly `finish`ed) when the run terminates, closing the
/// broadcast channel for any still-attached subscribers. Cloning is
/// cheap (two `Arc`s) and `finish` on one clone is safe to call from
/// another — the second call is a no-op removal.
#[derive(Clone)]
pub struct RunPublisher {
    thread_id: String,
    channel: Arc<RunChannel>,
    channels: Arc<RwLock<HashMap<String, Arc<RunChannel>>>>,
}

impl RunPublisher {
    /// Append to the replay buffer and broadcast to live subscribers.
    /// A send with zero receivers is not an error — matches the
    /// teacher's fire-and-forget `emit`.
    pub fn publish(&self, event: Event) {
        // The replay-buffer push and the broadcast send must appear
        // atomic to `subscribe`, which holds this same lock across its
        // own snapshot-then-subscribe — otherwise a subscriber could
        // see the event twice (once in its snapshot, once live) or not
        // at all, depending on exactly where the two operations
        // interleave.
        let mut replay = self.channel.replay.lock();
        replay.push_back(event.clone());
        if replay.len() > REPLAY_BUFFER_CAPACITY {
            replay.pop_front();
        }
        let _ = self.channel.sender.send(event);
    }

    /// Signal completion: after this, `EventBus::subscribe` for this
    /// thread returns `None` and any still-attached receivers observe
    /// a clean `RecvError::Closed` once they drain the buffered tail.
    pub fn finish(self) {
        self.channels.write().remove(&self.thread_id);
    }
}

/// A subscriber's view: the events buffered since the run began,
/// followed by a receiver for the live tail.
pub struct RunSubscription {
    pub replayed: Vec<Event>,
    pub receiver: broadcast::Receiver<Event>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscribe_returns_none_when_no_run_is_live() {
        let bus = EventBus::new();
        assert!(bus.subscribe("t1").is_none());
    }

    #[tokio::test]
    async fn subscriber_replays_events_emitted_before_it_attached() {
        let bus = EventBus::new();
        let publisher = bus.start_run("t1");
        publisher.publish(Event::RunStarted {
            thread_id: "t1".into(),
            run_id: "r1".into(),
            input: None,
        });

        let sub = bus.subscribe("t1").unwrap();
        assert_eq!(sub.replayed.len(), 1);
    }

    #[tokio::test]
    async fn subscriber_sees_live_tail_after_attaching() {
        let bus = EventBus::new();
        let publisher = bus.start_run("t1");
        let mut sub = bus.subscribe("t1").unwrap();

        publisher.publish(Event::RunFinished {
            thread_id: "t1".into(),
            run_id: "r1".into(),
        });

        let event = sub.receiver.recv().await.unwrap();
        assert!(matches!(event, Event::RunFinished { .. }));
    }

    #[test]
    fn finish_removes_the_channel_so_later_subscribers_see_none() {
        let bus = EventBus::new();
        let publisher = bus.start_run("t1");
        assert!(bus.is_live("t1"));
        publisher.finish();
        assert!(!bus.is_live("t1"));
        assert!(bus.subscribe("t1").is_none());
    }
}
