//! Push-based change feed over the task collection.
//!
//! # Responsibility
//! - Fan out full, ordered task snapshots to every live subscriber.
//! - Model subscriber-side view state as an explicit reducer.
//!
//! # Invariants
//! - Every event carries a complete snapshot or a failure, never a diff.
//! - Disconnected subscribers are pruned on the next publish.
//! - `SubscriptionState` changes only through `FeedEvent`s.

use crate::model::task::{partition, Task, TaskBoard};
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender, TryRecvError};
use log::debug;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// One inbound event delivered to subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedEvent {
    /// Full task list ordered by creation time, newest first.
    SnapshotReceived(Vec<Task>),
    /// Reading the snapshot failed; carries a display message.
    SnapshotFailed(String),
}

/// Broadcast hub shared by the store and its subscribers.
#[derive(Clone, Default)]
pub struct TaskFeed {
    subscribers: Arc<Mutex<Vec<Sender<FeedEvent>>>>,
}

impl TaskFeed {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new subscriber and returns its receiving end.
    pub fn subscribe(&self) -> TaskSubscription {
        let (sender, receiver) = unbounded();
        self.lock_subscribers().push(sender);
        TaskSubscription { receiver }
    }

    /// Sends `event` to every live subscriber.
    ///
    /// Returns the number of subscribers that received it.
    pub fn publish(&self, event: FeedEvent) -> usize {
        let mut subscribers = self.lock_subscribers();
        subscribers.retain(|sender| sender.send(event.clone()).is_ok());
        debug!(
            "event=feed_publish module=feed status=ok kind={} subscribers={}",
            event_kind(&event),
            subscribers.len()
        );
        subscribers.len()
    }

    /// Number of subscribers still registered.
    pub fn subscriber_count(&self) -> usize {
        self.lock_subscribers().len()
    }

    fn lock_subscribers(&self) -> std::sync::MutexGuard<'_, Vec<Sender<FeedEvent>>> {
        // Senders stay valid after a poisoning panic.
        self.subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Receiving end of a feed subscription. Dropping it unsubscribes.
pub struct TaskSubscription {
    receiver: Receiver<FeedEvent>,
}

impl TaskSubscription {
    /// Returns the next pending event without blocking.
    pub fn try_next(&self) -> Option<FeedEvent> {
        match self.receiver.try_recv() {
            Ok(event) => Some(event),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }

    /// Waits up to `timeout` for the next event.
    pub fn next_timeout(&self, timeout: Duration) -> Option<FeedEvent> {
        match self.receiver.recv_timeout(timeout) {
            Ok(event) => Some(event),
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Drains every pending event into `state`, returning how many applied.
    pub fn drain_into(&self, state: &mut SubscriptionState) -> usize {
        let mut applied = 0;
        while let Some(event) = self.try_next() {
            state.apply(event);
            applied += 1;
        }
        applied
    }
}

/// View-side state of a live task subscription.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SubscriptionState {
    /// No snapshot delivered yet.
    #[default]
    Loading,
    /// Last delivered snapshot.
    Ready(Vec<Task>),
    /// Last delivery failed.
    Error(String),
}

impl SubscriptionState {
    /// Reducer: folds one event into the current state.
    pub fn apply(&mut self, event: FeedEvent) {
        *self = match event {
            FeedEvent::SnapshotReceived(tasks) => Self::Ready(tasks),
            FeedEvent::SnapshotFailed(message) => Self::Error(message),
        };
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, Self::Loading)
    }

    /// Active/completed partition of the last good snapshot.
    ///
    /// Empty while loading or after a failure.
    pub fn board(&self) -> TaskBoard {
        match self {
            Self::Ready(tasks) => partition(tasks.iter().cloned()),
            Self::Loading | Self::Error(_) => TaskBoard::default(),
        }
    }
}

fn event_kind(event: &FeedEvent) -> &'static str {
    match event {
        FeedEvent::SnapshotReceived(_) => "snapshot",
        FeedEvent::SnapshotFailed(_) => "failure",
    }
}

#[cfg(test)]
mod tests {
    use super::{FeedEvent, SubscriptionState, TaskFeed};
    use crate::model::task::Task;
    use uuid::Uuid;

    fn sample(title: &str, completed: bool) -> Task {
        Task {
            id: Uuid::new_v4(),
            title: title.to_string(),
            description: String::new(),
            completed,
            created_at: 1,
            priority: None,
        }
    }

    #[test]
    fn state_moves_from_loading_to_ready_to_error_and_back() {
        let mut state = SubscriptionState::default();
        assert!(state.is_loading());

        state.apply(FeedEvent::SnapshotReceived(vec![sample("a", false)]));
        assert!(matches!(&state, SubscriptionState::Ready(tasks) if tasks.len() == 1));

        state.apply(FeedEvent::SnapshotFailed("offline".to_string()));
        assert_eq!(state, SubscriptionState::Error("offline".to_string()));
        assert!(state.board().active.is_empty());

        state.apply(FeedEvent::SnapshotReceived(Vec::new()));
        assert_eq!(state, SubscriptionState::Ready(Vec::new()));
    }

    #[test]
    fn publish_reaches_every_subscriber_and_prunes_dropped_ones() {
        let feed = TaskFeed::new();
        let first = feed.subscribe();
        let second = feed.subscribe();
        assert_eq!(feed.subscriber_count(), 2);

        drop(second);
        let delivered = feed.publish(FeedEvent::SnapshotReceived(vec![sample("a", true)]));
        assert_eq!(delivered, 1);
        assert_eq!(feed.subscriber_count(), 1);

        let mut state = SubscriptionState::default();
        assert_eq!(first.drain_into(&mut state), 1);
        let board = state.board();
        assert!(board.active.is_empty());
        assert_eq!(board.completed.len(), 1);
    }

    #[test]
    fn try_next_returns_none_when_idle() {
        let feed = TaskFeed::new();
        let subscription = feed.subscribe();
        assert!(subscription.try_next().is_none());
    }
}
