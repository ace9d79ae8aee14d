use chrono::Utc;
use parking_lot::Mutex;
use std::collections::VecDeque;
use tokio::sync::broadcast;
use uuid::Uuid;
use workforce_core::{EventKind, WorkspaceEvent};

const DEFAULT_RETENTION: usize = 10_000;
const CHANNEL_CAPACITY: usize = 1_024;

struct FeedState {
    next_sequence: u64,
    log: VecDeque<WorkspaceEvent>,
}

/// Append-only, per-workspace event feed.
///
/// Sequence numbers start at 1 and are assigned under the same lock that
/// broadcasts the event, so every subscriber sees events in sequence order.
/// The most recent `retention` events are kept for replay.
pub struct EventFeed {
    workspace_id: Uuid,
    sender: broadcast::Sender<WorkspaceEvent>,
    state: Mutex<FeedState>,
    retention: usize,
}

impl EventFeed {
    pub fn new(workspace_id: Uuid) -> Self {
        Self::with_retention(workspace_id, DEFAULT_RETENTION)
    }

    pub fn with_retention(workspace_id: Uuid, retention: usize) -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            workspace_id,
            sender,
            state: Mutex::new(FeedState {
                next_sequence: 1,
                log: VecDeque::new(),
            }),
            retention: retention.max(1),
        }
    }

    pub fn workspace_id(&self) -> Uuid {
        self.workspace_id
    }

    pub fn publish(&self, kind: EventKind) -> WorkspaceEvent {
        let mut state = self.state.lock();
        let event = WorkspaceEvent {
            sequence: state.next_sequence,
            workspace_id: self.workspace_id,
            at: Utc::now(),
            kind,
        };
        state.next_sequence += 1;
        state.log.push_back(event.clone());
        while state.log.len() > self.retention {
            state.log.pop_front();
        }
        // No subscribers is fine.
        let _ = self.sender.send(event.clone());
        event
    }

    pub fn subscribe(&self) -> broadcast::Receiver<WorkspaceEvent> {
        self.sender.subscribe()
    }

    /// Retained events with a sequence strictly greater than `after`.
    pub fn since(&self, after: u64) -> Vec<WorkspaceEvent> {
        let state = self.state.lock();
        state
            .log
            .iter()
            .filter(|e| e.sequence > after)
            .cloned()
            .collect()
    }

    /// Sequence of the most recent event, or 0 if none was published.
    pub fn last_sequence(&self) -> u64 {
        self.state.lock().next_sequence - 1
    }
}
