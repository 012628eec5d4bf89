// In-process event hub.
//
// Per workspace: a sequence counter, a fixed-capacity ring of recent events
// for replay, and the live subscriber set. All of it sits behind one mutex;
// fanout sends happen on a snapshot taken under the lock, so a slow subscriber
// can never stall a publisher or another workspace. Delivery is at-most-once:
// a full subscriber queue drops its oldest item to make room for the new one.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use atelier_common::types::{now_rfc3339, WorkspaceEvent};
use tokio::sync::Notify;

/// Default per-workspace replay ring capacity.
pub const DEFAULT_RING_CAPACITY: usize = 200;
/// Default per-subscriber delivery buffer.
pub const DEFAULT_SUBSCRIBER_BUFFER: usize = 64;

/// Bounded single-consumer queue with drop-oldest overflow.
///
/// Producers never block: when the queue is full the oldest queued event is
/// evicted so the newest can be appended.
struct SubscriberQueue {
    state: Mutex<QueueState>,
    notify: Notify,
    capacity: usize,
}

struct QueueState {
    items: VecDeque<WorkspaceEvent>,
    closed: bool,
}

impl SubscriberQueue {
    fn new(capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(QueueState { items: VecDeque::with_capacity(capacity), closed: false }),
            notify: Notify::new(),
            capacity,
        })
    }

    /// Non-blocking append; evicts the oldest queued event when full.
    fn push(&self, event: WorkspaceEvent) {
        {
            let mut state = self.state.lock().expect("subscriber queue lock poisoned");
            if state.closed {
                return;
            }
            if state.items.len() >= self.capacity {
                state.items.pop_front();
            }
            state.items.push_back(event);
        }
        self.notify.notify_one();
    }

    fn close(&self) {
        {
            let mut state = self.state.lock().expect("subscriber queue lock poisoned");
            state.closed = true;
        }
        self.notify.notify_waiters();
        self.notify.notify_one();
    }
}

/// Receiving half of a subscription.
pub struct EventReceiver {
    queue: Arc<SubscriberQueue>,
}

impl EventReceiver {
    /// Await the next event. Returns `None` once the subscription is closed
    /// and every queued event has been drained.
    pub async fn recv(&mut self) -> Option<WorkspaceEvent> {
        loop {
            // Register interest before checking state so a push between the
            // check and the await cannot be missed.
            let notified = self.queue.notify.notified();
            {
                let mut state = self.queue.state.lock().expect("subscriber queue lock poisoned");
                if let Some(event) = state.items.pop_front() {
                    return Some(event);
                }
                if state.closed {
                    return None;
                }
            }
            notified.await;
        }
    }

    /// Non-blocking variant; `None` means empty or closed.
    pub fn try_recv(&mut self) -> Option<WorkspaceEvent> {
        self.queue.state.lock().expect("subscriber queue lock poisoned").items.pop_front()
    }
}

struct WorkspaceState {
    seq: u64,
    ring: VecDeque<WorkspaceEvent>,
    subscribers: HashMap<u64, Arc<SubscriberQueue>>,
    next_subscriber_id: u64,
}

impl WorkspaceState {
    fn new(ring_capacity: usize) -> Self {
        Self {
            seq: 0,
            ring: VecDeque::with_capacity(ring_capacity),
            subscribers: HashMap::new(),
            next_subscriber_id: 1,
        }
    }
}

struct HubInner {
    workspaces: HashMap<String, WorkspaceState>,
    closed: bool,
}

struct HubShared {
    inner: Mutex<HubInner>,
    ring_capacity: usize,
}

/// The hub. Cheap to clone; all clones share state.
#[derive(Clone)]
pub struct EventHub {
    shared: Arc<HubShared>,
}

impl Default for EventHub {
    fn default() -> Self {
        Self::new(DEFAULT_RING_CAPACITY)
    }
}

impl EventHub {
    pub fn new(ring_capacity: usize) -> Self {
        let ring_capacity = if ring_capacity == 0 { DEFAULT_RING_CAPACITY } else { ring_capacity };
        Self {
            shared: Arc::new(HubShared {
                inner: Mutex::new(HubInner { workspaces: HashMap::new(), closed: false }),
                ring_capacity,
            }),
        }
    }

    /// Assign the next per-workspace id (and a timestamp if absent), append to
    /// the replay ring, then fan out to current subscribers without blocking.
    pub fn publish(&self, workspace_id: &str, mut event: WorkspaceEvent) {
        let targets: Vec<Arc<SubscriberQueue>>;
        {
            let mut inner = self.shared.inner.lock().expect("hub lock poisoned");
            if inner.closed {
                return;
            }
            let ring_capacity = self.shared.ring_capacity;
            let state = inner
                .workspaces
                .entry(workspace_id.to_string())
                .or_insert_with(|| WorkspaceState::new(ring_capacity));

            state.seq += 1;
            event.id = state.seq;
            event.workspace_id = workspace_id.to_string();
            if event.ts.is_empty() {
                event.ts = now_rfc3339();
            }

            if state.ring.len() >= ring_capacity {
                state.ring.pop_front();
            }
            state.ring.push_back(event.clone());

            targets = state.subscribers.values().cloned().collect();
        }

        // Sends happen outside the hub lock; each push is non-blocking.
        for queue in targets {
            queue.push(event.clone());
        }
    }

    /// Register a subscriber for one workspace.
    ///
    /// Buffered events with id > `since_id` are queued for the new subscriber
    /// before it becomes visible to publishers, so delivered ids are strictly
    /// increasing across the replay/live boundary. Replay shares the
    /// drop-oldest overflow policy with live delivery.
    pub fn subscribe(
        &self,
        workspace_id: &str,
        since_id: u64,
        buffer: usize,
    ) -> (EventReceiver, Subscription) {
        let buffer = if buffer == 0 { DEFAULT_SUBSCRIBER_BUFFER } else { buffer };
        let queue = SubscriberQueue::new(buffer);

        let subscriber_id;
        {
            let mut inner = self.shared.inner.lock().expect("hub lock poisoned");
            if inner.closed {
                queue.close();
                let receiver = EventReceiver { queue };
                return (receiver, Subscription::detached());
            }
            let ring_capacity = self.shared.ring_capacity;
            let state = inner
                .workspaces
                .entry(workspace_id.to_string())
                .or_insert_with(|| WorkspaceState::new(ring_capacity));

            for event in state.ring.iter().filter(|e| e.id > since_id) {
                queue.push(event.clone());
            }

            subscriber_id = state.next_subscriber_id;
            state.next_subscriber_id += 1;
            state.subscribers.insert(subscriber_id, queue.clone());
        }

        let receiver = EventReceiver { queue };
        let subscription = Subscription {
            shared: Some(self.shared.clone()),
            workspace_id: workspace_id.to_string(),
            subscriber_id,
        };
        (receiver, subscription)
    }

    /// Terminate every subscription across all workspaces.
    pub fn close(&self) {
        let mut inner = self.shared.inner.lock().expect("hub lock poisoned");
        if inner.closed {
            return;
        }
        inner.closed = true;
        for state in inner.workspaces.values_mut() {
            for queue in state.subscribers.values() {
                queue.close();
            }
            state.subscribers.clear();
        }
    }
}

/// Removes its subscriber from the hub when dropped; `unsubscribe` is
/// idempotent and may be called explicitly.
pub struct Subscription {
    shared: Option<Arc<HubShared>>,
    workspace_id: String,
    subscriber_id: u64,
}

impl Subscription {
    fn detached() -> Self {
        Subscription { shared: None, workspace_id: String::new(), subscriber_id: 0 }
    }

    pub fn unsubscribe(&mut self) {
        let Some(shared) = self.shared.take() else {
            return;
        };
        let mut inner = shared.inner.lock().expect("hub lock poisoned");
        if let Some(state) = inner.workspaces.get_mut(&self.workspace_id) {
            if let Some(queue) = state.subscribers.remove(&self.subscriber_id) {
                queue.close();
            }
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}
