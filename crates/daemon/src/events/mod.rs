// Change notification: hub (ring buffer + fanout), watcher, debounce.

pub mod debounce;
pub mod hub;
pub mod watcher;

pub use hub::{EventHub, EventReceiver, Subscription};
pub use watcher::WatcherHandle;
