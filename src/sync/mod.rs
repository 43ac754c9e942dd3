//! Keeping shown data in step with the remote store.

pub mod alert;
pub mod bridge;
pub mod optimistic;

pub use alert::{AlertLoop, AlertSink, TerminalBell};
pub use bridge::{subscribe, Subscription};
pub use optimistic::{OptimisticView, SyncState};
