use std::future::Future;

use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio::sync::broadcast::Receiver;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::Result;
use crate::remote::{ChangeEvent, ChangeFeed};

/// Handle for one table watch. Dropping it stops the watch.
pub struct Subscription {
    table: String,
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl Subscription {
    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn is_active(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Stop watching and wait for the watcher task to exit.
    pub async fn unsubscribe(mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
        debug!(table = %self.table, "unsubscribed");
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Watch `table` and call `reload` after changes.
///
/// Events carry no data; each one only means "re-fetch". Events that pile
/// up while a reload runs collapse into a single follow-up reload, and a
/// lagged receiver is treated the same as a change. A failing reload is
/// logged and the watch keeps going.
pub async fn subscribe<F, Fut>(feed: &dyn ChangeFeed, table: &str, reload: F) -> Result<Subscription>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    let rx = feed.subscribe(table).await?;
    let cancel = CancellationToken::new();
    let handle = tokio::spawn(watch(table.to_string(), rx, cancel.clone(), reload));

    debug!(table, "subscribed");
    Ok(Subscription {
        table: table.to_string(),
        cancel,
        handle: Some(handle),
    })
}

async fn watch<F, Fut>(table: String, mut rx: Receiver<ChangeEvent>, cancel: CancellationToken, reload: F)
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    loop {
        let event = tokio::select! {
            _ = cancel.cancelled() => break,
            event = rx.recv() => event,
        };

        match event {
            Ok(_) | Err(RecvError::Lagged(_)) => {}
            Err(RecvError::Closed) => {
                debug!(table = %table, "change feed closed");
                break;
            }
        }

        let closed = drain(&mut rx);

        if let Err(e) = reload().await {
            warn!(table = %table, error = %e, "reload after change failed");
        }

        if closed {
            break;
        }
    }
}

/// Discard queued events. Returns `true` if the feed has closed.
fn drain(rx: &mut Receiver<ChangeEvent>) -> bool {
    loop {
        match rx.try_recv() {
            Ok(_) | Err(TryRecvError::Lagged(_)) => continue,
            Err(TryRecvError::Empty) => return false,
            Err(TryRecvError::Closed) => return true,
        }
    }
}
