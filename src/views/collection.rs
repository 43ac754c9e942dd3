use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::warn;

use crate::entity::Record;
use crate::error::{RebanhoError, Result};
use crate::remote::ChangeFeed;
use crate::storage::EntityService;
use crate::sync::{subscribe, OptimisticView, Subscription, SyncState};

/// The data one screen shows for an entity type: the last loaded list
/// plus any optimistic change on top of it.
pub struct CollectionView<E: Record> {
    service: Arc<EntityService<E>>,
    state: Arc<Mutex<OptimisticView<Vec<E>>>>,
}

impl<E: Record> Clone for CollectionView<E> {
    fn clone(&self) -> Self {
        Self {
            service: self.service.clone(),
            state: self.state.clone(),
        }
    }
}

impl<E: Record> CollectionView<E> {
    pub fn new(service: Arc<EntityService<E>>) -> Self {
        Self {
            service,
            state: Arc::new(Mutex::new(OptimisticView::new(Vec::new()))),
        }
    }

    pub fn service(&self) -> &EntityService<E> {
        &self.service
    }

    fn lock(&self) -> Result<MutexGuard<'_, OptimisticView<Vec<E>>>> {
        self.state
            .lock()
            .map_err(|_| RebanhoError::Storage("view state lock poisoned".to_string()))
    }

    /// Re-fetch everything from the service.
    pub async fn reload(&self) -> Result<()> {
        let items = self.service.get_all().await?;
        self.lock()?.refresh(items);
        Ok(())
    }

    /// What the screen currently shows.
    pub fn snapshot(&self) -> Vec<E> {
        self.state
            .lock()
            .map(|s| s.current().clone())
            .unwrap_or_default()
    }

    pub fn sync_state(&self) -> Option<SyncState<Vec<E>>> {
        self.state.lock().ok().map(|s| s.state().clone())
    }

    /// Drop everything shown (used on sign-out).
    pub fn clear(&self) {
        if let Ok(mut state) = self.state.lock() {
            *state = OptimisticView::new(Vec::new());
        }
    }

    /// Reload silently whenever the entity's remote table changes.
    pub async fn watch(&self, feed: &dyn ChangeFeed) -> Result<Subscription> {
        let view = self.clone();
        subscribe(feed, E::TABLE, move || {
            let view = view.clone();
            async move { view.reload().await }
        })
        .await
    }

    /// Show `apply` immediately, then run `remote`. On success the change
    /// is committed, on failure it is undone; either way the view reloads
    /// so it ends up matching the stored data. The remote error, if any,
    /// is returned after the reload.
    pub async fn mutate<R, Fut>(&self, apply: impl FnOnce(&mut Vec<E>), remote: Fut) -> Result<R>
    where
        Fut: Future<Output = Result<R>>,
    {
        self.lock()?.apply(apply)?;

        let outcome = remote.await;
        {
            let mut state = self.lock()?;
            match &outcome {
                Ok(_) => {
                    state.commit();
                }
                Err(e) => {
                    state.rollback(e);
                }
            }
        }

        if let Err(e) = self.reload().await {
            warn!(kind = E::KIND, error = %e, "reload after mutation failed");
        }
        outcome
    }
}
