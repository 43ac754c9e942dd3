use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use uuid::Uuid;

use super::CollectionView;
use crate::entity::Notice;
use crate::error::Result;
use crate::sync::{AlertLoop, AlertSink};

pub type NoticeBoard = CollectionView<Notice>;

impl CollectionView<Notice> {
    /// Confirm a notice for `user`, showing the confirmation before the
    /// store has answered. Returns `false` if the user had already
    /// confirmed.
    pub async fn confirm(&self, id: Uuid, user: &str) -> Result<bool> {
        let now = Utc::now();
        self.mutate(
            |notices| {
                if let Some(notice) = notices.iter_mut().find(|n| n.id == id) {
                    notice.confirm(user, now);
                }
            },
            self.service().confirm(id, user),
        )
        .await
    }

    /// Urgent notices `user` has not confirmed yet, newest first.
    pub fn pending_urgent(&self, user: &str) -> Vec<Notice> {
        self.snapshot()
            .into_iter()
            .filter(|n| n.needs_attention_from(user))
            .collect()
    }

    /// Ring `sink` every `interval` until `user` has no unconfirmed urgent
    /// notice left. Each check reloads the board first.
    pub fn alert_until_confirmed(
        &self,
        user: &str,
        interval: Duration,
        sink: Arc<dyn AlertSink>,
    ) -> AlertLoop {
        let board = self.clone();
        let user = user.to_string();
        AlertLoop::start(
            interval,
            move || {
                let board = board.clone();
                let user = user.clone();
                async move {
                    if let Err(e) = board.reload().await {
                        tracing::debug!(error = %e, "alert check could not reload notices");
                    }
                    !board.pending_urgent(&user).is_empty()
                }
            },
            sink,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{NewNotice, NoticePriority};
    use crate::remote::MemoryRemote;
    use crate::storage::{Backend, EntityService, MemoryBlobStore};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingSink(AtomicUsize);

    impl AlertSink for CountingSink {
        fn ring(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn board(backend: Backend) -> NoticeBoard {
        CollectionView::new(Arc::new(EntityService::new(
            backend,
            Arc::new(MemoryBlobStore::new()),
        )))
    }

    fn urgent(title: &str) -> NewNotice {
        NewNotice {
            title: title.to_string(),
            body: "Portão do curral quebrado".to_string(),
            priority: NoticePriority::Urgent,
            author: "Ana".to_string(),
        }
    }

    #[tokio::test]
    async fn test_confirm_shows_once() {
        let board = board(Backend::Local);
        let notice = board.service().create(urgent("Portão")).await.unwrap();
        board.reload().await.unwrap();
        assert_eq!(board.pending_urgent("joao").len(), 1);

        assert!(board.confirm(notice.id, "joao").await.unwrap());
        assert!(!board.confirm(notice.id, "joao").await.unwrap());

        let shown = board.snapshot();
        assert_eq!(shown[0].confirmations.len(), 1);
        assert!(board.pending_urgent("joao").is_empty());
        assert_eq!(board.pending_urgent("maria").len(), 1);
    }

    #[tokio::test]
    async fn test_confirm_failure_reverts() {
        let remote = Arc::new(MemoryRemote::new());
        let board = board(Backend::Remote(remote.clone()));
        let notice = board.service().create(urgent("Portão")).await.unwrap();
        board.reload().await.unwrap();

        remote.reject_writes_to("avisos");
        assert!(board.confirm(notice.id, "joao").await.is_err());
        assert!(board.snapshot()[0].confirmations.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_alert_stops_after_confirmation() {
        let board = board(Backend::Local);
        let notice = board.service().create(urgent("Portão")).await.unwrap();
        let sink = Arc::new(CountingSink::default());

        let alert = board.alert_until_confirmed("joao", Duration::from_secs(30), sink.clone());
        tokio::time::sleep(Duration::from_secs(45)).await;
        assert_eq!(sink.0.load(Ordering::SeqCst), 2);

        board.service().confirm(notice.id, "joao").await.unwrap();
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(sink.0.load(Ordering::SeqCst), 2);
        assert!(!alert.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_alert_without_urgent_notice() {
        let board = board(Backend::Local);
        let sink = Arc::new(CountingSink::default());
        let alert = board.alert_until_confirmed("joao", Duration::from_secs(30), sink.clone());
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(sink.0.load(Ordering::SeqCst), 0);
        assert!(!alert.is_running());
    }
}
