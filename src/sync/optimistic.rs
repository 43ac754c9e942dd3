use crate::error::{RebanhoError, Result};

/// Where an optimistic mutation stands.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncState<T> {
    /// No mutation has been made since the last refresh.
    Idle,
    /// Applied locally, remote write not yet answered.
    Pending { prior: T },
    /// The remote write succeeded; waiting for the converging reload.
    Committed,
    /// The remote write failed and the local change was undone.
    RolledBack { prior: T, error: String },
}

/// Data shown to the user plus the bookkeeping for one in-flight mutation.
///
/// The sequence is `apply` (local change, shown immediately), then either
/// `commit` or `rollback` once the remote answers, then `refresh` with the
/// re-fetched authoritative data. Only one mutation may be pending.
#[derive(Debug, Clone)]
pub struct OptimisticView<T: Clone> {
    current: T,
    state: SyncState<T>,
}

impl<T: Clone> OptimisticView<T> {
    pub fn new(initial: T) -> Self {
        Self {
            current: initial,
            state: SyncState::Idle,
        }
    }

    pub fn current(&self) -> &T {
        &self.current
    }

    pub fn state(&self) -> &SyncState<T> {
        &self.state
    }

    pub fn is_pending(&self) -> bool {
        matches!(self.state, SyncState::Pending { .. })
    }

    /// Change the shown data right away and remember what it was before.
    pub fn apply(&mut self, f: impl FnOnce(&mut T)) -> Result<()> {
        if self.is_pending() {
            return Err(RebanhoError::MutationInFlight);
        }
        let prior = self.current.clone();
        f(&mut self.current);
        self.state = SyncState::Pending { prior };
        Ok(())
    }

    /// The remote accepted the mutation. Returns `false` if nothing was pending.
    pub fn commit(&mut self) -> bool {
        if !self.is_pending() {
            return false;
        }
        self.state = SyncState::Committed;
        true
    }

    /// The remote refused the mutation: restore the data from before
    /// `apply`. Returns `false` if nothing was pending.
    pub fn rollback(&mut self, error: impl ToString) -> bool {
        let SyncState::Pending { prior } = std::mem::replace(&mut self.state, SyncState::Idle) else {
            return false;
        };
        self.current = prior.clone();
        self.state = SyncState::RolledBack {
            prior,
            error: error.to_string(),
        };
        true
    }

    /// Replace the shown data with freshly fetched data.
    ///
    /// While a mutation is pending only the remembered prior is replaced,
    /// so the optimistic change stays visible and a rollback lands on the
    /// newer data.
    pub fn refresh(&mut self, fresh: T) {
        match &mut self.state {
            SyncState::Pending { prior } => *prior = fresh,
            _ => {
                self.current = fresh;
                self.state = SyncState::Idle;
            }
        }
    }

    /// Error of the last rolled-back mutation, until the next refresh.
    pub fn last_error(&self) -> Option<&str> {
        match &self.state {
            SyncState::RolledBack { error, .. } => Some(error),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_commit_refresh() {
        let mut view = OptimisticView::new(vec![1, 2]);
        view.apply(|v| v.push(3)).unwrap();
        assert_eq!(view.current(), &vec![1, 2, 3]);
        assert_eq!(view.state(), &SyncState::Pending { prior: vec![1, 2] });

        assert!(view.commit());
        assert_eq!(view.state(), &SyncState::Committed);
        assert_eq!(view.current(), &vec![1, 2, 3]);

        view.refresh(vec![1, 2, 3, 4]);
        assert_eq!(view.state(), &SyncState::Idle);
        assert_eq!(view.current(), &vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_rollback_restores_prior() {
        let mut view = OptimisticView::new(vec!["a".to_string()]);
        view.apply(|v| v.clear()).unwrap();
        assert!(view.current().is_empty());

        assert!(view.rollback("offline"));
        assert_eq!(view.current(), &vec!["a".to_string()]);
        assert_eq!(view.last_error(), Some("offline"));

        view.refresh(vec!["a".to_string()]);
        assert_eq!(view.last_error(), None);
    }

    #[test]
    fn test_second_apply_while_pending_is_refused() {
        let mut view = OptimisticView::new(0);
        view.apply(|n| *n += 1).unwrap();
        assert!(matches!(
            view.apply(|n| *n += 1),
            Err(RebanhoError::MutationInFlight)
        ));
        assert_eq!(*view.current(), 1);
    }

    #[test]
    fn test_commit_and_rollback_without_pending() {
        let mut view = OptimisticView::new(0);
        assert!(!view.commit());
        assert!(!view.rollback("x"));
        assert_eq!(view.state(), &SyncState::Idle);
    }

    #[test]
    fn test_refresh_while_pending_keeps_optimistic_value() {
        let mut view = OptimisticView::new(1);
        view.apply(|n| *n = 10).unwrap();
        view.refresh(2);
        assert_eq!(*view.current(), 10);

        view.rollback("rejected");
        assert_eq!(*view.current(), 2);
    }
}
