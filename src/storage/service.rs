use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::{BlobStore, LocalCollection};
use crate::entity::{KnowledgeEntry, Notice, RadarAnalysis, Record, Task};
use crate::error::{RebanhoError, Result};
use crate::remote::{Filter, Query, RemoteStore};

/// Where an [`EntityService`] sends its operations. Chosen once at startup
/// and handed to every service.
#[derive(Clone)]
pub enum Backend {
    Remote(Arc<dyn RemoteStore>),
    Local,
}

/// Per-entity persistence adapter: the same operations routed either to
/// the remote store or to the local fallback collection.
pub struct EntityService<E: Record> {
    backend: Backend,
    local: LocalCollection<E>,
}

pub type TaskService = EntityService<Task>;
pub type NoticeService = EntityService<Notice>;
pub type KnowledgeService = EntityService<KnowledgeEntry>;
pub type RadarService = EntityService<RadarAnalysis>;

/// Result of completing a task.
#[derive(Debug, Clone)]
pub struct Completion {
    pub completed: Task,
    /// The next occurrence, when the recurrence rule produced one.
    pub next: Option<Task>,
}

fn id_filter(id: Uuid) -> Filter {
    Filter::eq("id", id)
}

impl<E: Record> EntityService<E> {
    pub fn new(backend: Backend, blobs: Arc<dyn BlobStore>) -> Self {
        Self {
            backend,
            local: LocalCollection::new(blobs),
        }
    }

    pub fn is_remote(&self) -> bool {
        matches!(self.backend, Backend::Remote(_))
    }

    /// The local fallback collection (in remote mode: the last remote read).
    pub fn local(&self) -> &LocalCollection<E> {
        &self.local
    }

    /// Every entity of this type.
    ///
    /// In remote mode a failed read is not an error: the local snapshot is
    /// returned instead, possibly stale.
    pub async fn get_all(&self) -> Result<Vec<E>> {
        let remote = match &self.backend {
            Backend::Local => return self.local.load(),
            Backend::Remote(remote) => remote,
        };

        match self.fetch(remote.as_ref(), Vec::new()).await {
            Ok(items) => {
                if let Err(e) = self.local.replace(&items) {
                    warn!(kind = E::KIND, error = %e, "failed to mirror remote read locally");
                }
                Ok(items)
            }
            Err(e) => {
                warn!(kind = E::KIND, error = %e, "remote read failed, serving local snapshot");
                self.local.load()
            }
        }
    }

    /// Find one entity by full id or unambiguous id prefix.
    pub async fn resolve(&self, id: &str) -> Result<E> {
        let needle = id.trim().to_lowercase();
        if needle.is_empty() {
            return Err(RebanhoError::EntityNotFound(id.to_string()));
        }

        let mut matches: Vec<E> = self
            .get_all()
            .await?
            .into_iter()
            .filter(|e| e.id().to_string().starts_with(&needle))
            .collect();

        match matches.len() {
            0 => Err(RebanhoError::EntityNotFound(id.to_string())),
            1 => Ok(matches.remove(0)),
            _ => Err(RebanhoError::AmbiguousId(id.to_string())),
        }
    }

    pub async fn create(&self, draft: E::Draft) -> Result<E> {
        let entity = E::from_draft(draft, Uuid::new_v4(), Utc::now())?;

        match &self.backend {
            Backend::Local => self.local.modify(|items| {
                items.push(entity.clone());
                Ok(())
            })?,
            Backend::Remote(remote) => insert_remote(remote.as_ref(), &entity).await?,
        }

        info!(kind = E::KIND, id = %entity.id(), title = entity.title(), "created");
        Ok(entity)
    }

    /// Apply `patch` to the entity with `id`; returns the stored result.
    pub async fn update(&self, id: Uuid, patch: E::Patch) -> Result<E> {
        let now = Utc::now();
        let (entity, _) = self
            .modify_one(id, move |entity| {
                entity.apply_patch(patch, now)?;
                Ok(true)
            })
            .await?;
        info!(kind = E::KIND, id = %id, "updated");
        Ok(entity)
    }

    pub async fn delete(&self, id: Uuid) -> Result<()> {
        match &self.backend {
            Backend::Local => self.local.modify(|items| {
                let before = items.len();
                items.retain(|e| e.id() != id);
                if items.len() == before {
                    return Err(RebanhoError::EntityNotFound(id.to_string()));
                }
                Ok(())
            })?,
            Backend::Remote(remote) => {
                if let Some(links) = E::LINKS {
                    remote
                        .delete(links.table, &Filter::eq(links.foreign_key, id))
                        .await?;
                }
                remote.delete(E::TABLE, &id_filter(id)).await?;
            }
        }
        info!(kind = E::KIND, id = %id, "deleted");
        Ok(())
    }

    async fn fetch(&self, remote: &dyn RemoteStore, filters: Vec<Filter>) -> Result<Vec<E>> {
        let query = Query {
            embed: E::LINKS,
            filters,
            order: Some(E::ORDER),
        };
        let rows = remote.select(E::TABLE, &query).await?;

        Ok(rows
            .into_iter()
            .filter_map(|row| match E::from_row(row) {
                Ok(entity) => Some(entity),
                Err(e) => {
                    warn!(kind = E::KIND, error = %e, "skipping malformed remote row");
                    None
                }
            })
            .collect())
    }

    async fn fetch_one(&self, remote: &dyn RemoteStore, id: Uuid) -> Result<E> {
        self.fetch(remote, vec![id_filter(id)])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| RebanhoError::EntityNotFound(id.to_string()))
    }

    /// Load one entity, let `f` change it, and store it when `f` reports a
    /// change. Returns the entity as stored and whether it changed.
    async fn modify_one<F>(&self, id: Uuid, f: F) -> Result<(E, bool)>
    where
        F: FnOnce(&mut E) -> Result<bool> + Send,
    {
        match &self.backend {
            Backend::Local => self.local.modify(|items| {
                let entity = items
                    .iter_mut()
                    .find(|e| e.id() == id)
                    .ok_or_else(|| RebanhoError::EntityNotFound(id.to_string()))?;
                let changed = f(entity)?;
                Ok((entity.clone(), changed))
            }),
            Backend::Remote(remote) => {
                let remote = remote.as_ref();
                let mut entity = self.fetch_one(remote, id).await?;
                let row_before = entity.to_row()?;
                let links_before = entity.link_rows();
                if !f(&mut entity)? {
                    return Ok((entity, false));
                }
                let patch = changed_columns(&row_before, &entity.to_row()?);
                if !is_empty_patch(&patch) {
                    remote.update(E::TABLE, &[id_filter(id)], patch).await?;
                }
                sync_links(remote, &entity, &links_before).await?;
                Ok((entity, true))
            }
        }
    }
}

/// Columns of `after` whose value differs from `before`. Writing only these
/// keeps a PATCH from overwriting columns another client changed since the
/// row was read.
fn changed_columns(before: &Value, after: &Value) -> Value {
    let (Value::Object(before), Value::Object(after)) = (before, after) else {
        return after.clone();
    };
    Value::Object(
        after
            .iter()
            .filter(|(column, value)| before.get(column.as_str()) != Some(*value))
            .map(|(column, value)| (column.clone(), value.clone()))
            .collect(),
    )
}

/// The values `before` held for the columns in `patch`.
fn previous_values(before: &Value, patch: &Value) -> Value {
    let Value::Object(patch) = patch else {
        return before.clone();
    };
    Value::Object(
        patch
            .keys()
            .map(|column| (column.clone(), before.get(column).cloned().unwrap_or(Value::Null)))
            .collect(),
    )
}

fn is_empty_patch(patch: &Value) -> bool {
    patch.as_object().is_some_and(|columns| columns.is_empty())
}

fn already_done() -> RebanhoError {
    RebanhoError::Validation("task is already done".to_string())
}

/// Insert the parent row, then its link rows. If the link insert fails the
/// parent row is deleted again so no half-written entity is left behind.
async fn insert_remote<E: Record>(remote: &dyn RemoteStore, entity: &E) -> Result<()> {
    remote.insert(E::TABLE, vec![entity.to_row()?]).await?;

    let (Some(links), rows) = (E::LINKS, entity.link_rows()) else {
        return Ok(());
    };
    if rows.is_empty() {
        return Ok(());
    }

    if let Err(link_error) = remote.insert(links.table, rows).await {
        match remote.delete(E::TABLE, &id_filter(entity.id())).await {
            Ok(()) => warn!(
                kind = E::KIND,
                id = %entity.id(),
                error = %link_error,
                "link rows rejected, parent row removed"
            ),
            Err(cleanup_error) => error!(
                kind = E::KIND,
                id = %entity.id(),
                error = %link_error,
                cleanup_error = %cleanup_error,
                "link rows rejected and parent row could not be removed"
            ),
        }
        return Err(link_error);
    }
    Ok(())
}

/// Rewrite the link rows of `entity` when they differ from `before`.
async fn sync_links<E: Record>(remote: &dyn RemoteStore, entity: &E, before: &[Value]) -> Result<()> {
    let Some(links) = E::LINKS else {
        return Ok(());
    };
    let after = entity.link_rows();
    if after.as_slice() == before {
        return Ok(());
    }

    remote
        .delete(links.table, &Filter::eq(links.foreign_key, entity.id()))
        .await?;
    if !after.is_empty() {
        remote.insert(links.table, after).await?;
    }
    Ok(())
}

impl EntityService<Task> {
    /// Mark `task` done by `executor` and, when its recurrence rule allows,
    /// create the next pending occurrence. Both writes have finished when
    /// this returns; in local mode they are a single collection write.
    pub async fn complete_task(
        &self,
        task: &Task,
        executor: &str,
        notes: Option<String>,
    ) -> Result<Completion> {
        let executor = executor.trim();
        if executor.is_empty() {
            return Err(RebanhoError::Validation("executor is required".to_string()));
        }
        let now = Utc::now();

        let completion = match &self.backend {
            Backend::Local => self.local.modify(|items| {
                let stored = items
                    .iter_mut()
                    .find(|t| t.id == task.id)
                    .ok_or_else(|| RebanhoError::EntityNotFound(task.id.to_string()))?;
                if stored.is_done() {
                    return Err(already_done());
                }
                stored.complete(executor, notes, now);
                let completed = stored.clone();
                let next = completed.next_instance(Uuid::new_v4(), now);
                if let Some(next) = &next {
                    items.push(next.clone());
                }
                Ok(Completion { completed, next })
            })?,
            Backend::Remote(remote) => {
                let remote = remote.as_ref();
                let stored = self.fetch_one(remote, task.id).await?;
                if stored.is_done() {
                    return Err(already_done());
                }
                let row_before = stored.to_row()?;
                let mut completed = stored;
                completed.complete(executor, notes, now);
                let patch = changed_columns(&row_before, &completed.to_row()?);

                // Only a still-pending row may be completed; a concurrent
                // completion makes this match nothing.
                let still_pending = [id_filter(task.id), Task::pending_filter()];
                if remote.update(Task::TABLE, &still_pending, patch.clone()).await? == 0 {
                    return Err(already_done());
                }

                let next = completed.next_instance(Uuid::new_v4(), now);
                if let Some(next) = &next {
                    if let Err(spawn_error) = insert_remote(remote, next).await {
                        let restore = previous_values(&row_before, &patch);
                        match remote.update(Task::TABLE, &[id_filter(task.id)], restore).await {
                            Ok(_) => warn!(
                                id = %task.id,
                                error = %spawn_error,
                                "next occurrence rejected, completion reverted"
                            ),
                            Err(revert_error) => error!(
                                id = %task.id,
                                error = %spawn_error,
                                revert_error = %revert_error,
                                "next occurrence rejected and completion could not be reverted"
                            ),
                        }
                        return Err(spawn_error);
                    }
                }
                Completion { completed, next }
            }
        };

        info!(
            id = %task.id,
            executor,
            next = ?completion.next.as_ref().map(|t| t.planned_date),
            "task completed"
        );
        Ok(completion)
    }
}

impl EntityService<Notice> {
    /// Record that `user` read the notice. Returns `false` when the user had
    /// already confirmed; no second confirmation is stored.
    pub async fn confirm(&self, id: Uuid, user: &str) -> Result<bool> {
        let user = user.trim().to_string();
        if user.is_empty() {
            return Err(RebanhoError::Validation("user is required".to_string()));
        }
        let now = Utc::now();
        let (_, added) = self
            .modify_one(id, move |notice| Ok(notice.confirm(&user, now)))
            .await?;
        Ok(added)
    }
}

impl EntityService<RadarAnalysis> {
    /// Pending → executed. Returns `false` if it was already executed.
    pub async fn mark_executed(&self, id: Uuid) -> Result<bool> {
        let now = Utc::now();
        let (_, changed) = self
            .modify_one(id, move |analysis| Ok(analysis.mark_executed(now)))
            .await?;
        Ok(changed)
    }
}
