mod knowledge;
mod notice;
mod radar;
mod task;

pub use knowledge::{KnowledgeEntry, NewKnowledgeEntry};
pub use notice::{Confirmation, NewNotice, Notice, NoticePatch, NoticePriority};
pub use radar::{NewRadarAnalysis, RadarAnalysis, RadarPatch, RadarStatus};
pub use task::{NewTask, Task, TaskPatch, TaskStatus};

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::error::{RebanhoError, Result};
use crate::remote::{Embed, Order};

/// A persisted entity type.
///
/// Ties together the local blob key, the remote table and its column
/// layout, and the draft/patch shapes used by `create` and `update`. The
/// Rust field names are the local serialization; `to_row`/`from_row` hold
/// the translation to remote column names.
pub trait Record: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Fields supplied on creation.
    type Draft: Send;
    /// Fields changed by `update`.
    type Patch: Send;

    /// Singular name used in messages ("task", "notice", ...).
    const KIND: &'static str;
    /// Local blob holding the whole collection.
    const LOCAL_KEY: &'static str;
    /// Remote table.
    const TABLE: &'static str;
    /// Remote listing order; local listings are sorted to match.
    const ORDER: Order;
    /// Child link table read and written alongside the parent row.
    const LINKS: Option<Embed> = None;

    fn id(&self) -> Uuid;

    fn title(&self) -> &str;

    fn created_at(&self) -> DateTime<Utc>;

    /// Build a new entity. Validation happens here, before any write.
    fn from_draft(draft: Self::Draft, id: Uuid, now: DateTime<Utc>) -> Result<Self>;

    fn apply_patch(&mut self, patch: Self::Patch, now: DateTime<Utc>) -> Result<()>;

    /// Remote row, without embedded link rows.
    fn to_row(&self) -> Result<Value>;

    /// Parse a remote row, including embedded link rows when `LINKS` is set.
    fn from_row(row: Value) -> Result<Self>;

    /// Rows to write into the `LINKS` table for this entity.
    fn link_rows(&self) -> Vec<Value> {
        Vec::new()
    }

    /// Local ordering matching `ORDER`.
    fn compare(&self, other: &Self) -> std::cmp::Ordering;
}

pub(crate) fn require_title(kind: &str, title: &str) -> Result<String> {
    let title = title.trim();
    if title.is_empty() {
        return Err(RebanhoError::Validation(format!("{} title is required", kind)));
    }
    Ok(title.to_string())
}

/// Drop empty optional text so blank form fields are stored as absent.
pub(crate) fn non_empty(value: Option<String>) -> Option<String> {
    value.and_then(|v| {
        let trimmed = v.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}
