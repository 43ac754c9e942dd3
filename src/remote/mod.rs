//! Boundary to the hosted database / realtime service.
//!
//! The adapter only needs a handful of capabilities from the remote
//! product: filtered, ordered reads with one embedded child table; row
//! insert/update/delete; and per-table change notifications. They are
//! expressed as two traits so that tests and offline tooling can swap in
//! [`MemoryRemote`].

mod memory;
mod postgrest;
mod realtime;

pub use memory::MemoryRemote;
pub use postgrest::PostgrestClient;
pub use realtime::{parse_change_frame, RealtimeFeed};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::broadcast;

use crate::error::Result;

/// Equality filter on one column (`column=eq.value`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filter {
    pub column: String,
    pub value: String,
}

impl Filter {
    pub fn eq(column: &str, value: impl ToString) -> Self {
        Self {
            column: column.to_string(),
            value: value.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Order {
    pub column: &'static str,
    pub ascending: bool,
}

/// A child table joined into each parent row on read, keyed by
/// `foreign_key = parent.id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Embed {
    pub table: &'static str,
    pub foreign_key: &'static str,
    pub columns: &'static [&'static str],
}

#[derive(Debug, Clone, Default)]
pub struct Query {
    pub embed: Option<Embed>,
    pub filters: Vec<Filter>,
    pub order: Option<Order>,
}

impl Query {
    /// Select clause in PostgREST syntax, e.g. `*,manejo_animais(animal_id)`.
    pub fn select_clause(&self) -> String {
        match self.embed {
            Some(embed) => format!("*,{}({})", embed.table, embed.columns.join(",")),
            None => "*".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

impl std::str::FromStr for ChangeKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "INSERT" => Ok(ChangeKind::Insert),
            "UPDATE" => Ok(ChangeKind::Update),
            "DELETE" => Ok(ChangeKind::Delete),
            _ => Err(format!("Unknown change type: {}", s)),
        }
    }
}

/// "Something changed in `table`". Carries no row payload: consumers
/// re-fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub table: String,
    pub kind: ChangeKind,
}

#[async_trait]
pub trait RemoteStore: Send + Sync {
    async fn select(&self, table: &str, query: &Query) -> Result<Vec<Value>>;

    async fn insert(&self, table: &str, rows: Vec<Value>) -> Result<()>;

    /// Patch every row matching all `filters`; returns how many matched.
    async fn update(&self, table: &str, filters: &[Filter], patch: Value) -> Result<usize>;

    async fn delete(&self, table: &str, filter: &Filter) -> Result<()>;
}

#[async_trait]
pub trait ChangeFeed: Send + Sync {
    async fn subscribe(&self, table: &str) -> Result<broadcast::Receiver<ChangeEvent>>;
}
