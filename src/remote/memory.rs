use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::broadcast;

use super::{ChangeEvent, ChangeFeed, ChangeKind, Filter, Query, RemoteStore};
use crate::error::{RebanhoError, Result};

const CHANNEL_CAPACITY: usize = 64;

/// In-process stand-in for the hosted store.
///
/// Rows are kept as JSON objects in the remote column layout, embedded
/// reads are resolved the way PostgREST resolves them, and every mutation
/// is broadcast to subscribers. The store can be switched offline or told
/// to reject writes to a table, which is how failure paths are exercised.
#[derive(Default)]
pub struct MemoryRemote {
    tables: Mutex<HashMap<String, Vec<Value>>>,
    channels: Mutex<HashMap<String, broadcast::Sender<ChangeEvent>>>,
    rejected_tables: Mutex<HashSet<String>>,
    offline: AtomicBool,
}

fn lock<T>(mutex: &Mutex<T>) -> Result<std::sync::MutexGuard<'_, T>> {
    mutex
        .lock()
        .map_err(|_| RebanhoError::Storage("memory remote lock poisoned".to_string()))
}

fn as_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn matches(row: &Value, filter: &Filter) -> bool {
    row.get(&filter.column)
        .map(|v| as_text(v) == filter.value)
        .unwrap_or(false)
}

impl MemoryRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate the service being unreachable.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Make every write to `table` fail with a constraint violation.
    pub fn reject_writes_to(&self, table: &str) {
        if let Ok(mut rejected) = self.rejected_tables.lock() {
            rejected.insert(table.to_string());
        }
    }

    /// Raw rows of a table, in insertion order.
    pub fn rows(&self, table: &str) -> Vec<Value> {
        self.tables
            .lock()
            .map(|tables| tables.get(table).cloned().unwrap_or_default())
            .unwrap_or_default()
    }

    fn check_online(&self) -> Result<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(RebanhoError::Unreachable(
                "memory remote is offline".to_string(),
            ));
        }
        Ok(())
    }

    fn check_writable(&self, table: &str) -> Result<()> {
        self.check_online()?;
        if lock(&self.rejected_tables)?.contains(table) {
            return Err(RebanhoError::Rejected {
                status: 409,
                message: format!("write to {} violates a constraint", table),
            });
        }
        Ok(())
    }

    fn notify(&self, table: &str, kind: ChangeKind) {
        if let Ok(channels) = self.channels.lock() {
            if let Some(tx) = channels.get(table) {
                let _ = tx.send(ChangeEvent {
                    table: table.to_string(),
                    kind,
                });
            }
        }
    }
}

#[async_trait]
impl RemoteStore for MemoryRemote {
    async fn select(&self, table: &str, query: &Query) -> Result<Vec<Value>> {
        self.check_online()?;

        let tables = lock(&self.tables)?;
        let mut rows: Vec<Value> = tables
            .get(table)
            .map(|rows| {
                rows.iter()
                    .filter(|row| query.filters.iter().all(|f| matches(row, f)))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        if let Some(embed) = query.embed {
            let children = tables.get(embed.table).cloned().unwrap_or_default();
            for row in rows.iter_mut() {
                let parent_id = row.get("id").map(as_text).unwrap_or_default();
                let joined: Vec<Value> = children
                    .iter()
                    .filter(|child| {
                        child.get(embed.foreign_key).map(as_text).as_deref()
                            == Some(parent_id.as_str())
                    })
                    .map(|child| {
                        let projected: serde_json::Map<String, Value> = embed
                            .columns
                            .iter()
                            .filter_map(|c| child.get(*c).map(|v| (c.to_string(), v.clone())))
                            .collect();
                        Value::Object(projected)
                    })
                    .collect();
                if let Value::Object(map) = row {
                    map.insert(embed.table.to_string(), Value::Array(joined));
                }
            }
        }

        if let Some(order) = query.order {
            rows.sort_by(|a, b| {
                let ka = a.get(order.column).map(as_text).unwrap_or_default();
                let kb = b.get(order.column).map(as_text).unwrap_or_default();
                if order.ascending {
                    ka.cmp(&kb)
                } else {
                    kb.cmp(&ka)
                }
            });
        }

        Ok(rows)
    }

    async fn insert(&self, table: &str, rows: Vec<Value>) -> Result<()> {
        self.check_writable(table)?;
        lock(&self.tables)?
            .entry(table.to_string())
            .or_default()
            .extend(rows);
        self.notify(table, ChangeKind::Insert);
        Ok(())
    }

    async fn update(&self, table: &str, filters: &[Filter], patch: Value) -> Result<usize> {
        self.check_writable(table)?;
        let Value::Object(patch) = patch else {
            return Err(RebanhoError::Rejected {
                status: 400,
                message: "update body must be an object".to_string(),
            });
        };

        let mut matched = 0;
        {
            let mut tables = lock(&self.tables)?;
            if let Some(rows) = tables.get_mut(table) {
                let hits = rows
                    .iter_mut()
                    .filter(|row| filters.iter().all(|f| matches(row, f)));
                for row in hits {
                    if let Value::Object(map) = row {
                        for (k, v) in &patch {
                            map.insert(k.clone(), v.clone());
                        }
                        matched += 1;
                    }
                }
            }
        }
        self.notify(table, ChangeKind::Update);
        Ok(matched)
    }

    async fn delete(&self, table: &str, filter: &Filter) -> Result<()> {
        self.check_online()?;
        {
            let mut tables = lock(&self.tables)?;
            if let Some(rows) = tables.get_mut(table) {
                rows.retain(|row| !matches(row, filter));
            }
        }
        self.notify(table, ChangeKind::Delete);
        Ok(())
    }
}

#[async_trait]
impl ChangeFeed for MemoryRemote {
    async fn subscribe(&self, table: &str) -> Result<broadcast::Receiver<ChangeEvent>> {
        self.check_online()?;
        let mut channels = lock(&self.channels)?;
        let tx = channels
            .entry(table.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0);
        Ok(tx.subscribe())
    }
}
