use std::marker::PhantomData;
use std::sync::Arc;

use super::BlobStore;
use crate::entity::Record;
use crate::error::{RebanhoError, Result};

/// One entity collection stored as a single JSON blob.
///
/// Every mutation reads the whole collection, changes it in memory and
/// writes the whole collection back through [`BlobStore::update`].
pub struct LocalCollection<E: Record> {
    blobs: Arc<dyn BlobStore>,
    _entity: PhantomData<fn() -> E>,
}

impl<E: Record> Clone for LocalCollection<E> {
    fn clone(&self) -> Self {
        Self {
            blobs: self.blobs.clone(),
            _entity: PhantomData,
        }
    }
}

fn parse<E: Record>(blob: Option<&str>) -> Result<Vec<E>> {
    match blob {
        Some(text) if !text.trim().is_empty() => Ok(serde_json::from_str(text)?),
        _ => Ok(Vec::new()),
    }
}

impl<E: Record> LocalCollection<E> {
    pub fn new(blobs: Arc<dyn BlobStore>) -> Self {
        Self {
            blobs,
            _entity: PhantomData,
        }
    }

    /// All stored entities, in listing order.
    pub fn load(&self) -> Result<Vec<E>> {
        let mut items: Vec<E> = parse(self.blobs.read(E::LOCAL_KEY)?.as_deref())?;
        items.sort_by(|a, b| a.compare(b));
        Ok(items)
    }

    /// Overwrite the collection (used to mirror the last remote read).
    pub fn replace(&self, items: &[E]) -> Result<()> {
        self.blobs
            .write(E::LOCAL_KEY, &serde_json::to_string(items)?)
    }

    /// Read-modify-write the whole collection. Nothing is written if `f`
    /// fails.
    pub fn modify<R>(&self, f: impl FnOnce(&mut Vec<E>) -> Result<R>) -> Result<R> {
        let mut f = Some(f);
        let mut output = None;

        self.blobs.update(E::LOCAL_KEY, &mut |current| {
            let mut items: Vec<E> = parse(current.as_deref())?;
            let f = f
                .take()
                .ok_or_else(|| RebanhoError::Storage("collection update re-entered".to_string()))?;
            output = Some(f(&mut items)?);
            Ok(serde_json::to_string(&items)?)
        })?;

        output.ok_or_else(|| RebanhoError::Storage("collection update produced no result".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{NewNotice, Notice, NoticePriority};
    use crate::storage::MemoryBlobStore;
    use chrono::{Duration, Utc};
    use uuid::Uuid;

    fn notice(title: &str, age_minutes: i64) -> Notice {
        Notice::from_draft(
            NewNotice {
                title: title.to_string(),
                body: String::new(),
                priority: NoticePriority::Normal,
                author: "Ana".to_string(),
            },
            Uuid::new_v4(),
            Utc::now() - Duration::minutes(age_minutes),
        )
        .unwrap()
    }

    #[test]
    fn test_missing_blob_is_empty() {
        let collection: LocalCollection<Notice> = LocalCollection::new(Arc::new(MemoryBlobStore::new()));
        assert!(collection.load().unwrap().is_empty());
    }

    #[test]
    fn test_modify_and_load_sorted() {
        let collection: LocalCollection<Notice> = LocalCollection::new(Arc::new(MemoryBlobStore::new()));
        collection
            .modify(|items| {
                items.push(notice("old", 60));
                items.push(notice("new", 1));
                Ok(())
            })
            .unwrap();

        let titles: Vec<String> = collection.load().unwrap().into_iter().map(|n| n.title).collect();
        assert_eq!(titles, vec!["new".to_string(), "old".to_string()]);
    }

    #[test]
    fn test_failed_modify_keeps_previous_state() {
        let collection: LocalCollection<Notice> = LocalCollection::new(Arc::new(MemoryBlobStore::new()));
        collection.replace(&[notice("kept", 1)]).unwrap();

        let result: Result<()> = collection.modify(|items| {
            items.clear();
            Err(RebanhoError::Validation("abort".to_string()))
        });

        assert!(result.is_err());
        assert_eq!(collection.load().unwrap().len(), 1);
    }
}
