use std::convert::Infallible;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::{non_empty, require_title, Record};
use crate::error::Result;
use crate::remote::Order;

/// A knowledge-base article. Entries are only ever added or removed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeEntry {
    pub id: Uuid,
    pub title: String,
    #[serde(default)]
    pub category: Option<String>,
    pub content: String,
    #[serde(default)]
    pub author: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct NewKnowledgeEntry {
    pub title: String,
    pub category: Option<String>,
    pub content: String,
    pub author: Option<String>,
}

#[derive(Serialize, Deserialize)]
struct KnowledgeRow {
    id: Uuid,
    titulo: String,
    #[serde(default)]
    categoria: Option<String>,
    #[serde(default)]
    conteudo: String,
    #[serde(default)]
    autor: Option<String>,
    created_at: DateTime<Utc>,
}

impl Record for KnowledgeEntry {
    type Draft = NewKnowledgeEntry;
    type Patch = Infallible;

    const KIND: &'static str = "knowledge entry";
    const LOCAL_KEY: &'static str = "rebanho.conhecimento";
    const TABLE: &'static str = "base_conhecimento";
    const ORDER: Order = Order {
        column: "created_at",
        ascending: false,
    };

    fn id(&self) -> Uuid {
        self.id
    }

    fn title(&self) -> &str {
        &self.title
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn from_draft(draft: NewKnowledgeEntry, id: Uuid, now: DateTime<Utc>) -> Result<Self> {
        Ok(KnowledgeEntry {
            id,
            title: require_title(Self::KIND, &draft.title)?,
            category: non_empty(draft.category),
            content: draft.content,
            author: non_empty(draft.author),
            created_at: now,
        })
    }

    fn apply_patch(&mut self, patch: Infallible, _now: DateTime<Utc>) -> Result<()> {
        match patch {}
    }

    fn to_row(&self) -> Result<Value> {
        Ok(serde_json::to_value(KnowledgeRow {
            id: self.id,
            titulo: self.title.clone(),
            categoria: self.category.clone(),
            conteudo: self.content.clone(),
            autor: self.author.clone(),
            created_at: self.created_at,
        })?)
    }

    fn from_row(row: Value) -> Result<Self> {
        let row: KnowledgeRow = serde_json::from_value(row)?;
        Ok(KnowledgeEntry {
            id: row.id,
            title: row.titulo,
            category: row.categoria,
            content: row.conteudo,
            author: row.autor,
            created_at: row.created_at,
        })
    }

    fn compare(&self, other: &Self) -> std::cmp::Ordering {
        other.created_at.cmp(&self.created_at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_translation() {
        let entry = KnowledgeEntry::from_draft(
            NewKnowledgeEntry {
                title: "Famacha".to_string(),
                category: Some("sanidade".to_string()),
                content: "Avaliar a mucosa ocular...".to_string(),
                author: None,
            },
            Uuid::new_v4(),
            Utc::now(),
        )
        .unwrap();

        let row = entry.to_row().unwrap();
        assert_eq!(row["titulo"], "Famacha");
        assert_eq!(row["categoria"], "sanidade");
        assert_eq!(KnowledgeEntry::from_row(row).unwrap(), entry);
    }
}
