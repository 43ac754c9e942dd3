use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::{require_title, Record};
use crate::error::{RebanhoError, Result};
use crate::remote::Order;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum NoticePriority {
    #[default]
    Normal,
    High,
    Urgent,
}

impl NoticePriority {
    fn column(self) -> &'static str {
        match self {
            NoticePriority::Normal => "normal",
            NoticePriority::High => "alta",
            NoticePriority::Urgent => "urgente",
        }
    }
}

impl std::fmt::Display for NoticePriority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NoticePriority::Normal => write!(f, "normal"),
            NoticePriority::High => write!(f, "high"),
            NoticePriority::Urgent => write!(f, "urgent"),
        }
    }
}

impl std::str::FromStr for NoticePriority {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "normal" => Ok(NoticePriority::Normal),
            "high" | "alta" => Ok(NoticePriority::High),
            "urgent" | "urgente" => Ok(NoticePriority::Urgent),
            _ => Err(format!("Invalid notice priority: {}", s)),
        }
    }
}

/// A user's read confirmation of a notice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Confirmation {
    pub user: String,
    pub confirmed_at: DateTime<Utc>,
}

/// A broadcast message (aviso) that every user confirms having read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notice {
    pub id: Uuid,
    pub title: String,
    pub body: String,
    #[serde(default)]
    pub priority: NoticePriority,
    pub author: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub confirmations: Vec<Confirmation>,
}

#[derive(Debug, Clone, Default)]
pub struct NewNotice {
    pub title: String,
    pub body: String,
    pub priority: NoticePriority,
    pub author: String,
}

#[derive(Debug, Clone, Default)]
pub struct NoticePatch {
    pub title: Option<String>,
    pub body: Option<String>,
    pub priority: Option<NoticePriority>,
}

impl Notice {
    pub fn is_confirmed_by(&self, user: &str) -> bool {
        self.confirmations.iter().any(|c| c.user == user)
    }

    /// Record that `user` read this notice. Returns `false` when the user
    /// had already confirmed, leaving the list untouched.
    pub fn confirm(&mut self, user: &str, at: DateTime<Utc>) -> bool {
        if self.is_confirmed_by(user) {
            return false;
        }
        self.confirmations.push(Confirmation {
            user: user.to_string(),
            confirmed_at: at,
        });
        true
    }

    /// Urgent and not yet confirmed by `user`.
    pub fn needs_attention_from(&self, user: &str) -> bool {
        self.priority == NoticePriority::Urgent && !self.is_confirmed_by(user)
    }
}

#[derive(Serialize, Deserialize)]
struct ConfirmationRow {
    usuario: String,
    data: DateTime<Utc>,
}

#[derive(Serialize, Deserialize)]
struct NoticeRow {
    id: Uuid,
    titulo: String,
    #[serde(default)]
    mensagem: String,
    #[serde(default)]
    prioridade: Option<String>,
    #[serde(default)]
    autor: String,
    created_at: DateTime<Utc>,
    #[serde(default)]
    confirmacoes: Option<Vec<ConfirmationRow>>,
}

impl Record for Notice {
    type Draft = NewNotice;
    type Patch = NoticePatch;

    const KIND: &'static str = "notice";
    const LOCAL_KEY: &'static str = "rebanho.avisos";
    const TABLE: &'static str = "avisos";
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

    fn from_draft(draft: NewNotice, id: Uuid, now: DateTime<Utc>) -> Result<Self> {
        Ok(Notice {
            id,
            title: require_title(Self::KIND, &draft.title)?,
            body: draft.body.trim().to_string(),
            priority: draft.priority,
            author: draft.author,
            created_at: now,
            confirmations: Vec::new(),
        })
    }

    fn apply_patch(&mut self, patch: NoticePatch, _now: DateTime<Utc>) -> Result<()> {
        if let Some(title) = patch.title {
            self.title = require_title(Self::KIND, &title)?;
        }
        if let Some(body) = patch.body {
            self.body = body.trim().to_string();
        }
        if let Some(priority) = patch.priority {
            self.priority = priority;
        }
        Ok(())
    }

    fn to_row(&self) -> Result<Value> {
        let row = NoticeRow {
            id: self.id,
            titulo: self.title.clone(),
            mensagem: self.body.clone(),
            prioridade: Some(self.priority.column().to_string()),
            autor: self.author.clone(),
            created_at: self.created_at,
            confirmacoes: Some(
                self.confirmations
                    .iter()
                    .map(|c| ConfirmationRow {
                        usuario: c.user.clone(),
                        data: c.confirmed_at,
                    })
                    .collect(),
            ),
        };
        Ok(serde_json::to_value(row)?)
    }

    fn from_row(row: Value) -> Result<Self> {
        let row: NoticeRow = serde_json::from_value(row)?;
        let priority = match row.prioridade.as_deref() {
            Some(value) => value.parse().map_err(RebanhoError::Validation)?,
            None => NoticePriority::Normal,
        };

        Ok(Notice {
            id: row.id,
            title: row.titulo,
            body: row.mensagem,
            priority,
            author: row.autor,
            created_at: row.created_at,
            confirmations: row
                .confirmacoes
                .unwrap_or_default()
                .into_iter()
                .map(|c| Confirmation {
                    user: c.usuario,
                    confirmed_at: c.data,
                })
                .collect(),
        })
    }

    fn compare(&self, other: &Self) -> std::cmp::Ordering {
        other.created_at.cmp(&self.created_at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn notice(priority: NoticePriority) -> Notice {
        Notice::from_draft(
            NewNotice {
                title: "Vacinação amanhã".to_string(),
                body: "Separar o lote 2".to_string(),
                priority,
                author: "Ana".to_string(),
            },
            Uuid::new_v4(),
            Utc::now(),
        )
        .unwrap()
    }

    #[test]
    fn test_confirm_is_idempotent_per_user() {
        let mut n = notice(NoticePriority::Normal);
        assert!(n.confirm("joao", Utc::now()));
        assert!(!n.confirm("joao", Utc::now()));
        assert!(n.confirm("maria", Utc::now()));

        assert_eq!(n.confirmations.len(), 2);
        assert_eq!(
            n.confirmations.iter().filter(|c| c.user == "joao").count(),
            1
        );
    }

    #[test]
    fn test_needs_attention_only_for_unconfirmed_urgent() {
        let mut urgent = notice(NoticePriority::Urgent);
        assert!(urgent.needs_attention_from("joao"));
        urgent.confirm("joao", Utc::now());
        assert!(!urgent.needs_attention_from("joao"));
        assert!(urgent.needs_attention_from("maria"));

        assert!(!notice(NoticePriority::High).needs_attention_from("joao"));
    }

    #[test]
    fn test_row_translation() {
        let mut n = notice(NoticePriority::Urgent);
        n.confirm("joao", Utc::now());

        let row = n.to_row().unwrap();
        assert_eq!(row["prioridade"], "urgente");
        assert_eq!(row["mensagem"], "Separar o lote 2");
        assert_eq!(row["confirmacoes"][0]["usuario"], "joao");

        assert_eq!(Notice::from_row(row).unwrap(), n);
    }

    #[test]
    fn test_from_row_tolerates_null_confirmations() {
        let row = json!({
            "id": Uuid::new_v4(),
            "titulo": "Chuva",
            "mensagem": "Recolher o rebanho",
            "prioridade": null,
            "autor": "Ana",
            "created_at": "2025-03-10T08:00:00Z",
            "confirmacoes": null
        });
        let n = Notice::from_row(row).unwrap();
        assert_eq!(n.priority, NoticePriority::Normal);
        assert!(n.confirmations.is_empty());
    }
}
