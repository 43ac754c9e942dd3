use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::{non_empty, require_title, Record};
use crate::error::{RebanhoError, Result};
use crate::remote::Order;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RadarStatus {
    #[default]
    Pending,
    Executed,
}

impl std::fmt::Display for RadarStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RadarStatus::Pending => write!(f, "pending"),
            RadarStatus::Executed => write!(f, "executed"),
        }
    }
}

impl std::str::FromStr for RadarStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" | "pendente" => Ok(RadarStatus::Pending),
            "executed" | "executada" => Ok(RadarStatus::Executed),
            _ => Err(format!("Invalid radar status: {}", s)),
        }
    }
}

/// A radar (spider-chart) assessment of a flock or group, scored per axis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RadarAnalysis {
    pub id: Uuid,
    pub title: String,
    #[serde(default)]
    pub group: Option<String>,
    #[serde(default)]
    pub scores: BTreeMap<String, f64>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub status: RadarStatus,
    #[serde(default)]
    pub executed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct NewRadarAnalysis {
    pub title: String,
    pub group: Option<String>,
    pub scores: BTreeMap<String, f64>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct RadarPatch {
    pub title: Option<String>,
    pub group: Option<Option<String>>,
    pub scores: Option<BTreeMap<String, f64>>,
    pub notes: Option<Option<String>>,
}

impl RadarAnalysis {
    /// Pending → executed. Returns `false` if it was already executed.
    pub fn mark_executed(&mut self, at: DateTime<Utc>) -> bool {
        if self.status == RadarStatus::Executed {
            return false;
        }
        self.status = RadarStatus::Executed;
        self.executed_at = Some(at);
        true
    }

    /// Mean of all axis scores.
    pub fn average_score(&self) -> Option<f64> {
        if self.scores.is_empty() {
            return None;
        }
        Some(self.scores.values().sum::<f64>() / self.scores.len() as f64)
    }
}

fn validate_scores(scores: &BTreeMap<String, f64>) -> Result<()> {
    if let Some((axis, _)) = scores.iter().find(|(_, v)| !v.is_finite()) {
        return Err(RebanhoError::Validation(format!(
            "score for '{}' must be a number",
            axis
        )));
    }
    Ok(())
}

#[derive(Serialize, Deserialize)]
struct RadarRow {
    id: Uuid,
    titulo: String,
    #[serde(default)]
    lote: Option<String>,
    #[serde(default)]
    indicadores: Option<BTreeMap<String, f64>>,
    #[serde(default)]
    observacoes: Option<String>,
    status: String,
    #[serde(default)]
    executada_em: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl Record for RadarAnalysis {
    type Draft = NewRadarAnalysis;
    type Patch = RadarPatch;

    const KIND: &'static str = "radar analysis";
    const LOCAL_KEY: &'static str = "rebanho.radar";
    const TABLE: &'static str = "analises_radar";
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

    fn from_draft(draft: NewRadarAnalysis, id: Uuid, now: DateTime<Utc>) -> Result<Self> {
        validate_scores(&draft.scores)?;
        Ok(RadarAnalysis {
            id,
            title: require_title(Self::KIND, &draft.title)?,
            group: non_empty(draft.group),
            scores: draft.scores,
            notes: non_empty(draft.notes),
            status: RadarStatus::Pending,
            executed_at: None,
            created_at: now,
        })
    }

    fn apply_patch(&mut self, patch: RadarPatch, _now: DateTime<Utc>) -> Result<()> {
        if let Some(title) = patch.title {
            self.title = require_title(Self::KIND, &title)?;
        }
        if let Some(group) = patch.group {
            self.group = non_empty(group);
        }
        if let Some(scores) = patch.scores {
            validate_scores(&scores)?;
            self.scores = scores;
        }
        if let Some(notes) = patch.notes {
            self.notes = non_empty(notes);
        }
        Ok(())
    }

    fn to_row(&self) -> Result<Value> {
        let status = match self.status {
            RadarStatus::Pending => "pendente",
            RadarStatus::Executed => "executada",
        };
        Ok(serde_json::to_value(RadarRow {
            id: self.id,
            titulo: self.title.clone(),
            lote: self.group.clone(),
            indicadores: Some(self.scores.clone()),
            observacoes: self.notes.clone(),
            status: status.to_string(),
            executada_em: self.executed_at,
            created_at: self.created_at,
        })?)
    }

    fn from_row(row: Value) -> Result<Self> {
        let row: RadarRow = serde_json::from_value(row)?;
        Ok(RadarAnalysis {
            id: row.id,
            title: row.titulo,
            group: row.lote,
            scores: row.indicadores.unwrap_or_default(),
            notes: row.observacoes,
            status: row.status.parse().map_err(RebanhoError::Validation)?,
            executed_at: row.executada_em,
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

    fn analysis() -> RadarAnalysis {
        let mut scores = BTreeMap::new();
        scores.insert("escore_corporal".to_string(), 3.0);
        scores.insert("famacha".to_string(), 2.0);
        RadarAnalysis::from_draft(
            NewRadarAnalysis {
                title: "Matrizes março".to_string(),
                group: Some("Matrizes".to_string()),
                scores,
                notes: None,
            },
            Uuid::new_v4(),
            Utc::now(),
        )
        .unwrap()
    }

    #[test]
    fn test_mark_executed_is_one_way() {
        let mut a = analysis();
        let first = Utc::now();
        assert!(a.mark_executed(first));
        assert!(!a.mark_executed(Utc::now()));
        assert_eq!(a.status, RadarStatus::Executed);
        assert_eq!(a.executed_at, Some(first));
    }

    #[test]
    fn test_average_score() {
        assert_eq!(analysis().average_score(), Some(2.5));
    }

    #[test]
    fn test_rejects_non_finite_scores() {
        let mut scores = BTreeMap::new();
        scores.insert("peso".to_string(), f64::NAN);
        let draft = NewRadarAnalysis {
            title: "x".to_string(),
            scores,
            ..Default::default()
        };
        assert!(RadarAnalysis::from_draft(draft, Uuid::new_v4(), Utc::now()).is_err());
    }

    #[test]
    fn test_row_translation() {
        let mut a = analysis();
        a.mark_executed(Utc::now());
        let row = a.to_row().unwrap();
        assert_eq!(row["status"], "executada");
        assert_eq!(row["indicadores"]["famacha"], 2.0);
        assert_eq!(RadarAnalysis::from_row(row).unwrap(), a);
    }
}
