use std::collections::HashSet;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use super::{non_empty, require_title, Record};
use crate::error::{RebanhoError, Result};
use crate::recurrence::{next_occurrence, Frequency, Recurrence};
use crate::remote::{Embed, Filter, Order};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    #[default]
    Pending,
    Done,
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskStatus::Pending => write!(f, "pending"),
            TaskStatus::Done => write!(f, "done"),
        }
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" | "pendente" => Ok(TaskStatus::Pending),
            "done" | "concluido" | "concluído" => Ok(TaskStatus::Done),
            _ => Err(format!("Invalid task status: {}", s)),
        }
    }
}

/// A scheduled husbandry action (manejo).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub title: String,
    pub category: String,
    #[serde(default)]
    pub recurrence: Recurrence,
    pub planned_date: NaiveDate,
    #[serde(default)]
    pub planned_time: Option<NaiveTime>,
    #[serde(default)]
    pub executed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub executed_by: Option<String>,
    #[serde(default)]
    pub assigned_to: Option<String>,
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(default)]
    pub instructions: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    /// Whole animal group the task applies to. When set, `animal_ids` is empty.
    #[serde(default)]
    pub group: Option<String>,
    #[serde(default)]
    pub animal_ids: Vec<String>,
    #[serde(default)]
    pub edited_by_manager: bool,
    #[serde(default)]
    pub last_edited_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct NewTask {
    pub title: String,
    pub category: String,
    pub recurrence: Recurrence,
    pub planned_date: NaiveDate,
    pub planned_time: Option<NaiveTime>,
    pub assigned_to: Option<String>,
    pub instructions: Option<String>,
    pub group: Option<String>,
    pub animal_ids: Vec<String>,
}

/// Update payload for a task
#[derive(Debug, Clone, Default)]
pub struct TaskPatch {
    pub title: Option<String>,
    pub category: Option<String>,
    pub recurrence: Option<Recurrence>,
    pub planned_date: Option<NaiveDate>,
    pub planned_time: Option<Option<NaiveTime>>, // Some(None) to clear
    pub assigned_to: Option<Option<String>>,
    pub instructions: Option<Option<String>>,
    pub group: Option<Option<String>>,
    pub animal_ids: Option<Vec<String>>,
    /// The edit was made by a manager; recorded in the audit fields.
    pub by_manager: bool,
}

impl Task {
    pub fn is_done(&self) -> bool {
        self.status == TaskStatus::Done
    }

    /// Stamp the completion fields.
    pub fn complete(&mut self, executor: &str, notes: Option<String>, at: DateTime<Utc>) {
        self.status = TaskStatus::Done;
        self.executed_by = Some(executor.to_string());
        self.executed_at = Some(at);
        self.notes = non_empty(notes);
    }

    /// The pending task that follows this one under its recurrence rule,
    /// or `None` when the rule is exhausted or produces no date.
    pub fn next_instance(&self, id: Uuid, now: DateTime<Utc>) -> Option<Task> {
        if !self.recurrence.is_recurring() {
            return None;
        }
        let next_count = self.recurrence.count + 1;
        if !self.recurrence.allows(next_count) {
            return None;
        }
        let planned_date = next_occurrence(self.planned_date, &self.recurrence)?;

        Some(Task {
            id,
            title: self.title.clone(),
            category: self.category.clone(),
            recurrence: Recurrence {
                count: next_count,
                ..self.recurrence.clone()
            },
            planned_date,
            planned_time: self.planned_time,
            executed_at: None,
            executed_by: None,
            assigned_to: self.assigned_to.clone(),
            status: TaskStatus::Pending,
            instructions: self.instructions.clone(),
            notes: None,
            group: self.group.clone(),
            animal_ids: self.animal_ids.clone(),
            edited_by_manager: false,
            last_edited_at: None,
            created_at: now,
        })
    }

    fn normalize_target(&mut self) {
        self.group = non_empty(self.group.take());
        if self.group.is_some() {
            self.animal_ids.clear();
        }
        let mut seen = HashSet::new();
        self.animal_ids
            .retain(|a| !a.trim().is_empty() && seen.insert(a.clone()));
    }

    /// Remote filter matching rows that are still pending.
    pub(crate) fn pending_filter() -> Filter {
        Filter::eq("status", status_column(TaskStatus::Pending))
    }
}

// Remote column layout of the `manejos` table.

#[derive(Serialize, Deserialize)]
struct RecurrenceConfigRow {
    #[serde(default = "one")]
    intervalo: u32,
    #[serde(default)]
    dias_semana: Vec<u8>,
    #[serde(default)]
    dia_mes: Option<u32>,
    #[serde(default)]
    limite: Option<u32>,
    #[serde(default)]
    contagem: u32,
}

fn one() -> u32 {
    1
}

#[derive(Deserialize)]
struct AnimalLinkRow {
    animal_id: String,
}

#[derive(Serialize, Deserialize)]
struct TaskRow {
    id: Uuid,
    titulo: String,
    #[serde(default)]
    tipo: String,
    #[serde(default)]
    recorrencia: Option<String>,
    #[serde(default)]
    config_recorrencia: Option<RecurrenceConfigRow>,
    data_prevista: NaiveDate,
    #[serde(default)]
    hora_prevista: Option<NaiveTime>,
    #[serde(default)]
    data_execucao: Option<DateTime<Utc>>,
    #[serde(default)]
    executado_por: Option<String>,
    #[serde(default)]
    responsavel: Option<String>,
    status: String,
    #[serde(default)]
    instrucoes: Option<String>,
    #[serde(default)]
    observacoes: Option<String>,
    #[serde(default)]
    lote: Option<String>,
    #[serde(default)]
    editado_gerente: bool,
    #[serde(default)]
    ultima_edicao: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    #[serde(default, skip_serializing)]
    manejo_animais: Option<Vec<AnimalLinkRow>>,
}

fn frequency_column(frequency: Frequency) -> &'static str {
    match frequency {
        Frequency::None => "nenhuma",
        Frequency::Daily => "diaria",
        Frequency::Weekly => "semanal",
        Frequency::Monthly => "mensal",
    }
}

fn status_column(status: TaskStatus) -> &'static str {
    match status {
        TaskStatus::Pending => "pendente",
        TaskStatus::Done => "concluido",
    }
}

const ANIMAL_LINKS: Embed = Embed {
    table: "manejo_animais",
    foreign_key: "manejo_id",
    columns: &["animal_id"],
};

impl Record for Task {
    type Draft = NewTask;
    type Patch = TaskPatch;

    const KIND: &'static str = "task";
    const LOCAL_KEY: &'static str = "rebanho.manejos";
    const TABLE: &'static str = "manejos";
    const ORDER: Order = Order {
        column: "data_prevista",
        ascending: true,
    };
    const LINKS: Option<Embed> = Some(ANIMAL_LINKS);

    fn id(&self) -> Uuid {
        self.id
    }

    fn title(&self) -> &str {
        &self.title
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn from_draft(draft: NewTask, id: Uuid, now: DateTime<Utc>) -> Result<Self> {
        let title = require_title(Self::KIND, &draft.title)?;
        let mut task = Task {
            id,
            title,
            category: draft.category.trim().to_string(),
            recurrence: draft.recurrence,
            planned_date: draft.planned_date,
            planned_time: draft.planned_time,
            executed_at: None,
            executed_by: None,
            assigned_to: non_empty(draft.assigned_to),
            status: TaskStatus::Pending,
            instructions: non_empty(draft.instructions),
            notes: None,
            group: draft.group,
            animal_ids: draft.animal_ids,
            edited_by_manager: false,
            last_edited_at: None,
            created_at: now,
        };
        task.normalize_target();
        Ok(task)
    }

    fn apply_patch(&mut self, patch: TaskPatch, now: DateTime<Utc>) -> Result<()> {
        if let Some(title) = patch.title {
            self.title = require_title(Self::KIND, &title)?;
        }
        if let Some(category) = patch.category {
            self.category = category.trim().to_string();
        }
        if let Some(recurrence) = patch.recurrence {
            self.recurrence = recurrence;
        }
        if let Some(date) = patch.planned_date {
            self.planned_date = date;
        }
        if let Some(time) = patch.planned_time {
            self.planned_time = time;
        }
        if let Some(assigned_to) = patch.assigned_to {
            self.assigned_to = non_empty(assigned_to);
        }
        if let Some(instructions) = patch.instructions {
            self.instructions = non_empty(instructions);
        }
        if let Some(group) = patch.group {
            self.group = group;
        }
        if let Some(animal_ids) = patch.animal_ids {
            self.animal_ids = animal_ids;
        }
        self.normalize_target();

        self.last_edited_at = Some(now);
        self.edited_by_manager |= patch.by_manager;
        Ok(())
    }

    fn to_row(&self) -> Result<Value> {
        let row = TaskRow {
            id: self.id,
            titulo: self.title.clone(),
            tipo: self.category.clone(),
            recorrencia: Some(frequency_column(self.recurrence.frequency).to_string()),
            config_recorrencia: Some(RecurrenceConfigRow {
                intervalo: self.recurrence.interval,
                dias_semana: self.recurrence.weekdays.clone(),
                dia_mes: self.recurrence.day_of_month,
                limite: self.recurrence.limit,
                contagem: self.recurrence.count,
            }),
            data_prevista: self.planned_date,
            hora_prevista: self.planned_time,
            data_execucao: self.executed_at,
            executado_por: self.executed_by.clone(),
            responsavel: self.assigned_to.clone(),
            status: status_column(self.status).to_string(),
            instrucoes: self.instructions.clone(),
            observacoes: self.notes.clone(),
            lote: self.group.clone(),
            editado_gerente: self.edited_by_manager,
            ultima_edicao: self.last_edited_at,
            created_at: self.created_at,
            manejo_animais: None,
        };
        Ok(serde_json::to_value(row)?)
    }

    fn from_row(row: Value) -> Result<Self> {
        let row: TaskRow = serde_json::from_value(row)?;

        let frequency = match row.recorrencia.as_deref() {
            Some(value) => value.parse().map_err(RebanhoError::Validation)?,
            None => Frequency::None,
        };
        let config = row.config_recorrencia.unwrap_or(RecurrenceConfigRow {
            intervalo: 1,
            dias_semana: Vec::new(),
            dia_mes: None,
            limite: None,
            contagem: 0,
        });

        Ok(Task {
            id: row.id,
            title: row.titulo,
            category: row.tipo,
            recurrence: Recurrence {
                frequency,
                interval: config.intervalo,
                weekdays: config.dias_semana,
                day_of_month: config.dia_mes,
                limit: config.limite,
                count: config.contagem,
            },
            planned_date: row.data_prevista,
            planned_time: row.hora_prevista,
            executed_at: row.data_execucao,
            executed_by: row.executado_por,
            assigned_to: row.responsavel,
            status: row.status.parse().map_err(RebanhoError::Validation)?,
            instructions: row.instrucoes,
            notes: row.observacoes,
            group: row.lote,
            animal_ids: row
                .manejo_animais
                .unwrap_or_default()
                .into_iter()
                .map(|link| link.animal_id)
                .collect(),
            edited_by_manager: row.editado_gerente,
            last_edited_at: row.ultima_edicao,
            created_at: row.created_at,
        })
    }

    fn link_rows(&self) -> Vec<Value> {
        if self.group.is_some() {
            return Vec::new();
        }
        self.animal_ids
            .iter()
            .map(|animal| json!({"manejo_id": self.id, "animal_id": animal}))
            .collect()
    }

    fn compare(&self, other: &Self) -> std::cmp::Ordering {
        self.planned_date
            .cmp(&other.planned_date)
            .then(self.planned_time.cmp(&other.planned_time))
    }
}
