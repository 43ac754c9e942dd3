//! Recurrence rules for scheduled tasks and the next-occurrence calculator.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::dates;

/// How many days ahead a weekly rule looks for a matching weekday.
const WEEKLY_SCAN_DAYS: i64 = 14;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    #[default]
    None,
    Daily,
    Weekly,
    Monthly,
}

impl std::fmt::Display for Frequency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Frequency::None => write!(f, "none"),
            Frequency::Daily => write!(f, "daily"),
            Frequency::Weekly => write!(f, "weekly"),
            Frequency::Monthly => write!(f, "monthly"),
        }
    }
}

impl std::str::FromStr for Frequency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "none" | "nenhuma" | "" => Ok(Frequency::None),
            "daily" | "diaria" | "diária" => Ok(Frequency::Daily),
            "weekly" | "semanal" => Ok(Frequency::Weekly),
            "monthly" | "mensal" => Ok(Frequency::Monthly),
            _ => Err(format!("Invalid recurrence: {}", s)),
        }
    }
}

fn default_interval() -> u32 {
    1
}

/// Recurrence configuration carried by every task.
///
/// `count` is the number of occurrences already generated from the
/// original task; `limit` caps it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recurrence {
    pub frequency: Frequency,
    #[serde(default = "default_interval")]
    pub interval: u32,
    /// Weekdays for weekly rules, 0 = Sunday .. 6 = Saturday.
    #[serde(default)]
    pub weekdays: Vec<u8>,
    #[serde(default)]
    pub day_of_month: Option<u32>,
    #[serde(default)]
    pub limit: Option<u32>,
    #[serde(default)]
    pub count: u32,
}

impl Default for Recurrence {
    fn default() -> Self {
        Self::none()
    }
}

impl Recurrence {
    pub fn none() -> Self {
        Self {
            frequency: Frequency::None,
            interval: 1,
            weekdays: Vec::new(),
            day_of_month: None,
            limit: None,
            count: 0,
        }
    }

    pub fn daily(interval: u32) -> Self {
        Self {
            frequency: Frequency::Daily,
            interval,
            ..Self::none()
        }
    }

    pub fn weekly(weekdays: Vec<u8>) -> Self {
        Self {
            frequency: Frequency::Weekly,
            weekdays,
            ..Self::none()
        }
    }

    pub fn monthly(day_of_month: Option<u32>) -> Self {
        Self {
            frequency: Frequency::Monthly,
            day_of_month,
            ..Self::none()
        }
    }

    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn is_recurring(&self) -> bool {
        self.frequency != Frequency::None
    }

    /// Whether an occurrence numbered `next_count` may still be created.
    pub fn allows(&self, next_count: u32) -> bool {
        match self.limit {
            Some(limit) => next_count < limit,
            None => true,
        }
    }

    /// Short human description, e.g. `weekly (1,3,5)` or `daily every 2 days`.
    pub fn describe(&self) -> String {
        let base = match self.frequency {
            Frequency::None => return "once".to_string(),
            Frequency::Daily if self.interval > 1 => format!("daily every {} days", self.interval),
            Frequency::Daily => "daily".to_string(),
            Frequency::Weekly => {
                let days: Vec<String> = self.weekdays.iter().map(|d| d.to_string()).collect();
                format!("weekly ({})", days.join(","))
            }
            Frequency::Monthly => match self.day_of_month {
                Some(day) => format!("monthly on day {}", day),
                None => "monthly".to_string(),
            },
        };
        match self.limit {
            Some(limit) => format!("{} [{}/{}]", base, self.count, limit),
            None => base,
        }
    }
}

/// Date of the occurrence after `current`, or `None` when the rule does not
/// produce one.
///
/// Monthly rules advance one calendar month and then force
/// `day_of_month`; neither step clamps short months, so the result can land
/// in the following month.
pub fn next_occurrence(current: NaiveDate, rule: &Recurrence) -> Option<NaiveDate> {
    match rule.frequency {
        Frequency::None => None,
        Frequency::Daily => dates::add_days(current, rule.interval.max(1) as i64),
        Frequency::Weekly => (1..=WEEKLY_SCAN_DAYS)
            .filter_map(|offset| dates::add_days(current, offset))
            .find(|date| rule.weekdays.contains(&dates::weekday_index(*date))),
        Frequency::Monthly => {
            let next = dates::add_months_overflowing(current, 1)?;
            match rule.day_of_month {
                Some(day) => dates::with_day_overflowing(next, day),
                None => Some(next),
            }
        }
    }
}
