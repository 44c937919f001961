use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use anyhow::{anyhow, Result};
use chrono::{DateTime, NaiveDate, Utc};
use clap::ValueEnum;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

static CALENDAR_DAY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*(\d{4}-\d{2}-\d{2})").expect("calendar day pattern is valid")
});

/// A task as the server models it. Every field except the title may be
/// missing from the wire payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section_id: Option<String>,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub subtasks: Vec<Subtask>,
    #[serde(default)]
    pub comments: Vec<Comment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recurring_mode: Option<String>,
}

impl Task {
    pub fn key(&self) -> Option<&str> {
        self.id.as_deref().filter(|id| !id.is_empty())
    }

    /// Absence of the completion flag means "not completed".
    pub fn is_completed(&self) -> bool {
        self.completed.unwrap_or(false)
    }

    pub fn due_day(&self) -> Option<NaiveDate> {
        self.due_date.as_deref().and_then(parse_due_day)
    }

    pub fn has_label(&self, label_id: &str) -> bool {
        self.labels.iter().any(|label| label == label_id)
    }

    pub fn label_set(&self) -> HashSet<&str> {
        self.labels.iter().map(String::as_str).collect()
    }

    pub fn subtask_mut(&mut self, subtask_id: &str) -> Option<&mut Subtask> {
        self.subtasks
            .iter_mut()
            .find(|subtask| subtask.id.as_deref() == Some(subtask_id))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subtask {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<i64>,
}

impl Subtask {
    pub fn is_completed(&self) -> bool {
        self.completed.unwrap_or(false)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub slug: String,
    #[serde(default)]
    pub color: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shared: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sections: Option<Vec<Section>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_order: Option<Vec<String>>,
}

impl Project {
    pub fn section(&self, section_id: &str) -> Option<&Section> {
        self.sections
            .as_deref()
            .unwrap_or_default()
            .iter()
            .find(|section| section.id == section_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Section {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub color: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Label {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub slug: String,
    #[serde(default)]
    pub color: String,
}

/// Body of a full fetch. Missing collections mean "keep what you have".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteSnapshot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tasks: Option<Vec<Task>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub projects: Option<Vec<Project>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<Vec<Label>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

/// The last known-good `{tasks, projects, labels}` triple.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub tasks: Vec<Task>,
    #[serde(default)]
    pub projects: Vec<Project>,
    #[serde(default)]
    pub labels: Vec<Label>,
}

/// Full payload for a task the server has not seen yet. Never diffed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskDraft {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<String>,
}

impl TaskDraft {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    pub fn require_title(&self) -> Result<()> {
        if self.title.trim().is_empty() {
            return Err(anyhow!("Task title cannot be empty"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterCategory {
    #[default]
    All,
    Inbox,
    Today,
    Upcoming,
    Completed,
}

impl FilterCategory {
    pub const ALL: [FilterCategory; 5] = [
        FilterCategory::All,
        FilterCategory::Inbox,
        FilterCategory::Today,
        FilterCategory::Upcoming,
        FilterCategory::Completed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FilterCategory::All => "all",
            FilterCategory::Inbox => "inbox",
            FilterCategory::Today => "today",
            FilterCategory::Upcoming => "upcoming",
            FilterCategory::Completed => "completed",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            FilterCategory::All => "All",
            FilterCategory::Inbox => "Inbox",
            FilterCategory::Today => "Today",
            FilterCategory::Upcoming => "Upcoming",
            FilterCategory::Completed => "Completed",
        }
    }

    /// Inbox already constrains on "no project".
    pub fn applies_project_filter(&self) -> bool {
        !matches!(self, FilterCategory::Inbox)
    }

    pub fn applies_label_filter(&self) -> bool {
        !matches!(self, FilterCategory::Completed)
    }
}

impl fmt::Display for FilterCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for FilterCategory {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "all" => Ok(FilterCategory::All),
            "inbox" => Ok(FilterCategory::Inbox),
            "today" => Ok(FilterCategory::Today),
            "upcoming" => Ok(FilterCategory::Upcoming),
            "completed" | "done" => Ok(FilterCategory::Completed),
            other => Err(anyhow!(
                "Unknown filter '{}': expected all|inbox|today|upcoming|completed",
                other
            )),
        }
    }
}

impl ValueEnum for FilterCategory {
    fn value_variants<'a>() -> &'a [Self] {
        &Self::ALL
    }

    fn to_possible_value(&self) -> Option<clap::builder::PossibleValue> {
        Some(clap::builder::PossibleValue::new(self.as_str()))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOption {
    Default,
    #[default]
    DueDate,
    Priority,
}

impl SortOption {
    pub const ALL: [SortOption; 3] = [SortOption::Default, SortOption::DueDate, SortOption::Priority];

    pub fn as_str(&self) -> &'static str {
        match self {
            SortOption::Default => "default",
            SortOption::DueDate => "due",
            SortOption::Priority => "priority",
        }
    }
}

impl fmt::Display for SortOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for SortOption {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "default" | "none" => Ok(SortOption::Default),
            "due" | "due-date" | "due_date" | "duedate" => Ok(SortOption::DueDate),
            "priority" => Ok(SortOption::Priority),
            other => Err(anyhow!(
                "Unknown sort option '{}': expected default|due|priority",
                other
            )),
        }
    }
}

impl ValueEnum for SortOption {
    fn value_variants<'a>() -> &'a [Self] {
        &Self::ALL
    }

    fn to_possible_value(&self) -> Option<clap::builder::PossibleValue> {
        Some(clap::builder::PossibleValue::new(self.as_str()))
    }
}

/// Strip any time or zone suffix and keep the `YYYY-MM-DD` prefix.
pub fn normalize_due_date(raw: &str) -> Option<String> {
    let day = parse_due_day(raw)?;
    Some(day.format("%Y-%m-%d").to_string())
}

pub fn parse_due_day(raw: &str) -> Option<NaiveDate> {
    let captures = CALENDAR_DAY.captures(raw)?;
    NaiveDate::parse_from_str(captures.get(1)?.as_str(), "%Y-%m-%d").ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn normalizes_due_dates_to_calendar_days() {
        assert_eq!(normalize_due_date("2025-09-29").as_deref(), Some("2025-09-29"));
        assert_eq!(
            normalize_due_date("2025-09-29T23:30:00.000-05:00").as_deref(),
            Some("2025-09-29")
        );
        assert_eq!(normalize_due_date("tomorrow"), None);
        assert_eq!(normalize_due_date("2025-13-40"), None);
    }

    #[test]
    fn decodes_tolerant_task_payloads() {
        let raw = r#"{
            "id": "t1",
            "title": "Ship release",
            "dueDate": "2025-09-29",
            "labels": ["l1"],
            "subtasks": [{"id": "s1", "title": "Tag", "completed": true, "order": 0}],
            "createdAt": "2025-09-22T13:10:45.620Z",
            "attachments": [],
            "status": "active"
        }"#;
        let task: Task = serde_json::from_str(raw).unwrap();
        assert_eq!(task.key(), Some("t1"));
        assert!(!task.is_completed());
        assert_eq!(task.due_day(), NaiveDate::from_ymd_opt(2025, 9, 29));
        assert!(task.subtasks[0].is_completed());
        assert!(task.comments.is_empty());
    }

    #[test]
    fn project_without_sections_decodes() {
        let raw = r##"{"id": "p1", "name": "Ops", "slug": "ops", "color": "#fff"}"##;
        let project: Project = serde_json::from_str(raw).unwrap();
        assert!(project.section("s1").is_none());
        assert_eq!(project.shared, None);
    }

    #[test]
    fn filter_and_sort_parse_from_cli_strings() {
        assert_eq!("Today".parse::<FilterCategory>().unwrap(), FilterCategory::Today);
        assert_eq!("due-date".parse::<SortOption>().unwrap(), SortOption::DueDate);
        assert!("later".parse::<FilterCategory>().is_err());
        assert!(FilterCategory::Completed.applies_project_filter());
        assert!(!FilterCategory::Completed.applies_label_filter());
        assert!(!FilterCategory::Inbox.applies_project_filter());
    }
}
