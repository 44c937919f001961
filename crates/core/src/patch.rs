//! Partial task updates sent over PATCH.
//!
//! A field left at [`FieldPatch::Unchanged`] (or `None` for non-nullable
//! fields) is omitted from the payload; [`FieldPatch::Clear`] is sent as an
//! explicit JSON `null`.

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use chrono::{DateTime, Utc};

use crate::model::{Subtask, Task};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum FieldPatch<T> {
    #[default]
    Unchanged,
    Clear,
    Set(T),
}

impl<T> FieldPatch<T> {
    pub fn is_unchanged(&self) -> bool {
        matches!(self, FieldPatch::Unchanged)
    }

    /// `None` becomes the clear sentinel.
    pub fn from_value(value: Option<T>) -> Self {
        match value {
            Some(value) => FieldPatch::Set(value),
            None => FieldPatch::Clear,
        }
    }

    fn apply(&self, slot: &mut Option<T>)
    where
        T: Clone,
    {
        match self {
            FieldPatch::Unchanged => {}
            FieldPatch::Clear => *slot = None,
            FieldPatch::Set(value) => *slot = Some(value.clone()),
        }
    }
}

impl<T: Serialize> Serialize for FieldPatch<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            FieldPatch::Set(value) => value.serialize(serializer),
            FieldPatch::Unchanged | FieldPatch::Clear => serializer.serialize_none(),
        }
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for FieldPatch<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(FieldPatch::from_value(Option::<T>::deserialize(deserializer)?))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartialTask {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "FieldPatch::is_unchanged")]
    pub description: FieldPatch<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed: Option<bool>,
    #[serde(default, skip_serializing_if = "FieldPatch::is_unchanged")]
    pub completed_at: FieldPatch<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "FieldPatch::is_unchanged")]
    pub priority: FieldPatch<u8>,
    #[serde(default, skip_serializing_if = "FieldPatch::is_unchanged")]
    pub due_date: FieldPatch<String>,
    #[serde(default, skip_serializing_if = "FieldPatch::is_unchanged")]
    pub project_id: FieldPatch<String>,
    #[serde(default, skip_serializing_if = "FieldPatch::is_unchanged")]
    pub section_id: FieldPatch<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtasks: Option<Vec<Subtask>>,
    #[serde(default, skip_serializing_if = "FieldPatch::is_unchanged")]
    pub recurring_mode: FieldPatch<String>,
}

impl PartialTask {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    /// Number of keys in the payload, the identifier included.
    pub fn field_count(&self) -> usize {
        1 + usize::from(self.title.is_some())
            + usize::from(!self.description.is_unchanged())
            + usize::from(self.completed.is_some())
            + usize::from(!self.completed_at.is_unchanged())
            + usize::from(!self.priority.is_unchanged())
            + usize::from(!self.due_date.is_unchanged())
            + usize::from(!self.project_id.is_unchanged())
            + usize::from(!self.section_id.is_unchanged())
            + usize::from(self.labels.is_some())
            + usize::from(self.subtasks.is_some())
            + usize::from(!self.recurring_mode.is_unchanged())
    }

    /// Only the identifier is present: nothing to send.
    pub fn is_empty(&self) -> bool {
        self.field_count() <= 1
    }

    pub fn apply_to(&self, task: &mut Task) {
        if let Some(title) = &self.title {
            task.title = title.clone();
        }
        self.description.apply(&mut task.description);
        if let Some(completed) = self.completed {
            task.completed = Some(completed);
        }
        self.completed_at.apply(&mut task.completed_at);
        self.priority.apply(&mut task.priority);
        self.due_date.apply(&mut task.due_date);
        self.project_id.apply(&mut task.project_id);
        self.section_id.apply(&mut task.section_id);
        if let Some(labels) = &self.labels {
            task.labels = labels.clone();
        }
        if let Some(subtasks) = &self.subtasks {
            task.subtasks = subtasks.clone();
        }
        self.recurring_mode.apply(&mut task.recurring_mode);
    }
}
