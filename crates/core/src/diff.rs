//! Field-level diffing between two versions of a task.

use std::collections::HashSet;

use crate::model::{normalize_due_date, Task};
use crate::patch::{FieldPatch, PartialTask};

/// Build the minimal patch turning `original` into `modified`.
///
/// The identifier is taken from `modified`, falling back to `original`.
/// Due dates are compared and emitted as calendar days, labels as sets, and
/// subtasks as a whole list since the API cannot patch single subtasks. A due
/// date that is not a calendar day is passed through untouched; only a
/// missing or blank one clears the field.
pub fn diff(original: &Task, modified: &Task) -> PartialTask {
    let id = modified
        .key()
        .or_else(|| original.key())
        .unwrap_or_default();
    let mut patch = PartialTask::new(id);

    if original.title != modified.title {
        patch.title = Some(modified.title.clone());
    }
    if original.description != modified.description {
        patch.description = FieldPatch::from_value(modified.description.clone());
    }
    if original.is_completed() != modified.is_completed() {
        patch.completed = Some(modified.is_completed());
    }
    if original.completed_at != modified.completed_at {
        patch.completed_at = FieldPatch::from_value(modified.completed_at);
    }
    if original.priority != modified.priority {
        patch.priority = FieldPatch::from_value(modified.priority);
    }

    let original_due = original.due_date.as_deref().and_then(due_value);
    let modified_due = modified.due_date.as_deref().and_then(due_value);
    if original_due != modified_due {
        patch.due_date = FieldPatch::from_value(modified_due);
    }

    if original.project_id != modified.project_id {
        patch.project_id = FieldPatch::from_value(modified.project_id.clone());
    }
    if original.section_id != modified.section_id {
        patch.section_id = FieldPatch::from_value(modified.section_id.clone());
    }
    if label_set(original) != label_set(modified) {
        patch.labels = Some(modified.labels.clone());
    }
    if original.subtasks != modified.subtasks {
        patch.subtasks = Some(modified.subtasks.clone());
    }
    if original.recurring_mode != modified.recurring_mode {
        patch.recurring_mode = FieldPatch::from_value(modified.recurring_mode.clone());
    }

    patch
}

fn due_value(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    normalize_due_date(trimmed).or_else(|| Some(trimmed.to_string()))
}

fn label_set(task: &Task) -> HashSet<&str> {
    task.label_set()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Subtask;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn sample() -> Task {
        Task {
            id: Some("t1".into()),
            title: "Write report".into(),
            description: Some("Quarterly numbers".into()),
            completed: None,
            priority: Some(2),
            due_date: Some("2025-09-29".into()),
            project_id: Some("p1".into()),
            section_id: None,
            labels: vec!["l1".into(), "l2".into()],
            subtasks: vec![Subtask {
                id: Some("s1".into()),
                title: "Outline".into(),
                completed: Some(false),
                order: Some(0),
            }],
            ..Task::default()
        }
    }

    #[test]
    fn identical_tasks_diff_to_identifier_only() {
        let task = sample();
        let patch = diff(&task, &task);
        assert_eq!(patch, PartialTask::new("t1"));
        assert!(patch.is_empty());
    }

    #[rstest]
    #[case::reordered_labels(|t: &mut Task| t.labels.reverse())]
    #[case::same_day_with_time(|t: &mut Task| t.due_date = Some("2025-09-29T18:00:00.000Z".into()))]
    #[case::explicit_false_completion(|t: &mut Task| t.completed = Some(false))]
    fn equivalent_values_produce_no_change(#[case] edit: fn(&mut Task)) {
        let original = sample();
        let mut modified = original.clone();
        edit(&mut modified);
        assert!(diff(&original, &modified).is_empty());
    }

    #[test]
    fn cleared_due_date_is_sent_as_sentinel() {
        let original = sample();
        let mut modified = original.clone();
        modified.due_date = None;

        let patch = diff(&original, &modified);
        assert_eq!(patch.due_date, FieldPatch::Clear);
        assert_eq!(patch.field_count(), 2);
    }

    #[test]
    fn unparseable_due_date_is_sent_verbatim() {
        let original = sample();
        let mut modified = original.clone();
        modified.due_date = Some("next friday".into());

        let patch = diff(&original, &modified);
        assert_eq!(patch.due_date, FieldPatch::Set("next friday".into()));

        let mut rebuilt = original.clone();
        patch.apply_to(&mut rebuilt);
        assert_eq!(rebuilt.due_date, modified.due_date);
        assert!(diff(&rebuilt, &modified).is_empty());
    }

    #[test]
    fn blank_due_date_clears_the_field() {
        let original = sample();
        let mut modified = original.clone();
        modified.due_date = Some("  ".into());

        assert_eq!(diff(&original, &modified).due_date, FieldPatch::Clear);
    }

    #[test]
    fn completion_timestamp_travels_with_the_flag() {
        let original = sample();
        let mut modified = original.clone();
        modified.completed = Some(true);
        modified.completed_at = "2025-09-30T08:00:00Z".parse().ok();

        let patch = diff(&original, &modified);
        assert_eq!(patch.completed, Some(true));
        assert_eq!(patch.completed_at, FieldPatch::from_value(modified.completed_at));

        let reopened = diff(&modified, &original);
        assert_eq!(reopened.completed, Some(false));
        assert_eq!(reopened.completed_at, FieldPatch::Clear);
    }

    #[test]
    fn due_date_is_emitted_without_time_component() {
        let original = sample();
        let mut modified = original.clone();
        modified.due_date = Some("2025-10-01T09:30:00+02:00".into());

        let patch = diff(&original, &modified);
        assert_eq!(patch.due_date, FieldPatch::Set("2025-10-01".into()));
    }

    #[test]
    fn any_subtask_change_resends_whole_list() {
        let original = sample();
        let mut modified = original.clone();
        modified.subtasks[0].completed = Some(true);
        modified.subtasks.push(Subtask {
            id: Some("s2".into()),
            title: "Proofread".into(),
            completed: None,
            order: Some(1),
        });

        let patch = diff(&original, &modified);
        assert_eq!(patch.subtasks.as_ref().map(Vec::len), Some(2));
        assert_eq!(patch.field_count(), 2);
    }

    #[test]
    fn applying_a_diff_reproduces_the_modified_task() {
        let original = sample();
        let mut modified = original.clone();
        modified.title = "Write final report".into();
        modified.description = None;
        modified.completed = Some(true);
        modified.completed_at = "2025-10-01T09:30:00Z".parse().ok();
        modified.priority = None;
        modified.due_date = Some("2025-10-02".into());
        modified.project_id = None;
        modified.section_id = Some("s9".into());
        modified.labels = vec!["l3".into()];
        modified.subtasks.clear();

        let patch = diff(&original, &modified);
        let mut rebuilt = original.clone();
        patch.apply_to(&mut rebuilt);

        assert_eq!(rebuilt, modified);
    }

    #[test]
    fn fields_absent_from_patch_keep_original_values() {
        let original = sample();
        let mut modified = original.clone();
        modified.priority = Some(1);

        let patch = diff(&original, &modified);
        let mut rebuilt = original.clone();
        patch.apply_to(&mut rebuilt);

        assert_eq!(rebuilt.priority, Some(1));
        assert_eq!(rebuilt.title, original.title);
        assert_eq!(rebuilt.labels, original.labels);
        assert_eq!(rebuilt.due_date, original.due_date);
    }
}
