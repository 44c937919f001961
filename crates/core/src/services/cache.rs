//! In-memory task collections plus the dirty-tracking that protects
//! unconfirmed local edits from server snapshots.

use std::collections::{HashMap, HashSet};

use crate::diff::diff;
use crate::model::{Label, Project, RemoteSnapshot, Snapshot, Task};
use crate::patch::PartialTask;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// The fetch carried no tasks and was dropped.
    Ignored,
    Unchanged,
    Changed,
}

#[derive(Debug, Clone, Default)]
pub struct TaskCache {
    tasks: Vec<Task>,
    projects: Vec<Project>,
    labels: Vec<Label>,
    dirty: HashSet<String>,
    /// Last server-acknowledged value of every dirty task.
    confirmed: HashMap<String, Task>,
}

impl TaskCache {
    pub fn from_snapshot(snapshot: Snapshot) -> Self {
        Self {
            tasks: unique_by_key(snapshot.tasks),
            projects: snapshot.projects,
            labels: snapshot.labels,
            ..Self::default()
        }
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            tasks: self.tasks.clone(),
            projects: self.projects.clone(),
            labels: self.labels.clone(),
        }
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn projects(&self) -> &[Project] {
        &self.projects
    }

    pub fn labels(&self) -> &[Label] {
        &self.labels
    }

    pub fn get(&self, id: &str) -> Option<&Task> {
        self.tasks.iter().find(|task| task.key() == Some(id))
    }

    pub fn is_dirty(&self, id: &str) -> bool {
        self.dirty.contains(id)
    }

    pub fn baseline(&self, id: &str) -> Option<&Task> {
        self.confirmed.get(id)
    }

    /// Replace the cached task with the same identifier and mark it dirty.
    /// Returns the value it replaced, or `None` when the task is unknown.
    pub fn apply_local(&mut self, task: Task) -> Option<Task> {
        let id = task.key()?.to_string();
        let slot = self
            .tasks
            .iter_mut()
            .find(|cached| cached.key() == Some(id.as_str()))?;
        let previous = std::mem::replace(slot, task);

        self.confirmed
            .entry(id.clone())
            .or_insert_with(|| previous.clone());
        self.dirty.insert(id);
        Some(previous)
    }

    /// Fold an acknowledged patch into the confirmed value. The task stops
    /// being dirty once nothing unsent remains.
    pub fn acknowledge(&mut self, patch: &PartialTask) {
        if let Some(baseline) = self.confirmed.get_mut(&patch.id) {
            patch.apply_to(baseline);
        }
        self.settle(&patch.id);
    }

    /// Clear the dirty mark if the cached value matches the confirmed one.
    pub fn settle(&mut self, id: &str) -> bool {
        let unsent = match (self.confirmed.get(id), self.get(id)) {
            (Some(baseline), Some(current)) => !diff(baseline, current).is_empty(),
            _ => false,
        };
        if unsent {
            return false;
        }
        self.confirmed.remove(id);
        self.dirty.remove(id);
        true
    }

    /// Merge a fetch into the cache; dirty tasks keep their local value.
    /// Returns the identifiers of dirty tasks the server no longer knows.
    pub fn merge_remote(&mut self, remote: RemoteSnapshot) -> (MergeOutcome, Vec<String>) {
        let server_tasks = remote.tasks.unwrap_or_default();
        if server_tasks.is_empty() {
            tracing::warn!("fetch returned no tasks, keeping cached state");
            return (MergeOutcome::Ignored, Vec::new());
        }

        let merged: Vec<Task> = unique_by_key(server_tasks)
            .into_iter()
            .map(|server_task| {
                let local = server_task
                    .key()
                    .filter(|id| self.dirty.contains(*id))
                    .and_then(|id| self.get(id));
                match local {
                    Some(local) => local.clone(),
                    None => server_task,
                }
            })
            .collect();

        let projects = remote
            .projects
            .filter(|projects| !projects.is_empty())
            .unwrap_or_else(|| self.projects.clone());
        let labels = remote
            .labels
            .filter(|labels| !labels.is_empty())
            .unwrap_or_else(|| self.labels.clone());

        let changed = merged != self.tasks || projects != self.projects || labels != self.labels;
        self.tasks = merged;
        self.projects = projects;
        self.labels = labels;

        let orphaned: Vec<String> = self
            .dirty
            .iter()
            .filter(|id| !self.tasks.iter().any(|task| task.key() == Some(id.as_str())))
            .cloned()
            .collect();
        for id in &orphaned {
            tracing::debug!(task_id = id.as_str(), "dropping edit for task removed on server");
            self.dirty.remove(id);
            self.confirmed.remove(id);
        }

        let outcome = if changed {
            MergeOutcome::Changed
        } else {
            MergeOutcome::Unchanged
        };
        (outcome, orphaned)
    }
}

/// One task per identifier; tasks without one cannot be tracked.
fn unique_by_key(tasks: Vec<Task>) -> Vec<Task> {
    let mut seen = HashSet::new();
    tasks
        .into_iter()
        .filter(|task| match task.key() {
            Some(id) => {
                let fresh = seen.insert(id.to_string());
                if !fresh {
                    tracing::warn!(task_id = id, "skipping duplicate task from server");
                }
                fresh
            }
            None => {
                tracing::warn!(title = task.title.as_str(), "skipping task without identifier");
                false
            }
        })
        .collect()
}
