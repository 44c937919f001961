use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;

use super::{GatewayError, RemoteGateway};
use crate::model::{RemoteSnapshot, Snapshot, Task, TaskDraft};
use crate::patch::PartialTask;

const DEMO_FIXTURE: &str = include_str!("../../fixtures/demo.json");

/// In-process stand-in for the task server. Applies writes to its own copy
/// of the data and records every call so tests can inspect the traffic.
#[derive(Default)]
pub struct MemoryGateway {
    state: Mutex<ServerState>,
    latency: Option<Duration>,
}

#[derive(Default)]
struct ServerState {
    snapshot: Snapshot,
    patch_batches: Vec<Vec<PartialTask>>,
    created: Vec<TaskDraft>,
    failures: VecDeque<GatewayError>,
    empty_fetches: usize,
    fetches: usize,
    next_id: usize,
}

impl MemoryGateway {
    pub fn new(snapshot: Snapshot) -> Self {
        Self {
            state: Mutex::new(ServerState {
                snapshot,
                ..ServerState::default()
            }),
            latency: None,
        }
    }

    /// Seeded with the bundled sample workspace.
    pub fn demo() -> Self {
        let snapshot = match serde_json::from_str::<RemoteSnapshot>(DEMO_FIXTURE) {
            Ok(remote) => Snapshot {
                tasks: remote.tasks.unwrap_or_default(),
                projects: remote.projects.unwrap_or_default(),
                labels: remote.labels.unwrap_or_default(),
            },
            Err(err) => {
                tracing::warn!(error = %err, "demo fixture is unreadable, starting empty");
                Snapshot::default()
            }
        };
        Self::new(snapshot)
    }

    /// Every call sleeps for `latency` before answering.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// The next call, whichever it is, fails with `error`.
    pub fn fail_next(&self, error: GatewayError) {
        self.state.lock().failures.push_back(error);
    }

    /// The next `count` fetches answer with an empty task list.
    pub fn answer_empty(&self, count: usize) {
        self.state.lock().empty_fetches += count;
    }

    pub fn replace_task(&self, task: Task) {
        let mut state = self.state.lock();
        if let Some(slot) = state
            .snapshot
            .tasks
            .iter_mut()
            .find(|existing| existing.key() == task.key())
        {
            *slot = task;
        } else {
            state.snapshot.tasks.push(task);
        }
    }

    pub fn server_task(&self, id: &str) -> Option<Task> {
        let state = self.state.lock();
        state
            .snapshot
            .tasks
            .iter()
            .find(|task| task.key() == Some(id))
            .cloned()
    }

    pub fn patch_batches(&self) -> Vec<Vec<PartialTask>> {
        self.state.lock().patch_batches.clone()
    }

    pub fn created(&self) -> Vec<TaskDraft> {
        self.state.lock().created.clone()
    }

    pub fn fetch_count(&self) -> usize {
        self.state.lock().fetches
    }

    async fn simulate_latency(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }

    fn take_failure(&self) -> Result<(), GatewayError> {
        match self.state.lock().failures.pop_front() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl RemoteGateway for MemoryGateway {
    async fn fetch_all(&self) -> Result<RemoteSnapshot, GatewayError> {
        self.simulate_latency().await;
        self.take_failure()?;

        let mut state = self.state.lock();
        state.fetches += 1;
        if state.empty_fetches > 0 {
            state.empty_fetches -= 1;
            return Ok(RemoteSnapshot {
                tasks: Some(Vec::new()),
                ..RemoteSnapshot::default()
            });
        }
        Ok(RemoteSnapshot {
            tasks: Some(state.snapshot.tasks.clone()),
            projects: Some(state.snapshot.projects.clone()),
            labels: Some(state.snapshot.labels.clone()),
            version: None,
        })
    }

    async fn apply_patches(&self, patches: &[PartialTask]) -> Result<(), GatewayError> {
        self.simulate_latency().await;
        self.take_failure()?;

        let mut state = self.state.lock();
        for patch in patches {
            if let Some(task) = state
                .snapshot
                .tasks
                .iter_mut()
                .find(|task| task.key() == Some(patch.id.as_str()))
            {
                patch.apply_to(task);
            }
        }
        state.patch_batches.push(patches.to_vec());
        Ok(())
    }

    async fn create_task(&self, draft: &TaskDraft) -> Result<(), GatewayError> {
        self.simulate_latency().await;
        self.take_failure()?;

        let mut state = self.state.lock();
        state.next_id += 1;
        let task = Task {
            id: Some(format!("created-{}", state.next_id)),
            title: draft.title.clone(),
            description: draft.description.clone(),
            priority: draft.priority,
            due_date: draft.due_date.clone(),
            project_id: draft.project_id.clone(),
            section_id: draft.section_id.clone(),
            labels: draft.labels.clone(),
            created_at: Some(Utc::now()),
            ..Task::default()
        };
        state.snapshot.tasks.push(task);
        state.created.push(draft.clone());
        Ok(())
    }
}
