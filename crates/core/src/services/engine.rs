//! The sync engine: a single-threaded state machine that owns the cache and
//! turns user actions and network results into state changes plus the
//! network commands still to run.

use std::collections::BTreeSet;

use anyhow::Result;
use chrono::{Local, NaiveDate, Utc};
use tokio::time::Instant;

use crate::config::{ConnectionConfig, SyncOptions};
use crate::diff::diff;
use crate::gateway::GatewayError;
use crate::model::{FilterCategory, Label, Project, RemoteSnapshot, Section, SortOption, Task, TaskDraft};
use crate::patch::PartialTask;
use crate::services::auth::{AuthMonitor, ReconfigurationRequest};
use crate::services::cache::{MergeOutcome, TaskCache};
use crate::services::writeback::WriteBackScheduler;
use crate::store::Persistence;
use crate::view::{derive_page, Catalog, TaskPage, ViewCriteria};

pub const SETTING_FILTER: &str = "view.filter";
pub const SETTING_SORT: &str = "view.sort";
pub const SETTING_PROJECTS: &str = "view.projects";
pub const SETTING_LABELS: &str = "view.labels";

#[derive(Debug, Clone)]
pub enum Message {
    Refresh,
    Fetched(Result<RemoteSnapshot, GatewayError>),
    /// Debounced edit.
    Mutate(Task),
    /// Edit written back right away, bypassing the debounce window.
    MutateImmediately(Task),
    ToggleCompletion(String),
    ToggleSubtask {
        task_id: String,
        subtask_id: String,
    },
    Create(TaskDraft),
    Created(Result<(), GatewayError>),
    FlushDue,
    PatchesApplied {
        patches: Vec<PartialTask>,
        result: Result<(), GatewayError>,
    },
    SetFilter(FilterCategory),
    SetSort(SortOption),
    SetProjects(BTreeSet<String>),
    SetLabels(BTreeSet<String>),
    SetPageSize(usize),
    GoToPage(usize),
    NextPage,
    PreviousPage,
    DismissError,
}

/// Network work requested by the engine. Its outcome comes back as a
/// [`Message`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Fetch,
    ApplyPatches(Vec<PartialTask>),
    CreateTask(TaskDraft),
}

pub struct SyncEngine {
    store: Box<dyn Persistence>,
    cache: TaskCache,
    scheduler: WriteBackScheduler,
    auth: AuthMonitor,
    criteria: ViewCriteria,
    page_size: usize,
    current_page: usize,
    view: TaskPage,
    is_loading: bool,
    error_message: Option<String>,
    writes_in_flight: usize,
    today: fn() -> NaiveDate,
}

impl SyncEngine {
    pub fn new(
        store: Box<dyn Persistence>,
        connection: Option<ConnectionConfig>,
        options: SyncOptions,
    ) -> Self {
        let mut engine = Self {
            store,
            cache: TaskCache::default(),
            scheduler: WriteBackScheduler::new(options.debounce_window),
            auth: AuthMonitor::new(connection),
            criteria: ViewCriteria::default(),
            page_size: options.page_size.max(1),
            current_page: 0,
            view: TaskPage::default(),
            is_loading: false,
            error_message: None,
            writes_in_flight: 0,
            today: local_today,
        };
        engine.recompute_view();
        engine
    }

    /// Pin the notion of "today" used by the date-based categories.
    pub fn with_today(mut self, today: fn() -> NaiveDate) -> Self {
        self.today = today;
        self.recompute_view();
        self
    }

    /// Restore the last snapshot and view settings before any network
    /// activity.
    pub fn load(&mut self) -> Result<()> {
        if let Some(snapshot) = self.store.load_snapshot()? {
            tracing::debug!(tasks = snapshot.tasks.len(), "restored cached snapshot");
            self.cache = TaskCache::from_snapshot(snapshot);
        }

        if let Some(raw) = self.store.load_setting(SETTING_FILTER)? {
            match raw.parse() {
                Ok(filter) => self.criteria.filter = filter,
                Err(err) => tracing::warn!(error = %err, "ignoring stored filter"),
            }
        }
        if let Some(raw) = self.store.load_setting(SETTING_SORT)? {
            match raw.parse() {
                Ok(sort) => self.criteria.sort = sort,
                Err(err) => tracing::warn!(error = %err, "ignoring stored sort option"),
            }
        }
        if let Some(ids) = self.load_id_set(SETTING_PROJECTS)? {
            self.criteria.project_ids = ids;
        }
        if let Some(ids) = self.load_id_set(SETTING_LABELS)? {
            self.criteria.label_ids = ids;
        }

        self.current_page = 0;
        self.recompute_view();
        Ok(())
    }

    pub fn react(&mut self, message: Message) -> Vec<Command> {
        match message {
            Message::Refresh => self.refresh(),
            Message::Fetched(result) => self.finish_fetch(result),
            Message::Mutate(task) => {
                self.mutate(task);
                Vec::new()
            }
            Message::MutateImmediately(task) => self.mutate_immediately(task),
            Message::ToggleCompletion(id) => self.toggle_completion(&id),
            Message::ToggleSubtask {
                task_id,
                subtask_id,
            } => {
                self.toggle_subtask(&task_id, &subtask_id);
                Vec::new()
            }
            Message::Create(draft) => self.create(draft),
            Message::Created(result) => self.finish_create(result),
            Message::FlushDue => self.flush(Instant::now()),
            Message::PatchesApplied { patches, result } => {
                self.finish_patches(&patches, result);
                Vec::new()
            }
            Message::SetFilter(filter) => {
                self.criteria.filter = filter;
                self.persist_setting(SETTING_FILTER, filter.as_str());
                self.reset_page();
                Vec::new()
            }
            Message::SetSort(sort) => {
                self.criteria.sort = sort;
                self.persist_setting(SETTING_SORT, sort.as_str());
                self.reset_page();
                Vec::new()
            }
            Message::SetProjects(ids) => {
                self.persist_id_set(SETTING_PROJECTS, &ids);
                self.criteria.project_ids = ids;
                self.reset_page();
                Vec::new()
            }
            Message::SetLabels(ids) => {
                self.persist_id_set(SETTING_LABELS, &ids);
                self.criteria.label_ids = ids;
                self.reset_page();
                Vec::new()
            }
            Message::SetPageSize(size) => {
                self.page_size = size.max(1);
                self.reset_page();
                Vec::new()
            }
            Message::GoToPage(page) => {
                self.current_page = page;
                self.recompute_view();
                Vec::new()
            }
            Message::NextPage => {
                if self.current_page + 1 < self.view.total_pages {
                    self.current_page += 1;
                    self.recompute_view();
                }
                Vec::new()
            }
            Message::PreviousPage => {
                if self.current_page > 0 {
                    self.current_page -= 1;
                    self.recompute_view();
                }
                Vec::new()
            }
            Message::DismissError => {
                self.dismiss_error();
                Vec::new()
            }
        }
    }

    fn refresh(&mut self) -> Vec<Command> {
        if self.is_loading {
            tracing::debug!("refresh already in progress");
            return Vec::new();
        }
        self.is_loading = true;
        self.error_message = None;
        vec![Command::Fetch]
    }

    fn finish_fetch(&mut self, result: Result<RemoteSnapshot, GatewayError>) -> Vec<Command> {
        self.is_loading = false;
        let remote = match result {
            Ok(remote) => remote,
            Err(err) => {
                self.report_failure("fetch", &err);
                return Vec::new();
            }
        };

        let (outcome, orphaned) = self.cache.merge_remote(remote);
        for id in &orphaned {
            self.scheduler.discard(id);
        }
        match outcome {
            MergeOutcome::Ignored | MergeOutcome::Unchanged => {}
            MergeOutcome::Changed => {
                if let Err(err) = self.store.save_snapshot(&self.cache.snapshot()) {
                    tracing::warn!(error = %err, "failed to persist snapshot");
                }
                self.recompute_view();
            }
        }
        tracing::debug!(?outcome, tasks = self.cache.tasks().len(), "fetch merged");
        Vec::new()
    }

    fn mutate(&mut self, task: Task) {
        let Some(id) = task.key().map(str::to_string) else {
            tracing::debug!("ignoring edit for task without identifier");
            return;
        };
        if self.cache.apply_local(task.clone()).is_none() {
            tracing::debug!(task_id = id.as_str(), "ignoring edit for unknown task");
            return;
        }
        self.scheduler.enqueue(task, Instant::now());
        self.recompute_view();
    }

    fn mutate_immediately(&mut self, task: Task) -> Vec<Command> {
        let Some(id) = task.key().map(str::to_string) else {
            return Vec::new();
        };
        let Some(previous) = self.cache.apply_local(task.clone()) else {
            tracing::debug!(task_id = id.as_str(), "ignoring edit for unknown task");
            return Vec::new();
        };
        self.scheduler.supersede(task.clone());
        self.recompute_view();

        let patch = diff(&previous, &task);
        if patch.is_empty() {
            self.cache.settle(&id);
            return Vec::new();
        }
        self.writes_in_flight += 1;
        vec![Command::ApplyPatches(vec![patch])]
    }

    fn toggle_completion(&mut self, id: &str) -> Vec<Command> {
        let Some(mut task) = self.cache.get(id).cloned() else {
            return Vec::new();
        };
        let completed = !task.is_completed();
        task.completed = Some(completed);
        task.completed_at = completed.then(Utc::now);
        self.mutate_immediately(task)
    }

    fn toggle_subtask(&mut self, task_id: &str, subtask_id: &str) {
        let Some(mut task) = self.cache.get(task_id).cloned() else {
            return;
        };
        let Some(subtask) = task.subtask_mut(subtask_id) else {
            tracing::debug!(task_id, subtask_id, "unknown subtask");
            return;
        };
        subtask.completed = Some(!subtask.is_completed());
        self.mutate(task);
    }

    fn create(&mut self, draft: TaskDraft) -> Vec<Command> {
        if let Err(err) = draft.require_title() {
            self.error_message = Some(err.to_string());
            return Vec::new();
        }
        vec![Command::CreateTask(draft)]
    }

    fn finish_create(&mut self, result: Result<(), GatewayError>) -> Vec<Command> {
        match result {
            Ok(()) => {
                tracing::info!("task created");
                self.refresh()
            }
            Err(err) => {
                self.report_failure("create", &err);
                Vec::new()
            }
        }
    }

    fn flush(&mut self, now: Instant) -> Vec<Command> {
        if self.writes_in_flight > 0 {
            return Vec::new();
        }
        let Some(batch) = self.scheduler.take_due(now) else {
            return Vec::new();
        };

        let mut patches = Vec::new();
        for task in batch {
            let Some(id) = task.key() else {
                continue;
            };
            let Some(baseline) = self.cache.baseline(id) else {
                continue;
            };
            let patch = diff(baseline, &task);
            if patch.is_empty() {
                self.cache.settle(id);
                continue;
            }
            patches.push(patch);
        }

        if patches.is_empty() {
            return Vec::new();
        }
        tracing::debug!(patches = patches.len(), "flushing debounced edits");
        self.writes_in_flight += 1;
        vec![Command::ApplyPatches(patches)]
    }

    fn finish_patches(&mut self, patches: &[PartialTask], result: Result<(), GatewayError>) {
        self.writes_in_flight = self.writes_in_flight.saturating_sub(1);
        match result {
            Ok(()) => {
                for patch in patches {
                    self.cache.acknowledge(patch);
                }
                tracing::info!(patches = patches.len(), "write-back acknowledged");
            }
            Err(err) => self.report_failure("write-back", &err),
        }
    }

    fn report_failure(&mut self, operation: &str, err: &GatewayError) {
        if self.auth.observe(err) {
            return;
        }
        tracing::warn!(operation, kind = ?err.kind(), error = %err, "request failed");
        self.error_message = Some(err.to_string());
    }

    fn reset_page(&mut self) {
        self.current_page = 0;
        self.recompute_view();
    }

    fn recompute_view(&mut self) {
        let catalog = Catalog {
            has_projects: !self.cache.projects().is_empty(),
            has_labels: !self.cache.labels().is_empty(),
        };
        self.view = derive_page(
            self.cache.tasks(),
            &self.criteria,
            catalog,
            (self.today)(),
            self.current_page,
            self.page_size,
        );
    }

    fn persist_setting(&self, key: &str, value: &str) {
        if let Err(err) = self.store.save_setting(key, value) {
            tracing::warn!(key, error = %err, "failed to persist setting");
        }
    }

    fn persist_id_set(&self, key: &str, ids: &BTreeSet<String>) {
        match serde_json::to_string(ids) {
            Ok(raw) => self.persist_setting(key, &raw),
            Err(err) => tracing::warn!(key, error = %err, "failed to encode setting"),
        }
    }

    fn load_id_set(&self, key: &str) -> Result<Option<BTreeSet<String>>> {
        let Some(raw) = self.store.load_setting(key)? else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(ids) => Ok(Some(ids)),
            Err(err) => {
                tracing::warn!(key, error = %err, "ignoring unreadable setting");
                Ok(None)
            }
        }
    }

    pub fn page(&self) -> &TaskPage {
        &self.view
    }

    /// The visible page of tasks.
    pub fn tasks(&self) -> &[Task] {
        &self.view.tasks
    }

    pub fn total_pages(&self) -> usize {
        self.view.total_pages
    }

    pub fn current_page(&self) -> usize {
        self.current_page
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn criteria(&self) -> &ViewCriteria {
        &self.criteria
    }

    pub fn is_loading(&self) -> bool {
        self.is_loading
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    pub fn dismiss_error(&mut self) {
        self.error_message = None;
    }

    pub fn reconfiguration(&self) -> Option<&ReconfigurationRequest> {
        self.auth.request()
    }

    pub fn acknowledge_reconfiguration(&mut self) -> Option<ReconfigurationRequest> {
        self.auth.acknowledge()
    }

    pub fn connection(&self) -> Option<&ConnectionConfig> {
        self.auth.connection()
    }

    pub fn set_connection(&mut self, connection: ConnectionConfig) {
        self.auth.reconfigure(connection);
    }

    pub fn task(&self, id: &str) -> Option<&Task> {
        self.cache.get(id)
    }

    pub fn all_tasks(&self) -> &[Task] {
        self.cache.tasks()
    }

    pub fn projects(&self) -> &[Project] {
        self.cache.projects()
    }

    pub fn labels(&self) -> &[Label] {
        self.cache.labels()
    }

    pub fn project_for(&self, task: &Task) -> Option<&Project> {
        let project_id = task.project_id.as_deref()?;
        self.cache
            .projects()
            .iter()
            .find(|project| project.id == project_id)
    }

    pub fn section_for(&self, task: &Task) -> Option<&Section> {
        let section_id = task.section_id.as_deref()?;
        self.project_for(task)?.section(section_id)
    }

    /// Labels attached to `task`, in catalog order. Unknown ids are skipped.
    pub fn labels_for(&self, task: &Task) -> Vec<&Label> {
        self.cache
            .labels()
            .iter()
            .filter(|label| task.has_label(&label.id))
            .collect()
    }

    pub fn selected_projects(&self) -> Vec<&Project> {
        self.cache
            .projects()
            .iter()
            .filter(|project| self.criteria.project_ids.contains(&project.id))
            .collect()
    }

    pub fn selected_labels(&self) -> Vec<&Label> {
        self.cache
            .labels()
            .iter()
            .filter(|label| self.criteria.label_ids.contains(&label.id))
            .collect()
    }

    /// Edits buffered for the next debounced flush.
    pub fn pending_writes(&self) -> usize {
        self.scheduler.len()
    }

    pub fn is_dirty(&self, id: &str) -> bool {
        self.cache.is_dirty(id)
    }

    /// When the buffered edits should be flushed. `None` while a write is
    /// still in flight so batches never overlap.
    pub fn flush_deadline(&self) -> Option<Instant> {
        if self.writes_in_flight > 0 {
            return None;
        }
        self.scheduler.deadline()
    }
}

fn local_today() -> NaiveDate {
    Local::now().date_naive()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Snapshot, Subtask};
    use crate::patch::FieldPatch;
    use crate::store::{MemoryStore, SettingsStore};
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    fn fixed_today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, 10).unwrap()
    }

    fn task(id: &str, title: &str) -> Task {
        Task {
            id: Some(id.into()),
            title: title.into(),
            ..Task::default()
        }
    }

    fn project(id: &str) -> Project {
        Project {
            id: id.into(),
            name: format!("Project {id}"),
            slug: id.into(),
            color: "#336699".into(),
            shared: None,
            sections: Some(vec![Section {
                id: "s1".into(),
                name: "Backlog".into(),
                color: String::new(),
            }]),
            task_order: None,
        }
    }

    fn seeded_snapshot() -> Snapshot {
        let mut with_subtask = task("c", "Gamma");
        with_subtask.project_id = Some("P".into());
        with_subtask.section_id = Some("s1".into());
        with_subtask.subtasks = vec![Subtask {
            id: Some("s-1".into()),
            title: "Step".into(),
            completed: None,
            order: Some(0),
        }];
        Snapshot {
            tasks: vec![task("a", "Alpha"), task("b", "Beta"), with_subtask],
            projects: vec![project("P")],
            labels: vec![],
        }
    }

    fn engine_with(store: &MemoryStore) -> SyncEngine {
        let connection = ConnectionConfig::new("https://tasks.example.com/api", "key");
        let mut engine = SyncEngine::new(Box::new(store.clone()), connection, SyncOptions::default())
            .with_today(fixed_today);
        engine.load().unwrap();
        engine
    }

    fn seeded() -> (SyncEngine, MemoryStore) {
        let store = MemoryStore::with_snapshot(seeded_snapshot());
        (engine_with(&store), store)
    }

    fn server(tasks: Vec<Task>) -> RemoteSnapshot {
        RemoteSnapshot {
            tasks: Some(tasks),
            ..RemoteSnapshot::default()
        }
    }

    fn wait_window() -> Duration {
        SyncOptions::default().debounce_window
    }

    #[test]
    fn load_restores_snapshot_before_network() {
        let (engine, _) = seeded();
        assert_eq!(engine.all_tasks().len(), 3);
        assert_eq!(engine.tasks().len(), 3);
        assert!(!engine.is_loading());
    }

    #[test]
    fn second_refresh_while_loading_is_a_no_op() {
        let (mut engine, _) = seeded();
        assert_eq!(engine.react(Message::Refresh), vec![Command::Fetch]);
        assert!(engine.is_loading());
        assert_eq!(engine.react(Message::Refresh), Vec::new());

        engine.react(Message::Fetched(Ok(server(vec![task("a", "Alpha")]))));
        assert!(!engine.is_loading());
        assert_eq!(engine.react(Message::Refresh), vec![Command::Fetch]);
    }

    #[tokio::test(start_paused = true)]
    async fn refresh_keeps_unconfirmed_edits() {
        let (mut engine, store) = seeded();
        engine.react(Message::Mutate(task("a", "Alpha (mine)")));

        engine.react(Message::Refresh);
        engine.react(Message::Fetched(Ok(server(vec![
            task("a", "Alpha (server)"),
            task("b", "Beta (server)"),
        ]))));

        assert_eq!(engine.task("a").unwrap().title, "Alpha (mine)");
        assert_eq!(engine.task("b").unwrap().title, "Beta (server)");
        assert!(engine.is_dirty("a"));
        let persisted = store.snapshot().unwrap();
        assert_eq!(persisted.tasks.len(), 2);
        assert_eq!(persisted.projects, vec![project("P")]);
    }

    #[test]
    fn empty_task_list_is_ignored() {
        let (mut engine, store) = seeded();
        let before = engine.all_tasks().to_vec();

        engine.react(Message::Refresh);
        engine.react(Message::Fetched(Ok(server(Vec::new()))));

        assert_eq!(engine.all_tasks(), before.as_slice());
        assert_eq!(engine.error_message(), None);
        assert_eq!(store.snapshot_saves(), 0);
    }

    #[test]
    fn identical_fetch_does_not_rewrite_snapshot() {
        let (mut engine, store) = seeded();
        let remote = RemoteSnapshot {
            tasks: Some(seeded_snapshot().tasks),
            projects: Some(seeded_snapshot().projects),
            labels: None,
            version: None,
        };
        engine.react(Message::Refresh);
        engine.react(Message::Fetched(Ok(remote)));
        assert_eq!(store.snapshot_saves(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn rapid_edits_coalesce_into_one_patch() {
        let (mut engine, _) = seeded();
        let original = engine.task("a").cloned().unwrap();

        let mut first = original.clone();
        first.title = "Alpha v1".into();
        first.priority = Some(2);
        engine.react(Message::Mutate(first));

        tokio::time::advance(Duration::from_millis(200)).await;
        let mut second = original.clone();
        second.title = "Alpha v2".into();
        engine.react(Message::Mutate(second.clone()));

        tokio::time::advance(Duration::from_millis(400)).await;
        assert_eq!(engine.react(Message::FlushDue), Vec::new());

        tokio::time::advance(Duration::from_millis(100)).await;
        let commands = engine.react(Message::FlushDue);
        assert_eq!(
            commands,
            vec![Command::ApplyPatches(vec![diff(&original, &second)])]
        );
        assert_eq!(engine.pending_writes(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn free_form_due_date_stays_dirty_until_acknowledged() {
        let (mut engine, _) = seeded();
        let mut edited = engine.task("a").cloned().unwrap();
        edited.due_date = Some("next friday".into());
        engine.react(Message::Mutate(edited));

        tokio::time::advance(wait_window()).await;
        let Some(Command::ApplyPatches(patches)) = engine.react(Message::FlushDue).pop() else {
            panic!("expected a flush");
        };
        assert_eq!(patches[0].due_date, FieldPatch::Set("next friday".into()));
        assert!(engine.is_dirty("a"));

        engine.react(Message::PatchesApplied {
            patches,
            result: Ok(()),
        });
        assert!(!engine.is_dirty("a"));
        assert_eq!(engine.task("a").unwrap().due_date.as_deref(), Some("next friday"));
    }

    #[tokio::test(start_paused = true)]
    async fn unchanged_edit_sends_nothing() {
        let (mut engine, _) = seeded();
        let same = engine.task("b").cloned().unwrap();
        engine.react(Message::Mutate(same));
        assert!(engine.is_dirty("b"));

        tokio::time::advance(wait_window()).await;
        assert_eq!(engine.react(Message::FlushDue), Vec::new());
        assert!(!engine.is_dirty("b"));
    }

    #[tokio::test(start_paused = true)]
    async fn acknowledged_flush_clears_dirty_marks() {
        let (mut engine, _) = seeded();
        engine.react(Message::Mutate(task("a", "Alpha v2")));
        engine.react(Message::Mutate(task("b", "Beta v2")));
        tokio::time::advance(wait_window()).await;

        let Command::ApplyPatches(patches) = engine.react(Message::FlushDue).remove(0) else {
            panic!("expected a patch batch");
        };
        assert_eq!(patches.len(), 2);
        assert_eq!(engine.flush_deadline(), None);

        engine.react(Message::PatchesApplied {
            patches,
            result: Ok(()),
        });
        assert!(!engine.is_dirty("a"));
        assert!(!engine.is_dirty("b"));
    }

    #[tokio::test(start_paused = true)]
    async fn failed_flush_keeps_edits_and_resends_them_later() {
        let (mut engine, _) = seeded();
        engine.react(Message::Mutate(task("a", "Alpha v2")));
        tokio::time::advance(wait_window()).await;
        let Command::ApplyPatches(patches) = engine.react(Message::FlushDue).remove(0) else {
            panic!("expected a patch batch");
        };

        engine.react(Message::PatchesApplied {
            patches,
            result: Err(GatewayError::Network("connection reset".into())),
        });
        assert!(engine.is_dirty("a"));
        assert!(engine.error_message().is_some());

        let mut next = task("a", "Alpha v2");
        next.priority = Some(1);
        engine.react(Message::Mutate(next));
        tokio::time::advance(wait_window()).await;
        let Command::ApplyPatches(patches) = engine.react(Message::FlushDue).remove(0) else {
            panic!("expected a patch batch");
        };
        assert_eq!(patches[0].title.as_deref(), Some("Alpha v2"));
        assert_eq!(patches[0].priority, FieldPatch::Set(1));

        engine.react(Message::DismissError);
        assert_eq!(engine.error_message(), None);
    }

    #[test]
    fn toggling_completion_writes_immediately() {
        let (mut engine, _) = seeded();
        let commands = engine.react(Message::ToggleCompletion("a".into()));

        let Some(Command::ApplyPatches(patches)) = commands.first() else {
            panic!("expected an immediate patch");
        };
        assert_eq!(patches.len(), 1);
        assert_eq!(patches[0].completed, Some(true));
        assert!(matches!(patches[0].completed_at, FieldPatch::Set(_)));
        assert_eq!(patches[0].field_count(), 3);
        assert!(engine.is_dirty("a"));
        assert_eq!(engine.pending_writes(), 0);

        let patches = patches.clone();
        engine.react(Message::PatchesApplied {
            patches,
            result: Ok(()),
        });
        assert!(!engine.is_dirty("a"));
        assert!(engine.task("a").unwrap().is_completed());
    }

    #[test]
    fn immediate_write_of_unchanged_task_is_suppressed() {
        let (mut engine, _) = seeded();
        let same = engine.task("a").cloned().unwrap();
        assert_eq!(engine.react(Message::MutateImmediately(same)), Vec::new());
        assert!(!engine.is_dirty("a"));
    }

    #[tokio::test(start_paused = true)]
    async fn immediate_write_does_not_revert_queued_edit() {
        let (mut engine, _) = seeded();
        engine.react(Message::Mutate(task("a", "Alpha v2")));

        let Command::ApplyPatches(immediate) =
            engine.react(Message::ToggleCompletion("a".into())).remove(0)
        else {
            panic!("expected an immediate patch");
        };
        assert_eq!(immediate[0].title, None);
        engine.react(Message::PatchesApplied {
            patches: immediate,
            result: Ok(()),
        });
        assert!(engine.is_dirty("a"));

        tokio::time::advance(wait_window()).await;
        let Command::ApplyPatches(flushed) = engine.react(Message::FlushDue).remove(0) else {
            panic!("expected a patch batch");
        };
        assert_eq!(flushed[0].title.as_deref(), Some("Alpha v2"));
        assert_eq!(flushed[0].completed, None);
    }

    #[tokio::test(start_paused = true)]
    async fn subtask_toggle_is_debounced() {
        let (mut engine, _) = seeded();
        let commands = engine.react(Message::ToggleSubtask {
            task_id: "c".into(),
            subtask_id: "s-1".into(),
        });
        assert_eq!(commands, Vec::new());
        assert_eq!(engine.pending_writes(), 1);
        assert!(engine.task("c").unwrap().subtasks[0].is_completed());

        tokio::time::advance(wait_window()).await;
        let Command::ApplyPatches(patches) = engine.react(Message::FlushDue).remove(0) else {
            panic!("expected a patch batch");
        };
        assert_eq!(patches[0].subtasks.as_ref().map(Vec::len), Some(1));
    }

    #[tokio::test(start_paused = true)]
    async fn edits_to_unknown_tasks_are_ignored() {
        let (mut engine, _) = seeded();
        engine.react(Message::Mutate(task("ghost", "Boo")));
        assert_eq!(engine.pending_writes(), 0);
        assert!(engine.task("ghost").is_none());
        assert_eq!(
            engine.react(Message::MutateImmediately(task("ghost", "Boo"))),
            Vec::new()
        );
    }

    #[test]
    fn forbidden_raises_reconfiguration_without_error_banner() {
        let (mut engine, _) = seeded();
        let before = engine.all_tasks().to_vec();

        engine.react(Message::Refresh);
        engine.react(Message::Fetched(Err(GatewayError::Forbidden)));

        assert_eq!(engine.all_tasks(), before.as_slice());
        assert_eq!(engine.error_message(), None);
        let request = engine.reconfiguration().unwrap();
        assert_eq!(
            request.connection.as_ref().map(|c| c.endpoint.as_str()),
            Some("https://tasks.example.com/api")
        );

        let fresh = ConnectionConfig::new("https://tasks.example.com/api", "rotated").unwrap();
        engine.set_connection(fresh.clone());
        assert!(engine.reconfiguration().is_none());
        assert_eq!(engine.connection(), Some(&fresh));
    }

    #[test]
    fn forbidden_write_keeps_dirty_state() {
        let (mut engine, _) = seeded();
        let patches = match engine.react(Message::ToggleCompletion("b".into())).remove(0) {
            Command::ApplyPatches(patches) => patches,
            other => panic!("unexpected command {other:?}"),
        };
        engine.react(Message::PatchesApplied {
            patches,
            result: Err(GatewayError::Forbidden),
        });
        assert!(engine.is_dirty("b"));
        assert!(engine.reconfiguration().is_some());
        assert_eq!(engine.error_message(), None);
        assert!(engine.acknowledge_reconfiguration().is_some());
        assert!(engine.reconfiguration().is_none());
    }

    #[test]
    fn create_requests_refresh_on_success() {
        let (mut engine, _) = seeded();
        let draft = TaskDraft::new("Draft");
        assert_eq!(
            engine.react(Message::Create(draft.clone())),
            vec![Command::CreateTask(draft)]
        );
        assert_eq!(engine.all_tasks().len(), 3);
        assert_eq!(engine.react(Message::Created(Ok(()))), vec![Command::Fetch]);
    }

    #[test]
    fn create_without_title_is_rejected_locally() {
        let (mut engine, _) = seeded();
        assert_eq!(engine.react(Message::Create(TaskDraft::new("  "))), Vec::new());
        assert!(engine.error_message().is_some());
    }

    #[test]
    fn criteria_changes_reset_page_and_persist() {
        let store = MemoryStore::with_snapshot(Snapshot {
            tasks: (0..7).map(|n| task(&n.to_string(), "Task")).collect(),
            projects: vec![project("P")],
            labels: vec![],
        });
        let mut engine = engine_with(&store);
        engine.react(Message::SetPageSize(3));
        assert_eq!(engine.total_pages(), 3);

        engine.react(Message::NextPage);
        engine.react(Message::NextPage);
        engine.react(Message::NextPage);
        assert_eq!(engine.current_page(), 2);
        assert_eq!(engine.tasks().len(), 1);

        engine.react(Message::SetSort(SortOption::Priority));
        assert_eq!(engine.current_page(), 0);
        engine.react(Message::PreviousPage);
        assert_eq!(engine.current_page(), 0);

        engine.react(Message::SetFilter(FilterCategory::Inbox));
        engine.react(Message::SetProjects(BTreeSet::from(["P".to_string()])));
        assert_eq!(store.load_setting(SETTING_FILTER).unwrap().as_deref(), Some("inbox"));
        assert_eq!(store.load_setting(SETTING_SORT).unwrap().as_deref(), Some("priority"));
        assert_eq!(
            store.load_setting(SETTING_PROJECTS).unwrap().as_deref(),
            Some(r#"["P"]"#)
        );

        let reopened = engine_with(&store);
        assert_eq!(reopened.criteria().filter, FilterCategory::Inbox);
        assert_eq!(reopened.criteria().sort, SortOption::Priority);
        assert_eq!(reopened.selected_projects(), vec![&project("P")]);
    }

    #[test]
    fn going_past_last_page_yields_empty_page() {
        let (mut engine, _) = seeded();
        engine.react(Message::GoToPage(4));
        assert!(engine.tasks().is_empty());
        assert_eq!(engine.total_pages(), 1);
    }

    #[test]
    fn unreadable_settings_are_ignored() {
        let store = MemoryStore::with_snapshot(seeded_snapshot());
        store.save_setting(SETTING_FILTER, "someday").unwrap();
        store.save_setting(SETTING_LABELS, "not json").unwrap();
        let engine = engine_with(&store);
        assert_eq!(engine.criteria().filter, FilterCategory::All);
        assert!(engine.criteria().label_ids.is_empty());
    }

    #[test]
    fn lookup_helpers_resolve_references() {
        let (engine, _) = seeded();
        let gamma = engine.task("c").cloned().unwrap();
        assert_eq!(engine.project_for(&gamma).map(|p| p.id.as_str()), Some("P"));
        assert_eq!(engine.section_for(&gamma).map(|s| s.name.as_str()), Some("Backlog"));
        assert!(engine.labels_for(&gamma).is_empty());
        assert!(engine.project_for(&task("x", "Loose")).is_none());
    }
}
