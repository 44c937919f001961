use std::collections::BTreeSet;
use std::fmt;
use std::io::Write;
use std::sync::Arc;

use anyhow::{anyhow, bail, Result};
use trove_core::gateway::{HttpGateway, MemoryGateway, RemoteGateway};
use trove_core::services::{Message, SyncEngine, SyncRuntime};
use trove_core::store::{MemoryStore, Persistence};
use trove_core::Database;

use crate::cli::{AddArgs, CliCommand, EditArgs, ListArgs, SubtaskArgs, TaskRef};
use crate::config::{CliConfig, ConnectionConfig};
use crate::model::{normalize_due_date, Label, Project, Task, TaskDraft};

const DEMO_ENDPOINT: &str = "memory://demo";
const CLEAR_KEYWORD: &str = "none";
const SHORT_ID_LEN: usize = 8;

pub async fn execute<W: Write>(config: &CliConfig, command: CliCommand, mut writer: W) -> Result<()> {
    if let CliCommand::Configure = command {
        return handle_configure(config, &mut writer);
    }
    let mut runtime = open_session(config)?;
    run_command(&mut runtime, command, &mut writer).await
}

/// Run a session command against an already assembled runtime.
pub async fn run_command<W: Write>(
    runtime: &mut SyncRuntime,
    command: CliCommand,
    mut writer: W,
) -> Result<()> {
    match command {
        CliCommand::List(args) => handle_list(runtime, &args, &mut writer).await,
        CliCommand::Refresh => handle_refresh(runtime, &mut writer).await,
        CliCommand::Add(args) => handle_add(runtime, &args, &mut writer).await,
        CliCommand::Edit(args) => handle_edit(runtime, &args, &mut writer).await,
        CliCommand::Complete(task) => handle_complete(runtime, &task, &mut writer).await,
        CliCommand::Subtask(args) => handle_subtask(runtime, &args, &mut writer).await,
        CliCommand::Configure => Err(anyhow!("configure does not open a sync session")),
    }
}

fn open_session(config: &CliConfig) -> Result<SyncRuntime> {
    if config.demo {
        let connection = ConnectionConfig::new(DEMO_ENDPOINT, "demo");
        return start_session(
            Box::new(MemoryStore::default()),
            connection,
            Arc::new(MemoryGateway::demo()),
            config,
        );
    }

    let db = Database::initialize(&config.app)?;
    let connection =
        ConnectionConfig::resolve(config.endpoint.clone(), config.api_key.clone(), &db)?
            .ok_or_else(|| {
                anyhow!(
                    "No server configured. Run `trove configure --endpoint URL --api-key KEY` or pass --demo."
                )
            })?;
    let gateway = HttpGateway::new(&connection)?;
    start_session(Box::new(db), Some(connection), Arc::new(gateway), config)
}

fn start_session(
    store: Box<dyn Persistence>,
    connection: Option<ConnectionConfig>,
    gateway: Arc<dyn RemoteGateway>,
    config: &CliConfig,
) -> Result<SyncRuntime> {
    let mut engine = SyncEngine::new(store, connection, config.options);
    engine.load()?;
    Ok(SyncRuntime::new(engine, gateway))
}

fn handle_configure<W: Write>(config: &CliConfig, mut writer: W) -> Result<()> {
    let (Some(endpoint), Some(api_key)) = (&config.endpoint, &config.api_key) else {
        bail!("configure needs both --endpoint and --api-key");
    };
    let connection = ConnectionConfig::new(endpoint.as_str(), api_key.as_str())
        .ok_or_else(|| anyhow!("Endpoint and API key must not be blank"))?;
    let db = Database::initialize(&config.app)?;
    connection.save(&db)?;
    writeln!(writer, "Saved connection to {}", connection.endpoint)?;
    Ok(())
}

async fn handle_list<W: Write>(
    runtime: &mut SyncRuntime,
    args: &ListArgs,
    mut writer: W,
) -> Result<()> {
    if !args.offline {
        if let Some(warning) = sync(runtime).await? {
            writeln!(writer, "warning: showing cached tasks ({warning})")?;
        }
    }

    if let Some(filter) = args.filter {
        runtime.dispatch(Message::SetFilter(filter));
    }
    if let Some(sort) = args.sort {
        runtime.dispatch(Message::SetSort(sort));
    }
    if args.clear_selection {
        runtime.dispatch(Message::SetProjects(BTreeSet::new()));
        runtime.dispatch(Message::SetLabels(BTreeSet::new()));
    }
    if !args.project.is_empty() {
        let ids = args
            .project
            .iter()
            .map(|needle| resolve_project(runtime.engine().projects(), needle))
            .collect::<Result<BTreeSet<_>>>()?;
        runtime.dispatch(Message::SetProjects(ids));
    }
    if !args.label.is_empty() {
        let ids = args
            .label
            .iter()
            .map(|needle| resolve_label(runtime.engine().labels(), needle))
            .collect::<Result<BTreeSet<_>>>()?;
        runtime.dispatch(Message::SetLabels(ids));
    }
    if let Some(size) = args.page_size {
        if size == 0 {
            bail!("Page size must be at least 1");
        }
        runtime.dispatch(Message::SetPageSize(size));
    }
    if let Some(page) = args.page {
        if page == 0 {
            bail!("Pages are numbered from 1");
        }
        runtime.dispatch(Message::GoToPage(page - 1));
    }

    write_page(runtime.engine(), &mut writer)
}

async fn handle_refresh<W: Write>(runtime: &mut SyncRuntime, mut writer: W) -> Result<()> {
    require_sync(runtime).await?;
    let engine = runtime.engine();
    writeln!(
        writer,
        "Synced {}, {}, {}",
        Count(engine.all_tasks().len(), "task"),
        Count(engine.projects().len(), "project"),
        Count(engine.labels().len(), "label"),
    )?;
    Ok(())
}

async fn handle_add<W: Write>(runtime: &mut SyncRuntime, args: &AddArgs, mut writer: W) -> Result<()> {
    require_sync(runtime).await?;

    let engine = runtime.engine();
    let mut draft = TaskDraft::new(args.title.join(" ").trim());
    draft.require_title()?;
    draft.description = args.description.clone();
    draft.due_date = args.due_date.as_deref().map(parse_due_date).transpose()?;
    draft.priority = args.priority;
    draft.project_id = args
        .project
        .as_deref()
        .map(|needle| resolve_project(engine.projects(), needle))
        .transpose()?;
    draft.labels = args
        .label
        .iter()
        .map(|needle| resolve_label(engine.labels(), needle))
        .collect::<Result<Vec<_>>>()?;

    let title = draft.title.clone();
    runtime.dispatch(Message::Create(draft));
    runtime.settle().await;
    fail_on_error(runtime.engine_mut())?;

    writeln!(writer, "Created task '{title}'")?;
    Ok(())
}

async fn handle_edit<W: Write>(runtime: &mut SyncRuntime, args: &EditArgs, mut writer: W) -> Result<()> {
    require_sync(runtime).await?;

    let engine = runtime.engine();
    let original = find_task(engine, &args.task.id)?.clone();
    let mut task = original.clone();

    if let Some(title) = &args.title {
        let title = title.trim();
        if title.is_empty() {
            bail!("Task title cannot be empty");
        }
        task.title = title.to_string();
    }
    if let Some(description) = &args.description {
        task.description = clearable(description).map(str::to_string);
    }
    if let Some(due) = &args.due_date {
        task.due_date = clearable(due).map(parse_due_date).transpose()?;
    }
    if let Some(priority) = &args.priority {
        task.priority = clearable(priority).map(parse_priority).transpose()?;
    }
    if let Some(project) = &args.project {
        let project_id = clearable(project)
            .map(|needle| resolve_project(engine.projects(), needle))
            .transpose()?;
        if project_id != task.project_id {
            task.section_id = None;
        }
        task.project_id = project_id;
    }
    if let Some(labels) = &args.label {
        task.labels = labels
            .iter()
            .map(|needle| resolve_label(engine.labels(), needle))
            .collect::<Result<Vec<_>>>()?;
    }

    if task == original {
        writeln!(writer, "Nothing to change for {}", short_id(&original))?;
        return Ok(());
    }

    let line = short_id(&task);
    runtime.dispatch(Message::Mutate(task));
    runtime.settle().await;
    fail_on_error(runtime.engine_mut())?;

    writeln!(writer, "Updated {line}")?;
    Ok(())
}

async fn handle_complete<W: Write>(
    runtime: &mut SyncRuntime,
    reference: &TaskRef,
    mut writer: W,
) -> Result<()> {
    require_sync(runtime).await?;
    let id = task_id(find_task(runtime.engine(), &reference.id)?)?;

    runtime.dispatch(Message::ToggleCompletion(id.clone()));
    runtime.settle().await;
    fail_on_error(runtime.engine_mut())?;

    let Some(task) = runtime.engine().task(&id) else {
        bail!("Task {id} disappeared during sync");
    };
    let verb = if task.is_completed() { "Completed" } else { "Reopened" };
    writeln!(writer, "{verb} {} {}", short_id(task), task.title)?;
    Ok(())
}

async fn handle_subtask<W: Write>(
    runtime: &mut SyncRuntime,
    args: &SubtaskArgs,
    mut writer: W,
) -> Result<()> {
    require_sync(runtime).await?;
    let task = find_task(runtime.engine(), &args.task_id)?;
    let id = task_id(task)?;
    if !task
        .subtasks
        .iter()
        .any(|subtask| subtask.id.as_deref() == Some(args.subtask_id.as_str()))
    {
        bail!("Task {} has no subtask '{}'", short_id(task), args.subtask_id);
    }

    runtime.dispatch(Message::ToggleSubtask {
        task_id: id.clone(),
        subtask_id: args.subtask_id.clone(),
    });
    runtime.settle().await;
    fail_on_error(runtime.engine_mut())?;

    let subtask = runtime
        .engine()
        .task(&id)
        .and_then(|task| {
            task.subtasks
                .iter()
                .find(|subtask| subtask.id.as_deref() == Some(args.subtask_id.as_str()))
        })
        .ok_or_else(|| anyhow!("Subtask '{}' disappeared during sync", args.subtask_id))?;
    let state = if subtask.is_completed() { "done" } else { "open" };
    writeln!(writer, "Marked '{}' {state}", subtask.title)?;
    Ok(())
}

/// Refresh and settle. Authorization rejections are errors; any other
/// failure is handed back as a warning.
async fn sync(runtime: &mut SyncRuntime) -> Result<Option<String>> {
    runtime.dispatch(Message::Refresh);
    runtime.settle().await;

    let engine = runtime.engine_mut();
    raise_reconfiguration(engine)?;
    let warning = engine.error_message().map(str::to_string);
    engine.dismiss_error();
    Ok(warning)
}

async fn require_sync(runtime: &mut SyncRuntime) -> Result<()> {
    match sync(runtime).await? {
        Some(warning) => Err(anyhow!("Could not reach the server: {warning}")),
        None => Ok(()),
    }
}

fn fail_on_error(engine: &mut SyncEngine) -> Result<()> {
    raise_reconfiguration(engine)?;
    if let Some(message) = engine.error_message().map(str::to_string) {
        engine.dismiss_error();
        bail!(message);
    }
    Ok(())
}

fn raise_reconfiguration(engine: &mut SyncEngine) -> Result<()> {
    let Some(request) = engine.acknowledge_reconfiguration() else {
        return Ok(());
    };
    let endpoint = request
        .connection
        .map(|connection| connection.endpoint)
        .unwrap_or_else(|| "the server".to_string());
    bail!(
        "{endpoint} rejected the API key. Reconfiguration needed: run `trove configure --endpoint URL --api-key KEY`."
    )
}

fn find_task<'a>(engine: &'a SyncEngine, reference: &str) -> Result<&'a Task> {
    if let Some(task) = engine.task(reference) {
        return Ok(task);
    }
    let mut matches = engine
        .all_tasks()
        .iter()
        .filter(|task| task.key().is_some_and(|id| id.starts_with(reference)));
    match (matches.next(), matches.next()) {
        (Some(task), None) => Ok(task),
        (None, _) => Err(anyhow!("No task matches '{reference}'")),
        (Some(_), Some(_)) => Err(anyhow!(
            "'{reference}' matches more than one task; use a longer prefix"
        )),
    }
}

fn task_id(task: &Task) -> Result<String> {
    task.key()
        .map(str::to_string)
        .ok_or_else(|| anyhow!("Task '{}' has no identifier yet", task.title))
}

fn resolve_project(projects: &[Project], needle: &str) -> Result<String> {
    projects
        .iter()
        .find(|project| matches_reference(needle, &project.id, &project.slug, &project.name))
        .map(|project| project.id.clone())
        .ok_or_else(|| anyhow!("Unknown project '{needle}'"))
}

fn resolve_label(labels: &[Label], needle: &str) -> Result<String> {
    labels
        .iter()
        .find(|label| matches_reference(needle, &label.id, &label.slug, &label.name))
        .map(|label| label.id.clone())
        .ok_or_else(|| anyhow!("Unknown label '{needle}'"))
}

fn matches_reference(needle: &str, id: &str, slug: &str, name: &str) -> bool {
    let needle = needle.trim();
    id == needle || slug.eq_ignore_ascii_case(needle) || name.eq_ignore_ascii_case(needle)
}

/// `None` when the user asked to clear the field.
fn clearable(raw: &str) -> Option<&str> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case(CLEAR_KEYWORD) {
        None
    } else {
        Some(trimmed)
    }
}

fn parse_due_date(raw: &str) -> Result<String> {
    normalize_due_date(raw).ok_or_else(|| anyhow!("Invalid due date '{raw}': expected YYYY-MM-DD"))
}

fn parse_priority(raw: &str) -> Result<u8> {
    match raw.parse::<u8>() {
        Ok(priority @ 1..=4) => Ok(priority),
        _ => Err(anyhow!("Invalid priority '{raw}': expected 1-4 or none")),
    }
}

fn short_id(task: &Task) -> String {
    task.key()
        .map(|id| id.chars().take(SHORT_ID_LEN).collect())
        .unwrap_or_else(|| "--------".to_string())
}

fn write_page<W: Write>(engine: &SyncEngine, mut writer: W) -> Result<()> {
    let criteria = engine.criteria();
    let page = engine.page();
    writeln!(
        writer,
        "{} | sorted by {} | page {}/{} | {}",
        criteria.filter.title(),
        criteria.sort,
        engine.current_page() + 1,
        page.total_pages,
        Count(page.filtered_count, "task"),
    )?;

    let projects = engine.selected_projects();
    if !projects.is_empty() {
        let names: Vec<_> = projects.iter().map(|project| project.name.as_str()).collect();
        writeln!(writer, "projects: {}", names.join(", "))?;
    }
    let labels = engine.selected_labels();
    if !labels.is_empty() {
        let names: Vec<_> = labels.iter().map(|label| label.name.as_str()).collect();
        writeln!(writer, "labels: {}", names.join(", "))?;
    }

    if page.tasks.is_empty() {
        writeln!(writer, "No tasks.")?;
        return Ok(());
    }
    for task in &page.tasks {
        writeln!(writer, "{}", TaskLine { engine, task })?;
    }
    Ok(())
}

struct TaskLine<'a> {
    engine: &'a SyncEngine,
    task: &'a Task,
}

impl fmt::Display for TaskLine<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let task = self.task;
        let check = if task.is_completed() { "x" } else { " " };
        write!(f, "[{check}] {}  {}", short_id(task), task.title)?;

        if let Some(priority) = task.priority {
            write!(f, "  p{priority}")?;
        }
        if let Some(due) = task.due_day() {
            write!(f, "  due {}", due.format("%Y-%m-%d"))?;
        }
        if let Some(project) = self.engine.project_for(task) {
            write!(f, "  {}", project.name)?;
            if let Some(section) = self.engine.section_for(task) {
                write!(f, "/{}", section.name)?;
            }
        }
        for label in self.engine.labels_for(task) {
            write!(f, "  #{}", label.name)?;
        }
        if !task.subtasks.is_empty() {
            let done = task.subtasks.iter().filter(|s| s.is_completed()).count();
            write!(f, "  ({done}/{} subtasks)", task.subtasks.len())?;
        }
        if self.engine.is_dirty(task.key().unwrap_or_default()) {
            write!(f, "  *")?;
        }
        Ok(())
    }
}

struct Count(usize, &'static str);

impl fmt::Display for Count {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Count(count, noun) = *self;
        write!(f, "{count} {noun}{}", if count == 1 { "" } else { "s" })
    }
}
