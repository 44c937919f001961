use std::path::PathBuf;

use clap::{value_parser, ArgAction, Args, Parser, Subcommand};

use crate::model::{FilterCategory, SortOption};

#[derive(Parser, Debug, Clone)]
#[command(
    name = "trove",
    version,
    about = "Keep a local, editable copy of your task list in sync with the server.",
    after_help = "Examples:\n  trove                      List open tasks (same as `trove list`)\n  trove list --filter today --sort priority\n  trove edit 9e4a --due 2025-10-01\n  trove complete 9e4a\n  trove --demo list --filter completed"
)]
pub struct Cli {
    /// Override the data directory (defaults to platform-specific app dir)
    #[arg(long, value_name = "PATH", global = true)]
    pub data_dir: Option<PathBuf>,

    /// Task server base URL (overrides TROVE_ENDPOINT and stored settings)
    #[arg(long, value_name = "URL", global = true)]
    pub endpoint: Option<String>,

    /// API key sent as a bearer token (overrides TROVE_API_KEY and stored settings)
    #[arg(long = "api-key", value_name = "KEY", global = true)]
    pub api_key: Option<String>,

    /// Run against a bundled in-memory sample server instead of the network
    #[arg(long, global = true)]
    pub demo: bool,

    /// Tracing filter written to stderr (e.g. "debug", "trove_core=trace")
    #[arg(long = "log", value_name = "DIRECTIVE", global = true)]
    pub log_filter: Option<String>,

    #[command(subcommand)]
    pub command: Option<CliCommand>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum CliCommand {
    /// Show a page of tasks (default command)
    List(ListArgs),
    /// Fetch the latest tasks from the server
    Refresh,
    /// Create a task on the server
    Add(AddArgs),
    /// Change fields of an existing task
    Edit(EditArgs),
    /// Toggle completion of a task
    Complete(TaskRef),
    /// Toggle completion of a subtask
    Subtask(SubtaskArgs),
    /// Store the server endpoint and API key given with --endpoint and --api-key
    Configure,
}

impl Default for CliCommand {
    fn default() -> Self {
        CliCommand::List(ListArgs::default())
    }
}

#[derive(Args, Debug, Clone, Default)]
pub struct ListArgs {
    /// Category to show; remembered for later runs
    #[arg(long, value_enum)]
    pub filter: Option<FilterCategory>,

    /// Sort order; remembered for later runs
    #[arg(long, value_enum)]
    pub sort: Option<SortOption>,

    /// Only show tasks in these projects (id, slug or name; repeated or comma-separated)
    #[arg(long, value_delimiter = ',', action = ArgAction::Append)]
    pub project: Vec<String>,

    /// Only show tasks carrying any of these labels (id, slug or name)
    #[arg(long, value_delimiter = ',', action = ArgAction::Append)]
    pub label: Vec<String>,

    /// Forget the remembered project and label selection
    #[arg(long)]
    pub clear_selection: bool,

    /// Page to show, starting at 1
    #[arg(long, value_parser = value_parser!(usize))]
    pub page: Option<usize>,

    /// Tasks per page
    #[arg(long = "page-size", value_parser = value_parser!(usize))]
    pub page_size: Option<usize>,

    /// Show the cached tasks without contacting the server
    #[arg(long)]
    pub offline: bool,
}

#[derive(Args, Debug, Clone)]
pub struct AddArgs {
    /// Task title
    #[arg(value_name = "TITLE", required = true)]
    pub title: Vec<String>,

    #[arg(long)]
    pub description: Option<String>,

    /// Due date (YYYY-MM-DD)
    #[arg(long = "due", value_name = "DATE")]
    pub due_date: Option<String>,

    /// Priority (1 highest to 4 lowest)
    #[arg(long, value_parser = value_parser!(u8).range(1..=4))]
    pub priority: Option<u8>,

    /// Project id, slug or name
    #[arg(long)]
    pub project: Option<String>,

    /// Labels (id, slug or name; repeated or comma-separated)
    #[arg(long, value_delimiter = ',', action = ArgAction::Append)]
    pub label: Vec<String>,
}

#[derive(Args, Debug, Clone)]
pub struct EditArgs {
    #[command(flatten)]
    pub task: TaskRef,

    #[arg(long)]
    pub title: Option<String>,

    /// New description, or "none" to clear it
    #[arg(long)]
    pub description: Option<String>,

    /// New due date (YYYY-MM-DD), or "none" to clear it
    #[arg(long = "due", value_name = "DATE")]
    pub due_date: Option<String>,

    /// New priority (1-4), or "none" to clear it
    #[arg(long, value_name = "N")]
    pub priority: Option<String>,

    /// Move to a project (id, slug or name), or "none" for the inbox
    #[arg(long)]
    pub project: Option<String>,

    /// Replace the labels (id, slug or name; repeated or comma-separated)
    #[arg(long, value_delimiter = ',', action = ArgAction::Append)]
    pub label: Option<Vec<String>>,
}

#[derive(Args, Debug, Clone)]
pub struct TaskRef {
    /// Task id or a unique prefix of it
    #[arg(value_name = "ID")]
    pub id: String,
}

#[derive(Args, Debug, Clone)]
pub struct SubtaskArgs {
    /// Parent task id or a unique prefix of it
    #[arg(value_name = "TASK_ID")]
    pub task_id: String,

    /// Subtask id
    #[arg(value_name = "SUBTASK_ID")]
    pub subtask_id: String,
}
