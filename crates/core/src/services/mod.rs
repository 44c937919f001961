pub mod auth;
pub mod cache;
pub mod engine;
pub mod runtime;
pub mod writeback;

pub use auth::{AuthMonitor, ReconfigurationRequest};
pub use cache::{MergeOutcome, TaskCache};
pub use engine::{Command, Message, SyncEngine};
pub use runtime::SyncRuntime;
pub use writeback::WriteBackScheduler;
