pub mod config;
pub mod database;
pub mod diff;
pub mod gateway;
pub mod model;
pub mod patch;
pub mod services;
pub mod store;
pub mod view;

pub use config::{AppConfig, ConnectionConfig, SyncOptions};
pub use database::Database;
pub use diff::diff;
pub use gateway::{ErrorKind, GatewayError, HttpGateway, MemoryGateway, RemoteGateway};
pub use model::*;
pub use patch::{FieldPatch, PartialTask};
pub use services::{Message, SyncEngine, SyncRuntime};
pub use store::{MemoryStore, Persistence, SettingsStore, SnapshotStore};
pub use view::{TaskPage, ViewCriteria};
