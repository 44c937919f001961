//! Drives a [`SyncEngine`] against a [`RemoteGateway`] on tokio.
//!
//! Network calls run as tasks on a [`JoinSet`]; their results, and the
//! debounce timer, are fed back into the engine one message at a time so
//! the cache only ever has a single writer.

use std::future::Future;
use std::sync::Arc;

use tokio::task::JoinSet;
use tokio::time::{sleep_until, Instant};

use crate::config::ConnectionConfig;
use crate::gateway::{GatewayError, RemoteGateway};
use crate::services::engine::{Command, Message, SyncEngine};

pub struct SyncRuntime {
    engine: SyncEngine,
    gateway: Arc<dyn RemoteGateway>,
    in_flight: JoinSet<Message>,
}

impl SyncRuntime {
    pub fn new(engine: SyncEngine, gateway: Arc<dyn RemoteGateway>) -> Self {
        Self {
            engine,
            gateway,
            in_flight: JoinSet::new(),
        }
    }

    pub fn engine(&self) -> &SyncEngine {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut SyncEngine {
        &mut self.engine
    }

    /// Point future requests at a new server. Calls already in flight finish
    /// against the old one.
    pub fn reconnect(&mut self, gateway: Arc<dyn RemoteGateway>, connection: ConnectionConfig) {
        self.gateway = gateway;
        self.engine.set_connection(connection);
    }

    /// Must be called from within a tokio runtime.
    pub fn dispatch(&mut self, message: Message) {
        for command in self.engine.react(message) {
            self.spawn(command);
        }
    }

    fn spawn(&mut self, command: Command) {
        let gateway = Arc::clone(&self.gateway);
        match command {
            Command::Fetch => {
                self.in_flight.spawn(async move {
                    let result = guarded(async move { gateway.fetch_all().await }).await;
                    Message::Fetched(result)
                });
            }
            Command::ApplyPatches(patches) => {
                let sent = patches.clone();
                self.in_flight.spawn(async move {
                    let result = guarded(async move { gateway.apply_patches(&sent).await }).await;
                    Message::PatchesApplied { patches, result }
                });
            }
            Command::CreateTask(draft) => {
                self.in_flight.spawn(async move {
                    let result = guarded(async move { gateway.create_task(&draft).await }).await;
                    Message::Created(result)
                });
            }
        }
    }

    /// Wait for the next network result or debounce expiry and apply it.
    /// Returns `false` once nothing is outstanding.
    pub async fn next(&mut self) -> bool {
        let deadline = self.engine.flush_deadline();
        let has_calls = !self.in_flight.is_empty();
        if !has_calls && deadline.is_none() {
            return false;
        }

        let message = tokio::select! {
            Some(joined) = self.in_flight.join_next(), if has_calls => match joined {
                Ok(message) => message,
                Err(err) => {
                    tracing::error!(error = %err, "network task aborted");
                    return true;
                }
            },
            _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                Message::FlushDue
            }
            else => return false,
        };
        self.dispatch(message);
        true
    }

    /// Run until every in-flight call has answered and every buffered edit
    /// has been flushed.
    pub async fn settle(&mut self) {
        while self.next().await {}
    }
}

/// Run a gateway call on its own task so a panic inside it still produces a
/// result message for the engine.
async fn guarded<T, F>(call: F) -> Result<T, GatewayError>
where
    T: Send + 'static,
    F: Future<Output = Result<T, GatewayError>> + Send + 'static,
{
    tokio::spawn(call).await.unwrap_or_else(|err| {
        tracing::error!(error = %err, "gateway call did not complete");
        Err(GatewayError::Interrupted(err.to_string()))
    })
}
