//! Turns authorization rejections into a reconfiguration signal.

use chrono::{DateTime, Utc};

use crate::config::ConnectionConfig;
use crate::gateway::GatewayError;

/// Raised when the server rejects the credentials. Carries the parameters
/// that were in use so the settings surface can be prefilled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconfigurationRequest {
    pub connection: Option<ConnectionConfig>,
    pub raised_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct AuthMonitor {
    connection: Option<ConnectionConfig>,
    pending: Option<ReconfigurationRequest>,
}

impl AuthMonitor {
    pub fn new(connection: Option<ConnectionConfig>) -> Self {
        Self {
            connection,
            pending: None,
        }
    }

    /// Returns `true` when `error` was an authorization rejection.
    pub fn observe(&mut self, error: &GatewayError) -> bool {
        if !error.is_forbidden() {
            return false;
        }
        if self.pending.is_none() {
            tracing::warn!(
                endpoint = self
                    .connection
                    .as_ref()
                    .map(|connection| connection.endpoint.as_str())
                    .unwrap_or("<unset>"),
                "server rejected credentials, reconfiguration needed"
            );
            self.pending = Some(ReconfigurationRequest {
                connection: self.connection.clone(),
                raised_at: Utc::now(),
            });
        }
        true
    }

    pub fn request(&self) -> Option<&ReconfigurationRequest> {
        self.pending.as_ref()
    }

    pub fn acknowledge(&mut self) -> Option<ReconfigurationRequest> {
        self.pending.take()
    }

    pub fn connection(&self) -> Option<&ConnectionConfig> {
        self.connection.as_ref()
    }

    pub fn reconfigure(&mut self, connection: ConnectionConfig) {
        self.connection = Some(connection);
        self.pending = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connection() -> ConnectionConfig {
        ConnectionConfig::new("https://tasks.example.com/api", "old-key").unwrap()
    }

    #[test]
    fn forbidden_raises_request_with_last_connection() {
        let mut monitor = AuthMonitor::new(Some(connection()));
        assert!(monitor.observe(&GatewayError::Forbidden));
        let request = monitor.request().unwrap();
        assert_eq!(request.connection, Some(connection()));
    }

    #[test]
    fn other_errors_are_not_escalated() {
        let mut monitor = AuthMonitor::new(Some(connection()));
        assert!(!monitor.observe(&GatewayError::Network("offline".into())));
        assert!(monitor.request().is_none());
    }

    #[test]
    fn reconfigure_clears_pending_request() {
        let mut monitor = AuthMonitor::new(Some(connection()));
        monitor.observe(&GatewayError::Forbidden);
        let fresh = ConnectionConfig::new("https://tasks.example.com/api", "new-key").unwrap();
        monitor.reconfigure(fresh.clone());
        assert!(monitor.request().is_none());
        assert_eq!(monitor.connection(), Some(&fresh));
    }
}
