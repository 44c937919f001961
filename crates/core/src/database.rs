use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::{named_params, Connection, OptionalExtension};

use crate::config::AppConfig;
use crate::model::Snapshot;
use crate::store::{SettingsStore, SnapshotStore};

/// SQLite-backed snapshot and settings storage.
pub struct Database {
    conn: Connection,
}

impl Database {
    pub fn initialize(config: &AppConfig) -> Result<Self> {
        let conn = Connection::open(config.db_path()).with_context(|| {
            format!("Failed to open database at {}", config.db_path().display())
        })?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")
            .context("Failed to configure SQLite WAL mode")?;

        let db = Self { conn };
        db.apply_migrations()?;
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        let db = Self { conn };
        db.apply_migrations()?;
        Ok(db)
    }

    fn apply_migrations(&self) -> Result<()> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS meta (key TEXT PRIMARY KEY, value TEXT);
             CREATE TABLE IF NOT EXISTS snapshot (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                payload TEXT NOT NULL,
                saved_at TEXT NOT NULL
             );
            ",
        )?;
        Ok(())
    }
}

impl SnapshotStore for Database {
    fn load_snapshot(&self) -> Result<Option<Snapshot>> {
        let payload: Option<String> = self
            .conn
            .query_row("SELECT payload FROM snapshot WHERE id = 1", [], |row| {
                row.get(0)
            })
            .optional()?;

        let Some(payload) = payload else {
            return Ok(None);
        };
        match serde_json::from_str::<Snapshot>(&payload) {
            Ok(snapshot) => Ok(Some(snapshot)),
            Err(err) => {
                tracing::warn!(error = %err, "ignoring unreadable cached snapshot");
                Ok(None)
            }
        }
    }

    fn save_snapshot(&self, snapshot: &Snapshot) -> Result<()> {
        let payload = serde_json::to_string(snapshot)?;
        self.conn.execute(
            "INSERT INTO snapshot (id, payload, saved_at) VALUES (1, :payload, :saved_at)
             ON CONFLICT(id) DO UPDATE SET payload = excluded.payload, saved_at = excluded.saved_at",
            named_params! {
                ":payload": payload,
                ":saved_at": Utc::now().to_rfc3339(),
            },
        )?;
        Ok(())
    }
}

impl SettingsStore for Database {
    fn load_setting(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .conn
            .query_row(
                "SELECT value FROM meta WHERE key = :key",
                named_params! { ":key": key },
                |row| row.get::<_, Option<String>>(0),
            )
            .optional()?;
        Ok(value.flatten())
    }

    fn save_setting(&self, key: &str, value: &str) -> Result<()> {
        self.conn.execute(
            "INSERT INTO meta (key, value) VALUES (:key, :value)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            named_params! { ":key": key, ":value": value },
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Label, Task};
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn temp_config() -> (AppConfig, TempDir) {
        let dir = TempDir::new().expect("temp dir");
        let data_dir = dir.path().to_path_buf();
        std::fs::create_dir_all(&data_dir).expect("create data dir");
        let config = AppConfig::from_data_dir(data_dir).expect("config");
        (config, dir)
    }

    fn snapshot() -> Snapshot {
        Snapshot {
            tasks: vec![Task {
                id: Some("t1".into()),
                title: "Water plants".into(),
                due_date: Some("2025-05-01".into()),
                labels: vec!["home".into()],
                ..Task::default()
            }],
            projects: vec![],
            labels: vec![Label {
                id: "home".into(),
                name: "Home".into(),
                slug: "home".into(),
                color: "#00ff00".into(),
            }],
        }
    }

    #[test]
    fn snapshot_survives_reopen() {
        let (config, _dir) = temp_config();
        {
            let db = Database::initialize(&config).expect("init db");
            assert_eq!(db.load_snapshot().expect("load"), None);
            db.save_snapshot(&snapshot()).expect("save");
        }

        let reopened = Database::initialize(&config).expect("reopen db");
        assert_eq!(reopened.load_snapshot().expect("load"), Some(snapshot()));
        let saved_at: String = reopened
            .conn
            .query_row("SELECT saved_at FROM snapshot WHERE id = 1", [], |row| {
                row.get(0)
            })
            .expect("saved at");
        assert!(chrono::DateTime::parse_from_rfc3339(&saved_at).is_ok());
    }

    #[test]
    fn saving_replaces_previous_snapshot() {
        let db = Database::open_in_memory().expect("db");
        db.save_snapshot(&snapshot()).expect("save");
        let replacement = Snapshot::default();
        db.save_snapshot(&replacement).expect("save again");
        assert_eq!(db.load_snapshot().expect("load"), Some(replacement));
    }

    #[test]
    fn corrupt_snapshot_is_treated_as_missing() {
        let db = Database::open_in_memory().expect("db");
        db.conn
            .execute(
                "INSERT INTO snapshot (id, payload, saved_at) VALUES (1, 'not json', '2025-01-01T00:00:00Z')",
                [],
            )
            .expect("insert");
        assert_eq!(db.load_snapshot().expect("load"), None);
    }

    #[test]
    fn settings_upsert_by_key() {
        let db = Database::open_in_memory().expect("db");
        assert_eq!(db.load_setting("view.filter").expect("load"), None);
        db.save_setting("view.filter", "today").expect("save");
        db.save_setting("view.filter", "inbox").expect("save again");
        assert_eq!(
            db.load_setting("view.filter").expect("load").as_deref(),
            Some("inbox")
        );
    }
}
