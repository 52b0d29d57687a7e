//! SQLite-backed key/value store for the last selected directories.
//!
//! The database lives at `XDG_CONFIG_HOME/swipesort/preferences.sqlite` and
//! is opened in WAL mode.

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use directories::ProjectDirs;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info, warn};

use crate::pane::Side;

pub struct PreferenceStore {
    conn: Connection,
}

impl PreferenceStore {
    /// Opens or creates the store at the default XDG location.
    pub fn open_default() -> Result<Self> {
        let db_path = Self::default_db_path()?;
        Self::open(&db_path)
    }

    pub fn default_db_path() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("", "", "swipesort")
            .context("Failed to determine project directories")?;

        let config_dir = proj_dirs.config_dir();
        std::fs::create_dir_all(config_dir)
            .with_context(|| format!("Failed to create config directory: {:?}", config_dir))?;

        Ok(config_dir.join("preferences.sqlite"))
    }

    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create database directory: {:?}", parent))?;
        }

        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database at {:?}", path))?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            ",
        )
        .context("Failed to configure SQLite pragmas")?;

        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS preferences (
                key TEXT PRIMARY KEY NOT NULL,
                value TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            );
            ",
        )
        .context("Failed to create preferences table")?;

        info!("Opened preference store at {:?}", path);
        Ok(Self { conn })
    }

    pub fn get(&self, key: &str) -> Result<Option<String>> {
        self.conn
            .query_row(
                "SELECT value FROM preferences WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()
            .with_context(|| format!("Failed to read preference {key}"))
    }

    pub fn set(&self, key: &str, value: &str) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO preferences (key, value, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
                params![key, value, Self::now()],
            )
            .with_context(|| format!("Failed to write preference {key}"))?;
        debug!(key, value, "Stored preference");
        Ok(())
    }

    /// Last directory chosen for `side`, if one was stored.
    pub fn directory(&self, side: Side) -> Option<PathBuf> {
        match self.get(side.preference_key()) {
            Ok(value) => value.map(PathBuf::from),
            Err(e) => {
                warn!(error = ?e, ?side, "Failed to restore directory");
                None
            }
        }
    }

    pub fn set_directory(&self, side: Side, path: &Path) -> Result<()> {
        self.set(side.preference_key(), &path.to_string_lossy())
    }

    fn now() -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0)
    }
}
