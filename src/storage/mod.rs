//! Durable local cache of skin configurations
//!
//! One row per subject plus one row per frame. A subject's frame set is
//! always replaced wholesale inside a transaction.

use crate::model::{LoopMode, SkinConfig, SkinFrame};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

/// Current schema revision
pub const SCHEMA_VERSION: i64 = 1;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Persistence failure: {0}")]
    Persistence(#[from] rusqlite::Error),

    #[error("Storage connection lock poisoned")]
    Poisoned,

    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type StorageResult<T> = Result<T, StorageError>;

const MIGRATIONS: &[&str] = &[
    // 1
    "CREATE TABLE IF NOT EXISTS skin_configs (
        minecraft_uuid TEXT PRIMARY KEY,
        minecraft_username TEXT NOT NULL,
        cape_type TEXT NOT NULL DEFAULT 'vanilla',
        loop_mode TEXT NOT NULL DEFAULT 'loop',
        frame_duration_ticks INTEGER NOT NULL DEFAULT 10,
        enabled INTEGER NOT NULL DEFAULT 1,
        last_updated INTEGER NOT NULL DEFAULT (strftime('%s','now'))
    );
    CREATE TABLE IF NOT EXISTS skin_frames (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        minecraft_uuid TEXT NOT NULL REFERENCES skin_configs(minecraft_uuid) ON DELETE CASCADE,
        frame_index INTEGER NOT NULL,
        texture_value TEXT NOT NULL,
        texture_signature TEXT NOT NULL,
        texture_url TEXT,
        UNIQUE(minecraft_uuid, frame_index)
    );
    CREATE INDEX IF NOT EXISTS idx_frames_uuid ON skin_frames(minecraft_uuid);",
];

pub struct SkinStorage {
    conn: Mutex<Connection>,
}

impl SkinStorage {
    /// Open (creating if needed) the database file and run pending migrations
    pub fn open(path: &Path) -> StorageResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        let storage = Self::init(conn)?;
        info!("💾 Skin storage ready at {}", path.display());
        Ok(storage)
    }

    pub fn open_in_memory() -> StorageResult<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> StorageResult<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        migrate(&conn)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    fn lock(&self) -> StorageResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StorageError::Poisoned)
    }

    pub fn schema_version(&self) -> StorageResult<i64> {
        let conn = self.lock()?;
        current_version(&conn)
    }

    /// Upsert the config row and replace every frame row
    pub fn save_skin(&self, config: &SkinConfig) -> StorageResult<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let subject = config.subject().to_string();

        tx.execute(
            "INSERT INTO skin_configs
                (minecraft_uuid, minecraft_username, cape_type, loop_mode, frame_duration_ticks, enabled, last_updated)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, strftime('%s','now'))
             ON CONFLICT(minecraft_uuid) DO UPDATE SET
                minecraft_username = excluded.minecraft_username,
                cape_type = excluded.cape_type,
                loop_mode = excluded.loop_mode,
                frame_duration_ticks = excluded.frame_duration_ticks,
                enabled = excluded.enabled,
                last_updated = excluded.last_updated",
            params![
                subject,
                config.minecraft_username,
                config.cape_type,
                config.loop_mode.as_str(),
                config.frame_duration_ticks(),
                config.enabled,
            ],
        )?;

        tx.execute("DELETE FROM skin_frames WHERE minecraft_uuid = ?1", params![subject])?;
        {
            let mut insert = tx.prepare(
                "INSERT INTO skin_frames
                    (minecraft_uuid, frame_index, texture_value, texture_signature, texture_url)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            for frame in config.frames() {
                insert.execute(params![
                    subject,
                    frame.frame_index,
                    frame.texture_value,
                    frame.texture_signature,
                    frame.texture_url,
                ])?;
            }
        }
        tx.commit()?;

        debug!("💾 Saved {} frame(s) for {}", config.frame_count(), config.subject());
        Ok(())
    }

    /// Stored config, or `None` when the subject has no frames on disk
    pub fn load_skin(&self, subject: Uuid) -> StorageResult<Option<SkinConfig>> {
        let conn = self.lock()?;
        let key = subject.to_string();

        let row = conn
            .query_row(
                "SELECT minecraft_username, cape_type, loop_mode, frame_duration_ticks, enabled
                 FROM skin_configs WHERE minecraft_uuid = ?1",
                params![key],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, i32>(3)?,
                        row.get::<_, bool>(4)?,
                    ))
                },
            )
            .optional()?;
        let Some((name, cape_type, loop_mode, duration, enabled)) = row else {
            return Ok(None);
        };

        let mut stmt = conn.prepare(
            "SELECT frame_index, texture_value, texture_signature, texture_url
             FROM skin_frames WHERE minecraft_uuid = ?1 ORDER BY frame_index",
        )?;
        let frames = stmt
            .query_map(params![key], |row| {
                Ok(SkinFrame {
                    frame_index: row.get(0)?,
                    texture_value: row.get(1)?,
                    texture_signature: row.get(2)?,
                    texture_url: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        if frames.is_empty() {
            return Ok(None);
        }

        Ok(Some(
            SkinConfig::new(subject, name, frames)
                .with_cape_type(cape_type)
                .with_loop_mode(LoopMode::parse_lossy(&loop_mode))
                .with_frame_duration(duration)
                .with_enabled(enabled),
        ))
    }

    pub fn has_skin(&self, subject: Uuid) -> StorageResult<bool> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM skin_frames WHERE minecraft_uuid = ?1",
            params![subject.to_string()],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Remove the subject's config and frames. Returns whether a row existed.
    pub fn delete_skin(&self, subject: Uuid) -> StorageResult<bool> {
        let conn = self.lock()?;
        let removed = conn.execute(
            "DELETE FROM skin_configs WHERE minecraft_uuid = ?1",
            params![subject.to_string()],
        )?;
        Ok(removed > 0)
    }
}

fn current_version(conn: &Connection) -> StorageResult<i64> {
    let version = conn.query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |row| {
        row.get(0)
    })?;
    Ok(version)
}

fn migrate(conn: &Connection) -> StorageResult<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER PRIMARY KEY);")?;
    let from = current_version(conn)?;
    for (i, sql) in MIGRATIONS.iter().enumerate() {
        let version = i as i64 + 1;
        if version <= from {
            continue;
        }
        conn.execute_batch(sql)?;
        conn.execute("INSERT INTO schema_version (version) VALUES (?1)", params![version])?;
        info!("💾 Storage schema migrated to v{}", version);
    }
    Ok(())
}
