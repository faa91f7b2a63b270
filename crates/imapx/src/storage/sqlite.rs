//! SQLite-based summary storage

use std::path::Path;
use std::sync::Mutex;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use rusqlite_migration::{M, Migrations};

use super::traits::SummaryStore;
use crate::models::{MessageFlags, MessageInfo, SummaryRecord, Uid};

/// Database migrations
///
/// Each migration is applied in order. The user_version pragma tracks which
/// migrations have been applied.
fn migrations() -> Migrations<'static> {
    Migrations::new(vec![
        // Migration 1: Initial schema
        M::up(
            r#"
            -- One row per folder summary
            CREATE TABLE folders (
                path TEXT PRIMARY KEY,
                uidvalidity INTEGER NOT NULL DEFAULT 0,
                last_refresh_at TEXT
            );

            -- Message infos, UID-keyed within a folder
            CREATE TABLE message_infos (
                folder_path TEXT NOT NULL,
                uid INTEGER NOT NULL,
                flags INTEGER NOT NULL DEFAULT 0,
                server_flags INTEGER NOT NULL DEFAULT 0,
                from_addr TEXT NOT NULL DEFAULT '',
                to_addr TEXT NOT NULL DEFAULT '',
                cc_addr TEXT NOT NULL DEFAULT '',
                subject TEXT NOT NULL DEFAULT '',
                size INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (folder_path, uid),
                FOREIGN KEY (folder_path) REFERENCES folders(path)
                    ON DELETE CASCADE ON UPDATE CASCADE
            );
            "#,
        ),
        // Migration 2: Track entries awaiting reconciliation after an epoch change
        M::up(
            r#"
            ALTER TABLE message_infos ADD COLUMN stale INTEGER NOT NULL DEFAULT 0;
            "#,
        ),
    ])
}

/// SQLite-based summary storage
pub struct SqliteSummaryStore {
    conn: Mutex<Connection>,
}

impl SqliteSummaryStore {
    /// Open (or create) a summary database at `db_path`
    pub fn new(db_path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(db_path.as_ref())
            .with_context(|| format!("Failed to open database at {:?}", db_path.as_ref()))?;
        Self::from_connection(conn)
    }

    /// Open a private in-memory database
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        Self::from_connection(conn)
    }

    fn from_connection(mut conn: Connection) -> Result<Self> {
        // WAL lets readers proceed during a save; foreign keys are
        // required for the cascades on rename and delete.
        conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
            PRAGMA foreign_keys = ON;
            "#,
        )?;

        migrations()
            .to_latest(&mut conn)
            .context("Failed to run database migrations")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn load_messages(&self, conn: &Connection, folder_path: &str) -> Result<Vec<MessageInfo>> {
        let mut stmt = conn.prepare(
            "SELECT uid, flags, server_flags, from_addr, to_addr, cc_addr, subject, size, stale
             FROM message_infos
             WHERE folder_path = ?
             ORDER BY uid",
        )?;

        let messages = stmt
            .query_map([folder_path], |row| {
                Ok(MessageInfo {
                    uid: Uid(row.get::<_, i64>(0)? as u32),
                    flags: MessageFlags::from_bits(row.get::<_, i64>(1)? as u32),
                    server_flags: MessageFlags::from_bits(row.get::<_, i64>(2)? as u32),
                    from: row.get(3)?,
                    to: row.get(4)?,
                    cc: row.get(5)?,
                    subject: row.get(6)?,
                    size: row.get::<_, i64>(7)? as u32,
                    stale: row.get::<_, i64>(8)? != 0,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(messages)
    }
}

impl SummaryStore for SqliteSummaryStore {
    fn load(&self, folder_path: &str) -> Result<Option<SummaryRecord>> {
        let conn = self.conn.lock().unwrap();

        let folder: Option<(i64, Option<String>)> = conn
            .query_row(
                "SELECT uidvalidity, last_refresh_at FROM folders WHERE path = ?",
                [folder_path],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let Some((uidvalidity, last_refresh_at)) = folder else {
            return Ok(None);
        };

        let last_refresh_at = match last_refresh_at {
            Some(ts) => Some(
                DateTime::parse_from_rfc3339(&ts)
                    .with_context(|| format!("Invalid refresh timestamp for {}", folder_path))?
                    .with_timezone(&Utc),
            ),
            None => None,
        };

        let messages = self.load_messages(&conn, folder_path)?;

        Ok(Some(SummaryRecord {
            uidvalidity: uidvalidity as u32,
            last_refresh_at,
            messages,
        }))
    }

    fn save(&self, folder_path: &str, record: &SummaryRecord) -> Result<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        tx.execute(
            "INSERT INTO folders (path, uidvalidity, last_refresh_at) VALUES (?, ?, ?)
             ON CONFLICT(path) DO UPDATE SET
                uidvalidity = excluded.uidvalidity,
                last_refresh_at = excluded.last_refresh_at",
            params![
                folder_path,
                record.uidvalidity as i64,
                record.last_refresh_at.map(|ts| ts.to_rfc3339()),
            ],
        )?;

        tx.execute(
            "DELETE FROM message_infos WHERE folder_path = ?",
            [folder_path],
        )?;

        {
            let mut insert = tx.prepare(
                "INSERT INTO message_infos
                    (folder_path, uid, flags, server_flags, from_addr, to_addr, cc_addr, subject, size, stale)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )?;
            for info in &record.messages {
                insert.execute(params![
                    folder_path,
                    info.uid.value() as i64,
                    info.flags.bits() as i64,
                    info.server_flags.bits() as i64,
                    info.from,
                    info.to,
                    info.cc,
                    info.subject,
                    info.size as i64,
                    info.stale as i64,
                ])?;
            }
        }

        tx.commit().context("Failed to commit summary")?;
        Ok(())
    }

    fn rename(&self, old_path: &str, new_path: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM folders WHERE path = ?", [new_path])?;
        conn.execute(
            "UPDATE folders SET path = ? WHERE path = ?",
            params![new_path, old_path],
        )?;
        Ok(())
    }

    fn delete(&self, folder_path: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM folders WHERE path = ?", [folder_path])?;
        Ok(())
    }

    fn list_folders(&self) -> Result<Vec<String>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT path FROM folders ORDER BY path")?;
        let paths = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(paths)
    }
}
