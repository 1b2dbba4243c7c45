use std::fmt::Display;
use std::fs;
use std::path::PathBuf;

use chrono::{DateTime, SecondsFormat, Utc};
use crawler_core::domain::{Record, RecordId, COLUMNS};
use crawler_core::ports::{RecordRepository, Result};
use crawler_core::CrawlError;
use rusqlite::{params, Connection, Row};
use tracing::debug;

const TABLE: &str = "records";

/// SQLite implementation of the RecordRepository trait.
/// One database file per crawled account, holding a single `records` table.
pub struct SqliteRecordRepository {
    db_path: PathBuf,
}

/// Row as stored, before identifiers and timestamps are parsed back.
struct StoredRow {
    id: String,
    post_url: String,
    is_post: bool,
    commenter: String,
    text: Option<String>,
    replies_to: Option<String>,
    replies_count: Option<u32>,
    likes: Option<String>,
    date: Option<String>,
    crawl_time: String,
}

impl SqliteRecordRepository {
    pub fn new(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: db_path.into(),
        }
    }

    fn connect(&self) -> Result<Connection> {
        if let Some(parent) = self.db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| {
                storage(format!("cannot create {}: {e}", parent.display()))
            })?;
        }
        let conn = Connection::open(&self.db_path).map_err(storage)?;
        conn.execute_batch(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS {TABLE} (
                id            TEXT PRIMARY KEY,
                post_url      TEXT NOT NULL,
                is_post       INTEGER NOT NULL,
                commenter     TEXT NOT NULL,
                text          TEXT,
                replies_to    TEXT,
                replies_count INTEGER,
                likes         TEXT,
                date          TEXT,
                crawl_time    TEXT NOT NULL
            );
            "#
        ))
        .map_err(storage)?;
        Ok(conn)
    }

    fn read_row(row: &Row) -> rusqlite::Result<StoredRow> {
        Ok(StoredRow {
            id: row.get(0)?,
            post_url: row.get(1)?,
            is_post: row.get(2)?,
            commenter: row.get(3)?,
            text: row.get(4)?,
            replies_to: row.get(5)?,
            replies_count: row.get(6)?,
            likes: row.get(7)?,
            date: row.get(8)?,
            crawl_time: row.get(9)?,
        })
    }
}

impl StoredRow {
    fn into_record(self) -> Result<(RecordId, Record)> {
        let id: RecordId = self
            .id
            .parse()
            .map_err(|e| storage(format!("bad record id '{}': {e}", self.id)))?;
        let replies_to = self
            .replies_to
            .map(|parent| {
                parent
                    .parse::<RecordId>()
                    .map_err(|e| storage(format!("bad parent id '{parent}': {e}")))
            })
            .transpose()?;
        let crawl_time = DateTime::parse_from_rfc3339(&self.crawl_time)
            .map_err(|e| storage(format!("bad crawl time '{}': {e}", self.crawl_time)))?
            .with_timezone(&Utc);

        Ok((
            id,
            Record {
                post_url: self.post_url,
                is_post: self.is_post,
                commenter: self.commenter,
                text: self.text,
                replies_to,
                replies_count: self.replies_count,
                likes: self.likes,
                date: self.date,
                crawl_time,
            },
        ))
    }
}

impl RecordRepository for SqliteRecordRepository {
    fn exists(&self) -> bool {
        self.db_path.exists()
    }

    fn load(&self) -> Result<Vec<(RecordId, Record)>> {
        let conn = self.connect()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT id, {} FROM {TABLE} ORDER BY rowid ASC",
                COLUMNS.join(", ")
            ))
            .map_err(storage)?;

        let stored = stmt
            .query_map([], Self::read_row)
            .map_err(storage)?
            .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()
            .map_err(storage)?;

        stored.into_iter().map(StoredRow::into_record).collect()
    }

    fn save(&self, rows: &[(RecordId, Record)]) -> Result<()> {
        let mut conn = self.connect()?;
        let tx = conn.transaction().map_err(storage)?;
        tx.execute(&format!("DELETE FROM {TABLE}"), [])
            .map_err(storage)?;
        {
            let placeholders = vec!["?"; COLUMNS.len() + 1].join(", ");
            let mut insert = tx
                .prepare(&format!(
                    "INSERT INTO {TABLE} (id, {}) VALUES ({placeholders})",
                    COLUMNS.join(", ")
                ))
                .map_err(storage)?;
            for (id, record) in rows {
                insert
                    .execute(params![
                        id.to_string(),
                        record.post_url,
                        record.is_post,
                        record.commenter,
                        record.text,
                        record.replies_to.map(|parent| parent.to_string()),
                        record.replies_count,
                        record.likes,
                        record.date,
                        record.crawl_time.to_rfc3339_opts(SecondsFormat::AutoSi, true),
                    ])
                    .map_err(storage)?;
            }
        }
        tx.commit().map_err(storage)?;
        debug!(path = %self.db_path.display(), rows = rows.len(), "record table written");
        Ok(())
    }

    fn location(&self) -> String {
        self.db_path.display().to_string()
    }
}

fn storage(e: impl Display) -> CrawlError {
    CrawlError::Storage(e.to_string())
}
