//! Durable article index
//!
//! Embedded SQLite store with idempotent upserts. One connection behind a
//! mutex serializes all writers; each batch (a LIST response, one XOVER
//! range) runs in a single transaction, and the writer lock is never held
//! across network I/O.

mod retry;
mod schema;

pub use retry::RetryPolicy;

use std::path::Path;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use tracing::debug;

use crate::error::{IndexError, Result};
use crate::matcher::SegmentFields;

/// A newsgroup row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Group {
    /// Newsgroup name
    pub name: String,
    /// Whether the indexer fetches this group
    pub watch: bool,
}

/// An article row: the overview fields shared across groups
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Article {
    /// Globally unique wire identifier, whitespace-trimmed
    pub message_id: String,
    /// Decoded subject line
    pub subject: String,
    /// Decoded poster (From header)
    pub poster: String,
    /// Post date in UTC
    pub posted: DateTime<Utc>,
    /// Article size in bytes
    pub size: u64,
}

/// A matched release segment, owned 1:1 by its article
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    /// Message-id of the owning article
    pub message_id: String,
    /// Captured release coordinates
    pub fields: SegmentFields,
}

/// One decoded overview record ready for ingest
#[derive(Debug, Clone)]
pub struct OverviewInsert {
    /// Article number within the group
    pub number: u64,
    /// The article attributes
    pub article: Article,
    /// Captured segment, when a matcher claimed the subject
    pub segment: Option<SegmentFields>,
}

/// Row counts for the status surface
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreStats {
    /// Known groups
    pub groups: u64,
    /// Indexed articles
    pub articles: u64,
    /// Matched segments
    pub segments: u64,
}

/// The article index
pub struct Store {
    conn: Mutex<Connection>,
    retry: RetryPolicy,
}

impl Store {
    /// Open (or create) the index at `path`
    pub fn open(path: &Path) -> Result<Self> {
        Self::from_connection(Connection::open(path)?)
    }

    /// Open an in-memory index (tests, dry runs)
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        // WAL lets readers proceed under a writer; the busy timeout absorbs
        // short lock collisions before the retry policy sees them
        let _mode: String =
            conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
        conn.busy_timeout(std::time::Duration::from_millis(250))?;
        conn.execute_batch(schema::SCHEMA)?;

        Ok(Self {
            conn: Mutex::new(conn),
            retry: RetryPolicy::default(),
        })
    }

    /// Replace the busy-retry policy
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn with_conn<T>(&self, f: impl FnMut(&mut Connection) -> rusqlite::Result<T>) -> Result<T> {
        let mut conn = self.conn.lock().expect("store mutex poisoned");
        let mut f = f;
        self.retry.run(|| f(&mut conn))
    }

    /// Run a store operation on the blocking pool.
    ///
    /// Store methods block: they take the writer mutex and the busy-retry
    /// policy sleeps the calling thread on contention. Async callers go
    /// through here so a stalled write never parks a runtime worker.
    pub async fn run_blocking<T, F>(self: &Arc<Self>, f: F) -> Result<T>
    where
        F: FnOnce(&Store) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let store = self.clone();
        tokio::task::spawn_blocking(move || f(&store))
            .await
            .map_err(|e| IndexError::Io(std::io::Error::other(format!("Task join error: {}", e))))?
    }

    /// Insert a group if absent; never touches an existing `watch` flag.
    pub fn upsert_group(&self, name: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO groups (name, watch) VALUES (?1, 0)
                 ON CONFLICT(name) DO NOTHING",
                params![name],
            )?;
            Ok(())
        })
    }

    /// Insert every listed group in one transaction, preserving watch flags.
    ///
    /// Returns the number of newly created rows.
    pub fn upsert_groups(&self, names: &[String]) -> Result<usize> {
        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            let mut created = 0;
            {
                let mut stmt = tx.prepare_cached(
                    "INSERT INTO groups (name, watch) VALUES (?1, 0)
                     ON CONFLICT(name) DO NOTHING",
                )?;
                for name in names {
                    created += stmt.execute(params![name])?;
                }
            }
            tx.commit()?;
            Ok(created)
        })
    }

    /// Set the watch flag; returns whether the group row existed.
    pub fn set_watch(&self, name: &str, watch: bool) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE groups SET watch = ?2 WHERE name = ?1",
                params![name, watch],
            )?;
            Ok(changed > 0)
        })
    }

    /// Record that the server no longer carries a group: it cannot be
    /// fetched, so it stops being watched. The row is kept.
    pub fn mark_missing(&self, name: &str) -> Result<()> {
        debug!(group = name, "marking group missing");
        self.set_watch(name, false)?;
        Ok(())
    }

    /// Ingest one XOVER range for `group` in a single transaction.
    ///
    /// Articles are keyed by message-id and never overwritten; a
    /// `(group, number)` pair re-offered with a different message-id takes
    /// the new id (servers reuse numbers after expiry). Segments are
    /// written at most once per article.
    pub fn ingest_overview(&self, group: &str, records: &[OverviewInsert]) -> Result<()> {
        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            {
                let mut group_stmt = tx.prepare_cached(
                    "INSERT INTO groups (name, watch) VALUES (?1, 0)
                     ON CONFLICT(name) DO NOTHING",
                )?;
                group_stmt.execute(params![group])?;

                let mut article_stmt = tx.prepare_cached(
                    "INSERT INTO articles (message_id, subject, poster, posted, size)
                     VALUES (?1, ?2, ?3, ?4, ?5)
                     ON CONFLICT(message_id) DO NOTHING",
                )?;
                let mut index_stmt = tx.prepare_cached(
                    "INSERT OR REPLACE INTO group_index (group_name, article_number, message_id)
                     VALUES (?1, ?2, ?3)",
                )?;
                let mut segment_stmt = tx.prepare_cached(
                    "INSERT INTO segments (message_id, release_name, file_name,
                                           file_total, file_number, part_total, part_number)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                     ON CONFLICT(message_id) DO NOTHING",
                )?;

                for record in records {
                    let article = &record.article;
                    article_stmt.execute(params![
                        article.message_id,
                        article.subject,
                        article.poster,
                        article.posted.timestamp(),
                        article.size as i64,
                    ])?;
                    index_stmt.execute(params![
                        group,
                        record.number as i64,
                        article.message_id,
                    ])?;
                    if let Some(fields) = &record.segment {
                        segment_stmt.execute(params![
                            article.message_id,
                            fields.release_name,
                            fields.file_name,
                            fields.file_total,
                            fields.file_number,
                            fields.part_total,
                            fields.part_number,
                        ])?;
                    }
                }
            }
            tx.commit()?;
            Ok(())
        })
    }

    /// Insert an article if absent; attributes are immutable once set.
    pub fn upsert_article(&self, article: &Article) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO articles (message_id, subject, poster, posted, size)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(message_id) DO NOTHING",
                params![
                    article.message_id,
                    article.subject,
                    article.poster,
                    article.posted.timestamp(),
                    article.size as i64,
                ],
            )?;
            Ok(())
        })
    }

    /// Bind an article to a position inside a group.
    ///
    /// Keyed by `(group, number)`; a re-offered number takes the new
    /// message-id.
    pub fn upsert_group_index(&self, group: &str, number: u64, message_id: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT OR REPLACE INTO group_index (group_name, article_number, message_id)
                 VALUES (?1, ?2, ?3)",
                params![group, number as i64, message_id],
            )?;
            Ok(())
        })
    }

    /// Write a segment for an article, keeping any existing one.
    pub fn upsert_segment(&self, message_id: &str, fields: &SegmentFields) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO segments (message_id, release_name, file_name,
                                       file_total, file_number, part_total, part_number)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT(message_id) DO NOTHING",
                params![
                    message_id,
                    fields.release_name,
                    fields.file_name,
                    fields.file_total,
                    fields.file_number,
                    fields.part_total,
                    fields.part_number,
                ],
            )?;
            Ok(())
        })
    }

    /// Highest indexed article number for a group, 0 when none.
    pub fn max_indexed(&self, group: &str) -> Result<u64> {
        self.with_conn(|conn| {
            let max: i64 = conn.query_row(
                "SELECT COALESCE(MAX(article_number), 0) FROM group_index
                 WHERE group_name = ?1",
                params![group],
                |row| row.get(0),
            )?;
            Ok(max as u64)
        })
    }

    /// Indexed article numbers for a group within `[lo, hi]`, ascending.
    pub fn indexed_numbers(&self, group: &str, lo: u64, hi: u64) -> Result<Vec<u64>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare_cached(
                "SELECT article_number FROM group_index
                 WHERE group_name = ?1 AND article_number BETWEEN ?2 AND ?3
                 ORDER BY article_number",
            )?;
            let numbers = stmt
                .query_map(params![group, lo as i64, hi as i64], |row| {
                    row.get::<_, i64>(0).map(|n| n as u64)
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(numbers)
        })
    }

    /// All watched groups, by name.
    pub fn watched(&self) -> Result<Vec<Group>> {
        self.with_conn(|conn| {
            let mut stmt = conn
                .prepare_cached("SELECT name, watch FROM groups WHERE watch = 1 ORDER BY name")?;
            let groups = stmt
                .query_map([], row_to_group)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(groups)
        })
    }

    /// Browse groups, optionally filtered by substring and watch flag.
    pub fn list_groups(
        &self,
        filter: Option<&str>,
        watched_only: bool,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<Group>> {
        let pattern = filter.map(|f| format!("%{}%", like_escape(f)));
        self.with_conn(|conn| {
            let mut stmt = conn.prepare_cached(
                "SELECT name, watch FROM groups
                 WHERE (?1 IS NULL OR name LIKE ?1 ESCAPE '\\')
                   AND (?2 = 0 OR watch = 1)
                 ORDER BY name LIMIT ?3 OFFSET ?4",
            )?;
            let groups = stmt
                .query_map(
                    params![pattern, watched_only, limit, offset],
                    row_to_group,
                )?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(groups)
        })
    }

    /// Browse articles, optionally filtered by subject substring.
    pub fn list_articles(
        &self,
        subject_like: Option<&str>,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<Article>> {
        let pattern = subject_like.map(|f| format!("%{}%", like_escape(f)));
        self.with_conn(|conn| {
            let mut stmt = conn.prepare_cached(
                "SELECT message_id, subject, poster, posted, size FROM articles
                 WHERE (?1 IS NULL OR subject LIKE ?1 ESCAPE '\\')
                 ORDER BY posted DESC, message_id LIMIT ?2 OFFSET ?3",
            )?;
            let articles = stmt
                .query_map(params![pattern, limit, offset], row_to_article)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(articles)
        })
    }

    /// Articles with no segment, for offline re-matching.
    ///
    /// Keyset-paged by message-id: pass the last message-id of the previous
    /// page to continue, `None` to start.
    pub fn unmatched_articles(&self, after: Option<&str>, limit: u32) -> Result<Vec<Article>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare_cached(
                "SELECT a.message_id, a.subject, a.poster, a.posted, a.size
                 FROM articles a
                 LEFT JOIN segments s ON s.message_id = a.message_id
                 WHERE s.message_id IS NULL AND (?1 IS NULL OR a.message_id > ?1)
                 ORDER BY a.message_id LIMIT ?2",
            )?;
            let articles = stmt
                .query_map(params![after, limit], row_to_article)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(articles)
        })
    }

    /// The groups an article was seen in (via its index rows).
    pub fn groups_for_article(&self, message_id: &str) -> Result<Vec<String>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare_cached(
                "SELECT group_name FROM group_index WHERE message_id = ?1 ORDER BY group_name",
            )?;
            let groups = stmt
                .query_map(params![message_id], |row| row.get(0))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(groups)
        })
    }

    /// Fetch one group row.
    pub fn group(&self, name: &str) -> Result<Option<Group>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT name, watch FROM groups WHERE name = ?1",
                params![name],
                row_to_group,
            )
            .optional()
        })
    }

    /// Fetch one article row.
    pub fn article(&self, message_id: &str) -> Result<Option<Article>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT message_id, subject, poster, posted, size FROM articles
                 WHERE message_id = ?1",
                params![message_id],
                row_to_article,
            )
            .optional()
        })
    }

    /// Fetch one segment row.
    pub fn segment(&self, message_id: &str) -> Result<Option<Segment>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT message_id, release_name, file_name, file_total, file_number,
                        part_total, part_number
                 FROM segments WHERE message_id = ?1",
                params![message_id],
                |row| {
                    Ok(Segment {
                        message_id: row.get(0)?,
                        fields: SegmentFields {
                            release_name: row.get(1)?,
                            file_name: row.get(2)?,
                            file_total: row.get(3)?,
                            file_number: row.get(4)?,
                            part_total: row.get(5)?,
                            part_number: row.get(6)?,
                        },
                    })
                },
            )
            .optional()
        })
    }

    /// Row counts for the status surface.
    pub fn stats(&self) -> Result<StoreStats> {
        self.with_conn(|conn| {
            let groups: i64 = conn.query_row("SELECT COUNT(*) FROM groups", [], |r| r.get(0))?;
            let articles: i64 =
                conn.query_row("SELECT COUNT(*) FROM articles", [], |r| r.get(0))?;
            let segments: i64 =
                conn.query_row("SELECT COUNT(*) FROM segments", [], |r| r.get(0))?;
            Ok(StoreStats {
                groups: groups as u64,
                articles: articles as u64,
                segments: segments as u64,
            })
        })
    }
}

fn like_escape(s: &str) -> String {
    s.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
}

fn row_to_group(row: &rusqlite::Row<'_>) -> rusqlite::Result<Group> {
    Ok(Group {
        name: row.get(0)?,
        watch: row.get(1)?,
    })
}

fn row_to_article(row: &rusqlite::Row<'_>) -> rusqlite::Result<Article> {
    let posted: i64 = row.get(3)?;
    let size: i64 = row.get(4)?;
    Ok(Article {
        message_id: row.get(0)?,
        subject: row.get(1)?,
        poster: row.get(2)?,
        posted: DateTime::from_timestamp(posted, 0).unwrap_or(DateTime::UNIX_EPOCH),
        size: size as u64,
    })
}
