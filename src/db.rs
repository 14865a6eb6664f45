//! SQLite storage: schema, per-thread transactions, inspection queries

use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use tracing::debug;

use crate::error::Result;
use crate::merger::{merge_thread, MergeOutcome};
use crate::record::ThreadRecord;
use crate::resolver::{associate_all, resolve_references};

/// Database handle for SQLite operations
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open (or create) the database file
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        // Create parent directories if needed
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        Self::configure(conn)
    }

    /// Private in-memory database, used by tests and dry runs
    pub fn open_in_memory() -> Result<Self> {
        Self::configure(Connection::open_in_memory()?)
    }

    fn configure(conn: Connection) -> Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn })
    }

    /// Get a reference to the underlying connection
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Create tables and uniqueness constraints
    pub fn run_migrations(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY,          -- forum's own user id
                name TEXT,
                url TEXT
            );

            CREATE TABLE IF NOT EXISTS developers (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL UNIQUE,
                url TEXT
            );

            CREATE TABLE IF NOT EXISTS platforms (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL UNIQUE
            );

            CREATE TABLE IF NOT EXISTS languages (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL UNIQUE
            );

            CREATE TABLE IF NOT EXISTS prefixes (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL UNIQUE,
                url TEXT
            );

            CREATE TABLE IF NOT EXISTS tags (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL UNIQUE COLLATE NOCASE,
                url TEXT
            );

            CREATE TABLE IF NOT EXISTS images (
                id INTEGER PRIMARY KEY,
                name TEXT,
                url TEXT NOT NULL UNIQUE
            );

            CREATE TABLE IF NOT EXISTS links (
                id INTEGER PRIMARY KEY,
                url TEXT NOT NULL UNIQUE
            );

            -- One row per forum thread, keyed by the forum's thread id
            CREATE TABLE IF NOT EXISTS threads (
                id INTEGER PRIMARY KEY,
                canonical TEXT,
                title TEXT,
                user_id INTEGER REFERENCES users(id),
                rating REAL,
                date INTEGER,                    -- posted (Unix)
                edited INTEGER,                  -- last edit (Unix)
                overview TEXT,
                developer_id INTEGER REFERENCES developers(id),
                platform_id INTEGER REFERENCES platforms(id),
                censorship TEXT,
                language_id INTEGER REFERENCES languages(id),
                version TEXT,
                views INTEGER,
                likes INTEGER,
                votes INTEGER,
                prefixes TEXT,                   -- comma-joined, denormalized
                pages INTEGER,
                image_cover TEXT
            );

            CREATE TABLE IF NOT EXISTS thread_tags (
                id INTEGER PRIMARY KEY,
                thread_id INTEGER NOT NULL REFERENCES threads(id),
                tag_id INTEGER NOT NULL REFERENCES tags(id),
                UNIQUE(thread_id, tag_id)
            );

            CREATE TABLE IF NOT EXISTS thread_links (
                id INTEGER PRIMARY KEY,
                thread_id INTEGER NOT NULL REFERENCES threads(id),
                link_id INTEGER NOT NULL REFERENCES links(id),
                UNIQUE(thread_id, link_id)
            );

            CREATE TABLE IF NOT EXISTS thread_images (
                id INTEGER PRIMARY KEY,
                thread_id INTEGER NOT NULL REFERENCES threads(id),
                image_id INTEGER NOT NULL REFERENCES images(id),
                UNIQUE(thread_id, image_id)
            );

            CREATE TABLE IF NOT EXISTS thread_prefixes (
                id INTEGER PRIMARY KEY,
                thread_id INTEGER NOT NULL REFERENCES threads(id),
                prefix_id INTEGER NOT NULL REFERENCES prefixes(id),
                UNIQUE(thread_id, prefix_id)
            );

            CREATE INDEX IF NOT EXISTS idx_thread_tags_tag ON thread_tags(tag_id);
            CREATE INDEX IF NOT EXISTS idx_thread_links_link ON thread_links(link_id);
            CREATE INDEX IF NOT EXISTS idx_thread_images_image ON thread_images(image_id);
            CREATE INDEX IF NOT EXISTS idx_thread_prefixes_prefix ON thread_prefixes(prefix_id);
            "#,
        )?;

        Ok(())
    }

    /// Persist one thread record atomically.
    ///
    /// Entities are resolved first, then the thread row is merged, then the
    /// junction rows are asserted. Any error rolls the whole import back.
    /// Requires `&mut self`: imports are single-writer.
    pub fn import_thread(&mut self, record: &ThreadRecord) -> Result<MergeOutcome> {
        let tx = self.conn.transaction()?;

        let refs = resolve_references(&tx, record)?;
        let outcome = merge_thread(&tx, record, &refs)?;
        let associated = associate_all(&tx, record.thread_id, &refs)?;

        tx.commit()?;

        debug!(
            "Thread {} {:?}, {} new associations",
            record.thread_id, outcome, associated
        );
        Ok(outcome)
    }

    /// Get a stored thread row
    pub fn get_thread(&self, thread_id: i64) -> Result<Option<StoredThread>> {
        let thread = self
            .conn
            .query_row(
                "SELECT id, canonical, title, user_id, rating, date, edited, overview,
                        developer_id, platform_id, censorship, language_id, version,
                        views, likes, votes, prefixes, pages, image_cover
                 FROM threads WHERE id = ?1",
                params![thread_id],
                |row| {
                    Ok(StoredThread {
                        id: row.get(0)?,
                        canonical: row.get(1)?,
                        title: row.get(2)?,
                        user_id: row.get(3)?,
                        rating: row.get(4)?,
                        date: row.get(5)?,
                        edited: row.get(6)?,
                        overview: row.get(7)?,
                        developer_id: row.get(8)?,
                        platform_id: row.get(9)?,
                        censorship: row.get(10)?,
                        language_id: row.get(11)?,
                        version: row.get(12)?,
                        views: row.get(13)?,
                        likes: row.get(14)?,
                        votes: row.get(15)?,
                        prefixes: row.get(16)?,
                        pages: row.get(17)?,
                        image_cover: row.get(18)?,
                    })
                },
            )
            .optional()?;

        Ok(thread)
    }

    /// Name of the developer a thread references
    pub fn developer_name(&self, developer_id: i64) -> Result<Option<String>> {
        let name = self
            .conn
            .query_row(
                "SELECT name FROM developers WHERE id = ?1",
                params![developer_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(name)
    }

    /// Row counts for every table, in schema order
    pub fn table_counts(&self) -> Result<Vec<TableCount>> {
        const TABLES: &[&str] = &[
            "threads",
            "users",
            "developers",
            "platforms",
            "languages",
            "prefixes",
            "tags",
            "images",
            "links",
            "thread_tags",
            "thread_links",
            "thread_images",
            "thread_prefixes",
        ];

        TABLES
            .iter()
            .map(|table| -> Result<TableCount> {
                let rows: i64 = self.conn.query_row(
                    &format!("SELECT COUNT(*) FROM {}", table),
                    [],
                    |row| row.get(0),
                )?;
                Ok(TableCount { table: *table, rows })
            })
            .collect()
    }

    /// Row count of a single table
    pub fn count(&self, table: &str) -> Result<i64> {
        let rows = self
            .conn
            .query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| row.get(0))?;
        Ok(rows)
    }
}

/// Thread row as stored
#[derive(Debug, Clone, PartialEq)]
pub struct StoredThread {
    pub id: i64,
    pub canonical: Option<String>,
    pub title: Option<String>,
    pub user_id: Option<i64>,
    pub rating: Option<f64>,
    pub date: Option<i64>,
    pub edited: Option<i64>,
    pub overview: Option<String>,
    pub developer_id: Option<i64>,
    pub platform_id: Option<i64>,
    pub censorship: Option<String>,
    pub language_id: Option<i64>,
    pub version: Option<String>,
    pub views: Option<i64>,
    pub likes: Option<i64>,
    pub votes: Option<i64>,
    pub prefixes: Option<String>,
    pub pages: Option<i64>,
    pub image_cover: Option<String>,
}

/// Row count of one table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableCount {
    pub table: &'static str,
    pub rows: i64,
}
