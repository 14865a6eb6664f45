//! Entity resolution and association upserts
//!
//! Every shared entity is looked up by its natural key and created only when
//! absent. Lookup-then-insert is not atomic, so a uniqueness violation on
//! insert means another writer got there first: refetch and carry on.
//! Imports must stay single-writer until this becomes an atomic
//! conditional insert.

use rusqlite::{params, Connection, OptionalExtension, ToSql};
use tracing::debug;

use crate::error::{is_unique_violation, ImportError, Result};
use crate::record::ThreadRecord;

/// An entity row identified by a natural key
pub trait NaturalKey {
    fn table(&self) -> &'static str;
    fn key_column(&self) -> &'static str;
    fn key(&self) -> &dyn ToSql;
    /// Insert the row, returning its id
    fn insert(&self, conn: &Connection) -> rusqlite::Result<i64>;
}

/// Forum user, keyed by the forum's own user id
#[derive(Debug)]
pub struct NewUser<'a> {
    pub id: i64,
    pub name: Option<&'a str>,
    pub url: Option<&'a str>,
}

impl NaturalKey for NewUser<'_> {
    fn table(&self) -> &'static str {
        "users"
    }
    fn key_column(&self) -> &'static str {
        "id"
    }
    fn key(&self) -> &dyn ToSql {
        &self.id
    }
    fn insert(&self, conn: &Connection) -> rusqlite::Result<i64> {
        conn.execute(
            "INSERT INTO users (id, name, url) VALUES (?1, ?2, ?3)",
            params![self.id, self.name, self.url],
        )?;
        Ok(self.id)
    }
}

#[derive(Debug)]
pub struct NewTag<'a> {
    pub name: &'a str,
    pub url: &'a str,
}

impl NaturalKey for NewTag<'_> {
    fn table(&self) -> &'static str {
        "tags"
    }
    fn key_column(&self) -> &'static str {
        "name"
    }
    fn key(&self) -> &dyn ToSql {
        &self.name
    }
    fn insert(&self, conn: &Connection) -> rusqlite::Result<i64> {
        conn.execute(
            "INSERT INTO tags (name, url) VALUES (?1, ?2)",
            params![self.name, self.url],
        )?;
        Ok(conn.last_insert_rowid())
    }
}

#[derive(Debug)]
pub struct NewImage<'a> {
    pub name: Option<&'a str>,
    pub url: &'a str,
}

impl NaturalKey for NewImage<'_> {
    fn table(&self) -> &'static str {
        "images"
    }
    fn key_column(&self) -> &'static str {
        "url"
    }
    fn key(&self) -> &dyn ToSql {
        &self.url
    }
    fn insert(&self, conn: &Connection) -> rusqlite::Result<i64> {
        conn.execute(
            "INSERT INTO images (name, url) VALUES (?1, ?2)",
            params![self.name, self.url],
        )?;
        Ok(conn.last_insert_rowid())
    }
}

#[derive(Debug)]
pub struct NewLink<'a> {
    pub url: &'a str,
}

impl NaturalKey for NewLink<'_> {
    fn table(&self) -> &'static str {
        "links"
    }
    fn key_column(&self) -> &'static str {
        "url"
    }
    fn key(&self) -> &dyn ToSql {
        &self.url
    }
    fn insert(&self, conn: &Connection) -> rusqlite::Result<i64> {
        conn.execute("INSERT INTO links (url) VALUES (?1)", params![self.url])?;
        Ok(conn.last_insert_rowid())
    }
}

/// Tables whose only natural key is a name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameTable {
    Developer,
    Platform,
    Language,
    Prefix,
}

impl NameTable {
    fn table(self) -> &'static str {
        match self {
            NameTable::Developer => "developers",
            NameTable::Platform => "platforms",
            NameTable::Language => "languages",
            NameTable::Prefix => "prefixes",
        }
    }
}

#[derive(Debug)]
pub struct NewNamed<'a> {
    pub kind: NameTable,
    pub name: &'a str,
}

impl NaturalKey for NewNamed<'_> {
    fn table(&self) -> &'static str {
        self.kind.table()
    }
    fn key_column(&self) -> &'static str {
        "name"
    }
    fn key(&self) -> &dyn ToSql {
        &self.name
    }
    fn insert(&self, conn: &Connection) -> rusqlite::Result<i64> {
        conn.execute(
            &format!("INSERT INTO {} (name) VALUES (?1)", self.table()),
            params![self.name],
        )?;
        Ok(conn.last_insert_rowid())
    }
}

/// How an entity reference was satisfied
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Existing(i64),
    Created(i64),
}

impl Resolution {
    pub fn id(self) -> i64 {
        match self {
            Resolution::Existing(id) | Resolution::Created(id) => id,
        }
    }
}

fn lookup<E: NaturalKey + ?Sized>(conn: &Connection, entity: &E) -> rusqlite::Result<Option<i64>> {
    conn.query_row(
        &format!(
            "SELECT id FROM {} WHERE {} = ?1",
            entity.table(),
            entity.key_column()
        ),
        params![entity.key()],
        |row| row.get(0),
    )
    .optional()
}

/// Find the entity's row by natural key, creating it when absent.
pub fn resolve<E: NaturalKey + ?Sized>(conn: &Connection, entity: &E) -> Result<Resolution> {
    if let Some(id) = lookup(conn, entity)? {
        return Ok(Resolution::Existing(id));
    }

    match entity.insert(conn) {
        Ok(id) => Ok(Resolution::Created(id)),
        Err(e) if is_unique_violation(&e) => {
            debug!("Row in {} appeared concurrently, refetching", entity.table());
            lookup(conn, entity)?
                .map(Resolution::Existing)
                .ok_or(ImportError::Store(e))
        }
        Err(e) => Err(e.into()),
    }
}

/// Many-to-many tables between threads and shared entities
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Association {
    Tag,
    Link,
    Image,
    Prefix,
}

impl Association {
    fn table(self) -> &'static str {
        match self {
            Association::Tag => "thread_tags",
            Association::Link => "thread_links",
            Association::Image => "thread_images",
            Association::Prefix => "thread_prefixes",
        }
    }

    fn related_column(self) -> &'static str {
        match self {
            Association::Tag => "tag_id",
            Association::Link => "link_id",
            Association::Image => "image_id",
            Association::Prefix => "prefix_id",
        }
    }
}

/// Ensure exactly one (thread, related) row exists. Returns true if inserted.
pub fn associate(conn: &Connection, kind: Association, thread_id: i64, related_id: i64) -> Result<bool> {
    let exists = conn
        .query_row(
            &format!(
                "SELECT 1 FROM {} WHERE thread_id = ?1 AND {} = ?2",
                kind.table(),
                kind.related_column()
            ),
            params![thread_id, related_id],
            |_| Ok(()),
        )
        .optional()?
        .is_some();
    if exists {
        return Ok(false);
    }

    let inserted = conn.execute(
        &format!(
            "INSERT INTO {} (thread_id, {}) VALUES (?1, ?2)",
            kind.table(),
            kind.related_column()
        ),
        params![thread_id, related_id],
    );
    match inserted {
        Ok(_) => Ok(true),
        Err(e) if is_unique_violation(&e) => Ok(false),
        Err(e) => Err(e.into()),
    }
}

/// Ids of every entity a thread record references
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedRefs {
    pub user_id: Option<i64>,
    pub developer_id: Option<i64>,
    pub platform_id: Option<i64>,
    pub language_id: Option<i64>,
    pub tag_ids: Vec<i64>,
    pub link_ids: Vec<i64>,
    pub image_ids: Vec<i64>,
    pub prefix_ids: Vec<i64>,
}

fn resolve_name(conn: &Connection, kind: NameTable, name: Option<&str>) -> Result<Option<i64>> {
    match name.map(str::trim).filter(|n| !n.is_empty()) {
        Some(name) => Ok(Some(resolve(conn, &NewNamed { kind, name })?.id())),
        None => Ok(None),
    }
}

/// Resolve or create every entity the record references.
pub fn resolve_references(conn: &Connection, record: &ThreadRecord) -> Result<ResolvedRefs> {
    let mut refs = ResolvedRefs::default();

    if let Some(id) = record.user.id {
        let user = NewUser {
            id,
            name: record.user.name.as_deref(),
            url: record.user.url.as_deref(),
        };
        refs.user_id = Some(resolve(conn, &user)?.id());
    }

    refs.developer_id = resolve_name(conn, NameTable::Developer, record.developer.as_deref())?;
    refs.platform_id = resolve_name(conn, NameTable::Platform, record.platform.as_deref())?;
    refs.language_id = resolve_name(conn, NameTable::Language, record.language.as_deref())?;

    for (name, url) in &record.tags {
        refs.tag_ids.push(resolve(conn, &NewTag { name, url })?.id());
    }
    for url in &record.links {
        refs.link_ids.push(resolve(conn, &NewLink { url })?.id());
    }
    for image in &record.images {
        let image = NewImage {
            name: image.name.as_deref(),
            url: &image.url,
        };
        refs.image_ids.push(resolve(conn, &image)?.id());
    }
    for prefix in &record.prefixes {
        if let Some(id) = resolve_name(conn, NameTable::Prefix, Some(prefix.as_str()))? {
            refs.prefix_ids.push(id);
        }
    }

    Ok(refs)
}

/// Assert junction rows for all multi-valued references. The thread row
/// must already exist. Returns the number of rows inserted.
pub fn associate_all(conn: &Connection, thread_id: i64, refs: &ResolvedRefs) -> Result<usize> {
    let groups = [
        (Association::Tag, &refs.tag_ids),
        (Association::Link, &refs.link_ids),
        (Association::Image, &refs.image_ids),
        (Association::Prefix, &refs.prefix_ids),
    ];

    let mut inserted = 0;
    for (kind, ids) in groups {
        for &id in ids {
            if associate(conn, kind, thread_id, id)? {
                inserted += 1;
            }
        }
    }
    Ok(inserted)
}
