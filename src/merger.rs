//! Create-or-refresh of the thread row
//!
//! A thread is written in full once. Later imports refresh only the volatile
//! counters (edited, views, votes, likes, pages, version, rating); everything
//! parsed from the body and the identity fields stay as first captured.

use rusqlite::{params, Connection, OptionalExtension};

use crate::error::Result;
use crate::record::ThreadRecord;
use crate::resolver::ResolvedRefs;

/// Which transition the thread row went through
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// Absent -> created with every field
    Created,
    /// Present -> mutable subset refreshed
    Updated,
}

/// Insert the thread row, or refresh its mutable subset if it exists.
pub fn merge_thread(conn: &Connection, record: &ThreadRecord, refs: &ResolvedRefs) -> Result<MergeOutcome> {
    let existing: Option<i64> = conn
        .query_row(
            "SELECT id FROM threads WHERE id = ?1",
            params![record.thread_id],
            |row| row.get(0),
        )
        .optional()?;

    if existing.is_some() {
        conn.execute(
            r#"
            UPDATE threads SET
                edited = ?2,
                views = ?3,
                votes = ?4,
                likes = ?5,
                pages = ?6,
                version = ?7,
                rating = ?8
            WHERE id = ?1
            "#,
            params![
                record.thread_id,
                record.edited,
                record.views,
                record.votes,
                record.likes,
                record.pages,
                record.version,
                record.rating,
            ],
        )?;
        return Ok(MergeOutcome::Updated);
    }

    conn.execute(
        r#"
        INSERT INTO threads (
            id, canonical, title, user_id, rating, date, edited, overview,
            developer_id, platform_id, censorship, language_id,
            version, views, likes, votes, prefixes, pages, image_cover
        ) VALUES (
            ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8,
            ?9, ?10, ?11, ?12,
            ?13, ?14, ?15, ?16, ?17, ?18, ?19
        )
        "#,
        params![
            record.thread_id,
            record.canonical,
            record.title,
            refs.user_id,
            record.rating,
            record.date,
            record.edited,
            record.overview,
            refs.developer_id,
            refs.platform_id,
            record.censorship,
            refs.language_id,
            record.version,
            record.views,
            record.likes,
            record.votes,
            record.prefix_text(),
            record.pages,
            record.image_cover,
        ],
    )?;

    Ok(MergeOutcome::Created)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    fn open() -> Database {
        let db = Database::open_in_memory().unwrap();
        db.run_migrations().unwrap();
        db
    }

    #[test]
    fn test_absent_then_present() {
        let db = open();
        let conn = db.connection();
        let mut record = ThreadRecord::new(10);
        record.title = Some("First".to_string());
        record.views = Some(1);

        assert_eq!(
            merge_thread(conn, &record, &ResolvedRefs::default()).unwrap(),
            MergeOutcome::Created
        );

        record.title = Some("Second".to_string());
        record.views = Some(2);
        assert_eq!(
            merge_thread(conn, &record, &ResolvedRefs::default()).unwrap(),
            MergeOutcome::Updated
        );

        let stored = db.get_thread(10).unwrap().unwrap();
        assert_eq!(stored.title.as_deref(), Some("First"));
        assert_eq!(stored.views, Some(2));
    }

    #[test]
    fn test_update_keeps_references() {
        let db = open();
        let conn = db.connection();
        conn.execute("INSERT INTO platforms (id, name) VALUES (5, 'Windows')", []).unwrap();

        let record = ThreadRecord::new(11);
        let refs = ResolvedRefs {
            platform_id: Some(5),
            ..Default::default()
        };
        merge_thread(conn, &record, &refs).unwrap();
        merge_thread(conn, &record, &ResolvedRefs::default()).unwrap();

        assert_eq!(db.get_thread(11).unwrap().unwrap().platform_id, Some(5));
    }

    #[test]
    fn test_prefix_text_is_denormalized() {
        let db = open();
        let mut record = ThreadRecord::new(12);
        record.prefixes = vec!["Completed".to_string(), "Ren'Py".to_string()];
        merge_thread(db.connection(), &record, &ResolvedRefs::default()).unwrap();

        let stored = db.get_thread(12).unwrap().unwrap();
        assert_eq!(stored.prefixes.as_deref(), Some("Completed,Ren'Py"));
    }
}
