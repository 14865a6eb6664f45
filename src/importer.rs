//! Import driver: snapshot + feed record -> one thread transaction

use tracing::{debug, info, warn};

use crate::db::Database;
use crate::error::{ImportError, Result};
use crate::extractor::extract_thread;
use crate::feed::MetadataFeed;
use crate::merger::MergeOutcome;
use crate::snapshots::Snapshot;

/// Run statistics
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ImportStats {
    pub total: usize,
    pub created: usize,
    pub updated: usize,
    pub skipped_unknown: usize,
    pub skipped_malformed: usize,
    pub failed: usize,
}

impl ImportStats {
    fn record(&mut self, result: &Result<MergeOutcome>) {
        self.total += 1;
        match result {
            Ok(MergeOutcome::Created) => self.created += 1,
            Ok(MergeOutcome::Updated) => self.updated += 1,
            Err(ImportError::UnknownDocument(_)) => self.skipped_unknown += 1,
            Err(ImportError::MalformedDocument(_)) => self.skipped_malformed += 1,
            Err(_) => self.failed += 1,
        }
    }
}

/// Imports documents one at a time against a single database handle
pub struct Importer<'a> {
    db: &'a mut Database,
    feed: &'a MetadataFeed,
    skip_malformed: bool,
}

impl<'a> Importer<'a> {
    pub fn new(db: &'a mut Database, feed: &'a MetadataFeed) -> Self {
        Self {
            db,
            feed,
            skip_malformed: true,
        }
    }

    /// Persist malformed documents (canonical, title and feed values only) instead of skipping them
    pub fn skip_malformed(mut self, skip: bool) -> Self {
        self.skip_malformed = skip;
        self
    }

    /// Import one document's HTML
    pub fn import_document(&mut self, thread_id: i64, html: &str) -> Result<MergeOutcome> {
        let metadata = self
            .feed
            .get(thread_id)
            .ok_or(ImportError::UnknownDocument(thread_id))?;

        let extraction = extract_thread(thread_id, html);
        if extraction.malformed && self.skip_malformed {
            return Err(ImportError::MalformedDocument(thread_id));
        }

        let mut record = extraction.record;
        metadata.apply(&mut record);

        self.db.import_thread(&record)
    }

    /// Read and import one snapshot
    pub async fn import_snapshot(&mut self, snapshot: &Snapshot) -> Result<MergeOutcome> {
        // Skip the read entirely when the feed has nothing for this thread
        if self.feed.get(snapshot.thread_id).is_none() {
            return Err(ImportError::UnknownDocument(snapshot.thread_id));
        }
        let html = snapshot.read().await?;
        self.import_document(snapshot.thread_id, &html)
    }

    /// Import snapshots in order, up to `max` of them.
    ///
    /// Per-document failures are logged and counted; a fatal store error
    /// stops the run.
    pub async fn import_all(&mut self, snapshots: &[Snapshot], max: Option<usize>) -> Result<ImportStats> {
        let mut stats = ImportStats::default();
        let limit = max.unwrap_or(snapshots.len()).min(snapshots.len());

        info!("Importing {} of {} snapshots", limit, snapshots.len());

        for snapshot in &snapshots[..limit] {
            match self.import_snapshot(snapshot).await {
                Err(e) if e.is_fatal() => {
                    warn!("Aborting run at {:?}: {} (so far: {:?})", snapshot.path, e, stats);
                    return Err(e);
                }
                result => {
                    match &result {
                        Ok(outcome) => debug!("Thread {}: {:?}", snapshot.thread_id, outcome),
                        Err(e) => warn!("Skipping {:?}: {}", snapshot.path, e),
                    }
                    stats.record(&result);
                }
            }

            if stats.total % 100 == 0 {
                info!(
                    "Progress: {} processed, {} created, {} updated",
                    stats.total, stats.created, stats.updated
                );
            }
        }

        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::MetadataRecord;

    const DOC: &str = r#"
<html><head><title>Moonlit Harbor | Forum</title>
<link rel="canonical" href="https://f95zone.com/threads/moonlit-harbor.1234/"></head>
<body><div uix_component="MainContent">
  <div class="message-content js-messageContent">
    <article class="message-body js-selectToQuote">
Overview:
A quiet fishing town hides a secret beneath the waves.
Developer: Tidewater Games
Language: English
    </article>
  </div>
</div></body></html>
"#;

    fn setup() -> (Database, MetadataFeed) {
        let db = Database::open_in_memory().unwrap();
        db.run_migrations().unwrap();
        let mut feed = MetadataFeed::default();
        feed.insert(MetadataRecord {
            thread_id: 1234,
            title: Some("Moonlit Harbor".to_string()),
            views: Some(10),
            ..Default::default()
        });
        (db, feed)
    }

    #[test]
    fn test_unknown_document_is_skipped() {
        let (mut db, feed) = setup();
        let mut importer = Importer::new(&mut db, &feed);

        let err = importer.import_document(999, DOC).unwrap_err();
        assert!(matches!(err, ImportError::UnknownDocument(999)));
        assert_eq!(db.count("threads").unwrap(), 0);
    }

    #[test]
    fn test_malformed_document_policy() {
        let (mut db, feed) = setup();
        let html = "<html><head><title>Gone</title></head><body><p>Removed</p></body></html>";

        {
            let mut importer = Importer::new(&mut db, &feed);
            let err = importer.import_document(1234, html).unwrap_err();
            assert!(matches!(err, ImportError::MalformedDocument(1234)));
        }
        assert_eq!(db.count("threads").unwrap(), 0);

        {
            let mut importer = Importer::new(&mut db, &feed).skip_malformed(false);
            assert_eq!(importer.import_document(1234, html).unwrap(), MergeOutcome::Created);
        }
        let stored = db.get_thread(1234).unwrap().unwrap();
        assert_eq!(stored.title.as_deref(), Some("Moonlit Harbor"));
        assert_eq!(stored.overview, None);
    }

    #[test]
    fn test_feed_values_win() {
        let (mut db, feed) = setup();
        let mut importer = Importer::new(&mut db, &feed);
        assert_eq!(importer.import_document(1234, DOC).unwrap(), MergeOutcome::Created);
        assert_eq!(importer.import_document(1234, DOC).unwrap(), MergeOutcome::Updated);

        let stored = db.get_thread(1234).unwrap().unwrap();
        assert_eq!(stored.title.as_deref(), Some("Moonlit Harbor"));
        assert_eq!(stored.views, Some(10));
        assert_eq!(db.count("threads").unwrap(), 1);
    }

    #[tokio::test]
    async fn test_store_failure_stops_the_run() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut db = Database::new(dir.path().join("threads.db")).unwrap();
        db.run_migrations().unwrap();
        db.connection().execute_batch("PRAGMA query_only=ON;").unwrap();

        let (_, mut feed) = setup();
        feed.insert(MetadataRecord {
            thread_id: 1235,
            ..Default::default()
        });

        let mut snapshots = Vec::new();
        for id in [1234, 1235] {
            let path = dir.path().join(format!("thread-{}.html", id));
            std::fs::write(&path, DOC).unwrap();
            snapshots.push(Snapshot::from_path(&path).unwrap());
        }

        let err = Importer::new(&mut db, &feed)
            .import_all(&snapshots, None)
            .await
            .unwrap_err();
        assert!(err.is_fatal(), "{}", err);
        assert_eq!(db.count("threads").unwrap(), 0);
    }

    #[test]
    fn test_stats_tally() {
        let mut stats = ImportStats::default();
        stats.record(&Ok(MergeOutcome::Created));
        stats.record(&Ok(MergeOutcome::Updated));
        stats.record(&Err(ImportError::UnknownDocument(1)));
        stats.record(&Err(ImportError::MalformedDocument(2)));
        stats.record(&Err(ImportError::Store(rusqlite::Error::QueryReturnedNoRows)));

        assert_eq!(
            stats,
            ImportStats {
                total: 5,
                created: 1,
                updated: 1,
                skipped_unknown: 1,
                skipped_malformed: 1,
                failed: 1,
            }
        );
    }
}
