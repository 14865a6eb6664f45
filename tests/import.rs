//! End-to-end runs over a snapshot directory and feed pages on disk

use std::fs;
use std::path::Path;
use tempfile::TempDir;

use thread_import::{snapshots, Database, Importer, MetadataFeed};

fn thread_page(thread_id: i64, title: &str, tags: &[&str]) -> String {
    let tag_links: String = tags
        .iter()
        .map(|t| format!(r#"<a href="/tags/{t}/">{t}</a>"#))
        .collect();

    format!(
        r#"<!DOCTYPE html>
<html><head>
<title>{title} | Forum</title>
<link rel="canonical" href="https://f95zone.com/threads/{thread_id}/">
</head><body>
<div uix_component="MainContent">
  <h1 class="p-title-value">{title}</h1>
  <div class="tabs tabs--standalone"><div><span>
    <a href="/threads/{thread_id}/">Information</a>
    <a href="/threads/{thread_id}/reviews">Reviews (3)</a>
  </span></div></div>
  <div class="inputGroup inputGroup--numbers"><div><input type="number" max="4"></div></div>
  <a class="username" data-user-id="991" href="/members/harbormaster.991/">harbormaster</a>
  <ul><li class="groupedTags">{tag_links}</li></ul>
  <select name="rating" data-initial-rating="4.0"></select>
  <time class="u-dt" data-time="1600000000"></time>
  <div class="message-content js-messageContent">
    <article class="message-body js-selectToQuote">
Overview:
A story told one lantern at a time along the coast.
Developer: Tidewater
Platform: Windows
<a class="js-lbImage" href="https://attachments.f95zone.com/thumb/{thread_id}.png"><img alt="{thread_id}.png"></a>
<span style="font-size: 18px"><a href="https://mega.nz/file/{thread_id}">MEGA</a></span>
    </article>
  </div>
</div>
</body></html>"#
    )
}

fn feed_page(entries: &[(i64, &str, i64)]) -> String {
    let data: Vec<String> = entries
        .iter()
        .map(|(id, version, views)| {
            format!(
                r#"{{"thread_id": {id}, "title": "Thread {id}", "developer": "Tidewater",
                    "version": "{version}", "views": {views}, "likes": 5,
                    "prefixes": [7], "rating": 4.1,
                    "images": {{"cover": "https://attachments.f95zone.com/cover-{id}.jpg"}}}}"#
            )
        })
        .collect();
    format!(r#"{{"status": "ok", "msg": {{"data": [{}]}}}}"#, data.join(","))
}

struct Workspace {
    _dir: TempDir,
    documents: std::path::PathBuf,
    feed: std::path::PathBuf,
}

fn workspace() -> Workspace {
    let dir = TempDir::new().unwrap();
    let documents = dir.path().join("snapshots");
    let feed = dir.path().join("feed");
    fs::create_dir_all(&documents).unwrap();
    fs::create_dir_all(&feed).unwrap();

    fs::write(documents.join("thread-1.html"), thread_page(1, "Lanterns", &["story", "bdsm"])).unwrap();
    fs::write(documents.join("thread-2.html"), thread_page(2, "Tides", &["Story"])).unwrap();
    fs::write(documents.join("thread-3.html"), thread_page(3, "Unlisted", &["story"])).unwrap();

    Workspace { _dir: dir, documents, feed }
}

fn write_feed(dir: &Path, entries: &[(i64, &str, i64)]) {
    fs::write(dir.join("page-1.json"), feed_page(entries)).unwrap();
}

async fn run(db: &mut Database, ws: &Workspace) -> thread_import::ImportStats {
    let feed = MetadataFeed::load_dir(&ws.feed).await.unwrap();
    let found = snapshots::discover(&ws.documents).unwrap();
    Importer::new(db, &feed).import_all(&found, None).await.unwrap()
}

fn open_db() -> Database {
    let db = Database::open_in_memory().unwrap();
    db.run_migrations().unwrap();
    db
}

#[tokio::test]
async fn test_import_is_idempotent() {
    let ws = workspace();
    write_feed(&ws.feed, &[(1, "0.1", 100), (2, "1.0", 200)]);
    let mut db = open_db();

    let first = run(&mut db, &ws).await;
    assert_eq!(first.total, 3);
    assert_eq!(first.created, 2);
    assert_eq!(first.skipped_unknown, 1);

    let counts_before = db.table_counts().unwrap();
    let stored_before = db.get_thread(1).unwrap().unwrap();

    let second = run(&mut db, &ws).await;
    assert_eq!(second.created, 0);
    assert_eq!(second.updated, 2);

    assert_eq!(db.table_counts().unwrap(), counts_before);
    assert_eq!(db.get_thread(1).unwrap().unwrap(), stored_before);
    assert!(db.get_thread(3).unwrap().is_none());
}

#[tokio::test]
async fn test_reimport_updates_only_mutable_fields() {
    let ws = workspace();
    write_feed(&ws.feed, &[(1, "0.1", 100)]);
    let mut db = open_db();
    run(&mut db, &ws).await;
    let before = db.get_thread(1).unwrap().unwrap();

    write_feed(&ws.feed, &[(1, "0.2", 150)]);
    run(&mut db, &ws).await;
    let after = db.get_thread(1).unwrap().unwrap();

    assert_eq!(after.version.as_deref(), Some("0.2"));
    assert_eq!(after.views, Some(150));
    assert_eq!(after.title, before.title);
    assert_eq!(after.overview, before.overview);
    assert_eq!(after.developer_id, before.developer_id);
    assert_eq!(after.image_cover, before.image_cover);
    assert_eq!(after.date, before.date);
}

#[tokio::test]
async fn test_entities_are_shared_across_threads() {
    let ws = workspace();
    write_feed(&ws.feed, &[(1, "0.1", 100), (2, "1.0", 200)]);
    let mut db = open_db();
    run(&mut db, &ws).await;

    // "story" and "Story" are one tag; "bdsm" is the other
    assert_eq!(db.count("tags").unwrap(), 2);
    assert_eq!(db.count("thread_tags").unwrap(), 3);
    assert_eq!(db.count("developers").unwrap(), 1);
    assert_eq!(db.count("users").unwrap(), 1);
    assert_eq!(db.count("prefixes").unwrap(), 1);
    assert_eq!(db.count("thread_prefixes").unwrap(), 2);

    let stored = db.get_thread(2).unwrap().unwrap();
    let developer = db.developer_name(stored.developer_id.unwrap()).unwrap();
    assert_eq!(developer.as_deref(), Some("Tidewater"));
    assert_eq!(stored.title.as_deref(), Some("Thread 2"));
}

#[tokio::test]
async fn test_max_documents_caps_the_run() {
    let ws = workspace();
    write_feed(&ws.feed, &[(1, "0.1", 100), (2, "1.0", 200)]);
    let mut db = open_db();

    let feed = MetadataFeed::load_dir(&ws.feed).await.unwrap();
    let found = snapshots::discover(&ws.documents).unwrap();
    let stats = Importer::new(&mut db, &feed).import_all(&found, Some(1)).await.unwrap();

    assert_eq!(stats.total, 1);
    assert_eq!(db.count("threads").unwrap(), 1);
}

#[tokio::test]
async fn test_file_backed_database() {
    let ws = workspace();
    write_feed(&ws.feed, &[(1, "0.1", 100)]);
    let db_dir = TempDir::new().unwrap();
    let path = db_dir.path().join("nested").join("threads.db");

    {
        let mut db = Database::new(&path).unwrap();
        db.run_migrations().unwrap();
        run(&mut db, &ws).await;
    }

    let db = Database::new(&path).unwrap();
    assert_eq!(db.count("threads").unwrap(), 1);
}
