//! Metadata feed: authoritative per-thread values from the forum's listing API
//!
//! Feed pages are JSON files shaped like the listing endpoint's response:
//! `{"msg": {"data": [ {thread_id, title, developer, ...}, ... ]}}`.

use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use tokio::fs;
use tracing::{debug, info};

use crate::error::{ImportError, Result};
use crate::record::ThreadRecord;

#[derive(Debug, Deserialize)]
struct FeedPage {
    msg: FeedMessage,
}

#[derive(Debug, Deserialize)]
struct FeedMessage {
    #[serde(default)]
    data: Vec<MetadataRecord>,
}

/// One thread's entry in the feed
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MetadataRecord {
    pub thread_id: i64,
    pub title: Option<String>,
    pub developer: Option<String>,
    pub version: Option<String>,
    pub views: Option<i64>,
    pub likes: Option<i64>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub prefixes: Vec<Value>,
    pub rating: Option<f64>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub images: FeedImages,
}

/// The listing API sends `null` for empty lists and objects.
fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FeedImages {
    pub cover: Option<String>,
}

impl MetadataRecord {
    /// Overlay the feed's values onto an extracted record.
    ///
    /// Only the fields the feed is authoritative for are touched, and only
    /// when the feed actually carries a value.
    pub fn apply(&self, record: &mut ThreadRecord) {
        if let Some(title) = &self.title {
            record.title = Some(title.clone());
        }
        if let Some(developer) = &self.developer {
            record.developer = Some(developer.clone());
        }
        if let Some(version) = &self.version {
            record.version = Some(version.clone());
        }
        if self.views.is_some() {
            record.views = self.views;
        }
        if self.likes.is_some() {
            record.likes = self.likes;
        }
        if self.rating.is_some() {
            record.rating = self.rating;
        }
        if let Some(cover) = &self.images.cover {
            record.image_cover = Some(cover.clone());
        }
        let prefixes = self.prefix_names();
        if !prefixes.is_empty() {
            record.prefixes = prefixes;
        }
    }

    /// Prefixes as stored names; the listing API sends numeric ids.
    pub fn prefix_names(&self) -> Vec<String> {
        self.prefixes
            .iter()
            .filter_map(|v| match v {
                Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
            .collect()
    }
}

/// All feed records, keyed by thread id
#[derive(Debug, Default)]
pub struct MetadataFeed {
    records: HashMap<i64, MetadataRecord>,
}

impl MetadataFeed {
    /// Load every `*.json` page in a directory. Later pages win on duplicates.
    pub async fn load_dir<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let mut paths = Vec::new();
        let mut entries = fs::read_dir(dir.as_ref()).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().map_or(false, |ext| ext == "json") {
                paths.push(path);
            }
        }
        paths.sort();

        let mut feed = MetadataFeed::default();
        for path in &paths {
            let content = fs::read_to_string(path).await?;
            let added = feed.add_page(&content).map_err(|source| ImportError::Feed {
                path: path.clone(),
                source,
            })?;
            debug!("Loaded {} feed records from {:?}", added, path);
        }

        info!("Metadata feed: {} threads from {} pages", feed.len(), paths.len());
        Ok(feed)
    }

    /// Parse one feed page and merge its records. Returns the record count.
    pub fn add_page(&mut self, json: &str) -> std::result::Result<usize, serde_json::Error> {
        let page: FeedPage = serde_json::from_str(json)?;
        let count = page.msg.data.len();
        for record in page.msg.data {
            self.records.insert(record.thread_id, record);
        }
        Ok(count)
    }

    pub fn insert(&mut self, record: MetadataRecord) {
        self.records.insert(record.thread_id, record);
    }

    pub fn get(&self, thread_id: i64) -> Option<&MetadataRecord> {
        self.records.get(&thread_id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"{
        "status": "ok",
        "msg": {
            "data": [
                {
                    "thread_id": 1234,
                    "title": "Moonlit Harbor",
                    "creator": "harbormaster",
                    "developer": "Tidewater Games",
                    "version": "0.5",
                    "views": 5000,
                    "likes": 80,
                    "prefixes": [7, "Ren'Py"],
                    "tags": [1, 2],
                    "rating": 4.2,
                    "images": {"cover": "https://attachments.f95zone.com/cover.jpg", "screens": []}
                },
                {"thread_id": 99}
            ]
        }
    }"#;

    #[test]
    fn test_parse_page() {
        let mut feed = MetadataFeed::default();
        assert_eq!(feed.add_page(PAGE).unwrap(), 2);
        assert_eq!(feed.len(), 2);

        let record = feed.get(1234).unwrap();
        assert_eq!(record.developer.as_deref(), Some("Tidewater Games"));
        assert_eq!(record.prefix_names(), vec!["7".to_string(), "Ren'Py".to_string()]);

        let bare = feed.get(99).unwrap();
        assert_eq!(bare.title, None);
        assert_eq!(bare.images.cover, None);
    }

    #[test]
    fn test_apply_overrides_authoritative_fields() {
        let mut feed = MetadataFeed::default();
        feed.add_page(PAGE).unwrap();

        let mut record = ThreadRecord::new(1234);
        record.title = Some("Moonlit Harbor [v0.4] | Forum".to_string());
        record.developer = Some("tidewater".to_string());
        record.rating = Some(4.5);
        record.overview = Some("Kept as extracted".to_string());

        feed.get(1234).unwrap().apply(&mut record);
        assert_eq!(record.title.as_deref(), Some("Moonlit Harbor"));
        assert_eq!(record.developer.as_deref(), Some("Tidewater Games"));
        assert_eq!(record.rating, Some(4.2));
        assert_eq!(record.views, Some(5000));
        assert_eq!(record.likes, Some(80));
        assert_eq!(record.version.as_deref(), Some("0.5"));
        assert_eq!(
            record.image_cover.as_deref(),
            Some("https://attachments.f95zone.com/cover.jpg")
        );
        assert_eq!(record.overview.as_deref(), Some("Kept as extracted"));
    }

    #[test]
    fn test_apply_keeps_extracted_when_feed_is_silent() {
        let mut feed = MetadataFeed::default();
        feed.add_page(PAGE).unwrap();

        let mut record = ThreadRecord::new(99);
        record.title = Some("From the page".to_string());
        record.rating = Some(3.5);
        feed.get(99).unwrap().apply(&mut record);

        assert_eq!(record.title.as_deref(), Some("From the page"));
        assert_eq!(record.rating, Some(3.5));
        assert!(record.prefixes.is_empty());
    }

    #[test]
    fn test_null_lists_do_not_reject_page() {
        let page = r#"{"msg": {"data": [
            {"thread_id": 1, "title": "Kept", "prefixes": [3]},
            {"thread_id": 2, "prefixes": null, "images": null},
            {"thread_id": 3, "images": {"cover": null}}
        ]}}"#;

        let mut feed = MetadataFeed::default();
        assert_eq!(feed.add_page(page).unwrap(), 3);
        assert_eq!(feed.get(1).unwrap().prefix_names(), vec!["3".to_string()]);

        let nulls = feed.get(2).unwrap();
        assert!(nulls.prefixes.is_empty());
        assert_eq!(nulls.images.cover, None);
        assert_eq!(feed.get(3).unwrap().images.cover, None);
    }

    #[test]
    fn test_bad_page() {
        let mut feed = MetadataFeed::default();
        assert!(feed.add_page("{\"msg\": 3}").is_err());
        assert!(feed.is_empty());
    }
}
