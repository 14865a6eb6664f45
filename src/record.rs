//! Candidate thread record assembled from a snapshot and the metadata feed

use std::collections::BTreeMap;

/// Byline of the thread starter
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UserRef {
    pub id: Option<i64>,
    pub name: Option<String>,
    pub url: Option<String>,
}

/// One lightbox image from the post body
#[derive(Debug, Clone, PartialEq)]
pub struct ImageRef {
    pub name: Option<String>,
    pub url: String,
}

/// Everything one import knows about a thread.
///
/// Each extraction step fills its own slots only; absent or unparseable
/// values stay `None`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ThreadRecord {
    pub thread_id: i64,
    pub canonical: Option<String>,
    pub title: Option<String>,
    pub user: UserRef,
    pub rating: Option<f64>,
    pub date: Option<i64>,
    pub edited: Option<i64>,
    pub pages: Option<i64>,
    pub votes: Option<i64>,

    // Recovered from the post body by the segmenter
    pub overview: Option<String>,
    pub developer: Option<String>,
    pub platform: Option<String>,
    pub censorship: Option<String>,
    pub language: Option<String>,

    /// Tag display name -> tag url
    pub tags: BTreeMap<String, String>,
    pub images: Vec<ImageRef>,
    pub links: Vec<String>,

    // Supplied by the metadata feed only
    pub version: Option<String>,
    pub views: Option<i64>,
    pub likes: Option<i64>,
    pub prefixes: Vec<String>,
    pub image_cover: Option<String>,
}

impl ThreadRecord {
    pub fn new(thread_id: i64) -> Self {
        Self {
            thread_id,
            ..Default::default()
        }
    }

    /// Denormalized prefix column value
    pub fn prefix_text(&self) -> Option<String> {
        if self.prefixes.is_empty() {
            None
        } else {
            Some(self.prefixes.join(","))
        }
    }
}
