//! Field extraction from archived thread snapshots
//!
//! Every field is looked up independently. A missing element or an
//! unparseable value leaves that one field `None` and never stops the
//! others; only a missing main content container ends extraction early.

use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use tracing::{debug, trace};

use crate::record::{ImageRef, ThreadRecord, UserRef};
use crate::segmenter::segment_body;

/// Links into the forum itself are navigation, not downloads
pub const INTERNAL_INDEX_PREFIX: &str = "https://f95zone.com/index.php";

// Genre codes kept upper-case instead of title-cased
static UPPERCASE_TAGS: Lazy<HashSet<&'static str>> =
    Lazy::new(|| ["2dcg", "3dcg", "bdsm", "ntr", "pov", "rpg"].into_iter().collect());

fn selector(css: &str) -> Selector {
    Selector::parse(css).unwrap()
}

static CANONICAL: Lazy<Selector> = Lazy::new(|| selector(r#"link[rel="canonical"]"#));
static HEAD_TITLE: Lazy<Selector> = Lazy::new(|| selector("head > title"));
static MAIN_CONTENT: Lazy<Selector> = Lazy::new(|| selector(r#"div[uix_component="MainContent"]"#));
static THREAD_HEADING: Lazy<Selector> = Lazy::new(|| selector(r#"h1[class="p-title-value"]"#));
static VOTE_TABS: Lazy<Selector> = Lazy::new(|| selector(r#"div[class="tabs tabs--standalone"]"#));
static PAGE_INPUT: Lazy<Selector> = Lazy::new(|| selector(r#"div[class="inputGroup inputGroup--numbers"]"#));
static USERNAME: Lazy<Selector> = Lazy::new(|| selector(r#"a[class^="username"]"#));
static TAG_GROUP: Lazy<Selector> = Lazy::new(|| selector(r#"li[class="groupedTags"]"#));
static RATING: Lazy<Selector> = Lazy::new(|| selector(r#"select[name="rating"]"#));
static POST_TIME: Lazy<Selector> = Lazy::new(|| selector(r#"time[class="u-dt"]"#));
static MESSAGE: Lazy<Selector> = Lazy::new(|| selector(r#"div[class="message-content js-messageContent"]"#));
static LAST_EDIT: Lazy<Selector> = Lazy::new(|| selector(r#"div[class^="message-lastEdit"] time"#));
static MESSAGE_BODY: Lazy<Selector> = Lazy::new(|| selector(r#"article[class="message-body js-selectToQuote"]"#));
static LIGHTBOX: Lazy<Selector> = Lazy::new(|| selector(r#"a[class="js-lbImage"]"#));
static DOWNLOAD_BLOCK: Lazy<Selector> = Lazy::new(|| selector(r#"span[style="font-size: 18px"]"#));
static EXTERNAL_LINK: Lazy<Selector> = Lazy::new(|| selector(r#"a[class="link link--external"]"#));
static DIV: Lazy<Selector> = Lazy::new(|| selector("div"));
static SPAN: Lazy<Selector> = Lazy::new(|| selector("span"));
static ANCHOR: Lazy<Selector> = Lazy::new(|| selector("a"));
static INPUT: Lazy<Selector> = Lazy::new(|| selector("input"));
static IMG: Lazy<Selector> = Lazy::new(|| selector("img"));

/// Why a single field came out empty. Never escapes this module.
#[derive(Debug)]
enum FieldError {
    /// Expected element or attribute is not in the document
    Missing(&'static str),
    /// Value is present but does not convert
    Unparseable { what: &'static str, value: String },
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldError::Missing(what) => write!(f, "{} missing", what),
            FieldError::Unparseable { what, value } => write!(f, "{} unparseable: {:?}", what, value),
        }
    }
}

type FieldResult<T> = std::result::Result<T, FieldError>;

/// Outcome of extracting one snapshot
#[derive(Debug, Clone)]
pub struct Extraction {
    pub record: ThreadRecord,
    /// No main content container was found; only canonical and title are set
    pub malformed: bool,
}

/// Extract a thread record from raw snapshot HTML.
pub fn extract_thread(thread_id: i64, html: &str) -> Extraction {
    let document = Html::parse_document(html);
    let mut record = ThreadRecord::new(thread_id);

    record.canonical = settle(thread_id, canonical(&document));
    record.title = settle(thread_id, head_title(&document));

    let main = match document.select(&MAIN_CONTENT).next() {
        Some(main) => main,
        None => {
            debug!("Thread {}: no main content container", thread_id);
            return Extraction { record, malformed: true };
        }
    };

    if let Some(heading) = settle(thread_id, heading_title(main)) {
        record.title = Some(heading);
    }
    record.votes = settle(thread_id, votes(main));
    record.pages = settle(thread_id, pages(main));
    record.user = user(&document);
    record.tags = tags(main);
    record.rating = settle(thread_id, rating(main));
    record.date = settle(thread_id, post_date(main));

    let message = main.select(&MESSAGE).next();
    record.edited = message
        .and_then(|m| settle(thread_id, edited(m)))
        .or(record.date);

    match message.and_then(|m| m.select(&MESSAGE_BODY).next()) {
        Some(body) => {
            let segments = segment_body(body);
            record.overview = segments.overview;
            record.developer = segments.developer;
            record.platform = segments.platform;
            record.censorship = segments.censorship;
            record.language = segments.language;

            record.images = images(body);
            record.links = links(body, &record.images);
        }
        None => debug!("Thread {}: no message body", thread_id),
    }

    Extraction { record, malformed: false }
}

/// Collapse a field result to an option, logging why it is empty.
fn settle<T>(thread_id: i64, result: FieldResult<T>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(e @ FieldError::Missing(_)) => {
            trace!("Thread {}: {}", thread_id, e);
            None
        }
        Err(e @ FieldError::Unparseable { .. }) => {
            debug!("Thread {}: {}", thread_id, e);
            None
        }
    }
}

fn attr<'a>(element: ElementRef<'a>, name: &'static str) -> FieldResult<&'a str> {
    element.value().attr(name).ok_or(FieldError::Missing(name))
}

fn parse<T: std::str::FromStr>(what: &'static str, value: &str) -> FieldResult<T> {
    value.trim().parse().map_err(|_| FieldError::Unparseable {
        what,
        value: value.to_string(),
    })
}

fn canonical(document: &Html) -> FieldResult<String> {
    let link = document.select(&CANONICAL).next().ok_or(FieldError::Missing("canonical link"))?;
    attr(link, "href").map(str::to_string)
}

fn head_title(document: &Html) -> FieldResult<String> {
    let title = document.select(&HEAD_TITLE).next().ok_or(FieldError::Missing("title"))?;
    Ok(title.text().collect::<String>().trim().to_string())
}

/// The heading's last child holds the bare title; prefix badges come first.
fn heading_title(main: ElementRef) -> FieldResult<String> {
    let heading = main.select(&THREAD_HEADING).next().ok_or(FieldError::Missing("thread heading"))?;
    let last = heading.children().last().ok_or(FieldError::Missing("thread heading text"))?;

    let text = match ElementRef::wrap(last) {
        Some(element) => element.text().collect::<String>(),
        None => last.value().as_text().map(|t| t.to_string()).unwrap_or_default(),
    };
    let text = text.trim();
    if text.is_empty() {
        return Err(FieldError::Missing("thread heading text"));
    }
    Ok(text.to_string())
}

/// Second anchor of the tab strip reads "Reviews (N)".
fn votes(main: ElementRef) -> FieldResult<i64> {
    let tabs = main.select(&VOTE_TABS).next().ok_or(FieldError::Missing("vote tabs"))?;
    let anchor = tabs
        .select(&DIV)
        .next()
        .and_then(|div| div.select(&SPAN).next())
        .and_then(|span| span.select(&ANCHOR).nth(1))
        .ok_or(FieldError::Missing("vote anchor"))?;

    let text: String = anchor.text().collect();
    parse("votes", &char_slice(&text, 9, 1))
}

fn pages(main: ElementRef) -> FieldResult<i64> {
    let input = main
        .select(&PAGE_INPUT)
        .next()
        .and_then(|group| group.select(&DIV).next())
        .and_then(|div| div.select(&INPUT).next())
        .ok_or(FieldError::Missing("page input"))?;
    parse("pages", attr(input, "max")?)
}

fn user(document: &Html) -> UserRef {
    let Some(byline) = document.select(&USERNAME).next() else {
        return UserRef::default();
    };

    let name: String = byline.text().collect();
    UserRef {
        id: byline.value().attr("data-user-id").and_then(|v| v.trim().parse().ok()),
        name: Some(name.trim().to_string()).filter(|n| !n.is_empty()),
        url: byline.value().attr("href").map(str::to_string),
    }
}

fn tags(main: ElementRef) -> BTreeMap<String, String> {
    let mut tags = BTreeMap::new();
    let Some(group) = main.select(&TAG_GROUP).next() else {
        return tags;
    };

    for anchor in group.select(&ANCHOR) {
        let Some(href) = anchor.value().attr("href") else {
            continue;
        };
        let name = tag_display_name(&anchor.text().collect::<String>());
        if !name.is_empty() {
            tags.insert(name, href.to_string());
        }
    }
    tags
}

fn rating(main: ElementRef) -> FieldResult<f64> {
    let select = main.select(&RATING).next().ok_or(FieldError::Missing("rating control"))?;
    parse("rating", attr(select, "data-initial-rating")?)
}

fn post_date(main: ElementRef) -> FieldResult<i64> {
    let time = main.select(&POST_TIME).next().ok_or(FieldError::Missing("post time"))?;
    parse("date", attr(time, "data-time")?)
}

fn edited(message: ElementRef) -> FieldResult<i64> {
    let time = message.select(&LAST_EDIT).next().ok_or(FieldError::Missing("last edit"))?;
    parse("edited", attr(time, "data-time")?)
}

fn images(body: ElementRef) -> Vec<ImageRef> {
    body.select(&LIGHTBOX)
        .filter_map(|anchor| {
            let href = anchor.value().attr("href")?;
            Some(ImageRef {
                name: anchor
                    .select(&IMG)
                    .next()
                    .and_then(|img| img.value().attr("alt"))
                    .map(str::to_string),
                url: full_size_url(href),
            })
        })
        .collect()
}

/// Download links, minus images and forum-internal index links.
fn links(body: ElementRef, images: &[ImageRef]) -> Vec<String> {
    let image_urls: HashSet<&str> = images.iter().map(|i| i.url.as_str()).collect();

    let anchors: Vec<ElementRef> = match body.select(&DOWNLOAD_BLOCK).next() {
        Some(block) => block.select(&ANCHOR).collect(),
        None => body.select(&EXTERNAL_LINK).collect(),
    };

    let mut links: Vec<String> = Vec::new();
    for href in anchors.iter().filter_map(|a| a.value().attr("href")) {
        if image_urls.contains(href) || href.starts_with(INTERNAL_INDEX_PREFIX) {
            continue;
        }
        if !links.iter().any(|l| l == href) {
            links.push(href.to_string());
        }
    }
    links
}

/// Lightbox hrefs may point at the thumbnail; drop the segment for the original.
pub fn full_size_url(url: &str) -> String {
    url.replace("/thumb/", "/")
}

/// Title-case a tag, except short genre codes which are upper-cased.
pub fn tag_display_name(raw: &str) -> String {
    let raw = raw.trim();
    if UPPERCASE_TAGS.contains(raw.to_lowercase().as_str()) {
        return raw.to_uppercase();
    }

    let mut out = String::with_capacity(raw.len());
    let mut prev_alpha = false;
    for c in raw.chars() {
        if c.is_alphabetic() {
            if prev_alpha {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            prev_alpha = true;
        } else {
            out.push(c);
            prev_alpha = false;
        }
    }
    out
}

/// Drop `skip` leading and `drop_end` trailing characters.
fn char_slice(text: &str, skip: usize, drop_end: usize) -> String {
    let count = text.chars().count();
    text.chars()
        .skip(skip)
        .take(count.saturating_sub(skip + drop_end))
        .collect()
}
