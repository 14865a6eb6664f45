//! Free-text segmentation of the first post body
//!
//! Thread starters describe their game in prose with wildly inconsistent
//! conventions: labeled headers ("Overview:"), bare paragraphs, inline
//! "Developer: ..." markers. The segmenter is a deterministic line
//! classifier driven by one ordered label table, with a document walk as
//! the last resort for the overview.

use once_cell::sync::Lazy;
use scraper::{ElementRef, Selector};

/// Overviews shorter than this trigger the fallback scan
pub const MIN_OVERVIEW_LEN: usize = 10;

/// A continuation line must be longer than this to be captured
pub const CONTINUATION_MIN_LEN: usize = 5;

const DEVELOPER_MARKER: &str = "developer:";

static FALLBACK_MARKER: Lazy<Selector> = Lazy::new(|| Selector::parse("noscript").unwrap());

/// Subfield a label introduces
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Overview,
    Developer,
    Platform,
    Censorship,
    Language,
}

/// One row of the label table
#[derive(Debug, Clone, Copy)]
pub struct Label {
    /// Lower-case phrase matched against the start of a trimmed line
    pub phrase: &'static str,
    pub field: Field,
    /// The text after the label must be longer than this to count as content
    pub min_remainder: usize,
}

const fn overview(phrase: &'static str) -> Label {
    Label {
        phrase,
        field: Field::Overview,
        min_remainder: 1,
    }
}

const fn inline(phrase: &'static str, field: Field) -> Label {
    Label {
        phrase,
        field,
        min_remainder: 0,
    }
}

/// Ordered label table; the first matching row wins.
///
/// A phrase must never appear after a shorter phrase it starts with, or it
/// could never match.
pub static LABELS: &[Label] = &[
    overview("overview:"),
    overview("overiew:"),
    overview("- overview -"),
    overview("-about-"),
    overview("overview :"),
    overview("* game overview"),
    overview("<plot>"),
    overview("=about="),
    overview("about the game:"),
    overview("about this game collection:"),
    overview("about this game:"),
    overview("about the site:"),
    overview("about:"),
    overview("dev's intro:"),
    overview("description:"),
    overview("review:"),
    overview("welcome:"),
    overview("from the dev team:"),
    overview("game info:"),
    overview("game guide:"),
    overview("story overview:"),
    overview("synopsis:"),
    overview("=speechoice"),
    overview("synopsis"),
    overview("description"),
    overview("story gameplay"),
    overview("the story:"),
    overview("about this game"),
    overview("about the game"),
    overview("basic plot"),
    overview("plot:"),
    overview("plot"),
    overview("about"),
    overview("overview"),
    overview("story:"),
    overview("story -"),
    overview("story"),
    inline("developer:", Field::Developer),
    inline("platform:", Field::Platform),
    inline("censorship:", Field::Censorship),
    inline("language:", Field::Language),
];

/// Subfields recovered from a post body
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Segments {
    pub overview: Option<String>,
    pub developer: Option<String>,
    pub platform: Option<String>,
    pub censorship: Option<String>,
    pub language: Option<String>,
}

impl Segments {
    fn set(&mut self, field: Field, value: &str) {
        let value = value.trim();
        if value.is_empty() {
            return;
        }
        let slot = match field {
            Field::Overview => &mut self.overview,
            Field::Developer => &mut self.developer,
            Field::Platform => &mut self.platform,
            Field::Censorship => &mut self.censorship,
            Field::Language => &mut self.language,
        };
        *slot = Some(value.to_string());
    }

    /// Take `text` as the overview, splitting off an inline developer marker
    fn capture_overview(&mut self, text: &str) {
        match find_ignore_ascii_case(text, DEVELOPER_MARKER) {
            Some(pos) => {
                self.set(Field::Overview, &text[..pos]);
                self.set(Field::Developer, &text[pos + DEVELOPER_MARKER.len()..]);
            }
            None => self.set(Field::Overview, text),
        }
    }

    fn needs_fallback(&self) -> bool {
        self.overview
            .as_deref()
            .map_or(true, |o| o.trim().chars().count() < MIN_OVERVIEW_LEN)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Scanning,
    ExpectContinuation,
    Captured,
}

/// Classify the lines of a prose block.
pub fn segment_text(text: &str) -> Segments {
    let mut segments = Segments::default();
    let mut state = State::Scanning;

    for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
        match state {
            State::Scanning => {
                if let Some((label, rest)) = match_label(line, |f| f == Field::Overview) {
                    if rest.chars().count() > label.min_remainder {
                        segments.capture_overview(rest);
                        state = State::Captured;
                    } else {
                        state = State::ExpectContinuation;
                    }
                    continue;
                }
            }
            State::ExpectContinuation => {
                let is_field_line = match_label(line, |f| f != Field::Overview).is_some();
                if !is_field_line && line.chars().count() > CONTINUATION_MIN_LEN {
                    segments.capture_overview(line);
                    state = State::Captured;
                    continue;
                }
            }
            State::Captured => {}
        }

        if let Some((label, rest)) = match_label(line, |f| f != Field::Overview) {
            segments.set(label.field, rest);
        }
    }

    segments
}

/// Segment a post body element, falling back to the document walk when no
/// usable overview was labeled.
pub fn segment_body(body: ElementRef) -> Segments {
    let text: String = body.text().collect();
    let mut segments = segment_text(&text);

    if segments.needs_fallback() {
        if let Some(found) = fallback_overview(body) {
            segments.overview = Some(found);
        }
    }

    segments
}

/// First non-empty text run after the fallback marker, in document order.
///
/// The marker's own subtree is skipped; the walk may leave `body`.
pub fn fallback_overview(body: ElementRef) -> Option<String> {
    let marker = body.select(&FALLBACK_MARKER).next()?;
    let marker_id = marker.id();

    marker
        .tree()
        .root()
        .descendants()
        .skip_while(|node| node.id() != marker_id)
        .skip(1)
        .filter(|node| !node.ancestors().any(|a| a.id() == marker_id))
        .filter_map(|node| node.value().as_text().map(|t| t.trim().to_string()))
        .find(|t| !t.is_empty())
}

/// First label in table order whose phrase starts `line`, with the
/// remainder after the label and its separator punctuation.
fn match_label(line: &str, accept: impl Fn(Field) -> bool) -> Option<(&'static Label, &str)> {
    LABELS
        .iter()
        .filter(|label| accept(label.field))
        .find_map(|label| {
            let head = line.get(..label.phrase.len())?;
            if !head.eq_ignore_ascii_case(label.phrase) {
                return None;
            }
            let rest = line[label.phrase.len()..]
                .trim_start_matches(|c: char| c.is_whitespace() || matches!(c, ':' | '-' | '=' | '*' | '>'))
                .trim_end();
            Some((label, rest))
        })
}

/// Byte offset of an ASCII `needle` in `haystack`, ignoring ASCII case
fn find_ignore_ascii_case(haystack: &str, needle: &str) -> Option<usize> {
    haystack
        .as_bytes()
        .windows(needle.len())
        .position(|w| w.eq_ignore_ascii_case(needle.as_bytes()))
}
