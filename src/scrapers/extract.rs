//! Pure field extractors over a parsed HTML page.
//!
//! Each field is derived by an ordered chain of small functions
//! `fn(&Page) -> Option<String>`. The chain is tried in order and the first
//! non-empty, well-formed result wins. Every function here is deterministic:
//! the same page always yields the same fields.
//!
//! # Thumbnail chain
//!
//! | Step | Source |
//! |------|--------|
//! | `open_graph` | `og:image`, `og:image:secure_url`, `og:image:url` |
//! | `twitter_card` | `twitter:image`, `twitter:image:src` |
//! | `json_ld` | `image` / `thumbnailUrl` of JSON-LD nodes (incl. `@graph`) |
//! | `meta_hint` | `itemprop=image`, `parsely-image`, `<link rel="image_src">` |
//! | `lead_image` | publisher lead image (`EagerImage`, `figure img`) |
//! | `content_image` | first meaningful `<img>` in `article`/`main`/page |

use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use serde_json::Value;
use std::collections::{HashMap, HashSet, VecDeque};

use crate::utils::{absolutize, collapse_whitespace, truncate_chars};

/// Elements whose text is never article body.
const BOILERPLATE: &[&str] = &[
    "script", "style", "noscript", "iframe", "svg", "footer", "header", "nav", "aside", "form",
];

/// Class/id fragments that suggest an article body container.
const CONTAINER_HINTS: &[&str] = &[
    "article", "content", "story", "post", "entry", "body", "read", "main", "text",
];

/// Image attributes checked in order, covering common lazy-loading schemes.
const IMG_ATTRS: &[&str] = &[
    "src",
    "data-src",
    "data-original",
    "data-lazy-src",
    "data-image",
    "data-thumb",
];

/// URL fragments of tracking pixels and spacers.
const PIXEL_MARKERS: &[&str] = &["/pixel", "1x1", "spacer.gif"];

/// JSON-LD types whose `image` is an avatar or a logo.
const NON_CONTENT_TYPES: &[&str] = &["person", "organization", "newsmediaorganization", "website"];

/// Paragraphs shorter than this are navigation crumbs, captions, or bylines.
const MIN_PARAGRAPH_CHARS: usize = 40;

/// Meta descriptions with fewer words than this are treated as absent.
const MIN_DESCRIPTION_WORDS: usize = 8;

/// Hard cap on synthesized summaries.
const SUMMARY_MAX_CHARS: usize = 2000;

fn sel(s: &str) -> Selector {
    Selector::parse(s).unwrap()
}

fn sels(list: &[&str]) -> Vec<Selector> {
    list.iter().map(|s| sel(s)).collect()
}

static OG_IMAGE: Lazy<Vec<Selector>> = Lazy::new(|| {
    sels(&[
        r#"meta[property="og:image"]"#,
        r#"meta[property="og:image:secure_url"]"#,
        r#"meta[property="og:image:url"]"#,
        r#"meta[name="og:image"]"#,
    ])
});
static TWITTER_IMAGE: Lazy<Vec<Selector>> = Lazy::new(|| {
    sels(&[
        r#"meta[name="twitter:image"]"#,
        r#"meta[name="twitter:image:src"]"#,
        r#"meta[property="twitter:image"]"#,
    ])
});
static HINT_IMAGE: Lazy<Vec<Selector>> =
    Lazy::new(|| sels(&[r#"meta[itemprop="image"]"#, r#"meta[name="parsely-image"]"#]));
static LINK_IMAGE_SRC: Lazy<Selector> = Lazy::new(|| sel(r#"link[rel~="image_src"]"#));
static LEAD_IMAGE: Lazy<Vec<Selector>> = Lazy::new(|| {
    sels(&[
        r#"img[data-testid="EagerImage"]"#,
        r#"[data-testid="EagerImageContainer"] img"#,
        "main figure img",
        "article figure img",
    ])
});
static DESCRIPTION: Lazy<Vec<Selector>> = Lazy::new(|| {
    sels(&[
        r#"meta[property="og:description"]"#,
        r#"meta[name="description"]"#,
        r#"meta[name="twitter:description"]"#,
    ])
});
static TITLE_META: Lazy<Vec<Selector>> = Lazy::new(|| {
    sels(&[
        r#"meta[property="og:title"]"#,
        r#"meta[name="twitter:title"]"#,
    ])
});
static PUBLISHED_META: Lazy<Vec<Selector>> = Lazy::new(|| {
    sels(&[
        r#"meta[property="article:published_time"]"#,
        r#"meta[property="og:pubdate"]"#,
        r#"meta[name="publish_date"]"#,
        r#"meta[name="date"]"#,
        r#"meta[itemprop="datePublished"]"#,
    ])
});
static JSON_LD: Lazy<Selector> = Lazy::new(|| sel(r#"script[type="application/ld+json"]"#));
static TITLE: Lazy<Selector> = Lazy::new(|| sel("title"));
static H1: Lazy<Selector> = Lazy::new(|| sel("h1"));
static TIME_DATETIME: Lazy<Selector> = Lazy::new(|| sel("time[datetime]"));
static ARTICLE: Lazy<Selector> = Lazy::new(|| sel("article"));
static MAIN: Lazy<Selector> = Lazy::new(|| sel(r#"[role="main"], main"#));
static ANY: Lazy<Selector> = Lazy::new(|| sel("*"));
static PARAGRAPH: Lazy<Selector> = Lazy::new(|| sel("p"));
static IMG: Lazy<Selector> = Lazy::new(|| sel("img"));

/// A parsed HTML document plus the URL relative links resolve against.
pub struct Page {
    document: Html,
    base_url: String,
}

impl Page {
    pub fn parse(html: &str, base_url: &str) -> Self {
        Self {
            document: Html::parse_document(html),
            base_url: base_url.to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// First non-empty `content` attribute among the selectors, in order.
    fn meta_content(&self, selectors: &[Selector]) -> Option<String> {
        selectors.iter().find_map(|s| {
            self.document
                .select(s)
                .filter_map(|el| el.value().attr("content"))
                .map(collapse_whitespace)
                .find(|c| !c.is_empty())
        })
    }

    /// First `content` among the selectors that resolves to an absolute URL.
    fn meta_url(&self, selectors: &[Selector]) -> Option<String> {
        selectors.iter().find_map(|s| {
            self.document
                .select(s)
                .filter_map(|el| el.value().attr("content"))
                .find_map(|c| absolutize(c, &self.base_url))
        })
    }
}

/// One step of a fallback chain.
pub type FieldExtractor = fn(&Page) -> Option<String>;

/// Ordered thumbnail chain; see the module docs.
pub const THUMBNAIL_CHAIN: &[(&str, FieldExtractor)] = &[
    ("open_graph", open_graph_image),
    ("twitter_card", twitter_card_image),
    ("json_ld", json_ld_image),
    ("meta_hint", meta_hint_image),
    ("lead_image", lead_image),
    ("content_image", first_content_image),
];

/// Ordered title chain.
pub const TITLE_CHAIN: &[(&str, FieldExtractor)] = &[
    ("meta", meta_title),
    ("json_ld", json_ld_headline),
    ("title_tag", title_tag),
    ("h1", first_heading),
];

/// Ordered publication-time chain.
pub const PUBLISHED_CHAIN: &[(&str, FieldExtractor)] = &[
    ("meta", meta_published),
    ("json_ld", json_ld_published),
    ("time_tag", time_tag_published),
];

/// Run a chain and return the name of the step that matched with its value.
pub fn first_match(chain: &[(&'static str, FieldExtractor)], page: &Page) -> Option<(&'static str, String)> {
    chain
        .iter()
        .find_map(|(name, step)| step(page).map(|value| (*name, value)))
}

// ---------------------------------------------------------------------------
// Thumbnail steps
// ---------------------------------------------------------------------------

pub fn open_graph_image(page: &Page) -> Option<String> {
    page.meta_url(&OG_IMAGE)
}

pub fn twitter_card_image(page: &Page) -> Option<String> {
    page.meta_url(&TWITTER_IMAGE)
}

/// Image of the JSON-LD article node. Other nodes are only consulted when no
/// article node carries one, and never people or organizations (avatars, logos).
pub fn json_ld_image(page: &Page) -> Option<String> {
    let nodes = json_ld_nodes(page);
    let image_of = |node: &Value| {
        let image = node.get("image").or_else(|| node.get("thumbnailUrl"))?;
        first_json_image(image, &page.base_url)
    };
    nodes
        .iter()
        .filter(|n| is_article_node(n))
        .find_map(image_of)
        .or_else(|| {
            nodes
                .iter()
                .filter(|n| !node_has_type(n, |t| NON_CONTENT_TYPES.contains(&t)))
                .find_map(image_of)
        })
}

pub fn meta_hint_image(page: &Page) -> Option<String> {
    page.meta_url(&HINT_IMAGE).or_else(|| {
        page.document
            .select(&LINK_IMAGE_SRC)
            .filter_map(|el| el.value().attr("href"))
            .find_map(|href| absolutize(href, &page.base_url))
    })
}

pub fn lead_image(page: &Page) -> Option<String> {
    LEAD_IMAGE.iter().find_map(|s| {
        page.document
            .select(s)
            .find_map(|img| image_from_img(img, &page.base_url))
    })
}

pub fn first_content_image(page: &Page) -> Option<String> {
    let mut containers: Vec<ElementRef> = Vec::new();
    containers.extend(page.document.select(&ARTICLE).next());
    containers.extend(page.document.select(&MAIN).next());
    if containers.is_empty() {
        containers.push(page.document.root_element());
    }

    containers.into_iter().find_map(|container| {
        container
            .select(&IMG)
            .find_map(|img| image_from_img(img, &page.base_url))
    })
}

/// The best URL an `<img>` offers: widest `srcset` entry, then lazy attributes.
fn image_from_img(img: ElementRef, base_url: &str) -> Option<String> {
    if let Some(best) = img
        .value()
        .attr("srcset")
        .and_then(|srcset| best_from_srcset(srcset, base_url))
        .filter(|u| !is_tracking_pixel(u))
    {
        return Some(best);
    }
    IMG_ATTRS.iter().find_map(|attr| {
        let value = img.value().attr(attr)?;
        absolutize(value, base_url).filter(|u| !is_tracking_pixel(u))
    })
}

fn is_tracking_pixel(url: &str) -> bool {
    let lower = url.to_lowercase();
    PIXEL_MARKERS.iter().any(|m| lower.contains(m))
}

/// Pick the widest candidate from an HTML `srcset` attribute.
pub fn best_from_srcset(srcset: &str, base_url: &str) -> Option<String> {
    let mut best: Option<(u32, String)> = None;
    for part in srcset.split(',') {
        let mut bits = part.split_whitespace();
        let Some(url) = bits.next().and_then(|u| absolutize(u, base_url)) else {
            continue;
        };
        let width = bits
            .next()
            .and_then(|d| d.strip_suffix('w'))
            .and_then(|w| w.parse::<u32>().ok())
            .unwrap_or(0);
        if best.as_ref().is_none_or(|(w, _)| width > *w) {
            best = Some((width, url));
        }
    }
    best.map(|(_, url)| url)
}

// ---------------------------------------------------------------------------
// JSON-LD
// ---------------------------------------------------------------------------

/// Every JSON object found in `ld+json` scripts, including `@graph` members.
pub fn json_ld_nodes(page: &Page) -> Vec<Value> {
    let mut nodes = Vec::new();
    for script in page.document.select(&JSON_LD) {
        let raw: String = script.text().collect();
        let Ok(data) = serde_json::from_str::<Value>(raw.trim()) else {
            continue;
        };
        let mut queue: VecDeque<Value> = match data {
            Value::Array(items) => items.into(),
            other => VecDeque::from([other]),
        };
        while let Some(node) = queue.pop_front() {
            if let Some(Value::Array(graph)) = node.get("@graph") {
                queue.extend(graph.iter().cloned());
            }
            if node.is_object() {
                nodes.push(node);
            }
        }
    }
    nodes
}

fn node_has_type(node: &Value, pred: impl Fn(&str) -> bool) -> bool {
    let check = |t: &str| pred(&t.to_lowercase());
    match node.get("@type").or_else(|| node.get("type")) {
        Some(Value::String(t)) => check(t),
        Some(Value::Array(types)) => types.iter().filter_map(Value::as_str).any(check),
        _ => false,
    }
}

fn is_article_node(node: &Value) -> bool {
    node_has_type(node, |t| t.contains("article"))
}

fn first_json_image(value: &Value, base_url: &str) -> Option<String> {
    match value {
        Value::String(s) => absolutize(s, base_url),
        Value::Object(map) => ["url", "contentUrl", "thumbnailUrl"]
            .iter()
            .filter_map(|k| map.get(*k).and_then(Value::as_str))
            .find_map(|u| absolutize(u, base_url)),
        Value::Array(items) => items.iter().find_map(|v| first_json_image(v, base_url)),
        _ => None,
    }
}

fn json_ld_article_field(page: &Page, keys: &[&str]) -> Option<String> {
    json_ld_nodes(page)
        .iter()
        .filter(|n| is_article_node(n))
        .find_map(|node| {
            keys.iter()
                .filter_map(|k| node.get(*k).and_then(Value::as_str))
                .map(collapse_whitespace)
                .find(|v| !v.is_empty())
        })
}

// ---------------------------------------------------------------------------
// Title, publication time, publisher
// ---------------------------------------------------------------------------

pub fn meta_title(page: &Page) -> Option<String> {
    page.meta_content(&TITLE_META)
}

pub fn json_ld_headline(page: &Page) -> Option<String> {
    json_ld_article_field(page, &["headline", "name"])
}

pub fn title_tag(page: &Page) -> Option<String> {
    page.document
        .select(&TITLE)
        .map(|t| collapse_whitespace(&t.text().collect::<String>()))
        .find(|t| !t.is_empty())
}

pub fn first_heading(page: &Page) -> Option<String> {
    page.document
        .select(&H1)
        .map(|t| collapse_whitespace(&t.text().collect::<String>()))
        .find(|t| !t.is_empty())
}

pub fn meta_published(page: &Page) -> Option<String> {
    page.meta_content(&PUBLISHED_META)
}

pub fn json_ld_published(page: &Page) -> Option<String> {
    json_ld_article_field(page, &["datePublished", "dateCreated"])
}

pub fn time_tag_published(page: &Page) -> Option<String> {
    page.document
        .select(&TIME_DATETIME)
        .filter_map(|t| t.value().attr("datetime"))
        .map(str::trim)
        .find(|d| !d.is_empty())
        .map(str::to_string)
}

/// Publisher name from JSON-LD `publisher.name`.
pub fn json_ld_publisher(page: &Page) -> Option<String> {
    json_ld_nodes(page).iter().find_map(|node| {
        node.get("publisher")
            .and_then(|p| p.get("name"))
            .and_then(Value::as_str)
            .map(collapse_whitespace)
            .filter(|n| !n.is_empty())
    })
}

// ---------------------------------------------------------------------------
// Body text and summary
// ---------------------------------------------------------------------------

fn in_boilerplate(el: ElementRef) -> bool {
    BOILERPLATE.contains(&el.value().name())
        || el
            .ancestors()
            .filter_map(ElementRef::wrap)
            .any(|a| BOILERPLATE.contains(&a.value().name()))
}

fn has_container_hint(el: ElementRef) -> bool {
    let mut label = el.value().classes().collect::<Vec<_>>().join(" ");
    if let Some(id) = el.value().id() {
        label.push(' ');
        label.push_str(id);
    }
    let label = label.to_lowercase();
    CONTAINER_HINTS.iter().any(|h| label.contains(h))
}

/// Extract the main article text with lightweight heuristics.
///
/// Candidate containers are `<article>`, `main`/`[role=main]`, and elements
/// whose class or id hints at article content. The candidate holding the
/// most paragraph text wins, narrowed to an `<article>` or `main` inside it
/// when that holds a good share of the text. Boilerplate regions
/// (navigation, headers, footers, forms, scripts) never contribute text, and
/// short paragraphs are dropped.
pub fn main_text(page: &Page) -> String {
    let paragraphs: Vec<(ElementRef, String)> = page
        .document
        .select(&PARAGRAPH)
        .filter(|p| !in_boilerplate(*p))
        .map(|p| (p, collapse_whitespace(&p.text().collect::<Vec<_>>().join(" "))))
        .collect();

    let mut scores = HashMap::new();
    for (p, text) in &paragraphs {
        let len = text.chars().count();
        for ancestor in p.ancestors() {
            *scores.entry(ancestor.id()).or_insert(0usize) += len;
        }
    }

    let mut seen = HashSet::new();
    let candidates = page
        .document
        .select(&ARTICLE)
        .chain(page.document.select(&MAIN))
        .chain(page.document.select(&ANY).filter(|el| has_container_hint(*el)))
        .filter(|el| !in_boilerplate(*el))
        .filter(|el| seen.insert(el.id()));

    let score_of = |el: &ElementRef| scores.get(&el.id()).copied().unwrap_or(0);
    let mut best: Option<ElementRef> = None;
    let mut best_score = 0usize;
    for candidate in candidates {
        let score = score_of(&candidate);
        if score > best_score {
            best = Some(candidate);
            best_score = score;
        }
    }

    // A hinted wrapper (e.g. `<body class="single-post">`) also holds
    // comments and related links; narrow to the article or main inside it.
    while let Some(container) = best {
        if container.value().name() == "article" {
            break;
        }
        let total = score_of(&container);
        let nested = container
            .select(&ARTICLE)
            .chain(container.select(&MAIN))
            .filter(|el| el.id() != container.id() && !in_boilerplate(*el))
            .max_by_key(|el| score_of(el));
        match nested {
            Some(el) if score_of(&el) > 0 && score_of(&el) * 3 >= total => best = Some(el),
            _ => break,
        }
    }
    let best = best.map(|el| el.id());

    let text = paragraphs
        .iter()
        .filter(|(p, _)| match best {
            Some(id) => p.ancestors().any(|a| a.id() == id),
            None => true,
        })
        .map(|(_, text)| text.as_str())
        .filter(|text| text.chars().count() > MIN_PARAGRAPH_CHARS)
        .collect::<Vec<_>>()
        .join(" ");
    collapse_whitespace(&text)
}

/// Split text into sentences on `.`, `!` or `?` followed by whitespace.
pub fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    for word in text.split_whitespace() {
        current.push(word);
        if word.ends_with(['.', '!', '?']) {
            sentences.push(current.join(" "));
            current.clear();
        }
    }
    if !current.is_empty() {
        sentences.push(current.join(" "));
    }
    sentences
}

/// Lead summary: whole sentences from the start of `text` up to about
/// `max_words` words. A first sentence longer than the budget is kept whole
/// and the result is capped at 2000 characters.
pub fn lead_summary(text: &str, max_words: usize) -> Option<String> {
    let mut out: Vec<String> = Vec::new();
    let mut words = 0usize;
    for sentence in split_sentences(text) {
        let w = sentence.split_whitespace().count();
        if words + w > max_words && !out.is_empty() {
            break;
        }
        out.push(sentence);
        words += w;
        if words >= max_words {
            break;
        }
    }
    let summary = truncate_chars(&out.join(" "), SUMMARY_MAX_CHARS);
    (!summary.is_empty()).then_some(summary)
}

/// Explicit page description, unless it is too short to be useful or merely
/// repeats the publisher name.
pub fn meta_description(page: &Page, source_label: Option<&str>) -> Option<String> {
    let description = page.meta_content(&DESCRIPTION)?;
    if description.split_whitespace().count() < MIN_DESCRIPTION_WORDS {
        return None;
    }
    if source_label.is_some_and(|s| s.trim().eq_ignore_ascii_case(&description)) {
        return None;
    }
    Some(truncate_chars(&description, SUMMARY_MAX_CHARS))
}

// ---------------------------------------------------------------------------
// Whole-page extraction
// ---------------------------------------------------------------------------

/// Limits applied while extracting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtractLimits {
    pub full_text_max_chars: usize,
    pub summary_max_words: usize,
}

/// Every field derivable from one page. Absent fields stay `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageExtract {
    pub title: Option<String>,
    pub summary: Option<String>,
    pub full_text: Option<String>,
    pub thumbnail_url: Option<String>,
    pub published_at: Option<String>,
    pub publisher: Option<String>,
}

/// Run every chain over `page`.
pub fn extract_page(page: &Page, limits: ExtractLimits, source_label: Option<&str>) -> PageExtract {
    let body = main_text(page);
    let full_text = (!body.is_empty()).then(|| truncate_chars(&body, limits.full_text_max_chars));
    let summary = meta_description(page, source_label)
        .or_else(|| lead_summary(&body, limits.summary_max_words));

    PageExtract {
        title: first_match(TITLE_CHAIN, page).map(|(_, v)| v),
        summary,
        full_text,
        thumbnail_url: first_match(THUMBNAIL_CHAIN, page).map(|(_, v)| v),
        published_at: first_match(PUBLISHED_CHAIN, page).map(|(_, v)| v),
        publisher: json_ld_publisher(page),
    }
}
