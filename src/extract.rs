//! Stream item extraction.
//!
//! Containers are found with the structural selector first and the bare
//! attribute selector if that finds nothing. Every field is derived by an
//! ordered list of strategies; the first one that produces a value wins and
//! the last resort is always a safe default. A container that cannot become a
//! record (no id, duplicate id) is logged and skipped without affecting the
//! others.

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::attachments::extract_attachments;
use crate::config::Config;
use crate::content::{clean_body, element_text};
use crate::dates::{clean_date_text, looks_like_date};
use crate::error::ExtractError;
use crate::model::{ItemKind, StreamItem, UNKNOWN_AUTHOR};

const ID_ATTR: &str = "data-stream-item-id";
const REQUIRED_CLASSES: [&str; 4] = ["qhnNic", "LBlAUc", "Aopndd", "TIunU"];

fn sel(css: &str) -> Selector {
    Selector::parse(css).unwrap()
}

static PRIMARY_SEL: Lazy<Selector> = Lazy::new(|| sel("div[data-stream-item-id].qhnNic.LBlAUc.Aopndd.TIunU"));
static FALLBACK_SEL: Lazy<Selector> = Lazy::new(|| sel("div[data-stream-item-id]"));

static AUTHOR_LABEL_SEL: Lazy<Selector> = Lazy::new(|| sel("span.YVvGBb.asQXV"));
static AUTHOR_SECONDARY_SELS: Lazy<Vec<Selector>> = Lazy::new(|| {
    vec![
        sel("div.GQW44b span.YVvGBb"),
        sel("div.lziZub span.YVvGBb"),
        sel(r#"div[role="listitem"] span:first-child"#),
    ]
});
static AUTHOR_IMG_SEL: Lazy<Selector> = Lazy::new(|| sel("img.tnyRnb"));
static AUTHOR_SUFFIX_RES: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        Regex::new(r"(?i)\s+posted\s+a\s+new\s+assignment:.*$").unwrap(),
        Regex::new(r"(?i)\s+posted\s+a\s+new\s+announcement:.*$").unwrap(),
        Regex::new(r"(?i)\s+posted.*$").unwrap(),
    ]
});
const NON_AUTHOR_WORDS: &[&str] = &["assignment", "announcement", "created", "posted"];

static DATE_SELS: Lazy<Vec<Selector>> = Lazy::new(|| {
    vec![
        sel(r#"span[aria-hidden="true"]"#),
        sel("span.PazDv"),
        sel("span.IMvYId span.PazDv"),
        sel("div.IMvYId span"),
    ]
});
static HEADER_SEL: Lazy<Selector> = Lazy::new(|| sel("div.lziZub, div.GQW44b"));

static ASSIGNMENT_ID_SEL: Lazy<Selector> = Lazy::new(|| sel("div[data-assignment-id]"));
static ANNOUNCEMENT_ID_SEL: Lazy<Selector> = Lazy::new(|| sel("div[data-announcement-id]"));
static ASSIGNMENT_MARKER_SEL: Lazy<Selector> = Lazy::new(|| {
    sel(r#"svg.NMm5M.hhikbc, div[role="button"][aria-label*="assignment"], div[aria-label*="Assignment:"]"#)
});
static ASSIGNMENT_CLASS_SEL: Lazy<Selector> = Lazy::new(|| sel(".xWw7yd.h7Ww0.DkDwHe"));

static ASSIGNMENT_TITLE_SEL: Lazy<Selector> =
    Lazy::new(|| sel("div.lziZub h2 span.PazDv, div.GQW44b h2 span.PazDv"));
static ARIA_LABEL_SEL: Lazy<Selector> = Lazy::new(|| sel("div[aria-label]"));
static ASSIGNMENT_PREFIX_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i).*assignment:\s*").unwrap());
static CONTENT_SELS: Lazy<Vec<Selector>> = Lazy::new(|| {
    vec![
        sel("div.pco8Kc.obylVb.j70YMc > span"),
        sel("div.pco8Kc.obylVb.j70YMc"),
        sel("div.n8F6Jd div.pco8Kc span"),
        sel(r#"div[role="listitem"] > div > div > div"#),
    ]
});
const METADATA_WORDS: &[&str] = &[
    "created",
    "posted",
    "assignment",
    "announcement",
    "pdf",
    "video",
    "google docs",
    "attachment",
    "view",
    "edit",
    "download",
];
const FALLBACK_MIN_CHARS: usize = 10;
const FALLBACK_MAX_SNIPPETS: usize = 3;

static DELETED_SEL: Lazy<Selector> = Lazy::new(|| sel(".deleted-text"));

type FieldStrategy = fn(ElementRef<'_>) -> Option<String>;
type BodyStrategy = fn(ElementRef<'_>, &Config) -> Option<String>;
type KindStrategy = fn(ElementRef<'_>) -> Option<ItemKind>;

const AUTHOR_STRATEGIES: &[FieldStrategy] = &[author_from_label, author_from_secondary, author_from_avatar];
const DATE_STRATEGIES: &[FieldStrategy] = &[date_from_selectors, date_from_header_text];
const KIND_STRATEGIES: &[KindStrategy] = &[
    kind_from_data_attribute,
    kind_from_markers,
    kind_from_text,
    kind_from_class_marker,
];
const ASSIGNMENT_BODY_STRATEGIES: &[BodyStrategy] = &[
    assignment_body_from_title,
    assignment_body_from_aria_label,
    assignment_body_from_author_text,
];
const ANNOUNCEMENT_BODY_STRATEGIES: &[BodyStrategy] = &[body_from_content_selectors, body_from_text_nodes];

/// Counters describing one extraction run.
#[derive(Serialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractionStats {
    /// Elements carrying the stream item id attribute.
    pub containers_found: usize,
    /// Of those, how many carry the full expected class set.
    pub containers_validated: usize,
    pub used_fallback_selector: bool,
    pub parsed: usize,
    pub skipped: usize,
}

/// Extract every stream item from a page snapshot.
pub fn extract_records(html: &str, config: &Config) -> Vec<StreamItem> {
    extract_with_stats(html, config).0
}

pub fn extract_with_stats(html: &str, config: &Config) -> (Vec<StreamItem>, ExtractionStats) {
    let document = Html::parse_document(html);
    let mut stats = validate_structure(&document);

    let mut containers: Vec<ElementRef<'_>> = document.select(&PRIMARY_SEL).collect();
    if containers.is_empty() {
        containers = document.select(&FALLBACK_SEL).collect();
        stats.used_fallback_selector = true;
        warn!(
            found = containers.len(),
            "no containers matched the structural selector, using attribute fallback"
        );
    }

    let mut seen = HashSet::new();
    let mut items = Vec::with_capacity(containers.len());
    for (index, container) in containers.into_iter().enumerate() {
        match parse_container(container, config, &mut seen) {
            Ok(item) => items.push(item),
            Err(e) => {
                error!(index, error = %e, "skipping stream item container");
                stats.skipped += 1;
            }
        }
    }
    stats.parsed = items.len();

    info!(parsed = stats.parsed, skipped = stats.skipped, "extraction finished");
    (items, stats)
}

fn validate_structure(document: &Html) -> ExtractionStats {
    let mut stats = ExtractionStats::default();
    for container in document.select(&FALLBACK_SEL) {
        stats.containers_found += 1;
        let classes: HashSet<&str> = container.value().classes().collect();
        if REQUIRED_CLASSES.iter().all(|c| classes.contains(c)) {
            stats.containers_validated += 1;
        }
    }

    if stats.containers_found == 0 {
        warn!("no stream item containers found, the page layout may have changed");
    } else if stats.containers_validated == 0 {
        warn!(
            found = stats.containers_found,
            "no container carries the expected class set"
        );
    }
    stats
}

/// Derive one stream item. `seen` holds the ids already emitted for this
/// document.
pub fn parse_container(
    container: ElementRef<'_>,
    config: &Config,
    seen: &mut HashSet<String>,
) -> Result<StreamItem, ExtractError> {
    let id = container.value().attr(ID_ATTR).unwrap_or("").trim().to_string();
    if id.is_empty() {
        return Err(ExtractError::MissingId);
    }
    if !seen.insert(id.clone()) {
        return Err(ExtractError::DuplicateId(id));
    }

    let kind = classify(container);
    let author = first_of(AUTHOR_STRATEGIES, container).unwrap_or_else(|| UNKNOWN_AUTHOR.to_string());
    let date = first_of(DATE_STRATEGIES, container).unwrap_or_default();
    let body = extract_body(container, kind, config);
    let deleted = container.select(&DELETED_SEL).next().is_some();
    let attachments = extract_attachments(container);

    debug!(%id, %kind, %author, attachments = attachments.len(), "parsed stream item");

    Ok(StreamItem {
        id,
        kind,
        author,
        date,
        deleted,
        body,
        attachments,
    })
}

fn first_of(strategies: &[FieldStrategy], container: ElementRef<'_>) -> Option<String> {
    strategies.iter().find_map(|strategy| strategy(container))
}

fn non_empty(s: String) -> Option<String> {
    let s = s.trim();
    if s.is_empty() {
        None
    } else {
        Some(s.to_string())
    }
}

fn author_from_label(container: ElementRef<'_>) -> Option<String> {
    let label = element_text(container.select(&AUTHOR_LABEL_SEL).next()?);
    let stripped = AUTHOR_SUFFIX_RES
        .iter()
        .fold(label, |text, re| re.replace(&text, "").into_owned());
    non_empty(stripped)
}

fn author_from_secondary(container: ElementRef<'_>) -> Option<String> {
    AUTHOR_SECONDARY_SELS.iter().find_map(|selector| {
        container.select(selector).find_map(|el| {
            let text = element_text(el);
            let lower = text.to_lowercase();
            if NON_AUTHOR_WORDS.iter().any(|w| lower.contains(w)) {
                None
            } else {
                non_empty(text)
            }
        })
    })
}

fn author_from_avatar(container: ElementRef<'_>) -> Option<String> {
    let img = container.select(&AUTHOR_IMG_SEL).next()?;
    non_empty(img.value().attr("alt")?.to_string())
}

fn date_from_selectors(container: ElementRef<'_>) -> Option<String> {
    DATE_SELS.iter().find_map(|selector| {
        container
            .select(selector)
            .map(element_text)
            .find(|text| looks_like_date(text))
            .map(|text| clean_date_text(&text))
    })
}

fn date_from_header_text(container: ElementRef<'_>) -> Option<String> {
    container.select(&HEADER_SEL).find_map(|header| {
        header
            .text()
            .map(str::trim)
            .find(|text| looks_like_date(text))
            .map(clean_date_text)
    })
}

/// Item kind; Announcement when no strategy decides.
pub fn classify(container: ElementRef<'_>) -> ItemKind {
    KIND_STRATEGIES
        .iter()
        .find_map(|strategy| strategy(container))
        .unwrap_or(ItemKind::Announcement)
}

fn kind_from_data_attribute(container: ElementRef<'_>) -> Option<ItemKind> {
    let own = |attr: &str| container.value().attr(attr).is_some();
    if own("data-assignment-id") || container.select(&ASSIGNMENT_ID_SEL).next().is_some() {
        Some(ItemKind::Assignment)
    } else if own("data-announcement-id") || container.select(&ANNOUNCEMENT_ID_SEL).next().is_some() {
        Some(ItemKind::Announcement)
    } else {
        None
    }
}

fn kind_from_markers(container: ElementRef<'_>) -> Option<ItemKind> {
    container
        .select(&ASSIGNMENT_MARKER_SEL)
        .next()
        .map(|_| ItemKind::Assignment)
}

fn kind_from_text(container: ElementRef<'_>) -> Option<ItemKind> {
    let text = element_text(container).to_lowercase();
    if text.contains("assignment:") || text.contains("posted a new assignment") {
        Some(ItemKind::Assignment)
    } else if text.contains("announcement:") || text.contains("posted a new announcement") {
        Some(ItemKind::Announcement)
    } else {
        None
    }
}

fn kind_from_class_marker(container: ElementRef<'_>) -> Option<ItemKind> {
    container
        .select(&ASSIGNMENT_CLASS_SEL)
        .next()
        .map(|_| ItemKind::Assignment)
}

fn extract_body(container: ElementRef<'_>, kind: ItemKind, config: &Config) -> String {
    match kind {
        ItemKind::Assignment => ASSIGNMENT_BODY_STRATEGIES
            .iter()
            .find_map(|strategy| strategy(container, config))
            .unwrap_or_else(|| "Assignment".to_string()),
        ItemKind::Announcement => ANNOUNCEMENT_BODY_STRATEGIES
            .iter()
            .find_map(|strategy| strategy(container, config))
            .unwrap_or_default(),
    }
}

fn assignment_body_from_title(container: ElementRef<'_>, config: &Config) -> Option<String> {
    let title = container.select(&ASSIGNMENT_TITLE_SEL).next()?;
    non_empty(clean_body(title, config))
}

fn assignment_body_from_aria_label(container: ElementRef<'_>, _config: &Config) -> Option<String> {
    container.select(&ARIA_LABEL_SEL).find_map(|el| {
        let label = el.value().attr("aria-label")?;
        if label.contains("Assignment:") {
            non_empty(label.replace("Assignment:", ""))
        } else {
            None
        }
    })
}

fn assignment_body_from_author_text(container: ElementRef<'_>, _config: &Config) -> Option<String> {
    container.select(&AUTHOR_LABEL_SEL).find_map(|el| {
        let text = element_text(el);
        if text.to_lowercase().contains("assignment:") {
            non_empty(ASSIGNMENT_PREFIX_RE.replace(&text, "").into_owned())
        } else {
            None
        }
    })
}

fn body_from_content_selectors(container: ElementRef<'_>, config: &Config) -> Option<String> {
    CONTENT_SELS.iter().find_map(|selector| {
        let el = container.select(selector).next()?;
        non_empty(clean_body(el, config))
    })
}

fn body_from_text_nodes(container: ElementRef<'_>, _config: &Config) -> Option<String> {
    let snippets: Vec<&str> = container
        .text()
        .map(str::trim)
        .filter(|text| text.chars().count() > FALLBACK_MIN_CHARS)
        .filter(|text| {
            let lower = text.to_lowercase();
            !METADATA_WORDS.iter().any(|w| lower.contains(w))
        })
        .take(FALLBACK_MAX_SNIPPETS)
        .collect();
    non_empty(snippets.join(" "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::AttachmentKind;

    const CLASSES: &str = "qhnNic LBlAUc Aopndd TIunU";

    fn page(containers: &[String]) -> String {
        format!("<html><body><main>{}</main></body></html>", containers.join("\n"))
    }

    fn assignment_post() -> String {
        format!(
            r#"<div data-stream-item-id="A1" class="{CLASSES}">
                 <div class="lziZub">
                   <span class="YVvGBb asQXV">Jane Smith posted a new assignment: Essay 1</span>
                   <span class="PazDv">Created 18 Sep 2023</span>
                   <h2><span class="PazDv">Essay <b>1</b></span></h2>
                 </div>
               </div>"#
        )
    }

    fn announcement_post() -> String {
        format!(
            r#"<div data-stream-item-id="B2" class="{CLASSES}">
                 <div class="GQW44b">
                   <span class="YVvGBb asQXV">Mr. Lee</span>
                   <span aria-hidden="true">Sep 20, 2023</span>
                 </div>
                 <div class="pco8Kc obylVb j70YMc"><span>Bring <b>calculators</b> tomorrow.</span></div>
                 <div class="luto0c"><a href="https://example.org/w.pdf">Worksheet</a></div>
               </div>"#
        )
    }

    fn deleted_post() -> String {
        format!(
            r#"<div data-stream-item-id="C3" class="{CLASSES}">
                 <div class="deleted-text">This post was removed by its author</div>
               </div>"#
        )
    }

    #[test]
    fn test_extracts_assignment_fields() {
        let items = extract_records(&page(&[assignment_post()]), &Config::default());
        assert_eq!(items.len(), 1);
        let item = &items[0];
        assert_eq!(item.id, "A1");
        assert_eq!(item.kind, ItemKind::Assignment);
        assert_eq!(item.author, "Jane Smith");
        assert_eq!(item.date, "18 Sep 2023");
        assert_eq!(item.body, "Essay **1**");
        assert!(!item.deleted);
        assert!(item.attachments.is_empty());
    }

    #[test]
    fn test_extracts_announcement_fields() {
        let items = extract_records(&page(&[announcement_post()]), &Config::default());
        let item = &items[0];
        assert_eq!(item.kind, ItemKind::Announcement);
        assert_eq!(item.author, "Mr. Lee");
        assert_eq!(item.date, "Sep 20, 2023");
        assert_eq!(item.body, "Bring **calculators** tomorrow.");
        assert_eq!(item.attachments.len(), 1);
        assert_eq!(item.attachments[0].kind, AttachmentKind::Pdf);
    }

    #[test]
    fn test_deleted_post_defaults() {
        let items = extract_records(&page(&[deleted_post()]), &Config::default());
        let item = &items[0];
        assert!(item.deleted);
        assert_eq!(item.author, UNKNOWN_AUTHOR);
        assert_eq!(item.date, "");
        assert_eq!(item.body, "This post was removed by its author");
    }

    #[test]
    fn test_stats_with_structural_selector() {
        let html = page(&[assignment_post(), announcement_post(), deleted_post()]);
        let (items, stats) = extract_with_stats(&html, &Config::default());
        assert_eq!(items.len(), 3);
        assert_eq!(
            stats,
            ExtractionStats {
                containers_found: 3,
                containers_validated: 3,
                used_fallback_selector: false,
                parsed: 3,
                skipped: 0,
            }
        );
        let ids: Vec<&str> = items.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, ["A1", "B2", "C3"]);
    }

    #[test]
    fn test_attribute_fallback_when_classes_drift() {
        let html = page(&[
            r#"<div data-stream-item-id="X1" class="newLayout"><div class="pco8Kc obylVb j70YMc">Hello class</div></div>"#
                .to_string(),
        ]);
        let (items, stats) = extract_with_stats(&html, &Config::default());
        assert_eq!(items.len(), 1);
        assert!(stats.used_fallback_selector);
        assert_eq!(stats.containers_found, 1);
        assert_eq!(stats.containers_validated, 0);
        assert_eq!(items[0].body, "Hello class");
    }

    #[test]
    fn test_one_bad_container_does_not_sink_the_batch() {
        let html = page(&[
            r#"<div data-stream-item-id="P1"><p>First notice for everyone</p></div>"#.to_string(),
            r#"<div data-stream-item-id=""><p>Broken container without id</p></div>"#.to_string(),
            r#"<div data-stream-item-id="P3"><p>Third notice for everyone</p></div>"#.to_string(),
        ]);
        let (items, stats) = extract_with_stats(&html, &Config::default());
        assert_eq!(items.len(), 2);
        assert_eq!(stats.skipped, 1);
        assert_eq!(items[0].body, "First notice for everyone");
        assert_eq!(items[1].id, "P3");
    }

    #[test]
    fn test_duplicate_ids_are_skipped() {
        let html = page(&[
            r#"<div data-stream-item-id="D1">one</div>"#.to_string(),
            r#"<div data-stream-item-id="D1">two</div>"#.to_string(),
        ]);
        let (items, stats) = extract_with_stats(&html, &Config::default());
        assert_eq!(items.len(), 1);
        assert_eq!(stats.skipped, 1);
    }

    #[test]
    fn test_parse_container_errors() {
        let doc = Html::parse_document(r#"<div data-stream-item-id=" "></div><div data-stream-item-id="Z"></div>"#);
        let mut seen = HashSet::new();
        let containers: Vec<_> = doc.select(&FALLBACK_SEL).collect();
        let config = Config::default();
        assert_eq!(
            parse_container(containers[0], &config, &mut seen).unwrap_err(),
            ExtractError::MissingId
        );
        assert!(parse_container(containers[1], &config, &mut seen).is_ok());
        assert_eq!(
            parse_container(containers[1], &config, &mut seen).unwrap_err(),
            ExtractError::DuplicateId("Z".to_string())
        );
    }

    #[test]
    fn test_kind_precedence() {
        let cases = [
            (r#"<div data-stream-item-id="k" data-assignment-id="9"></div>"#, ItemKind::Assignment),
            (
                r#"<div data-stream-item-id="k"><div data-announcement-id="1">Assignment: read</div></div>"#,
                ItemKind::Announcement,
            ),
            (r#"<div data-stream-item-id="k"><div aria-label="Assignment: Lab"></div></div>"#, ItemKind::Assignment),
            (r#"<div data-stream-item-id="k">Teacher posted a new announcement: hi</div>"#, ItemKind::Announcement),
            (r#"<div data-stream-item-id="k"><i class="xWw7yd h7Ww0 DkDwHe"></i></div>"#, ItemKind::Assignment),
            (r#"<div data-stream-item-id="k">hello</div>"#, ItemKind::Announcement),
        ];
        for (html, expected) in cases {
            let doc = Html::parse_document(html);
            let container = doc.select(&FALLBACK_SEL).next().unwrap();
            assert_eq!(classify(container), expected, "{}", html);
        }
    }

    #[test]
    fn test_assignment_body_fallbacks() {
        let config = Config::default();
        let html = page(&[
            r#"<div data-stream-item-id="a"><div aria-label="Assignment: Lab report"></div></div>"#.to_string(),
            r#"<div data-stream-item-id="b"><span class="YVvGBb asQXV">Ann posted a new assignment: Quiz 2</span></div>"#
                .to_string(),
            r#"<div data-stream-item-id="c" data-assignment-id="1"></div>"#.to_string(),
        ]);
        let bodies: Vec<String> = extract_records(&html, &config).into_iter().map(|i| i.body).collect();
        assert_eq!(bodies, ["Lab report", "Quiz 2", "Assignment"]);
    }

    #[test]
    fn test_author_secondary_and_avatar() {
        let html = page(&[
            r#"<div data-stream-item-id="a"><div class="GQW44b"><span class="YVvGBb">Created yesterday</span></div><div class="lziZub"><span class="YVvGBb">Ms. Virtanen</span></div></div>"#
                .to_string(),
            r#"<div data-stream-item-id="b"><img class="tnyRnb" alt="Coach Carter"></div>"#.to_string(),
        ]);
        let authors: Vec<String> = extract_records(&html, &Config::default())
            .into_iter()
            .map(|i| i.author)
            .collect();
        assert_eq!(authors, ["Ms. Virtanen", "Coach Carter"]);
    }

    #[test]
    fn test_date_from_header_text_nodes() {
        let html = page(&[
            r#"<div data-stream-item-id="a"><div class="lziZub">Mr. Lee<br>Posted 3.10.2023</div></div>"#.to_string(),
        ]);
        let items = extract_records(&html, &Config::default());
        assert_eq!(items[0].date, "3.10.2023");
    }

    #[test]
    fn test_empty_document() {
        let (items, stats) = extract_with_stats("", &Config::default());
        assert!(items.is_empty());
        assert_eq!(stats.containers_found, 0);
        assert!(stats.used_fallback_selector);
    }
}
