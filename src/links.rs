//! Hosted-document link discovery.
//!
//! Finds every anchor pointing at Drive or Docs, extracts the resource
//! identifier and collects declared type hints from the anchor and, failing
//! that, its nearest labelled ancestor.

use std::collections::BTreeSet;

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tracing::debug;

use crate::content::element_text;
use crate::model::DriveLink;
use crate::normalize::extension;

static ANCHOR_SEL: Lazy<Selector> = Lazy::new(|| Selector::parse("a[href]").unwrap());
static MIME_SEL: Lazy<Selector> = Lazy::new(|| Selector::parse("[data-mime-type]").unwrap());

/// Identifier patterns, most specific first.
static FILE_ID_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"/file/d/([a-zA-Z0-9_-]+)",
        r"/document/d/([a-zA-Z0-9_-]+)",
        r"/spreadsheets/d/([a-zA-Z0-9_-]+)",
        r"/presentation/d/([a-zA-Z0-9_-]+)",
        r"/open\?id=([a-zA-Z0-9_-]+)",
        r"[?&]id=([a-zA-Z0-9_-]+)",
        r"/d/([a-zA-Z0-9_-]+)",
    ]
    .into_iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

/// Type labels recognised in link text and labelling attributes.
static TYPE_LABELS: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    [
        (r"(?i)\bGoogle\s+Docs?\b", "google docs"),
        (r"(?i)\bGoogle\s+Sheets?\b", "google sheets"),
        (r"(?i)\bGoogle\s+Slides?\b", "google slides"),
        (r"(?i)\bPDF\b", "pdf"),
        (r"(?i)\bVideo\b", "video"),
        (r"(?i)\bDocument\b", "document"),
        (r"(?i)\bSpreadsheet\b", "spreadsheet"),
        (r"(?i)\bPresentation\b", "presentation"),
    ]
    .into_iter()
    .map(|(p, label)| (Regex::new(p).unwrap(), label))
    .collect()
});

const LABEL_ATTRS: &[&str] = &["aria-label", "title", "data-tooltip"];

/// Resource identifier of a Drive or Docs URL.
pub fn extract_file_id(href: &str) -> Option<String> {
    FILE_ID_PATTERNS
        .iter()
        .find_map(|re| re.captures(href))
        .map(|caps| caps[1].to_string())
}

fn is_hosted_document(href: &str) -> bool {
    href.contains("drive.google.com") || href.contains("docs.google.com")
}

/// Every hosted-document link in a document, in document order.
pub fn discover_links(html: &str) -> Vec<DriveLink> {
    let document = Html::parse_document(html);
    let mut links = Vec::new();

    for anchor in document.select(&ANCHOR_SEL) {
        let href = anchor.value().attr("href").unwrap_or("").trim();
        if !is_hosted_document(href) {
            continue;
        }
        let Some(identifier) = extract_file_id(href) else {
            debug!(href, "hosted link without a resource id");
            continue;
        };

        let text = element_text(anchor);
        let display_name = if text.is_empty() {
            format!("file_{}", identifier)
        } else {
            text
        };
        let declared_types = declared_types_near(anchor, &display_name);

        links.push(DriveLink {
            identifier,
            reference: href.to_string(),
            display_name,
            declared_types,
        });
    }

    debug!(count = links.len(), "hosted links discovered");
    links
}

/// Types declared by the anchor itself, else by the closest ancestor below
/// `body` that declares any.
fn declared_types_near(anchor: ElementRef<'_>, display_name: &str) -> BTreeSet<String> {
    let mut types = declared_types(anchor);
    types.extend(types_from_extension(display_name));
    if !types.is_empty() {
        return types;
    }

    for ancestor in anchor.ancestors().filter_map(ElementRef::wrap) {
        if matches!(ancestor.value().name(), "body" | "html") {
            break;
        }
        let found = declared_types(ancestor);
        if !found.is_empty() {
            return found;
        }
    }
    BTreeSet::new()
}

/// Type hints carried by one element: labels in its text and labelling
/// attributes, plus mime hints on it or its descendants.
pub fn declared_types(el: ElementRef<'_>) -> BTreeSet<String> {
    let mut haystack = element_text(el);
    for attr in LABEL_ATTRS {
        if let Some(value) = el.value().attr(attr) {
            haystack.push(' ');
            haystack.push_str(value);
        }
    }

    let mut types: BTreeSet<String> = TYPE_LABELS
        .iter()
        .filter(|(re, _)| re.is_match(&haystack))
        .map(|(_, label)| label.to_string())
        .collect();

    let own_mime = el.value().attr("data-mime-type");
    let nested_mime = el.select(&MIME_SEL).filter_map(|m| m.value().attr("data-mime-type"));
    for mime in own_mime.into_iter().chain(nested_mime) {
        if let Some(label) = type_for_mime(mime) {
            types.insert(label.to_string());
        }
    }
    types
}

fn type_for_mime(mime: &str) -> Option<&'static str> {
    let mime = mime.to_lowercase();
    if mime.contains("document") || mime.contains("kix") {
        Some("google docs")
    } else if mime.contains("pdf") {
        Some("pdf")
    } else if mime.contains("video") {
        Some("video")
    } else if mime.contains("spreadsheet") {
        Some("google sheets")
    } else if mime.contains("presentation") {
        Some("google slides")
    } else {
        None
    }
}

fn types_from_extension(name: &str) -> Option<String> {
    let label = match extension(name).as_str() {
        ".pdf" => "pdf",
        ".mp4" | ".avi" | ".mov" => "video",
        ".docx" | ".doc" => "google docs",
        ".xlsx" | ".xls" => "google sheets",
        ".pptx" | ".ppt" => "google slides",
        _ => return None,
    };
    Some(label.to_string())
}
