//! Attachment sub-extraction: title, kind and a normalised target for every
//! attachment block inside a stream item.

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Selector};
use tracing::debug;

use crate::content::element_text;
use crate::links::extract_file_id;
use crate::model::{Attachment, AttachmentKind, UNTITLED_ATTACHMENT};
use crate::normalize::extension;

static CONTAINER_SELECTORS: Lazy<[Selector; 2]> = Lazy::new(|| {
    [
        Selector::parse("div.luto0c").unwrap(),
        Selector::parse("div[data-attachment-id]").unwrap(),
    ]
});
static LINK_SEL: Lazy<Selector> = Lazy::new(|| Selector::parse("a").unwrap());
static IMG_SEL: Lazy<Selector> = Lazy::new(|| Selector::parse("img").unwrap());
static ICON_SEL: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"div.rzTfPe img, img[role="presentation"]"#).unwrap());
static TYPE_LABEL_SEL: Lazy<Selector> = Lazy::new(|| Selector::parse(".kRYv9b").unwrap());
static MIME_SEL: Lazy<Selector> = Lazy::new(|| Selector::parse("[data-mime-type]").unwrap());
static TITLE_SELECTORS: Lazy<[Selector; 3]> = Lazy::new(|| {
    [
        Selector::parse(".lIHx8b").unwrap(),
        Selector::parse(".A6dC2c").unwrap(),
        Selector::parse("div[title]").unwrap(),
    ]
});

static ARIA_PREFIX_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^Attachment:\s*\w+:\s*").unwrap());
static DOCS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"/(document|spreadsheets|presentation)/d/([a-zA-Z0-9_-]+)").unwrap());
static YOUTUBE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?:v=|youtu\.be/)([a-zA-Z0-9_-]+)").unwrap());

const VIDEO_HOSTS: &[&str] = &["youtube.com", "youtu.be", "vimeo.com"];

/// What the title and kind strategies get to look at.
pub struct AttachmentContext<'a> {
    pub block: ElementRef<'a>,
    pub link: ElementRef<'a>,
    pub href: &'a str,
}

type TitleStrategy = fn(&AttachmentContext<'_>) -> Option<String>;
type KindStrategy = fn(&AttachmentContext<'_>, &str) -> Option<AttachmentKind>;

const TITLE_STRATEGIES: &[TitleStrategy] = &[
    title_from_link_text,
    title_from_aria_label,
    title_from_title_elements,
    title_from_image_alt,
    title_from_hosted_url,
];

// Precedence matters: ambiguous blocks classify differently if reordered.
const KIND_STRATEGIES: &[KindStrategy] = &[
    kind_from_icon,
    kind_from_type_label,
    kind_from_extension,
    kind_from_host,
    kind_from_mime_hint,
    kind_from_title,
];

/// All attachments of a stream item container, in document order.
pub fn extract_attachments(container: ElementRef<'_>) -> Vec<Attachment> {
    let blocks: Vec<ElementRef<'_>> = CONTAINER_SELECTORS
        .iter()
        .map(|sel| container.select(sel).collect::<Vec<_>>())
        .find(|found| !found.is_empty())
        .unwrap_or_default();

    debug!(count = blocks.len(), "attachment blocks found");

    blocks.into_iter().filter_map(parse_attachment).collect()
}

fn parse_attachment(block: ElementRef<'_>) -> Option<Attachment> {
    let Some((link, href)) = block
        .select(&LINK_SEL)
        .next()
        .and_then(|a| a.value().attr("href").map(|h| (a, h.trim())))
        .filter(|(_, h)| !h.is_empty())
    else {
        debug!("attachment block has no usable link");
        return None;
    };

    let ctx = AttachmentContext { block, link, href };
    let title = resolve_title(&ctx);
    let kind = resolve_kind(&ctx, &title);
    let target = normalize_target(href);

    if target.is_empty() || target == "#" {
        debug!(href, "attachment target empty after normalisation");
        return None;
    }

    Some(Attachment { kind, title, target })
}

pub fn resolve_title(ctx: &AttachmentContext<'_>) -> String {
    TITLE_STRATEGIES
        .iter()
        .find_map(|strategy| strategy(ctx))
        .unwrap_or_else(|| UNTITLED_ATTACHMENT.to_string())
}

pub fn resolve_kind(ctx: &AttachmentContext<'_>, title: &str) -> AttachmentKind {
    KIND_STRATEGIES
        .iter()
        .find_map(|strategy| strategy(ctx, title))
        .unwrap_or(AttachmentKind::Link)
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s.trim().to_string())
    }
}

fn title_from_link_text(ctx: &AttachmentContext<'_>) -> Option<String> {
    non_empty(element_text(ctx.link)).filter(|t| !t.to_lowercase().starts_with("attachment"))
}

fn title_from_aria_label(ctx: &AttachmentContext<'_>) -> Option<String> {
    let label = ctx.link.value().attr("aria-label")?;
    non_empty(ARIA_PREFIX_RE.replace(label, "").into_owned())
}

fn title_from_title_elements(ctx: &AttachmentContext<'_>) -> Option<String> {
    TITLE_SELECTORS.iter().find_map(|sel| {
        let el = ctx.block.select(sel).next()?;
        non_empty(element_text(el))
            .or_else(|| el.value().attr("title").and_then(|t| non_empty(t.to_string())))
    })
}

fn title_from_image_alt(ctx: &AttachmentContext<'_>) -> Option<String> {
    let img = ctx.block.select(&IMG_SEL).next()?;
    non_empty(img.value().attr("alt")?.to_string())
}

fn title_from_hosted_url(ctx: &AttachmentContext<'_>) -> Option<String> {
    if !host_matches(ctx.href, "drive.google.com") {
        return None;
    }
    let id = extract_file_id(ctx.href)?;
    let short: String = id.chars().take(8).collect();
    Some(format!("Resource ({}...)", short))
}

fn kind_from_icon(ctx: &AttachmentContext<'_>, _title: &str) -> Option<AttachmentKind> {
    let icon = ctx.block.select(&ICON_SEL).next()?;
    let src = icon.value().attr("src").unwrap_or("").to_lowercase();
    if src.contains("pdf") {
        Some(AttachmentKind::Pdf)
    } else if src.contains("document") {
        Some(AttachmentKind::Document)
    } else if src.contains("video") || src.contains("audio") {
        Some(AttachmentKind::Video)
    } else if src.contains("image") || src.contains("picture") {
        Some(AttachmentKind::Image)
    } else {
        None
    }
}

fn kind_from_type_label(ctx: &AttachmentContext<'_>, _title: &str) -> Option<AttachmentKind> {
    let label = element_text(ctx.block.select(&TYPE_LABEL_SEL).next()?).to_lowercase();
    [
        ("pdf", AttachmentKind::Pdf),
        ("google docs", AttachmentKind::Document),
        ("video", AttachmentKind::Video),
        ("image", AttachmentKind::Image),
        ("audio", AttachmentKind::Video),
    ]
    .into_iter()
    .find(|(key, _)| label.contains(key))
    .map(|(_, kind)| kind)
}

/// Kind implied by a file extension such as ".pdf".
pub fn kind_for_extension(ext: &str) -> Option<AttachmentKind> {
    match ext {
        ".pdf" => Some(AttachmentKind::Pdf),
        ".doc" | ".docx" | ".rtf" | ".odt" => Some(AttachmentKind::Document),
        ".mp4" | ".avi" | ".mov" | ".wmv" | ".mp3" | ".wav" => Some(AttachmentKind::Video),
        ".jpg" | ".jpeg" | ".png" | ".gif" | ".svg" | ".bmp" => Some(AttachmentKind::Image),
        _ => None,
    }
}

fn kind_from_extension(ctx: &AttachmentContext<'_>, _title: &str) -> Option<AttachmentKind> {
    let path = ctx.href.split(['?', '#']).next().unwrap_or("");
    let last_segment = path.rsplit('/').next().unwrap_or("");
    kind_for_extension(&extension(last_segment))
}

fn kind_from_host(ctx: &AttachmentContext<'_>, _title: &str) -> Option<AttachmentKind> {
    if VIDEO_HOSTS.iter().any(|host| host_matches(ctx.href, host)) {
        Some(AttachmentKind::Video)
    } else if host_matches(ctx.href, "docs.google.com") {
        Some(AttachmentKind::Document)
    } else {
        None
    }
}

// Drive links always classify here: the mime hint when present, Document otherwise.
fn kind_from_mime_hint(ctx: &AttachmentContext<'_>, _title: &str) -> Option<AttachmentKind> {
    if !host_matches(ctx.href, "drive.google.com") {
        return None;
    }
    let mime = ctx
        .block
        .select(&MIME_SEL)
        .next()
        .and_then(|el| el.value().attr("data-mime-type"))
        .unwrap_or("")
        .to_lowercase();

    let kind = if mime.contains("pdf") {
        AttachmentKind::Pdf
    } else if mime.contains("video") {
        AttachmentKind::Video
    } else if mime.contains("image") {
        AttachmentKind::Image
    } else {
        AttachmentKind::Document
    };
    Some(kind)
}

fn kind_from_title(_ctx: &AttachmentContext<'_>, title: &str) -> Option<AttachmentKind> {
    let title = title.to_lowercase();
    let has_any = |words: &[&str]| words.iter().any(|w| title.contains(w));
    if has_any(&["pdf"]) {
        Some(AttachmentKind::Pdf)
    } else if has_any(&["video", "recording", "mp4"]) {
        Some(AttachmentKind::Video)
    } else if has_any(&["image", "photo", "png", "jpg"]) {
        Some(AttachmentKind::Image)
    } else if has_any(&["doc", "document", "slide"]) {
        Some(AttachmentKind::Document)
    } else {
        None
    }
}

/// Whether the URL's host is `domain` or one of its subdomains. Unparseable
/// references fall back to a substring check.
pub fn host_matches(href: &str, domain: &str) -> bool {
    match url::Url::parse(href) {
        Ok(parsed) => parsed
            .host_str()
            .map(|host| host == domain || host.ends_with(&format!(".{}", domain)))
            .unwrap_or(false),
        Err(_) => href.contains(domain),
    }
}

fn is_tracking_param(pair: &str) -> bool {
    let key = pair.split('=').next().unwrap_or("");
    key.starts_with("utm_") || key == "fbclid"
}

/// Remove `utm_*` and `fbclid` query parameters, keeping the rest verbatim.
pub fn strip_tracking(href: &str) -> String {
    let (base, fragment) = match href.split_once('#') {
        Some((b, f)) => (b, Some(f)),
        None => (href, None),
    };
    let Some((path, query)) = base.split_once('?') else {
        return href.to_string();
    };

    let kept: Vec<&str> = query
        .split('&')
        .filter(|pair| !pair.is_empty() && !is_tracking_param(pair))
        .collect();

    let mut out = path.to_string();
    if !kept.is_empty() {
        out.push('?');
        out.push_str(&kept.join("&"));
    }
    if let Some(fragment) = fragment {
        out.push('#');
        out.push_str(fragment);
    }
    out
}

/// Canonical form of an attachment reference.
///
/// Tracking parameters are dropped and common escapes decoded; Drive, Docs
/// and YouTube references are rewritten to a single URL keyed only by the
/// resource identifier.
pub fn normalize_target(href: &str) -> String {
    if href.is_empty() {
        return String::new();
    }

    let clean = strip_tracking(href)
        .replace("%20", " ")
        .replace("%2F", "/")
        .replace("%2f", "/");

    if host_matches(&clean, "drive.google.com") {
        if let Some(id) = extract_file_id(&clean) {
            return format!("https://drive.google.com/file/d/{}/view", id);
        }
    } else if host_matches(&clean, "docs.google.com") {
        if let Some(caps) = DOCS_RE.captures(&clean) {
            return format!("https://docs.google.com/{}/d/{}/edit", &caps[1], &caps[2]);
        }
    } else if host_matches(&clean, "youtube.com") || host_matches(&clean, "youtu.be") {
        if let Some(caps) = YOUTUBE_RE.captures(&clean) {
            return format!("https://www.youtube.com/watch?v={}", &caps[1]);
        }
    }

    clean
}
