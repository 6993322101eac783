use once_cell::sync::Lazy;
use regex::Regex;

static NON_WORD_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\w\s-]").unwrap());
static WS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Canonical comparison key for file and display names.
///
/// Drops the extension, removes everything except word characters, whitespace
/// and hyphens, collapses whitespace and lowercases. Total and idempotent.
pub fn normalize(name: &str) -> String {
    let stem = strip_extension(name);
    let stripped = NON_WORD_RE.replace_all(stem, "");
    WS_RE.replace_all(&stripped, " ").trim().to_lowercase()
}

/// Name without its final extension. Dots leading the final path component do
/// not start an extension (".hidden" has none).
pub fn strip_extension(name: &str) -> &str {
    match extension_start(name) {
        Some(idx) => &name[..idx],
        None => name,
    }
}

/// Lowercased final extension including the dot, or empty.
pub fn extension(name: &str) -> String {
    match extension_start(name) {
        Some(idx) => name[idx..].to_lowercase(),
        None => String::new(),
    }
}

fn extension_start(name: &str) -> Option<usize> {
    let base_start = name.rfind('/').map(|i| i + 1).unwrap_or(0);
    let base = &name[base_start..];
    let dot = base.rfind('.')?;
    if base[..dot].chars().all(|c| c == '.') {
        return None;
    }
    Some(base_start + dot)
}

/// Collapse runs of whitespace into single spaces and trim.
pub fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_basic() {
        assert_eq!(normalize("Week 3 - Notes (final).PDF"), "week 3 - notes final");
        assert_eq!(normalize("  Lab_Report   v2.docx "), "lab_report v2");
        assert_eq!(normalize(""), "");
    }

    #[test]
    fn test_normalize_idempotent() {
        let samples = [
            "Syllabus Google Docs",
            "notes.pdf.pdf",
            "  Ünïcode ~ title!!.txt",
            ".hidden",
            "a.b c/d.e",
            "---",
        ];
        for s in samples {
            let once = normalize(s);
            assert_eq!(normalize(&once), once, "not idempotent for {:?}", s);
        }
    }

    #[test]
    fn test_strip_extension() {
        assert_eq!(strip_extension("report.final.pdf"), "report.final");
        assert_eq!(strip_extension(".bashrc"), ".bashrc");
        assert_eq!(strip_extension("v1.2/notes"), "v1.2/notes");
        assert_eq!(strip_extension("plain"), "plain");
    }

    #[test]
    fn test_extension() {
        assert_eq!(extension("Slides.PPTX"), ".pptx");
        assert_eq!(extension("README"), "");
    }

    #[test]
    fn test_collapse_whitespace() {
        assert_eq!(collapse_whitespace("  a \n\t b  "), "a b");
    }
}
