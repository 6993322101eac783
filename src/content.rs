// Markup -> readable body text.

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Node};

use crate::config::Config;
use crate::normalize::collapse_whitespace;

static BLANK_RUN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").unwrap());
static HSPACE_RUN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[ \t]{2,}").unwrap());

const BLOCK_TAGS: &[&str] = &[
    "div", "li", "ul", "ol", "h1", "h2", "h3", "h4", "h5", "h6", "tr", "blockquote", "pre",
];

/// All descendant text of an element with whitespace collapsed.
pub fn element_text(el: ElementRef<'_>) -> String {
    collapse_whitespace(&el.text().collect::<String>())
}

/// Body text of a content element.
///
/// Line breaks become newlines, paragraphs end with a blank line, bold and
/// italic runs become `**text**` and `*text*`. With `preserve_html` the raw
/// element markup is returned untouched.
pub fn clean_body(el: ElementRef<'_>, config: &Config) -> String {
    if config.preserve_html {
        return el.html();
    }
    let mut raw = String::new();
    render(el, &mut raw);
    tidy(&raw)
}

fn render(el: ElementRef<'_>, out: &mut String) {
    for child in el.children() {
        match child.value() {
            Node::Text(text) => push_text(out, text),
            Node::Element(element) => {
                let Some(child_el) = ElementRef::wrap(child) else {
                    continue;
                };
                match element.name() {
                    "br" => out.push('\n'),
                    "p" => {
                        render(child_el, out);
                        out.push_str("\n\n");
                    }
                    "b" | "strong" => push_marked(out, child_el, "**"),
                    "i" | "em" => push_marked(out, child_el, "*"),
                    "script" | "style" => {}
                    name if BLOCK_TAGS.contains(&name) => {
                        out.push('\n');
                        render(child_el, out);
                        out.push('\n');
                    }
                    _ => render(child_el, out),
                }
            }
            _ => {}
        }
    }
}

fn push_marked(out: &mut String, el: ElementRef<'_>, marker: &str) {
    let text = element_text(el);
    if text.is_empty() {
        return;
    }
    out.push_str(marker);
    out.push_str(&text);
    out.push_str(marker);
}

// Source whitespace inside text nodes is layout, not content.
fn push_text(out: &mut String, text: &str) {
    for ch in text.chars() {
        if ch.is_whitespace() {
            if !(out.is_empty() || out.ends_with(' ') || out.ends_with('\n')) {
                out.push(' ');
            }
        } else {
            out.push(ch);
        }
    }
}

fn tidy(raw: &str) -> String {
    let collapsed = HSPACE_RUN_RE.replace_all(raw, " ");
    let trimmed: Vec<&str> = collapsed.lines().map(str::trim).collect();
    let joined = trimmed.join("\n");
    BLANK_RUN_RE.replace_all(&joined, "\n\n").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use scraper::{Html, Selector};

    fn body_of(html: &str, config: &Config) -> String {
        let doc = Html::parse_fragment(html);
        let sel = Selector::parse("div.body").unwrap();
        let el = doc.select(&sel).next().unwrap();
        clean_body(el, config)
    }

    #[test]
    fn test_formatting_markers() {
        let body = body_of(
            r#"<div class="body">Read <b>chapter 2</b> and <em>take notes</em>.</div>"#,
            &Config::default(),
        );
        assert_eq!(body, "Read **chapter 2** and *take notes*.");
    }

    #[test]
    fn test_breaks_and_paragraphs() {
        let body = body_of(
            "<div class=\"body\"><p>First   paragraph</p><p>Second<br>line two</p>\n\n\n</div>",
            &Config::default(),
        );
        assert_eq!(body, "First paragraph\n\nSecond\nline two");
    }

    #[test]
    fn test_source_indentation_is_collapsed() {
        let body = body_of(
            "<div class=\"body\">\n      Hello\n      world\n    </div>",
            &Config::default(),
        );
        assert_eq!(body, "Hello world");
    }

    #[test]
    fn test_excess_blank_lines_collapse() {
        let body = body_of(
            "<div class=\"body\">a<br><br><br><br>b</div>",
            &Config::default(),
        );
        assert_eq!(body, "a\n\nb");
    }

    #[test]
    fn test_preserve_html() {
        let config = Config {
            preserve_html: true,
            ..Config::default()
        };
        let body = body_of(r#"<div class="body">x <b>y</b></div>"#, &config);
        assert_eq!(body, r#"<div class="body">x <b>y</b></div>"#);
    }

    #[test]
    fn test_element_text() {
        let doc = Html::parse_fragment("<span> John \n <b>Doe</b> </span>");
        let sel = Selector::parse("span").unwrap();
        assert_eq!(element_text(doc.select(&sel).next().unwrap()), "John Doe");
    }
}
