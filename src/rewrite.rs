//! Rewriting link targets in the original document.
//!
//! Only quoted `href` values are touched, everything else in the document is
//! kept byte for byte.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use tracing::debug;

use crate::consolidate::ReferenceMap;

static HREF_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)(\shref\s*=\s*)(?:"([^"]*)"|'([^']*)')"#).unwrap());

static AMP_ENTITY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)&(?:amp|#0*38|#x0*26);").unwrap());

/// Undo the ampersand escapes a parser would have decoded, so the lookup key
/// matches the reference extracted from the parsed tree.
fn decode_attr(value: &str) -> String {
    AMP_ENTITY_RE.replace_all(value, "&").into_owned()
}

fn encode_attr(value: &str, quote: char) -> String {
    let encoded = value.replace('&', "&amp;");
    match quote {
        '"' => encoded.replace('"', "&quot;"),
        _ => encoded.replace('\'', "&#39;"),
    }
}

/// Replace every `href` whose target is in `mapping`. Returns the new
/// document and the number of links rewritten.
pub fn rewrite_links(html: &str, mapping: &ReferenceMap) -> (String, usize) {
    let mut count = 0;
    let rewritten = HREF_RE.replace_all(html, |caps: &Captures<'_>| {
        let (value, quote) = match (caps.get(2), caps.get(3)) {
            (Some(v), _) => (v.as_str(), '"'),
            (None, Some(v)) => (v.as_str(), '\''),
            (None, None) => return caps[0].to_string(),
        };

        match mapping.get(&decode_attr(value)) {
            Some(target) => {
                count += 1;
                format!("{}{}{}{}", &caps[1], quote, encode_attr(target, quote), quote)
            }
            None => caps[0].to_string(),
        }
    });

    debug!(count, "links rewritten");
    (rewritten.into_owned(), count)
}
