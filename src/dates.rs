//! Free-text date resolution.
//!
//! Each string goes through a cascade: prefix cleanup, "Week of" unwrapping,
//! the configured explicit formats, a token-based fuzzy parse with month-name
//! localisation, and finally a (day, month-name, year) regex. Anything that
//! survives none of them is unresolved; nothing here returns an error.

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use crate::config::Config;

static PREFIX_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)^\s*(?:assignment:|announcement:|created|posted|due:?|edited)\s*"#).unwrap()
});
static PAREN_SUFFIX_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s*\(.*?\)$").unwrap());
static WEEK_OF_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)week of\s+(.+)").unwrap());
static TRIPLE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d{1,2})\s+(\w{3,})\s+(\d{4})").unwrap());

static DATE_SHAPES: Lazy<[Regex; 4]> = Lazy::new(|| {
    [
        Regex::new(r"\d{1,2}\s+\w{3,9}\s+\d{4}").unwrap(),  // 27 Feb 2023
        Regex::new(r"\w{3,9}\s+\d{1,2},?\s+\d{4}").unwrap(), // Feb 27, 2023
        Regex::new(r"\d{1,2}[./]\d{1,2}[./]\d{4}").unwrap(), // 27/02/2023, 27.02.2023
        Regex::new(r"\d{4}-\d{1,2}-\d{1,2}").unwrap(),      // 2023-02-27
    ]
});

/// Finnish month stems, optionally inflected, mapped to English abbreviations.
static LOCALE_MONTHS: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    [
        ("tammi", "Jan"),
        ("helmi", "Feb"),
        ("maalis", "Mar"),
        ("huhti", "Apr"),
        ("touko", "May"),
        ("kesä", "Jun"),
        ("heinä", "Jul"),
        ("elo", "Aug"),
        ("syys", "Sep"),
        ("loka", "Oct"),
        ("marras", "Nov"),
        ("joulu", "Dec"),
    ]
    .into_iter()
    .map(|(stem, eng)| {
        let re = Regex::new(&format!(r"(?i)\b{}(?:kuuta|kuussa|kuu)?\b", stem)).unwrap();
        (re, eng)
    })
    .collect()
});

const MONTHS: [(&str, &str); 12] = [
    ("jan", "january"),
    ("feb", "february"),
    ("mar", "march"),
    ("apr", "april"),
    ("may", "may"),
    ("jun", "june"),
    ("jul", "july"),
    ("aug", "august"),
    ("sep", "september"),
    ("oct", "october"),
    ("nov", "november"),
    ("dec", "december"),
];

/// Whether text has one of the four structural date shapes once leading
/// "Created"/"Posted"/"Due"-style prefixes are removed.
pub fn looks_like_date(text: &str) -> bool {
    let clean = PREFIX_RE.replace(text, "");
    DATE_SHAPES.iter().any(|re| re.is_match(&clean))
}

/// Date text as stored on a stream item: prefixes, quotes and a trailing
/// parenthetical removed, "Week of X" reduced to X.
pub fn clean_date_text(text: &str) -> String {
    let cleaned = strip_decorations(text);
    match week_of(&cleaned) {
        Some(rest) => rest.to_string(),
        None => cleaned,
    }
}

fn strip_decorations(text: &str) -> String {
    let mut s = text.replace('"', "");
    loop {
        let next = PREFIX_RE.replace(&s, "").into_owned();
        if next == s {
            break;
        }
        s = next;
    }
    PAREN_SUFFIX_RE.replace(&s, "").trim().to_string()
}

fn week_of(text: &str) -> Option<&str> {
    WEEK_OF_RE
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim())
        .filter(|rest| !rest.is_empty())
}

/// Resolve a free-text date to a calendar date.
pub fn resolve(text: &str, config: &Config) -> Option<NaiveDate> {
    if text.trim().is_empty() {
        return None;
    }

    let cleaned = strip_decorations(text);
    if let Some(rest) = week_of(&cleaned) {
        return resolve(rest, config);
    }

    let resolved = parse_explicit(&cleaned, config)
        .or_else(|| parse_fuzzy(&localize_months(&cleaned), config))
        .or_else(|| parse_triple(&cleaned));

    if resolved.is_none() {
        debug!(date = text, "all date strategies failed");
    }
    resolved
}

fn parse_explicit(text: &str, config: &Config) -> Option<NaiveDate> {
    config
        .date_formats
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(text, fmt).ok())
}

/// Replace localised month names with English abbreviations.
pub fn localize_months(text: &str) -> String {
    let mut out = text.to_string();
    for (re, eng) in LOCALE_MONTHS.iter() {
        if re.is_match(&out) {
            out = re.replace_all(&out, *eng).into_owned();
        }
    }
    out
}

fn month_from_token(token: &str) -> Option<u32> {
    let t = token.to_lowercase();
    if t == "sept" {
        return Some(9);
    }
    MONTHS
        .iter()
        .position(|(abbr, full)| t == *abbr || t == *full)
        .map(|i| i as u32 + 1)
}

fn month_from_prefix(token: &str) -> Option<u32> {
    let prefix: String = token.chars().take(3).collect::<String>().to_lowercase();
    MONTHS
        .iter()
        .position(|(abbr, _)| prefix == *abbr)
        .map(|i| i as u32 + 1)
}

/// Pick a month name, a day and a year out of arbitrary surrounding words.
/// Clock times are ignored; a missing year falls back to the configured
/// default year. Two different month names make the text ambiguous and it is
/// left to the later strategies.
fn parse_fuzzy(text: &str, config: &Config) -> Option<NaiveDate> {
    let mut month = None;
    let mut day = None;
    let mut year = None;

    let tokens = text
        .split_whitespace()
        .filter(|word| !word.contains(':'))
        .flat_map(|word| word.split(|c: char| !c.is_alphanumeric()))
        .filter(|t| !t.is_empty());

    for token in tokens {
        let digits = token.trim_end_matches(|c: char| c.is_alphabetic());
        let is_numeric = !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit());
        if is_numeric {
            let suffix = &token[digits.len()..];
            let ordinal = suffix.is_empty() || matches!(suffix.to_lowercase().as_str(), "st" | "nd" | "rd" | "th");
            if !ordinal {
                continue;
            }
            let value: u32 = match digits.parse() {
                Ok(v) => v,
                Err(_) => continue,
            };
            if digits.len() == 4 && year.is_none() && suffix.is_empty() {
                year = Some(value as i32);
            } else if digits.len() <= 2 && (1..=31).contains(&value) && day.is_none() {
                day = Some(value);
            }
        } else if let Some(found) = month_from_token(token) {
            match month {
                None => month = Some(found),
                Some(seen) if seen != found => return None,
                Some(_) => {}
            }
        }
    }

    let year = year.or(config.default_year)?;
    NaiveDate::from_ymd_opt(year, month?, day?)
}

fn parse_triple(text: &str) -> Option<NaiveDate> {
    let caps = TRIPLE_RE.captures(text)?;
    let day: u32 = caps[1].parse().ok()?;
    let month = month_from_prefix(&caps[2])?;
    let year: i32 = caps[3].parse().ok()?;
    NaiveDate::from_ymd_opt(year, month, day)
}
