use std::fmt::Write;
use std::fs;
use std::path::Path;

use chrono::{NaiveDate, Weekday};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Week key format used when none is configured or the configured one cannot
/// render a date.
pub const DEFAULT_WEEK_KEY_FORMAT: &str = "%Y-%m-%d";

/// Explicit date formats tried before any fuzzy parsing, in order.
pub const DEFAULT_DATE_FORMATS: &[&str] = &[
    "%d %b %Y",  // 21 Sep 2023
    "%b %d, %Y", // Sep 21, 2023
    "%d.%m.%Y",  // 21.09.2023
    "%d/%m/%Y",  // 21/09/2023
    "%Y-%m-%d",  // 2023-09-21
    "%d %B %Y",  // 21 September 2023
    "%B %d, %Y", // September 21, 2023
];

/// Settings threaded through the date resolver, the aggregator and the body
/// cleaner. Loaded from `.classfeed.toml` when present.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    /// First day of a week bucket.
    pub week_start: Weekday,
    /// chrono format used for week keys.
    pub week_key_format: String,
    pub date_formats: Vec<String>,
    /// Year assumed for dates like "21 Sept". Unset leaves them unresolved.
    pub default_year: Option<i32>,
    /// Keep the raw markup of a body instead of cleaned text.
    pub preserve_html: bool,
    /// Reserved for collaborators that check attachment URLs. Nothing in this
    /// crate reads it.
    pub validate_urls: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            week_start: Weekday::Mon,
            week_key_format: DEFAULT_WEEK_KEY_FORMAT.to_string(),
            date_formats: DEFAULT_DATE_FORMATS.iter().map(|s| s.to_string()).collect(),
            default_year: None,
            preserve_html: false,
            validate_urls: false,
        }
    }
}

impl Config {
    /// Load a config file, falling back to defaults when it does not exist.
    pub fn load(path: &Path) -> Result<Config> {
        if !path.exists() {
            return Ok(Config::default());
        }
        let content = fs::read_to_string(path).map_err(|source| Error::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Config = toml::from_str(&content).map_err(|source| Error::Config {
            path: path.to_path_buf(),
            source,
        })?;
        if config.week_key(NaiveDate::default()).is_none() {
            return Err(Error::WeekKeyFormat {
                path: path.to_path_buf(),
                format: config.week_key_format,
            });
        }
        Ok(config)
    }

    /// Render the key of the week starting on `start`. `None` when
    /// `week_key_format` has an unknown specifier or one a bare date cannot
    /// fill, such as a time or an offset.
    pub fn week_key(&self, start: NaiveDate) -> Option<String> {
        let mut key = String::new();
        write!(key, "{}", start.format(&self.week_key_format)).ok()?;
        Some(key)
    }
}
