//! Weekly bucketing of stream items.

use std::collections::{BTreeMap, HashMap};

use chrono::{Datelike, Days, NaiveDate};
use tracing::{debug, info, warn};

use crate::config::{Config, DEFAULT_WEEK_KEY_FORMAT};
use crate::dates;
use crate::model::{StreamItem, WeekBucket};

/// First day of the configured week containing `date`.
pub fn week_start(date: NaiveDate, config: &Config) -> NaiveDate {
    let offset = (7 + date.weekday().num_days_from_monday() - config.week_start.num_days_from_monday()) % 7;
    date.checked_sub_days(Days::new(u64::from(offset))).unwrap_or(date)
}

/// Group items by week.
///
/// Keys are week starts formatted with `week_key_format`; the map iterates in
/// key order. Items whose date does not resolve are left out. Within a
/// bucket, items are newest first and keep their input order on equal dates.
///
/// A format that maps several weeks to one key (`%Y-%m`, say) merges those
/// weeks into one bucket whose label spans all of them. A format that cannot
/// render a date falls back to `%Y-%m-%d`.
pub fn aggregate_by_week(items: &[StreamItem], config: &Config) -> BTreeMap<String, WeekBucket> {
    let mut weeks: BTreeMap<NaiveDate, Vec<(NaiveDate, &StreamItem)>> = BTreeMap::new();
    let mut unresolved = 0;

    for item in items {
        match dates::resolve(&item.date, config) {
            Some(date) => weeks.entry(week_start(date, config)).or_default().push((date, item)),
            None => {
                debug!(id = %item.id, date = %item.date, "date unresolved, item not bucketed");
                unresolved += 1;
            }
        }
    }

    let mut groups: Vec<KeyedWeeks<'_>> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    for (start, dated) in weeks {
        let key = week_key(start, config);
        match index.get(&key) {
            Some(&i) => {
                warn!(key = %key, week = %start, "several weeks share one key, merging them");
                groups[i].last = start;
                groups[i].dated.extend(dated);
            }
            None => {
                index.insert(key.clone(), groups.len());
                groups.push(KeyedWeeks {
                    key,
                    first: start,
                    last: start,
                    dated,
                });
            }
        }
    }

    let mut buckets = BTreeMap::new();
    for (number, mut group) in groups.into_iter().enumerate() {
        group.dated.sort_by(|a, b| b.0.cmp(&a.0));
        let bucket = WeekBucket {
            label: week_label(number + 1, group.first, group.last),
            start: group.first,
            items: group.dated.into_iter().map(|(_, item)| item.clone()).collect(),
        };
        buckets.insert(group.key, bucket);
    }

    info!(weeks = buckets.len(), unresolved, "items grouped by week");
    buckets
}

/// Weeks whose starts render to the same key.
struct KeyedWeeks<'a> {
    key: String,
    first: NaiveDate,
    last: NaiveDate,
    dated: Vec<(NaiveDate, &'a StreamItem)>,
}

fn week_key(start: NaiveDate, config: &Config) -> String {
    config.week_key(start).unwrap_or_else(|| {
        warn!(
            format = %config.week_key_format,
            "week key format cannot render a date, using {}",
            DEFAULT_WEEK_KEY_FORMAT
        );
        start.format(DEFAULT_WEEK_KEY_FORMAT).to_string()
    })
}

fn week_label(number: usize, first: NaiveDate, last: NaiveDate) -> String {
    let end = last.checked_add_days(Days::new(6)).unwrap_or(last);
    format!("Week {} ({} - {})", number, first.format("%b %d"), end.format("%b %d"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ItemKind;
    use chrono::Weekday;

    fn item(id: &str, date: &str) -> StreamItem {
        StreamItem {
            id: id.to_string(),
            kind: ItemKind::Announcement,
            author: "Teacher".to_string(),
            date: date.to_string(),
            deleted: false,
            body: String::new(),
            attachments: Vec::new(),
        }
    }

    fn ids(bucket: &WeekBucket) -> Vec<&str> {
        bucket.items.iter().map(|i| i.id.as_str()).collect()
    }

    #[test]
    fn test_monday_weeks() {
        let items = vec![
            item("mon", "2023-09-18"),
            item("sun", "2023-09-24"),
            item("next", "2023-09-25"),
        ];
        let weeks = aggregate_by_week(&items, &Config::default());

        let keys: Vec<&str> = weeks.keys().map(String::as_str).collect();
        assert_eq!(keys, ["2023-09-18", "2023-09-25"]);
        assert_eq!(ids(&weeks["2023-09-18"]), ["sun", "mon"]);
        assert_eq!(ids(&weeks["2023-09-25"]), ["next"]);
        assert_eq!(weeks["2023-09-18"].label, "Week 1 (Sep 18 - Sep 24)");
        assert_eq!(weeks["2023-09-25"].label, "Week 2 (Sep 25 - Oct 01)");
    }

    #[test]
    fn test_sunday_start() {
        let config = Config {
            week_start: Weekday::Sun,
            ..Config::default()
        };
        let items = vec![item("sat", "2023-09-23"), item("sun", "2023-09-24")];
        let weeks = aggregate_by_week(&items, &config);

        let keys: Vec<&str> = weeks.keys().map(String::as_str).collect();
        assert_eq!(keys, ["2023-09-17", "2023-09-24"]);
    }

    #[test]
    fn test_unresolved_dates_are_excluded() {
        let items = vec![item("a", "someday"), item("b", ""), item("c", "21 Sept 2023")];
        let weeks = aggregate_by_week(&items, &Config::default());
        assert_eq!(weeks.len(), 1);
        assert_eq!(ids(&weeks["2023-09-18"]), ["c"]);
    }

    #[test]
    fn test_equal_dates_keep_input_order() {
        let items = vec![
            item("first", "2023-09-19"),
            item("second", "19 Sep 2023"),
            item("newest", "2023-09-20"),
        ];
        let weeks = aggregate_by_week(&items, &Config::default());
        assert_eq!(ids(&weeks["2023-09-18"]), ["newest", "first", "second"]);
    }

    #[test]
    fn test_custom_key_format() {
        let config = Config {
            week_key_format: "%G-W%V".to_string(),
            ..Config::default()
        };
        let weeks = aggregate_by_week(&[item("a", "2023-09-20")], &config);
        assert!(weeks.contains_key("2023-W38"));
    }

    #[test]
    fn test_unrenderable_key_format_falls_back() {
        let config = Config {
            week_key_format: "%Q".to_string(),
            ..Config::default()
        };
        let weeks = aggregate_by_week(&[item("a", "2023-09-04")], &config);

        let keys: Vec<&str> = weeks.keys().map(String::as_str).collect();
        assert_eq!(keys, ["2023-09-04"]);
        assert_eq!(ids(&weeks["2023-09-04"]), ["a"]);
    }

    #[test]
    fn test_weeks_sharing_a_key_are_merged() {
        let config = Config {
            week_key_format: "%Y-%m".to_string(),
            ..Config::default()
        };
        let items = vec![
            item("early", "2023-09-04"),
            item("late", "2023-09-18"),
            item("october", "2023-10-02"),
        ];
        let weeks = aggregate_by_week(&items, &config);

        let keys: Vec<&str> = weeks.keys().map(String::as_str).collect();
        assert_eq!(keys, ["2023-09", "2023-10"]);
        assert_eq!(ids(&weeks["2023-09"]), ["late", "early"]);
        assert_eq!(weeks["2023-09"].label, "Week 1 (Sep 04 - Sep 24)");
        assert_eq!(weeks["2023-09"].start, NaiveDate::from_ymd_opt(2023, 9, 4).unwrap());
        assert_eq!(weeks["2023-10"].label, "Week 2 (Oct 02 - Oct 08)");

        let total: usize = weeks.values().map(|w| w.items.len()).sum();
        assert_eq!(total, items.len());
    }

    #[test]
    fn test_empty_input() {
        assert!(aggregate_by_week(&[], &Config::default()).is_empty());
    }

    #[test]
    fn test_week_start_every_weekday() {
        let config = Config::default();
        let monday = NaiveDate::from_ymd_opt(2023, 9, 18).unwrap();
        for offset in 0..7 {
            let day = monday + Days::new(offset);
            assert_eq!(week_start(day, &config), monday);
        }
    }
}
