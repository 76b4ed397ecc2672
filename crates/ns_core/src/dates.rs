use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, NaiveDate};
use lazy_static::lazy_static;
use regex::Regex;
use tracing::warn;

use crate::types::NewsItem;

pub const DATE_FORMAT: &str = "%d.%m.%Y";

/// Abbreviated month names as they appear in search result bylines.
pub const MONTHS: [(&str, u32); 12] = [
    ("янв", 1),
    ("фев", 2),
    ("мар", 3),
    ("апр", 4),
    ("май", 5),
    ("июн", 6),
    ("июл", 7),
    ("авг", 8),
    ("сен", 9),
    ("окт", 10),
    ("ноя", 11),
    ("дек", 12),
];

lazy_static! {
    // "5 мар 2024, 14:30" or "5 мар, 14:30"
    static ref DATE_PATTERN: Regex =
        Regex::new(r"(\d{1,2})\s(\w{3})\s*(\d{4})?,\s*(\d{2}:\d{2})").expect("valid date pattern");
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DateSource {
    Parsed,
    /// The text did not parse and today's date was used instead. The
    /// article's real date is lost; `raw` keeps what was seen.
    Fallback { raw: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedDate {
    pub date: NaiveDate,
    pub source: DateSource,
}

impl NormalizedDate {
    pub fn formatted(&self) -> String {
        format_date(self.date)
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self.source, DateSource::Fallback { .. })
    }

    pub fn raw(&self) -> Option<&str> {
        match &self.source {
            DateSource::Parsed => None,
            DateSource::Fallback { raw } => Some(raw),
        }
    }
}

pub fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

pub fn parse_date(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), DATE_FORMAT).ok()
}

fn month_number(abbreviation: &str) -> Option<u32> {
    let lower = abbreviation.to_lowercase();
    // genitive form of "май"
    if lower == "мая" {
        return Some(5);
    }
    MONTHS
        .iter()
        .find(|(name, _)| *name == lower)
        .map(|(_, number)| *number)
}

/// Turns a byline like `"5 мар 2024, 14:30"` into a calendar date.
///
/// A missing year means `today`'s year. Anything that does not parse falls
/// back to `today` and is reported as [`DateSource::Fallback`].
pub fn normalize(raw: &str, today: NaiveDate) -> NormalizedDate {
    match parse_byline(raw, today.year()) {
        Some(date) => NormalizedDate {
            date,
            source: DateSource::Parsed,
        },
        None => {
            warn!("📅 Could not parse date {:?}, using {}", raw, format_date(today));
            NormalizedDate {
                date: today,
                source: DateSource::Fallback {
                    raw: raw.to_string(),
                },
            }
        }
    }
}

fn parse_byline(raw: &str, current_year: i32) -> Option<NaiveDate> {
    let captures = DATE_PATTERN.captures(raw)?;
    let day: u32 = captures.get(1)?.as_str().parse().ok()?;
    let month_text = captures.get(2)?.as_str();
    let month = month_number(month_text).unwrap_or_else(|| {
        warn!("📅 Unknown month {:?} in {:?}, assuming January", month_text, raw);
        1
    });
    let year = match captures.get(3) {
        Some(year) => year.as_str().parse().ok()?,
        None => current_year,
    };
    NaiveDate::from_ymd_opt(year, month, day)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    Ascending,
    Descending,
}

impl SortOrder {
    pub fn is_ascending(self) -> bool {
        self == SortOrder::Ascending
    }
}

impl FromStr for SortOrder {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "asc" | "ascending" => Ok(SortOrder::Ascending),
            "desc" | "descending" => Ok(SortOrder::Descending),
            other => Err(format!("Invalid sort order: {}", other)),
        }
    }
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SortOrder::Ascending => write!(f, "asc"),
            SortOrder::Descending => write!(f, "desc"),
        }
    }
}

/// Stable sort by the `DD.MM.YYYY` date of each item.
///
/// Equal dates keep their insertion order in both directions. Items whose
/// date does not parse go after every dated item.
pub fn sort_by_date(items: &mut [NewsItem], order: SortOrder) {
    let mut keys: Vec<(Option<NaiveDate>, usize)> = Vec::with_capacity(items.len());
    for (index, item) in items.iter().enumerate() {
        let date = parse_date(&item.date);
        if date.is_none() {
            warn!("📅 News item {:?} has unparseable date {:?}", item.title, item.date);
        }
        keys.push((date, index));
    }

    keys.sort_by(|(a, _), (b, _)| match (a, b) {
        (Some(a), Some(b)) if order.is_ascending() => a.cmp(b),
        (Some(a), Some(b)) => b.cmp(a),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    });

    let sorted: Vec<NewsItem> = keys.iter().map(|(_, index)| items[*index].clone()).collect();
    for (slot, item) in items.iter_mut().zip(sorted) {
        *slot = item;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 15).unwrap()
    }

    fn item(title: &str, date: &str) -> NewsItem {
        NewsItem::new(title, "text", date, "https://example.com")
    }

    fn titles(items: &[NewsItem]) -> Vec<&str> {
        items.iter().map(|i| i.title.as_str()).collect()
    }

    #[test]
    fn test_normalize_with_year() {
        let date = normalize("Экономика, 5 мар 2023, 14:30", today());
        assert_eq!(date.formatted(), "05.03.2023");
        assert_eq!(date.source, DateSource::Parsed);
    }

    #[test]
    fn test_normalize_without_year_uses_current_year() {
        let date = normalize("Политика, 12 ноя, 09:05", today());
        assert_eq!(date.formatted(), "12.11.2024");
        assert!(!date.is_fallback());
    }

    #[test]
    fn test_normalize_month_is_case_insensitive() {
        assert_eq!(normalize("1 Дек 2022, 10:00", today()).formatted(), "01.12.2022");
        assert_eq!(normalize("9 мая 2021, 10:00", today()).formatted(), "09.05.2021");
    }

    #[test]
    fn test_normalize_unknown_month_assumes_january() {
        let date = normalize("3 xyz 2022, 10:00", today());
        assert_eq!(date.formatted(), "03.01.2022");
    }

    #[test]
    fn test_normalize_falls_back_to_today() {
        let date = normalize("вчера", today());
        assert_eq!(date.formatted(), "15.06.2024");
        assert!(date.is_fallback());
        assert_eq!(date.raw(), Some("вчера"));

        // impossible calendar date
        let date = normalize("31 фев 2024, 10:00", today());
        assert!(date.is_fallback());
    }

    #[test]
    fn test_parse_date_accepts_short_day() {
        assert_eq!(parse_date("5.03.2024"), NaiveDate::from_ymd_opt(2024, 3, 5));
        assert_eq!(parse_date("05.03.2024"), NaiveDate::from_ymd_opt(2024, 3, 5));
        assert_eq!(parse_date("2024-03-05"), None);
    }

    #[test]
    fn test_sort_by_date_both_directions() {
        let mut items = vec![item("A", "01.01.2024"), item("B", "02.01.2024")];
        sort_by_date(&mut items, SortOrder::Ascending);
        assert_eq!(titles(&items), vec!["A", "B"]);

        sort_by_date(&mut items, SortOrder::Descending);
        assert_eq!(titles(&items), vec!["B", "A"]);
    }

    #[test]
    fn test_sort_by_date_is_stable() {
        let mut items = vec![
            item("late", "03.02.2024"),
            item("tie-1", "01.01.2024"),
            item("early", "31.12.2023"),
            item("tie-2", "01.01.2024"),
            item("tie-3", "1.01.2024"),
        ];

        let mut ascending = items.clone();
        sort_by_date(&mut ascending, SortOrder::Ascending);
        assert_eq!(titles(&ascending), vec!["early", "tie-1", "tie-2", "tie-3", "late"]);

        sort_by_date(&mut items, SortOrder::Descending);
        assert_eq!(titles(&items), vec!["late", "tie-1", "tie-2", "tie-3", "early"]);
    }

    #[test]
    fn test_sort_by_date_puts_unparseable_last() {
        let mut items = vec![
            item("broken", "someday"),
            item("B", "02.01.2024"),
            item("A", "01.01.2024"),
        ];
        sort_by_date(&mut items, SortOrder::Descending);
        assert_eq!(titles(&items), vec!["B", "A", "broken"]);

        sort_by_date(&mut items, SortOrder::Ascending);
        assert_eq!(titles(&items), vec!["A", "B", "broken"]);
    }

    #[test]
    fn test_sort_order_from_str() {
        assert_eq!("asc".parse::<SortOrder>().unwrap(), SortOrder::Ascending);
        assert_eq!("Descending".parse::<SortOrder>().unwrap(), SortOrder::Descending);
        assert!("sideways".parse::<SortOrder>().is_err());
    }
}
