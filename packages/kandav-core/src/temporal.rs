/// Temporal tag extraction from task text.
///
/// Tasks carry `@` tokens (`@2026-03-02`, `@kw10`, `@09:00-10:30`, weekday
/// names) and `#` hash tags. Each `@` token parses into a [`TemporalTag`];
/// [`resolve_schedule`] combines a task's tags into the single schedule the
/// calendar layer derives an item from.
use std::sync::OnceLock;

use chrono::{Datelike, NaiveDate, NaiveTime, Weekday};
use regex::Regex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

/// One parsed `@` token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TemporalTag {
    pub date: Option<NaiveDate>,
    /// ISO week as (year, week number).
    pub week: Option<(i32, u32)>,
    pub weekday: Option<Weekday>,
    pub has_explicit_date: bool,
    pub time_range: Option<TimeRange>,
}

impl TemporalTag {
    fn is_empty(&self) -> bool {
        self.date.is_none()
            && self.week.is_none()
            && self.weekday.is_none()
            && self.time_range.is_none()
    }
}

/// A task's combined schedule, resolved from all of its temporal tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Schedule {
    /// Explicit date with a time-of-day range.
    Timed { date: NaiveDate, range: TimeRange },
    /// Explicit date, no time of day.
    AllDay { date: NaiveDate },
    /// Week tag without a weekday: Monday of the ISO week.
    Week { monday: NaiveDate },
}

fn at_token_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)(?:^|\s)(@[^\s]+)").expect("valid temporal token regex"))
}

fn hash_tag_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)(?:^|\s)(#[^\s#@]+)").expect("valid hash tag regex"))
}

fn date_ymd_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(\d{4})[./-](\d{1,2})[./-](\d{1,2})$").expect("valid ymd regex")
    })
}

fn date_dmy_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(\d{1,2})[./-](\d{1,2})[./-](\d{4})$").expect("valid dmy regex")
    })
}

fn iso_week_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(\d{4})[-_/ ]w(\d{1,2})$").expect("valid iso week regex"))
}

fn week_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(?:(\d{4})[-_/ ]?)?(?:kw|w|week)(\d{1,2})$").expect("valid week regex")
    })
}

fn time_range_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(\d{1,2}):(\d{2})-(\d{1,2}):(\d{2})$").expect("valid time range regex")
    })
}

/// Extract all temporal tags from task text. Tokens that parse to nothing
/// recognizable are skipped.
pub fn extract_temporal_tags(text: &str) -> Vec<TemporalTag> {
    let mut tags = Vec::new();
    for caps in at_token_regex().captures_iter(text) {
        if let Some(raw) = caps.get(1).map(|m| m.as_str()) {
            let token = raw
                .trim_end_matches(|c: char| ",.;)".contains(c))
                .trim_start_matches('@')
                .to_ascii_lowercase();
            let tag = parse_token(&token);
            if !tag.is_empty() {
                tags.push(tag);
            }
        }
    }
    tags
}

/// Extract `#` hash tags (without normalizing case away — CATEGORIES keep
/// the author's spelling, minus the `#`).
pub fn extract_hash_tags(text: &str) -> Vec<String> {
    let mut tags = Vec::new();
    for caps in hash_tag_regex().captures_iter(text) {
        if let Some(raw) = caps.get(1).map(|m| m.as_str()) {
            let tag = raw
                .trim_end_matches(|c: char| ",.;)".contains(c))
                .trim_start_matches('#')
                .to_string();
            if !tag.is_empty() && !tags.contains(&tag) {
                tags.push(tag);
            }
        }
    }
    tags
}

/// Remove all `@` tokens from text, collapsing the whitespace they leave
/// behind. Used for the visible calendar summary.
pub fn strip_temporal_tokens(text: &str) -> String {
    let stripped = at_token_regex().replace_all(text, "");
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn parse_token(token: &str) -> TemporalTag {
    let mut tag = TemporalTag::default();
    if token.is_empty() {
        return tag;
    }

    if let Some(caps) = time_range_regex().captures(token) {
        let parse_time = |h: &str, m: &str| {
            let hour: u32 = h.parse().ok()?;
            let minute: u32 = m.parse().ok()?;
            NaiveTime::from_hms_opt(hour, minute, 0)
        };
        if let (Some(start), Some(end)) = (
            parse_time(&caps[1], &caps[2]),
            parse_time(&caps[3], &caps[4]),
        ) {
            tag.time_range = Some(TimeRange { start, end });
            return tag;
        }
    }

    if let Some(caps) = date_ymd_regex().captures(token) {
        let date = NaiveDate::from_ymd_opt(
            caps[1].parse().unwrap_or(0),
            caps[2].parse().unwrap_or(0),
            caps[3].parse().unwrap_or(0),
        );
        if date.is_some() {
            tag.date = date;
            tag.has_explicit_date = true;
            return tag;
        }
    }

    if let Some(caps) = date_dmy_regex().captures(token) {
        let date = NaiveDate::from_ymd_opt(
            caps[3].parse().unwrap_or(0),
            caps[2].parse().unwrap_or(0),
            caps[1].parse().unwrap_or(0),
        );
        if date.is_some() {
            tag.date = date;
            tag.has_explicit_date = true;
            return tag;
        }
    }

    if let Some(caps) = iso_week_regex().captures(token) {
        if let (Ok(year), Ok(week)) = (caps[1].parse::<i32>(), caps[2].parse::<u32>()) {
            if NaiveDate::from_isoywd_opt(year, week, Weekday::Mon).is_some() {
                tag.week = Some((year, week));
                return tag;
            }
        }
    }

    if let Some(caps) = week_regex().captures(token) {
        let year = caps
            .get(1)
            .and_then(|m| m.as_str().parse::<i32>().ok())
            .unwrap_or_else(|| chrono::Local::now().date_naive().year());
        if let Ok(week) = caps[2].parse::<u32>() {
            if NaiveDate::from_isoywd_opt(year, week, Weekday::Mon).is_some() {
                tag.week = Some((year, week));
                return tag;
            }
        }
    }

    if let Some(weekday) = parse_weekday(token) {
        tag.weekday = Some(weekday);
        return tag;
    }

    tag
}

fn parse_weekday(token: &str) -> Option<Weekday> {
    match token {
        "mon" | "monday" | "mo" | "montag" => Some(Weekday::Mon),
        "tue" | "tues" | "tuesday" | "tu" | "di" | "dienstag" => Some(Weekday::Tue),
        "wed" | "wednesday" | "we" | "mi" | "mittwoch" => Some(Weekday::Wed),
        "thu" | "thur" | "thursday" | "th" | "do" | "donnerstag" => Some(Weekday::Thu),
        "fri" | "friday" | "fr" | "freitag" => Some(Weekday::Fri),
        "sat" | "saturday" | "sa" | "samstag" => Some(Weekday::Sat),
        "sun" | "sunday" | "su" | "so" | "sonntag" => Some(Weekday::Sun),
        _ => None,
    }
}

/// Combine a task's tags into one schedule.
///
/// An explicit date wins; a week tag with a weekday resolves to that day of
/// the week; a week tag alone resolves to the week span. A time range only
/// applies together with a resolved single date. Tasks whose tags resolve to
/// nothing (weekday alone, time range alone) carry no schedule.
pub fn resolve_schedule(tags: &[TemporalTag]) -> Option<Schedule> {
    let date = tags.iter().find_map(|t| t.date);
    let week = tags.iter().find_map(|t| t.week);
    let weekday = tags.iter().find_map(|t| t.weekday);
    let range = tags.iter().find_map(|t| t.time_range);

    let resolved_date = date.or_else(|| {
        week.and_then(|(year, number)| {
            weekday.and_then(|wd| NaiveDate::from_isoywd_opt(year, number, wd))
        })
    });

    if let Some(date) = resolved_date {
        return Some(match range {
            Some(range) => Schedule::Timed { date, range },
            None => Schedule::AllDay { date },
        });
    }

    if let Some((year, number)) = week {
        let monday = NaiveDate::from_isoywd_opt(year, number, Weekday::Mon)?;
        return Some(Schedule::Week { monday });
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_date_with_range() {
        let tags = extract_temporal_tags("Ship @2026-03-02 @09:00-10:30");
        assert_eq!(tags.len(), 2);
        let schedule = resolve_schedule(&tags).unwrap();
        assert_eq!(
            schedule,
            Schedule::Timed {
                date: NaiveDate::from_ymd_opt(2026, 3, 2).unwrap(),
                range: TimeRange {
                    start: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
                    end: NaiveTime::from_hms_opt(10, 30, 0).unwrap(),
                },
            }
        );
    }

    #[test]
    fn test_week_tag() {
        let tags = extract_temporal_tags("Plan @2026kw10");
        let schedule = resolve_schedule(&tags).unwrap();
        assert_eq!(
            schedule,
            Schedule::Week {
                monday: NaiveDate::from_ymd_opt(2026, 3, 2).unwrap(),
            }
        );
    }

    #[test]
    fn test_week_tag_with_weekday() {
        let tags = extract_temporal_tags("Review @2026kw10 @friday");
        let schedule = resolve_schedule(&tags).unwrap();
        assert_eq!(
            schedule,
            Schedule::AllDay {
                date: NaiveDate::from_ymd_opt(2026, 3, 6).unwrap(),
            }
        );
    }

    #[test]
    fn test_dmy_date() {
        let tags = extract_temporal_tags("Pay rent @01.04.2026");
        let schedule = resolve_schedule(&tags).unwrap();
        assert_eq!(
            schedule,
            Schedule::AllDay {
                date: NaiveDate::from_ymd_opt(2026, 4, 1).unwrap(),
            }
        );
    }

    #[test]
    fn test_unresolvable_tags() {
        assert!(resolve_schedule(&extract_temporal_tags("Call back @friday")).is_none());
        assert!(resolve_schedule(&extract_temporal_tags("Standup @09:00-09:15")).is_none());
        assert!(resolve_schedule(&extract_temporal_tags("No tags at all")).is_none());
    }

    #[test]
    fn test_hash_tags() {
        let tags = extract_hash_tags("Plan launch #roadmap #Q1, more text");
        assert_eq!(tags, vec!["roadmap".to_string(), "Q1".to_string()]);
    }

    #[test]
    fn test_strip_temporal_tokens() {
        assert_eq!(
            strip_temporal_tokens("Ship @2026-03-02 release @09:00-10:30"),
            "Ship release"
        );
    }

    #[test]
    fn test_trailing_punctuation() {
        let tags = extract_temporal_tags("Done by @2026-05-01.");
        assert_eq!(
            tags[0].date,
            NaiveDate::from_ymd_opt(2026, 5, 1)
        );
    }
}
