/// iCalendar 2.0 serialization.
///
/// Wire rules that real clients depend on: CRLF line endings, content lines
/// folded at 75 octets with a single-space continuation, TEXT values with
/// `\ ; ,` and newlines backslash-escaped. The feed is read-only, so
/// DTSTAMP carries a fixed placeholder instead of a generation timestamp.
use super::{CalTime, CalendarItem, ItemKind, ItemStatus};

pub const PRODID: &str = "-//kandav//kandav 0.1//EN";

/// Fixed DTSTAMP for every serialized component.
pub const DTSTAMP: &str = "19700101T000000Z";

const FOLD_LIMIT: usize = 75;

/// Escape a TEXT value per RFC 5545 §3.3.11.
pub fn escape_text(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            ';' => out.push_str("\\;"),
            ',' => out.push_str("\\,"),
            '\n' => out.push_str("\\n"),
            '\r' => {}
            _ => out.push(ch),
        }
    }
    out
}

/// Fold one content line at 75 octets, breaking on UTF-8 boundaries.
/// Continuation lines begin with a single space that counts toward the
/// limit of the following segment.
pub fn fold_line(line: &str) -> String {
    if line.len() <= FOLD_LIMIT {
        return line.to_string();
    }

    let mut out = String::with_capacity(line.len() + line.len() / FOLD_LIMIT * 3);
    let mut limit = FOLD_LIMIT;
    let mut used = 0;
    for ch in line.chars() {
        let width = ch.len_utf8();
        if used + width > limit {
            out.push_str("\r\n ");
            limit = FOLD_LIMIT - 1;
            used = 0;
        }
        out.push(ch);
        used += width;
    }
    out
}

fn push_line(out: &mut String, line: &str) {
    out.push_str(&fold_line(line));
    out.push_str("\r\n");
}

fn format_time(time: &CalTime) -> String {
    match time {
        CalTime::Date(d) => d.format("%Y%m%d").to_string(),
        CalTime::DateTime(dt) => dt.format("%Y%m%dT%H%M%S").to_string(),
    }
}

fn push_time_prop(out: &mut String, prop: &str, time: &CalTime) {
    match time {
        CalTime::Date(_) => push_line(out, &format!("{};VALUE=DATE:{}", prop, format_time(time))),
        CalTime::DateTime(_) => push_line(out, &format!("{}:{}", prop, format_time(time))),
    }
}

/// Serialize one component (VEVENT or VTODO), without the calendar wrapper.
pub fn component_to_ics(item: &CalendarItem) -> String {
    let name = match item.kind {
        ItemKind::Event => "VEVENT",
        ItemKind::Todo => "VTODO",
    };

    let mut out = String::new();
    push_line(&mut out, &format!("BEGIN:{}", name));
    push_line(&mut out, &format!("UID:{}", item.uid));
    push_line(&mut out, &format!("DTSTAMP:{}", DTSTAMP));
    push_line(&mut out, &format!("SUMMARY:{}", escape_text(&item.summary)));

    if let Some(start) = &item.start {
        push_time_prop(&mut out, "DTSTART", start);
    }
    if let Some(end) = &item.end {
        push_time_prop(&mut out, "DTEND", end);
    }
    if item.kind == ItemKind::Todo {
        if let Some(due) = &item.due {
            push_time_prop(&mut out, "DUE", &CalTime::Date(*due));
        }
    }

    push_line(&mut out, &format!("STATUS:{}", item.status.as_ical()));
    if item.kind == ItemKind::Todo && item.status == ItemStatus::Completed {
        push_line(&mut out, "PERCENT-COMPLETE:100");
    }

    if !item.categories.is_empty() {
        let joined = item
            .categories
            .iter()
            .map(|c| escape_text(c))
            .collect::<Vec<_>>()
            .join(",");
        push_line(&mut out, &format!("CATEGORIES:{}", joined));
    }

    push_line(&mut out, &format!("END:{}", name));
    out
}

/// Serialize a whole calendar document.
pub fn calendar_to_ics(name: &str, items: &[CalendarItem]) -> String {
    let mut out = String::new();
    push_line(&mut out, "BEGIN:VCALENDAR");
    push_line(&mut out, "VERSION:2.0");
    push_line(&mut out, &format!("PRODID:{}", PRODID));
    push_line(&mut out, "CALSCALE:GREGORIAN");
    if !name.is_empty() {
        push_line(&mut out, &format!("X-WR-CALNAME:{}", escape_text(name)));
    }
    for item in items {
        out.push_str(&component_to_ics(item));
    }
    push_line(&mut out, "END:VCALENDAR");
    out
}

/// Serialize a single item as its own calendar document (the body served
/// for GET on `{uid}.ics`).
pub fn item_to_ics(item: &CalendarItem) -> String {
    calendar_to_ics("", std::slice::from_ref(item))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn timed_item() -> CalendarItem {
        let date = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();
        CalendarItem {
            uid: "abc123".into(),
            kind: ItemKind::Event,
            summary: "Ship release".into(),
            start: Some(CalTime::DateTime(date.and_hms_opt(9, 0, 0).unwrap())),
            end: Some(CalTime::DateTime(date.and_hms_opt(10, 30, 0).unwrap())),
            due: None,
            status: ItemStatus::Confirmed,
            categories: vec!["Work".into()],
            source_board: "b1".into(),
        }
    }

    #[test]
    fn test_timed_event_floating_time() {
        let ics = component_to_ics(&timed_item());
        assert!(ics.contains("DTSTART:20260302T090000\r\n"));
        assert!(ics.contains("DTEND:20260302T103000\r\n"));
        // Floating: no Z suffix, no TZID.
        assert!(!ics.contains("DTSTART:20260302T090000Z"));
        assert!(!ics.contains("TZID"));
    }

    #[test]
    fn test_all_day_uses_value_date() {
        let mut item = timed_item();
        item.kind = ItemKind::Todo;
        item.status = ItemStatus::NeedsAction;
        let date = NaiveDate::from_ymd_opt(2026, 4, 1).unwrap();
        item.start = Some(CalTime::Date(date));
        item.end = None;
        item.due = Some(date);
        let ics = component_to_ics(&item);
        assert!(ics.contains("BEGIN:VTODO\r\n"));
        assert!(ics.contains("DTSTART;VALUE=DATE:20260401\r\n"));
        assert!(ics.contains("DUE;VALUE=DATE:20260401\r\n"));
        assert!(ics.contains("STATUS:NEEDS-ACTION\r\n"));
    }

    #[test]
    fn test_completed_todo_percent() {
        let mut item = timed_item();
        item.kind = ItemKind::Todo;
        item.status = ItemStatus::Completed;
        let ics = component_to_ics(&item);
        assert!(ics.contains("STATUS:COMPLETED\r\n"));
        assert!(ics.contains("PERCENT-COMPLETE:100\r\n"));
    }

    #[test]
    fn test_escaping() {
        assert_eq!(escape_text("a,b;c\\d\ne"), "a\\,b\\;c\\\\d\\ne");
    }

    #[test]
    fn test_fold_line_limits() {
        let long = format!("SUMMARY:{}", "x".repeat(200));
        let folded = fold_line(&long);
        for (i, segment) in folded.split("\r\n").enumerate() {
            assert!(segment.len() <= 75, "segment {} too long: {}", i, segment.len());
            if i > 0 {
                assert!(segment.starts_with(' '));
            }
        }
        // Unfolding restores the original.
        assert_eq!(folded.replace("\r\n ", ""), long);
    }

    #[test]
    fn test_fold_respects_utf8_boundaries() {
        let long = format!("SUMMARY:{}", "ü".repeat(100));
        let folded = fold_line(&long);
        for segment in folded.split("\r\n") {
            assert!(segment.len() <= 75);
            assert!(std::str::from_utf8(segment.as_bytes()).is_ok());
        }
    }

    #[test]
    fn test_calendar_wrapper() {
        let ics = calendar_to_ics("Team", &[timed_item()]);
        assert!(ics.starts_with("BEGIN:VCALENDAR\r\n"));
        assert!(ics.ends_with("END:VCALENDAR\r\n"));
        assert!(ics.contains("X-WR-CALNAME:Team\r\n"));
        assert!(ics.contains("DTSTAMP:19700101T000000Z\r\n"));
    }
}
