/// CalDAV query evaluation over a calendar group's derived items.
///
/// Handles REPORT body classification (multiget vs calendar-query),
/// time-range filtering in floating time, cross-board aggregation with
/// dedup, and the composite CTag for multi-board groups.
use std::collections::HashSet;

use chrono::{NaiveDate, NaiveDateTime};
use percent_encoding::percent_decode_str;
use quick_xml::events::Event;
use quick_xml::Reader;
use sha2::{Digest, Sha256};

use super::{CalTime, CalendarItem};

/// Classified REPORT request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportQuery {
    /// calendar-multiget with the uids extracted from its hrefs.
    Multiget { uids: Vec<String> },
    /// calendar-query with an optional time-range filter, half-open
    /// `[start, end)` in floating time.
    TimeRange {
        start: Option<NaiveDateTime>,
        end: Option<NaiveDateTime>,
    },
    /// Everything (no recognized filter, or the fail-open fallback).
    All,
}

/// Composite CTag for a calendar group: a single member's etag passes
/// through unchanged; multiple members hash their etags in a stable order.
pub fn composite_ctag(member_etags: &[String]) -> String {
    match member_etags {
        [] => String::new(),
        [single] => single.trim_matches('"').to_string(),
        _ => {
            let mut sorted: Vec<&String> = member_etags.iter().collect();
            sorted.sort();
            let mut hasher = Sha256::new();
            for etag in sorted {
                hasher.update(etag.as_bytes());
            }
            hex::encode(&hasher.finalize()[..16])
        }
    }
}

/// Per-item ETag, derived from the item uid and the collection's CTag so it
/// changes whenever the collection content does.
pub fn item_etag(uid: &str, ctag: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(uid.as_bytes());
    hasher.update([0u8]);
    hasher.update(ctag.as_bytes());
    format!("\"{}\"", hex::encode(&hasher.finalize()[..8]))
}

/// Classify a REPORT request body.
///
/// A multiget whose hrefs all fail to parse falls open to [`ReportQuery::All`]:
/// a parse failure must not look identical to "nothing matches".
pub fn parse_report(body: &str) -> ReportQuery {
    let mut reader = Reader::from_str(body);
    reader.config_mut().trim_text(true);

    let mut is_multiget = false;
    let mut is_query = false;
    let mut in_href = false;
    let mut uids: Vec<String> = Vec::new();
    let mut range_start: Option<NaiveDateTime> = None;
    let mut range_end: Option<NaiveDateTime> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => match local_name(e.name().as_ref()) {
                b"calendar-multiget" => is_multiget = true,
                b"calendar-query" => is_query = true,
                b"href" => in_href = true,
                b"time-range" => read_time_range(&e, &mut range_start, &mut range_end),
                _ => {}
            },
            Ok(Event::Empty(e)) => {
                if local_name(e.name().as_ref()) == b"time-range" {
                    read_time_range(&e, &mut range_start, &mut range_end);
                }
            }
            Ok(Event::Text(t)) => {
                if in_href {
                    if let Ok(text) = t.unescape() {
                        if let Some(uid) = uid_from_href(&text) {
                            uids.push(uid);
                        }
                    }
                }
            }
            Ok(Event::End(e)) => {
                if local_name(e.name().as_ref()) == b"href" {
                    in_href = false;
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                log::warn!("[kandav.calendar.report] Unparseable REPORT body: {}", e);
                break;
            }
            _ => {}
        }
    }

    if is_multiget {
        if uids.is_empty() {
            log::warn!(
                "[kandav.calendar.report] Multiget with zero parseable hrefs, serving full set"
            );
            return ReportQuery::All;
        }
        return ReportQuery::Multiget { uids };
    }
    if is_query && (range_start.is_some() || range_end.is_some()) {
        return ReportQuery::TimeRange {
            start: range_start,
            end: range_end,
        };
    }
    ReportQuery::All
}

fn local_name(name: &[u8]) -> &[u8] {
    match name.iter().rposition(|&b| b == b':') {
        Some(pos) => &name[pos + 1..],
        None => name,
    }
}

fn read_time_range(
    e: &quick_xml::events::BytesStart<'_>,
    start: &mut Option<NaiveDateTime>,
    end: &mut Option<NaiveDateTime>,
) {
    for attr in e.attributes().flatten() {
        let value = match attr.unescape_value() {
            Ok(v) => v.into_owned(),
            Err(_) => continue,
        };
        match local_name(attr.key.as_ref()) {
            b"start" => *start = parse_floating(&value),
            b"end" => *end = parse_floating(&value),
            _ => {}
        }
    }
}

/// Parse an iCalendar date or date-time, ignoring a trailing timezone
/// indicator (the comparison is done in floating-time terms).
pub fn parse_floating(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim().trim_end_matches('Z');
    if let Ok(dt) = NaiveDateTime::parse_from_str(value, "%Y%m%dT%H%M%S") {
        return Some(dt);
    }
    NaiveDate::parse_from_str(value, "%Y%m%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

/// Extract a uid from a multiget href: the trailing `{uid}.ics` segment,
/// percent-decoded.
pub fn uid_from_href(href: &str) -> Option<String> {
    let segment = href.trim_end_matches('/').rsplit('/').next()?;
    let decoded = percent_decode_str(segment).decode_utf8().ok()?;
    let uid = decoded.strip_suffix(".ics")?;
    if uid.is_empty() {
        None
    } else {
        Some(uid.to_string())
    }
}

/// Whether an item passes the given query.
pub fn matches(item: &CalendarItem, query: &ReportQuery) -> bool {
    match query {
        ReportQuery::All => true,
        ReportQuery::Multiget { uids } => uids.iter().any(|u| u == &item.uid),
        ReportQuery::TimeRange { start, end } => {
            // Items with no resolvable date always pass.
            let Some(t) = item.primary_time() else {
                return true;
            };
            if let Some(start) = start {
                if t < *start {
                    return false;
                }
            }
            if let Some(end) = end {
                if t >= *end {
                    return false;
                }
            }
            true
        }
    }
}

/// Merge several boards' item lists into one feed: drop exact uid repeats
/// first, then distinct-uid items sharing identical (summary, start, end) —
/// two boards can independently derive "the same" appointment.
pub fn merge_group_items(per_board: Vec<Vec<CalendarItem>>) -> Vec<CalendarItem> {
    let mut seen_uids: HashSet<String> = HashSet::new();
    let mut seen_shapes: HashSet<(String, Option<CalTime>, Option<CalTime>)> = HashSet::new();
    let mut merged = Vec::new();

    for items in per_board {
        for item in items {
            if !seen_uids.insert(item.uid.clone()) {
                continue;
            }
            let shape = (item.summary.clone(), item.start, item.end);
            if !seen_shapes.insert(shape) {
                continue;
            }
            merged.push(item);
        }
    }

    merged
}
