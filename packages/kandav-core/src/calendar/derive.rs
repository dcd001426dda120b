/// Derives calendar items from a board's tagged tasks.
///
/// Exactly one item per task with a resolvable temporal tag; everything
/// else is omitted. Untagged tasks are the normal case, not an error.
use std::collections::HashMap;

use chrono::Days;
use sha2::{Digest, Sha256};

use super::{CalTime, CalendarItem, ItemKind, ItemStatus};
use crate::temporal::{
    extract_hash_tags, extract_temporal_tags, resolve_schedule, strip_temporal_tokens, Schedule,
};
use crate::types::KanbanBoard;

/// Deterministic item uid. The occurrence index disambiguates tasks that
/// repeat the same first line within one column; it makes the uid
/// order-sensitive for those duplicates (see DESIGN.md).
pub fn item_uid(board_id: &str, column_title: &str, first_line: &str, occurrence: usize) -> String {
    let mut hasher = Sha256::new();
    hasher.update(board_id.as_bytes());
    hasher.update([0u8]);
    hasher.update(column_title.as_bytes());
    hasher.update([0u8]);
    hasher.update(first_line.as_bytes());
    hasher.update([0u8]);
    hasher.update(occurrence.to_le_bytes());
    hex::encode(&hasher.finalize()[..8])
}

/// Derive all calendar items for one board.
pub fn derive_items(board: &KanbanBoard, board_id: &str) -> Vec<CalendarItem> {
    let mut occurrences: HashMap<(String, String), usize> = HashMap::new();
    let mut items = Vec::new();

    for column in &board.columns {
        for task in &column.tasks {
            let tags = extract_temporal_tags(&task.content);
            let Some(schedule) = resolve_schedule(&tags) else {
                continue;
            };

            let first_line = task.first_line().to_string();
            let key = (column.title.clone(), first_line.clone());
            let occurrence = occurrences.entry(key).or_insert(0);
            let uid = item_uid(board_id, &column.title, &first_line, *occurrence);
            *occurrence += 1;

            let summary = strip_temporal_tokens(&first_line);
            let mut categories = extract_hash_tags(&task.content);
            categories.push(column.title.clone());

            let (kind, start, end, due) = match schedule {
                Schedule::Timed { date, range } => (
                    ItemKind::Event,
                    Some(CalTime::DateTime(date.and_time(range.start))),
                    Some(CalTime::DateTime(date.and_time(range.end))),
                    None,
                ),
                Schedule::Week { monday } => (
                    ItemKind::Event,
                    Some(CalTime::Date(monday)),
                    Some(CalTime::Date(
                        monday.checked_add_days(Days::new(7)).unwrap_or(monday),
                    )),
                    Some(monday),
                ),
                Schedule::AllDay { date } => (
                    ItemKind::Todo,
                    Some(CalTime::Date(date)),
                    None,
                    Some(date),
                ),
            };

            let status = if task.checked {
                ItemStatus::Completed
            } else {
                match kind {
                    ItemKind::Event => ItemStatus::Confirmed,
                    ItemKind::Todo => ItemStatus::NeedsAction,
                }
            };

            items.push(CalendarItem {
                uid,
                kind,
                summary,
                start,
                end,
                due,
                status,
                categories,
                source_board: board_id.to_string(),
            });
        }
    }

    items
}
