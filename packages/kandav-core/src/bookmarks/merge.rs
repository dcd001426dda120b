/// Identity-preserving merge of an incoming bookmark tree into the current
/// kanban columns.
///
/// Matching is by key, never by stored identity: columns match on title,
/// tasks match on their encoded sub-path (first occurrence first when a
/// sub-path recurs). Re-ingesting a column's own previously generated tree
/// therefore reproduces the same task identities, which is what keeps
/// repeated client resync cycles from duplicating anything.
///
/// Rules:
/// - tasks without a link line (local notes) pass through untouched
/// - columns absent from the incoming tree are preserved verbatim
/// - new incoming columns are appended
/// - within a matched column the client's bookmark set is authoritative;
///   bookmark ids and descriptions are inherited from the existing task
///   where the incoming data lacks them
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};

use sha2::{Digest, Sha256};

use super::mapper::{flatten_folder, parse_task_links, render_task_content, FolderTasks};
use super::{BookmarkEntry, BookmarkFolder};
use crate::parser::generate_id;
use crate::types::{KanbanColumn, KanbanTask};

static BOOKMARK_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Generate a new bookmark id (8 hex chars), unique within the process.
pub fn generate_bookmark_id() -> String {
    let seq = BOOKMARK_ID_COUNTER.fetch_add(1, Ordering::Relaxed);
    let ts = std::time::SystemTime::now()
        .duration_since(std::time::SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let mut hasher = Sha256::new();
    hasher.update(seq.to_le_bytes());
    hasher.update(ts.to_le_bytes());
    let hash = hasher.finalize();
    hex::encode(&hash[..4])
}

/// Merge an incoming bookmark tree into the existing columns.
pub fn merge_trees(incoming: &[BookmarkFolder], existing: &[KanbanColumn]) -> Vec<KanbanColumn> {
    let mut consumed = vec![false; incoming.len()];
    let mut merged = Vec::with_capacity(existing.len());

    for column in existing {
        let folder = incoming
            .iter()
            .enumerate()
            .find(|(_, f)| f.title == column.title);
        match folder {
            Some((idx, folder)) => {
                consumed[idx] = true;
                merged.push(merge_column(column, folder));
            }
            None => merged.push(column.clone()),
        }
    }

    for (idx, folder) in incoming.iter().enumerate() {
        if !consumed[idx] {
            merged.push(new_column(folder));
        }
    }

    merged
}

fn merge_column(existing: &KanbanColumn, incoming: &BookmarkFolder) -> KanbanColumn {
    let groups = flatten_folder(incoming);

    // Multi-map so a recurring sub-path matches existing tasks in order.
    let mut by_sub_path: HashMap<&str, VecDeque<usize>> = HashMap::new();
    for (idx, group) in groups.iter().enumerate() {
        by_sub_path
            .entry(group.sub_path.as_str())
            .or_default()
            .push_back(idx);
    }
    let mut group_consumed = vec![false; groups.len()];

    let mut tasks = Vec::with_capacity(existing.tasks.len());
    for task in &existing.tasks {
        let Some(links) = parse_task_links(&task.content) else {
            // Local note: untouched.
            tasks.push(task.clone());
            continue;
        };

        let matched = by_sub_path
            .get_mut(links.sub_path.as_str())
            .and_then(VecDeque::pop_front);
        if let Some(idx) = matched {
            group_consumed[idx] = true;
            let entries = merge_entries(&links.entries, &groups[idx].entries);
            tasks.push(KanbanTask {
                id: task.id.clone(),
                content: render_task_content(&links.sub_path, &entries),
                checked: task.checked,
            });
        }
        // No incoming counterpart: the client removed it.
    }

    for (idx, group) in groups.iter().enumerate() {
        if !group_consumed[idx] {
            tasks.push(task_from_group(group));
        }
    }

    KanbanColumn {
        id: existing.id.clone(),
        title: existing.title.clone(),
        tasks,
    }
}

/// Merge one node's incoming bookmarks against the existing task's entries.
/// Incoming order and content win; identity and descriptions are inherited.
fn merge_entries(existing: &[BookmarkEntry], incoming: &[BookmarkEntry]) -> Vec<BookmarkEntry> {
    let mut used = vec![false; existing.len()];

    let find_match = |entry: &BookmarkEntry, used: &[bool]| -> Option<usize> {
        if !entry.id.is_empty() {
            if let Some(idx) = existing
                .iter()
                .enumerate()
                .position(|(i, e)| !used[i] && e.id == entry.id)
            {
                return Some(idx);
            }
        }
        existing
            .iter()
            .enumerate()
            .position(|(i, e)| !used[i] && e.href == entry.href)
    };

    incoming
        .iter()
        .map(|entry| {
            let matched = find_match(entry, &used);
            if let Some(idx) = matched {
                used[idx] = true;
            }
            let id = if !entry.id.is_empty() {
                entry.id.clone()
            } else if let Some(idx) = matched {
                if existing[idx].id.is_empty() {
                    generate_bookmark_id()
                } else {
                    existing[idx].id.clone()
                }
            } else {
                generate_bookmark_id()
            };
            let description = entry
                .description
                .clone()
                .or_else(|| matched.and_then(|idx| existing[idx].description.clone()));
            BookmarkEntry {
                id,
                title: entry.title.clone(),
                href: entry.href.clone(),
                description,
            }
        })
        .collect()
}

fn task_from_group(group: &FolderTasks) -> KanbanTask {
    let entries: Vec<BookmarkEntry> = group
        .entries
        .iter()
        .map(|entry| BookmarkEntry {
            id: if entry.id.is_empty() {
                generate_bookmark_id()
            } else {
                entry.id.clone()
            },
            ..entry.clone()
        })
        .collect();
    KanbanTask {
        id: generate_id("task"),
        content: render_task_content(&group.sub_path, &entries),
        checked: false,
    }
}

fn new_column(folder: &BookmarkFolder) -> KanbanColumn {
    KanbanColumn {
        id: generate_id("col"),
        title: folder.title.clone(),
        tasks: flatten_folder(folder)
            .iter()
            .map(task_from_group)
            .collect(),
    }
}
