/// Bidirectional mapping between bookmark folder trees and kanban columns.
///
/// Top-level folders correspond 1:1 to columns. Inside a column, every
/// folder node that owns bookmarks directly becomes one task:
///
///   Sub/Path            <- node path relative to the top-level folder,
///                          omitted when the node IS the top-level folder
///   [Title](href "id")  <- one line per bookmark
///   free text           <- optional description for the preceding bookmark
///
/// Tasks without any link line are local notes; they have no bookmark
/// representation and never leave the markdown file.
use std::sync::OnceLock;

use regex::Regex;
use sha2::{Digest, Sha256};

use super::{BookmarkEntry, BookmarkFolder};
use crate::parser::generate_id;
use crate::types::{KanbanColumn, KanbanTask};

fn link_line_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"^\[(?P<title>[^\]]*)\]\((?P<href>[^\s)]+)(?:\s+"(?P<id>[^"]*)")?\)\s*$"#)
            .expect("valid link line regex")
    })
}

/// Links parsed out of one task's content.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskLinks {
    /// Encoded sub-path ("" when bookmarks live in the top-level folder).
    pub sub_path: String,
    pub entries: Vec<BookmarkEntry>,
}

pub fn is_link_line(line: &str) -> bool {
    link_line_regex().is_match(line)
}

fn parse_link_line(line: &str) -> Option<BookmarkEntry> {
    let caps = link_line_regex().captures(line)?;
    Some(BookmarkEntry {
        id: caps.name("id").map(|m| m.as_str().to_string()).unwrap_or_default(),
        title: caps["title"].to_string(),
        href: caps["href"].to_string(),
        description: None,
    })
}

/// Parse a task's content into sub-path and bookmark entries. Returns `None`
/// for local notes (tasks without a single link line).
pub fn parse_task_links(content: &str) -> Option<TaskLinks> {
    let mut lines = content.lines();
    let first = lines.next().unwrap_or("");

    let mut links = TaskLinks::default();
    if let Some(entry) = parse_link_line(first) {
        links.entries.push(entry);
    } else {
        links.sub_path = first.trim().to_string();
    }

    for line in lines {
        if let Some(entry) = parse_link_line(line) {
            links.entries.push(entry);
        } else if !line.trim().is_empty() {
            if let Some(last) = links.entries.last_mut() {
                if last.description.is_none() {
                    last.description = Some(line.trim().to_string());
                }
            }
        }
    }

    if links.entries.is_empty() {
        None
    } else {
        Some(links)
    }
}

fn format_link_line(entry: &BookmarkEntry) -> String {
    if entry.id.is_empty() {
        format!("[{}]({})", entry.title, entry.href)
    } else {
        format!("[{}]({} \"{}\")", entry.title, entry.href, entry.id)
    }
}

/// Render a task's content lines from a sub-path and its entries.
pub fn render_task_content(sub_path: &str, entries: &[BookmarkEntry]) -> String {
    let mut lines = Vec::new();
    if !sub_path.is_empty() {
        lines.push(sub_path.to_string());
    }
    for entry in entries {
        lines.push(format_link_line(entry));
        if let Some(desc) = &entry.description {
            if !desc.is_empty() {
                lines.push(desc.clone());
            }
        }
    }
    lines.join("\n")
}

/// Deterministic folder id from the title path, so regenerated documents
/// stay byte-stable for unchanged boards.
fn folder_id(path: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for segment in path {
        hasher.update(segment.as_bytes());
        hasher.update([0u8]);
    }
    hex::encode(&hasher.finalize()[..4])
}

/// One task's worth of bookmarks inside a folder subtree, keyed by sub-path.
#[derive(Debug, Clone)]
pub struct FolderTasks {
    pub sub_path: String,
    pub entries: Vec<BookmarkEntry>,
}

/// Flatten a top-level folder into per-node bookmark groups, depth-first,
/// each keyed by its encoded sub-path.
pub fn flatten_folder(folder: &BookmarkFolder) -> Vec<FolderTasks> {
    let mut out = Vec::new();
    collect(folder, &mut Vec::new(), &mut out);
    out
}

fn collect<'a>(node: &'a BookmarkFolder, path: &mut Vec<&'a str>, out: &mut Vec<FolderTasks>) {
    if !node.bookmarks.is_empty() {
        out.push(FolderTasks {
            sub_path: path.join("/"),
            entries: node.bookmarks.clone(),
        });
    }
    for child in &node.children {
        path.push(&child.title);
        collect(child, path, out);
        path.pop();
    }
}

/// Map a bookmark tree to kanban columns: one column per top-level folder,
/// one task per bookmark-owning node.
pub fn tree_to_columns(tree: &[BookmarkFolder]) -> Vec<KanbanColumn> {
    tree.iter()
        .map(|folder| KanbanColumn {
            id: generate_id("col"),
            title: folder.title.clone(),
            tasks: flatten_folder(folder)
                .into_iter()
                .map(|group| KanbanTask {
                    id: generate_id("task"),
                    content: render_task_content(&group.sub_path, &group.entries),
                    checked: false,
                })
                .collect(),
        })
        .collect()
}

/// Map kanban columns back to a bookmark tree. Inverse of
/// [`tree_to_columns`]; local notes are skipped.
pub fn columns_to_tree(columns: &[KanbanColumn]) -> Vec<BookmarkFolder> {
    columns.iter().map(column_to_folder).collect()
}

fn column_to_folder(column: &KanbanColumn) -> BookmarkFolder {
    let mut folder = BookmarkFolder::named(&column.title);
    folder.id = folder_id(&[&column.title]);

    for task in &column.tasks {
        let Some(links) = parse_task_links(&task.content) else {
            continue;
        };
        let node = if links.sub_path.is_empty() {
            &mut folder
        } else {
            lookup_or_create(&mut folder, &column.title, &links.sub_path)
        };
        node.bookmarks.extend(links.entries);
    }

    folder
}

fn lookup_or_create<'a>(
    folder: &'a mut BookmarkFolder,
    column_title: &str,
    sub_path: &str,
) -> &'a mut BookmarkFolder {
    let mut node = folder;
    let mut path: Vec<String> = vec![column_title.to_string()];
    for segment in sub_path.split('/') {
        path.push(segment.to_string());
        let pos = node.children.iter().position(|c| c.title == segment);
        let idx = match pos {
            Some(idx) => idx,
            None => {
                let mut child = BookmarkFolder::named(segment);
                let refs: Vec<&str> = path.iter().map(String::as_str).collect();
                child.id = folder_id(&refs);
                node.children.push(child);
                node.children.len() - 1
            }
        };
        node = &mut node.children[idx];
    }
    node
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(content: &str) -> KanbanTask {
        KanbanTask {
            id: generate_id("task"),
            content: content.to_string(),
            checked: false,
        }
    }

    #[test]
    fn test_parse_task_links_top_level() {
        let links = parse_task_links("[Example](https://example.com \"abc\")").unwrap();
        assert_eq!(links.sub_path, "");
        assert_eq!(links.entries.len(), 1);
        assert_eq!(links.entries[0].id, "abc");
        assert_eq!(links.entries[0].href, "https://example.com");
    }

    #[test]
    fn test_parse_task_links_sub_path_and_desc() {
        let links = parse_task_links(
            "Tools/Editors\n[Helix](https://helix-editor.com \"h1\")\nmodal editor\n[Zed](https://zed.dev)",
        )
        .unwrap();
        assert_eq!(links.sub_path, "Tools/Editors");
        assert_eq!(links.entries.len(), 2);
        assert_eq!(links.entries[0].description.as_deref(), Some("modal editor"));
        assert_eq!(links.entries[1].id, "");
    }

    #[test]
    fn test_local_note_has_no_links() {
        assert!(parse_task_links("Remember to water the plants").is_none());
        assert!(parse_task_links("Shopping\nmilk\neggs").is_none());
    }

    #[test]
    fn test_columns_to_tree_nesting() {
        let columns = vec![KanbanColumn {
            id: generate_id("col"),
            title: "Reading".into(),
            tasks: vec![
                task("[Top](https://top.example \"t1\")"),
                task("Deep/Deeper\n[Nested](https://nested.example \"n1\")"),
                task("local note"),
            ],
        }];

        let tree = columns_to_tree(&columns);
        assert_eq!(tree.len(), 1);
        assert_eq!(tree[0].bookmarks.len(), 1);
        assert_eq!(tree[0].children.len(), 1);
        assert_eq!(tree[0].children[0].title, "Deep");
        assert_eq!(tree[0].children[0].children[0].title, "Deeper");
        assert_eq!(
            tree[0].children[0].children[0].bookmarks[0].href,
            "https://nested.example"
        );
    }

    #[test]
    fn test_tree_columns_inverse() {
        let columns = vec![KanbanColumn {
            id: generate_id("col"),
            title: "Col".into(),
            tasks: vec![
                task("[A](https://a.example \"a\")"),
                task("Sub\n[B](https://b.example \"b\")\nb description"),
            ],
        }];

        let tree = columns_to_tree(&columns);
        let back = tree_to_columns(&tree);
        assert_eq!(back.len(), 1);
        assert_eq!(back[0].title, "Col");
        assert_eq!(back[0].tasks.len(), 2);
        assert_eq!(back[0].tasks[0].content, "[A](https://a.example \"a\")");
        assert_eq!(
            back[0].tasks[1].content,
            "Sub\n[B](https://b.example \"b\")\nb description"
        );
    }

    #[test]
    fn test_same_sub_path_tasks_collapse_into_one_node() {
        let columns = vec![KanbanColumn {
            id: generate_id("col"),
            title: "Col".into(),
            tasks: vec![
                task("Sub\n[A](https://a.example \"a\")"),
                task("Sub\n[B](https://b.example \"b\")"),
            ],
        }];

        let tree = columns_to_tree(&columns);
        assert_eq!(tree[0].children.len(), 1);
        assert_eq!(tree[0].children[0].bookmarks.len(), 2);
    }

    #[test]
    fn test_folder_ids_deterministic() {
        let columns = vec![KanbanColumn {
            id: generate_id("col"),
            title: "Col".into(),
            tasks: vec![task("Sub\n[A](https://a.example \"a\")")],
        }];
        let a = columns_to_tree(&columns);
        let b = columns_to_tree(&columns);
        assert_eq!(a[0].id, b[0].id);
        assert_eq!(a[0].children[0].id, b[0].children[0].id);
    }
}
