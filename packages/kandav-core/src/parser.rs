/// Markdown parser and generator for kanban board files.
///
/// Handles the board format:
///   --- YAML header (must contain kanban-plugin: board) ---
///   ## Column Title
///   - [ ] Task summary
///     continuation line
///   %% footer %%
///
/// `generate_markdown` is the exact inverse of `parse_markdown`; the YAML
/// header and footer round-trip byte-identically.
use std::sync::atomic::{AtomicU64, Ordering};

use crate::types::{KanbanBoard, KanbanColumn, KanbanTask};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

pub fn generate_id(prefix: &str) -> String {
    let seq = NEXT_ID.fetch_add(1, Ordering::Relaxed);
    let ts = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis();
    format!("{}-{}-{:x}", prefix, seq, ts)
}

/// The minimal board content written when a tracked file is missing.
pub fn skeleton_board() -> String {
    "---\nkanban-plugin: board\n---\n".to_string()
}

/// Parse kanban markdown content into a board structure.
pub fn parse_markdown(content: &str) -> KanbanBoard {
    let content = content.replace("\r\n", "\n").replace('\r', "\n");
    let lines: Vec<&str> = content.split('\n').collect();

    let mut board = KanbanBoard {
        valid: false,
        title: String::new(),
        columns: Vec::new(),
        yaml_header: None,
        footer: None,
    };

    let mut current_column: Option<KanbanColumn> = None;
    let mut current_task: Option<KanbanTask> = None;
    let mut collecting_description = false;
    let mut in_yaml_header = false;
    let mut in_footer = false;
    let mut yaml_lines: Vec<&str> = Vec::new();
    let mut footer_lines: Vec<&str> = Vec::new();
    let mut yaml_start_found = false;

    let mut i = 0;
    while i < lines.len() {
        let line = lines[i];
        let trimmed = line.trim();

        // YAML front matter
        if line.starts_with("---") {
            if !yaml_start_found {
                yaml_start_found = true;
                in_yaml_header = true;
                yaml_lines.push(line);
                i += 1;
                continue;
            } else if in_yaml_header {
                yaml_lines.push(line);
                let header = yaml_lines.join("\n");
                board.valid = header.contains("kanban-plugin: board");
                board.title = yaml_title(&header).unwrap_or_default();
                board.yaml_header = Some(header);
                if !board.valid {
                    return board;
                }
                in_yaml_header = false;
                i += 1;
                continue;
            }
        }

        if in_yaml_header {
            yaml_lines.push(line);
            i += 1;
            continue;
        }

        // Footer block
        if line.starts_with("%%") {
            if collecting_description {
                if let (Some(task), Some(col)) = (current_task.take(), current_column.as_mut()) {
                    col.tasks.push(task);
                }
                collecting_description = false;
            }
            in_footer = true;
            footer_lines.push(line);
            i += 1;
            continue;
        }

        if in_footer {
            footer_lines.push(line);
            i += 1;
            continue;
        }

        // Column header
        if line.starts_with("## ") {
            if collecting_description {
                if let (Some(task), Some(col)) = (current_task.take(), current_column.as_mut()) {
                    col.tasks.push(task);
                }
                collecting_description = false;
            }
            current_task = None;
            if let Some(col) = current_column.take() {
                board.columns.push(col);
            }

            current_column = Some(KanbanColumn {
                id: generate_id("col"),
                title: line[3..].to_string(),
                tasks: Vec::new(),
            });
            i += 1;
            continue;
        }

        // Task line
        if line.starts_with("- ") {
            if collecting_description {
                if let (Some(task), Some(col)) = (current_task.take(), current_column.as_mut()) {
                    col.tasks.push(task);
                }
                collecting_description = false;
            }

            if current_column.is_some() {
                let checked = line.starts_with("- [x] ") || line.starts_with("- [X] ");
                let summary = if line.len() >= 6 { &line[6..] } else { "" };
                current_task = Some(KanbanTask {
                    id: generate_id("task"),
                    content: summary.to_string(),
                    checked,
                });
                collecting_description = true;
            }
            i += 1;
            continue;
        }

        // Continuation lines
        if current_task.is_some() && collecting_description {
            if trimmed.is_empty() && !line.starts_with("  ") {
                // A blank line only ends the task when the next non-empty
                // line starts a new structure
                let mut next_index = i + 1;
                while next_index < lines.len() && lines[next_index].trim().is_empty() {
                    next_index += 1;
                }
                let next_line = lines.get(next_index).copied();
                let is_structural_boundary = next_line.is_none()
                    || next_line.is_some_and(|l| {
                        l.starts_with("## ")
                            || l.starts_with("- ")
                            || l.starts_with("%%")
                            || l.starts_with("---")
                    });
                if is_structural_boundary {
                    i += 1;
                    continue;
                }
            }
            let desc_line = line.strip_prefix("  ").unwrap_or(line);
            if let Some(task) = current_task.as_mut() {
                task.content.push('\n');
                task.content.push_str(desc_line);
            }
            i += 1;
            continue;
        }

        i += 1;
    }

    if collecting_description {
        if let (Some(task), Some(col)) = (current_task.take(), current_column.as_mut()) {
            col.tasks.push(task);
        }
    }
    if let Some(col) = current_column.take() {
        board.columns.push(col);
    }

    if !footer_lines.is_empty() {
        board.footer = Some(footer_lines.join("\n"));
    }

    board
}

/// Generate markdown from a board structure.
pub fn generate_markdown(board: &KanbanBoard) -> String {
    let mut markdown = String::new();

    let header = board
        .yaml_header
        .clone()
        .unwrap_or_else(|| "---\nkanban-plugin: board\n---".to_string());
    markdown.push_str(&header);
    markdown.push_str("\n\n");

    for column in &board.columns {
        markdown.push_str(&format!("## {}\n", column.title));

        for task in &column.tasks {
            let normalized = task.content.replace("\r\n", "\n").replace('\r', "\n");
            let content_lines: Vec<&str> = normalized.split('\n').collect();
            let summary = content_lines.first().copied().unwrap_or("");

            let checkbox = if task.checked { "- [x] " } else { "- [ ] " };
            markdown.push_str(checkbox);
            markdown.push_str(summary);
            markdown.push('\n');

            for line in content_lines.iter().skip(1) {
                markdown.push_str("  ");
                markdown.push_str(line);
                markdown.push('\n');
            }
        }

        markdown.push('\n');
    }

    if let Some(footer) = &board.footer {
        if markdown.ends_with("\n\n") {
            markdown.pop();
        }
        markdown.push_str(footer);
        if !footer.ends_with('\n') {
            markdown.push('\n');
        }
    } else {
        markdown.push('\n');
    }

    markdown
}

/// Read a `title:` line out of the YAML header, if present.
fn yaml_title(header: &str) -> Option<String> {
    for line in header.lines() {
        if let Some(rest) = line.strip_prefix("title:") {
            let value = rest.trim().trim_matches('"');
            if !value.is_empty() {
                return Some(value.to_string());
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_BOARD: &str = "\
---
kanban-plugin: board
---

## Todo
- [ ] First task
- [x] Completed task
  with continuation

## Done
- [x] Finished item

%% kanban:settings
%%
";

    #[test]
    fn test_parse_basic_board() {
        let board = parse_markdown(SAMPLE_BOARD);
        assert!(board.valid);
        assert_eq!(board.columns.len(), 2);
        assert_eq!(board.columns[0].title, "Todo");
        assert_eq!(board.columns[0].tasks.len(), 2);
        assert!(!board.columns[0].tasks[0].checked);
        assert_eq!(board.columns[0].tasks[0].content, "First task");
        assert!(board.columns[0].tasks[1].checked);
        assert_eq!(
            board.columns[0].tasks[1].content,
            "Completed task\nwith continuation"
        );
        assert_eq!(board.columns[1].tasks.len(), 1);
        assert!(board.footer.is_some());
    }

    #[test]
    fn test_parse_invalid_board() {
        let board = parse_markdown("---\ntitle: not a kanban\n---\n## Col\n- [ ] task");
        assert!(!board.valid);
    }

    #[test]
    fn test_title_from_yaml() {
        let board = parse_markdown("---\nkanban-plugin: board\ntitle: Projects\n---\n");
        assert!(board.valid);
        assert_eq!(board.title, "Projects");
    }

    #[test]
    fn test_roundtrip() {
        let board = parse_markdown(SAMPLE_BOARD);
        let regenerated = generate_markdown(&board);
        let reparsed = parse_markdown(&regenerated);

        assert!(reparsed.valid);
        assert_eq!(reparsed.columns.len(), board.columns.len());
        for (orig, re) in board.columns.iter().zip(reparsed.columns.iter()) {
            assert_eq!(orig.title, re.title);
            assert_eq!(orig.tasks.len(), re.tasks.len());
            for (ot, rt) in orig.tasks.iter().zip(re.tasks.iter()) {
                assert_eq!(ot.content, rt.content);
                assert_eq!(ot.checked, rt.checked);
            }
        }
        assert_eq!(board.footer, reparsed.footer);
    }

    #[test]
    fn test_skeleton_is_valid() {
        let board = parse_markdown(&skeleton_board());
        assert!(board.valid);
        assert_eq!(board.columns.len(), 0);
    }

    #[test]
    fn test_continuation_with_blank_lines() {
        let md = "---\nkanban-plugin: board\n---\n\n## Col\n- [ ] Task\n  line1\n  line2\n\n## Next\n";
        let board = parse_markdown(md);
        assert_eq!(board.columns[0].tasks[0].content, "Task\nline1\nline2");
    }
}
