use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KanbanTask {
    pub id: String,
    /// Raw task text: first line plus continuation lines, without the
    /// leading checkbox marker.
    pub content: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub checked: bool,
}

impl KanbanTask {
    /// First content line of the task.
    pub fn first_line(&self) -> &str {
        self.content.lines().next().unwrap_or("")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KanbanColumn {
    pub id: String,
    pub title: String,
    pub tasks: Vec<KanbanTask>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KanbanBoard {
    pub valid: bool,
    pub title: String,
    pub columns: Vec<KanbanColumn>,
    pub yaml_header: Option<String>,
    pub footer: Option<String>,
}

impl KanbanBoard {
    pub fn task_count(&self) -> usize {
        self.columns.iter().map(|c| c.tasks.len()).sum()
    }
}
