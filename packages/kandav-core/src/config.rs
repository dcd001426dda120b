/// Configuration document types, shared between the server and tests.
/// Loading and hot-reload live in the server; these are just the shapes.
use serde::{Deserialize, Serialize};

use crate::store::{BoardOptions, CalendarOptions};

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8077
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub boards: Vec<BoardEntry>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
            boards: Vec::new(),
        }
    }
}

/// One tracked board file and its per-board flags.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardEntry {
    pub file: String,
    #[serde(default)]
    pub name: Option<String>,
    /// Bookmark sync on/off.
    #[serde(default = "default_true")]
    pub bookmarks: bool,
    /// Custom bookmark resource filename.
    #[serde(default)]
    pub bookmark_file: Option<String>,
    /// Calendar sync on/off.
    #[serde(default)]
    pub calendar: bool,
    #[serde(default)]
    pub calendar_slug: Option<String>,
    #[serde(default)]
    pub calendar_name: Option<String>,
}

impl BoardEntry {
    pub fn to_options(&self) -> BoardOptions {
        BoardOptions {
            name: self.name.clone(),
            bookmarks: self.bookmarks,
            bookmark_file: self.bookmark_file.clone(),
            calendar: self.calendar.then(|| CalendarOptions {
                slug: self.calendar_slug.clone().unwrap_or_default(),
                name: self.calendar_name.clone(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config: Config = serde_json::from_str("{}").unwrap();
        assert_eq!(config.bind_address, "127.0.0.1");
        assert_eq!(config.port, 8077);
        assert!(config.boards.is_empty());
    }

    #[test]
    fn test_board_entry_flags() {
        let entry: BoardEntry = serde_json::from_str(
            r#"{"file": "/tmp/work.md", "calendar": true, "calendarSlug": "team"}"#,
        )
        .unwrap();
        assert!(entry.bookmarks);
        let options = entry.to_options();
        assert_eq!(options.calendar.as_ref().unwrap().slug, "team");
    }

    #[test]
    fn test_calendar_disabled_by_default() {
        let entry: BoardEntry = serde_json::from_str(r#"{"file": "/tmp/work.md"}"#).unwrap();
        assert!(entry.to_options().calendar.is_none());
    }
}
