use axum::extract::State;
use axum::response::Json;
use std::time::SystemTime;

use crate::state::AppState;

/// GET /status -- tracked board count plus per-board change tokens.
pub async fn status(State(state): State<AppState>) -> Json<serde_json::Value> {
    let boards: Vec<serde_json::Value> = state
        .store
        .all()
        .into_iter()
        .map(|board| {
            let last_modified = board
                .last_modified
                .duration_since(SystemTime::UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs();
            serde_json::json!({
                "path": board.file_path.to_string_lossy(),
                "name": board.derived_name,
                "etag": board.content_etag,
                "lastModified": last_modified,
                "bookmarks": board.bookmarks_enabled,
                "calendarSlug": board.calendar_slug,
            })
        })
        .collect();

    Json(serde_json::json!({
        "status": "ok",
        "boardCount": boards.len(),
        "boards": boards,
    }))
}
