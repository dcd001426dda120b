use axum::http::StatusCode;
use axum::routing::{any, get};
use axum::Router;

pub mod caldav;
pub mod status;
pub mod webdav;

use crate::state::AppState;

/// Routes:
///
///   GET      /status                             -> health + per-board etags
///   *        /bookmarks[/]                       -> WebDAV root collection
///   *        /bookmarks/{name}                   -> bookmark or lock resource
///   *        /.well-known/caldav                 -> redirect to /caldav/
///   *        /caldav[/]                          -> CalDAV principal
///   *        /caldav/calendars[/]                -> calendar home
///   *        /caldav/calendars/{slug}[/]         -> calendar collection
///   *        /caldav/calendars/{slug}/{item}     -> single .ics item
///
/// PROPFIND and REPORT are not methods axum routes on, so DAV endpoints
/// register with `any` and dispatch on the method themselves.
pub fn api_router() -> Router<AppState> {
    Router::new()
        .route("/status", get(status::status))
        .route("/bookmarks", any(webdav::collection))
        .route("/bookmarks/", any(webdav::collection))
        .route("/bookmarks/{name}", any(webdav::resource))
        .route("/.well-known/caldav", any(caldav::well_known))
        .route("/caldav", any(caldav::principal))
        .route("/caldav/", any(caldav::principal))
        .route("/caldav/calendars", any(caldav::calendar_home))
        .route("/caldav/calendars/", any(caldav::calendar_home))
        .route("/caldav/calendars/{slug}", any(caldav::collection))
        .route("/caldav/calendars/{slug}/", any(caldav::collection))
        .route("/caldav/calendars/{slug}/{item}", any(caldav::item))
}

/// Map store errors onto protocol status codes.
pub fn store_error_status(error: &kandav_core::store::StoreError) -> StatusCode {
    use kandav_core::store::StoreError;
    match error {
        StoreError::NotFound(_) => StatusCode::NOT_FOUND,
        StoreError::Parse(_) => StatusCode::BAD_REQUEST,
        StoreError::Forbidden(_) => StatusCode::FORBIDDEN,
        StoreError::Write { .. } | StoreError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub fn log_api_issue(status: StatusCode, target: &'static str, message: impl AsRef<str>) {
    let message = message.as_ref();
    if status.is_server_error() {
        log::error!(target: target, "{}", message);
    } else {
        log::warn!(target: target, "{}", message);
    }
}

/// Parse the Depth header; anything unrecognized (including "infinity")
/// is treated as depth 1, the deepest level the projections have.
pub fn depth(headers: &axum::http::HeaderMap) -> u8 {
    headers
        .get("depth")
        .and_then(|v| v.to_str().ok())
        .map(|v| if v.trim() == "0" { 0 } else { 1 })
        .unwrap_or(1)
}
