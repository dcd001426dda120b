/// WebDAV adapter for the bookmarks root.
///
/// Board-backed resources serve the cached XBEL projection and write through
/// the merge pipeline; any other name under the root is handled by the
/// in-memory lock store (cooperative lock files some clients create).
use axum::extract::{Path, State};
use axum::http::{HeaderMap, Method, StatusCode};
use axum::response::{IntoResponse, Response};

use kandav_core::dav::resources::ResourceMeta;

use super::{depth, log_api_issue, store_error_status};
use crate::dav_xml::{dav_timestamp, empty_prop, text_prop, MultiStatus};
use crate::state::AppState;

const BOOKMARKS_ROOT: &str = "/bookmarks/";
const ALLOW: &str = "OPTIONS, PROPFIND, GET, HEAD, PUT, DELETE";
const XML_CONTENT_TYPE: &str = "application/xml";

fn multistatus(body: String) -> Response {
    (
        StatusCode::MULTI_STATUS,
        [
            ("content-type", "application/xml; charset=utf-8"),
            ("dav", "1"),
        ],
        body,
    )
        .into_response()
}

fn options_response() -> Response {
    (StatusCode::OK, [("dav", "1"), ("allow", ALLOW)]).into_response()
}

fn method_not_allowed() -> Response {
    (StatusCode::METHOD_NOT_ALLOWED, [("allow", ALLOW)]).into_response()
}

fn resource_props(meta: &ResourceMeta) -> String {
    let mut props = String::new();
    props.push_str(&text_prop("D:creationdate", &dav_timestamp(meta.last_modified)));
    props.push_str(&text_prop("D:displayname", &meta.display_name));
    props.push_str(&text_prop(
        "D:getcontentlength",
        &meta.content_length.to_string(),
    ));
    props.push_str(&text_prop("D:getcontenttype", XML_CONTENT_TYPE));
    props.push_str(&text_prop("D:getetag", &meta.etag));
    props.push_str(&empty_prop("D:resourcetype"));
    props
}

/// The bookmarks root collection.
pub async fn collection(State(state): State<AppState>, method: Method, headers: HeaderMap) -> Response {
    match method.as_str() {
        "OPTIONS" => options_response(),
        "PROPFIND" => {
            let mut ms = MultiStatus::new();
            let mut root_props = String::new();
            root_props.push_str(&text_prop("D:displayname", "bookmarks"));
            root_props.push_str("        <D:resourcetype><D:collection/></D:resourcetype>\n");
            ms.response(BOOKMARKS_ROOT, &root_props);

            if depth(&headers) >= 1 {
                for meta in state.resources.list() {
                    let href = format!("{}{}", BOOKMARKS_ROOT, meta.name);
                    ms.response(&href, &resource_props(&meta));
                }
                for name in state.locks.names() {
                    if let Some(lock) = state.locks.get(&name) {
                        let mut props = String::new();
                        props.push_str(&text_prop(
                            "D:creationdate",
                            &dav_timestamp(lock.created),
                        ));
                        props.push_str(&text_prop("D:displayname", &name));
                        props.push_str(&text_prop(
                            "D:getcontentlength",
                            &lock.body.len().to_string(),
                        ));
                        props.push_str(&text_prop("D:getetag", &lock.etag));
                        props.push_str(&empty_prop("D:resourcetype"));
                        ms.response(&format!("{}{}", BOOKMARKS_ROOT, name), &props);
                    }
                }
            }
            multistatus(ms.finish())
        }
        "GET" | "HEAD" => StatusCode::OK.into_response(),
        _ => method_not_allowed(),
    }
}

/// A named resource under the bookmarks root: either a board projection or
/// a client lock file.
pub async fn resource(
    State(state): State<AppState>,
    Path(name): Path<String>,
    method: Method,
    body: String,
) -> Response {
    if state.resources.exists(&name) {
        board_resource(&state, &name, &method, body).await
    } else {
        lock_resource(&state, &name, &method, body)
    }
}

async fn board_resource(state: &AppState, name: &str, method: &Method, body: String) -> Response {
    match method.as_str() {
        "OPTIONS" => options_response(),
        "PROPFIND" => {
            let content = match state.resources.read(name) {
                Ok(content) => content,
                Err(e) => return store_error_response("kandav.api.webdav", name, &e),
            };
            let mut ms = MultiStatus::new();
            ms.response(
                &format!("{}{}", BOOKMARKS_ROOT, name),
                &resource_props(&content.meta),
            );
            multistatus(ms.finish())
        }
        "GET" | "HEAD" => {
            let content = match state.resources.read(name) {
                Ok(content) => content,
                Err(e) => return store_error_response("kandav.api.webdav", name, &e),
            };
            let headers = [
                ("content-type", "application/xml; charset=utf-8".to_string()),
                ("etag", content.meta.etag.clone()),
            ];
            if method.as_str() == "HEAD" {
                (StatusCode::OK, headers).into_response()
            } else {
                (StatusCode::OK, headers, content.body).into_response()
            }
        }
        "PUT" => match state.resources.write(name, &body).await {
            Ok(meta) => {
                log::info!(
                    "[kandav.api.webdav] Applied bookmark write to {} ({} bytes)",
                    name,
                    body.len()
                );
                (StatusCode::NO_CONTENT, [("etag", meta.etag)]).into_response()
            }
            Err(e) => store_error_response("kandav.api.webdav", name, &e),
        },
        "DELETE" => match state.resources.remove(name) {
            Err(e) => store_error_response("kandav.api.webdav", name, &e),
            Ok(()) => StatusCode::NO_CONTENT.into_response(),
        },
        "COPY" | "MOVE" => match state.resources.relocate(name) {
            Err(e) => store_error_response("kandav.api.webdav", name, &e),
            Ok(()) => StatusCode::NO_CONTENT.into_response(),
        },
        _ => method_not_allowed(),
    }
}

fn lock_resource(state: &AppState, name: &str, method: &Method, body: String) -> Response {
    match method.as_str() {
        "OPTIONS" => options_response(),
        "GET" => match state.locks.get(name) {
            Some(lock) => {
                let content_type = lock
                    .content_type
                    .unwrap_or_else(|| "application/octet-stream".to_string());
                (
                    StatusCode::OK,
                    [("content-type", content_type), ("etag", lock.etag)],
                    lock.body,
                )
                    .into_response()
            }
            None => StatusCode::NOT_FOUND.into_response(),
        },
        "HEAD" | "PROPFIND" => {
            if !state.locks.exists(name) {
                return StatusCode::NOT_FOUND.into_response();
            }
            if method.as_str() == "HEAD" {
                return StatusCode::OK.into_response();
            }
            let Some(lock) = state.locks.get(name) else {
                return StatusCode::NOT_FOUND.into_response();
            };
            let mut props = String::new();
            props.push_str(&text_prop("D:creationdate", &dav_timestamp(lock.created)));
            props.push_str(&text_prop("D:displayname", name));
            props.push_str(&text_prop("D:getetag", &lock.etag));
            props.push_str(&empty_prop("D:resourcetype"));
            let mut ms = MultiStatus::new();
            ms.response(&format!("{}{}", BOOKMARKS_ROOT, name), &props);
            multistatus(ms.finish())
        }
        "PUT" => {
            state.locks.put(name, body.into_bytes(), None);
            log::info!("[kandav.api.webdav] Stored lock file {}", name);
            StatusCode::CREATED.into_response()
        }
        "DELETE" => {
            if state.locks.delete(name) {
                StatusCode::NO_CONTENT.into_response()
            } else {
                StatusCode::NOT_FOUND.into_response()
            }
        }
        _ => method_not_allowed(),
    }
}

fn store_error_response(
    target: &'static str,
    name: &str,
    error: &kandav_core::store::StoreError,
) -> Response {
    let status = store_error_status(error);
    log_api_issue(status, target, format!("{}: {}", name, error));
    (status, error.to_string()).into_response()
}
