/// CalDAV adapter: principal discovery, calendar collections per slug,
/// REPORT evaluation, and read-only item access.
use axum::extract::{Path, State};
use axum::http::{HeaderMap, Method, StatusCode};
use axum::response::{IntoResponse, Redirect, Response};
use percent_encoding::percent_decode_str;

use kandav_core::calendar::ics::{calendar_to_ics, item_to_ics};
use kandav_core::calendar::query::{
    composite_ctag, item_etag, matches, merge_group_items, parse_report, ReportQuery,
};
use kandav_core::calendar::CalendarItem;

use super::depth;
use crate::dav_xml::{raw_prop, text_prop, xml_escape, MultiStatus};
use crate::state::AppState;

const PRINCIPAL_PATH: &str = "/caldav/";
const CALENDAR_HOME: &str = "/caldav/calendars/";
const ALLOW: &str = "OPTIONS, PROPFIND, REPORT, GET, HEAD";
const ICS_CONTENT_TYPE: &str = "text/calendar; charset=utf-8";

fn multistatus(body: String) -> Response {
    (
        StatusCode::MULTI_STATUS,
        [
            ("content-type", "application/xml; charset=utf-8"),
            ("dav", "1, calendar-access"),
        ],
        body,
    )
        .into_response()
}

fn options_response() -> Response {
    (
        StatusCode::OK,
        [("dav", "1, calendar-access"), ("allow", ALLOW)],
    )
        .into_response()
}

fn method_not_allowed() -> Response {
    (StatusCode::METHOD_NOT_ALLOWED, [("allow", ALLOW)]).into_response()
}

/// Aggregated view of one calendar group.
struct CalendarGroup {
    slug: String,
    display_name: String,
    ctag: String,
    items: Vec<CalendarItem>,
}

fn load_group(state: &AppState, slug: &str) -> Option<CalendarGroup> {
    let boards = state.store.by_calendar_slug(slug);
    if boards.is_empty() {
        return None;
    }

    let etags: Vec<String> = boards.iter().map(|b| b.content_etag.clone()).collect();
    let ctag = composite_ctag(&etags);
    let display_name = boards
        .iter()
        .find_map(|b| b.calendar_name.clone())
        .unwrap_or_else(|| slug.to_string());
    let items = merge_group_items(
        boards
            .iter()
            .map(|b| b.calendar_items.clone().unwrap_or_default())
            .collect(),
    );

    Some(CalendarGroup {
        slug: slug.to_string(),
        display_name,
        ctag,
        items,
    })
}

fn collection_props(group: &CalendarGroup) -> String {
    let mut props = String::new();
    props.push_str(&raw_prop(
        "D:resourcetype",
        "<D:collection/><C:calendar/>",
    ));
    props.push_str(&text_prop("D:displayname", &group.display_name));
    props.push_str(&text_prop("CS:getctag", &group.ctag));
    props.push_str(&raw_prop(
        "C:supported-calendar-component-set",
        "<C:comp name=\"VEVENT\"/><C:comp name=\"VTODO\"/>",
    ));
    props
}

fn item_href(slug: &str, uid: &str) -> String {
    format!("{}{}/{}.ics", CALENDAR_HOME, slug, uid)
}

fn item_props(item: &CalendarItem, ctag: &str, with_data: bool) -> String {
    let mut props = String::new();
    props.push_str(&text_prop("D:getetag", &item_etag(&item.uid, ctag)));
    props.push_str(&text_prop("D:getcontenttype", "text/calendar"));
    if with_data {
        props.push_str(&raw_prop(
            "C:calendar-data",
            &xml_escape(&item_to_ics(item)),
        ));
    }
    props
}

/// `/.well-known/caldav` points clients at the principal resource.
pub async fn well_known() -> Response {
    Redirect::permanent(PRINCIPAL_PATH).into_response()
}

/// The principal resource: answers the discovery PROPFIND.
pub async fn principal(method: Method) -> Response {
    match method.as_str() {
        "OPTIONS" => options_response(),
        "PROPFIND" => {
            let mut props = String::new();
            props.push_str(&raw_prop(
                "D:current-user-principal",
                &format!("<D:href>{}</D:href>", PRINCIPAL_PATH),
            ));
            props.push_str(&raw_prop(
                "C:calendar-home-set",
                &format!("<D:href>{}</D:href>", CALENDAR_HOME),
            ));
            props.push_str(&text_prop("D:displayname", "kandav"));
            props.push_str(&raw_prop("D:resourcetype", "<D:collection/>"));

            let mut ms = MultiStatus::new();
            ms.response(PRINCIPAL_PATH, &props);
            multistatus(ms.finish())
        }
        _ => method_not_allowed(),
    }
}

/// The calendar home: one child collection per calendar slug.
pub async fn calendar_home(
    State(state): State<AppState>,
    method: Method,
    headers: HeaderMap,
) -> Response {
    match method.as_str() {
        "OPTIONS" => options_response(),
        "PROPFIND" => {
            let mut ms = MultiStatus::new();
            let mut home_props = String::new();
            home_props.push_str(&text_prop("D:displayname", "calendars"));
            home_props.push_str(&raw_prop("D:resourcetype", "<D:collection/>"));
            ms.response(CALENDAR_HOME, &home_props);

            if depth(&headers) >= 1 {
                for slug in state.store.calendar_slugs() {
                    if let Some(group) = load_group(&state, &slug) {
                        let href = format!("{}{}/", CALENDAR_HOME, group.slug);
                        ms.response(&href, &collection_props(&group));
                    }
                }
            }
            multistatus(ms.finish())
        }
        _ => method_not_allowed(),
    }
}

/// One calendar collection: PROPFIND metadata, REPORT queries, GET feed.
pub async fn collection(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    method: Method,
    headers: HeaderMap,
    body: String,
) -> Response {
    let Some(group) = load_group(&state, &slug) else {
        return StatusCode::NOT_FOUND.into_response();
    };

    match method.as_str() {
        "OPTIONS" => options_response(),
        "PROPFIND" => {
            let mut ms = MultiStatus::new();
            let href = format!("{}{}/", CALENDAR_HOME, group.slug);
            ms.response(&href, &collection_props(&group));

            if depth(&headers) >= 1 {
                for item in &group.items {
                    ms.response(
                        &item_href(&group.slug, &item.uid),
                        &item_props(item, &group.ctag, false),
                    );
                }
            }
            multistatus(ms.finish())
        }
        "REPORT" => {
            let query = parse_report(&body);
            let mut ms = MultiStatus::new();
            for item in group.items.iter().filter(|i| matches(i, &query)) {
                ms.response(
                    &item_href(&group.slug, &item.uid),
                    &item_props(item, &group.ctag, true),
                );
            }
            // Multiget hrefs that matched nothing get an explicit 404.
            if let ReportQuery::Multiget { uids } = &query {
                for uid in uids {
                    if !group.items.iter().any(|i| &i.uid == uid) {
                        ms.status_response(
                            &item_href(&group.slug, uid),
                            "HTTP/1.1 404 Not Found",
                        );
                    }
                }
            }
            multistatus(ms.finish())
        }
        "GET" | "HEAD" => {
            let ics = calendar_to_ics(&group.display_name, &group.items);
            let response_headers = [
                ("content-type", ICS_CONTENT_TYPE.to_string()),
                ("etag", format!("\"{}\"", group.ctag)),
            ];
            if method.as_str() == "HEAD" {
                (StatusCode::OK, response_headers).into_response()
            } else {
                (StatusCode::OK, response_headers, ics).into_response()
            }
        }
        // The calendar is a read-only projection.
        "PUT" | "DELETE" | "COPY" | "MOVE" | "MKCALENDAR" => {
            StatusCode::FORBIDDEN.into_response()
        }
        _ => method_not_allowed(),
    }
}

/// A single `{uid}.ics` item.
pub async fn item(
    State(state): State<AppState>,
    Path((slug, item_name)): Path<(String, String)>,
    method: Method,
) -> Response {
    let Some(group) = load_group(&state, &slug) else {
        return StatusCode::NOT_FOUND.into_response();
    };
    let decoded = percent_decode_str(&item_name)
        .decode_utf8()
        .map(|s| s.into_owned())
        .unwrap_or(item_name);
    let Some(uid) = decoded.strip_suffix(".ics") else {
        return StatusCode::NOT_FOUND.into_response();
    };
    let Some(found) = group.items.iter().find(|i| i.uid == uid) else {
        return StatusCode::NOT_FOUND.into_response();
    };

    match method.as_str() {
        "OPTIONS" => options_response(),
        "GET" | "HEAD" => {
            let response_headers = [
                ("content-type", ICS_CONTENT_TYPE.to_string()),
                ("etag", item_etag(uid, &group.ctag)),
            ];
            if method.as_str() == "HEAD" {
                (StatusCode::OK, response_headers).into_response()
            } else {
                (StatusCode::OK, response_headers, item_to_ics(found)).into_response()
            }
        }
        "PROPFIND" => {
            let mut ms = MultiStatus::new();
            ms.response(
                &item_href(&group.slug, uid),
                &item_props(found, &group.ctag, false),
            );
            multistatus(ms.finish())
        }
        "PUT" | "DELETE" => StatusCode::FORBIDDEN.into_response(),
        _ => method_not_allowed(),
    }
}
