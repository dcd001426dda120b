/// Multistatus envelope construction for PROPFIND and REPORT responses.
///
/// Namespace prefixes used throughout: `D` for DAV:, `C` for the CalDAV
/// namespace, `CS` for the calendarserver extension that carries getctag.
use std::time::SystemTime;

use chrono::{DateTime, Utc};

pub fn xml_escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(ch),
        }
    }
    out
}

/// RFC 3339 timestamp for the DAV creationdate property.
pub fn dav_timestamp(time: SystemTime) -> String {
    let dt: DateTime<Utc> = time.into();
    dt.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

/// Builder for a 207 multistatus body.
pub struct MultiStatus {
    buf: String,
}

impl MultiStatus {
    pub fn new() -> Self {
        let mut buf = String::from("<?xml version=\"1.0\" encoding=\"utf-8\"?>\n");
        buf.push_str(
            "<D:multistatus xmlns:D=\"DAV:\" \
             xmlns:C=\"urn:ietf:params:xml:ns:caldav\" \
             xmlns:CS=\"http://calendarserver.org/ns/\">\n",
        );
        Self { buf }
    }

    /// One response with a 200 propstat.
    pub fn response(&mut self, href: &str, props: &str) {
        self.buf.push_str("  <D:response>\n");
        self.buf
            .push_str(&format!("    <D:href>{}</D:href>\n", xml_escape(href)));
        self.buf.push_str("    <D:propstat>\n      <D:prop>\n");
        self.buf.push_str(props);
        self.buf.push_str("      </D:prop>\n");
        self.buf
            .push_str("      <D:status>HTTP/1.1 200 OK</D:status>\n");
        self.buf.push_str("    </D:propstat>\n  </D:response>\n");
    }

    /// One response carrying only a status line (e.g. a 404 for a multiget
    /// href that matched nothing).
    pub fn status_response(&mut self, href: &str, status_line: &str) {
        self.buf.push_str("  <D:response>\n");
        self.buf
            .push_str(&format!("    <D:href>{}</D:href>\n", xml_escape(href)));
        self.buf
            .push_str(&format!("    <D:status>{}</D:status>\n", status_line));
        self.buf.push_str("  </D:response>\n");
    }

    pub fn finish(mut self) -> String {
        self.buf.push_str("</D:multistatus>\n");
        self.buf
    }
}

impl Default for MultiStatus {
    fn default() -> Self {
        Self::new()
    }
}

/// A simple `<tag>value</tag>` property line (value pre-escaped by caller
/// only when it contains markup; plain text is escaped here).
pub fn text_prop(tag: &str, value: &str) -> String {
    format!("        <{}>{}</{}>\n", tag, xml_escape(value), tag)
}

/// A property whose content is raw XML (nested elements).
pub fn raw_prop(tag: &str, inner: &str) -> String {
    format!("        <{}>{}</{}>\n", tag, inner, tag)
}

/// An empty property element.
pub fn empty_prop(tag: &str) -> String {
    format!("        <{}/>\n", tag)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape() {
        assert_eq!(xml_escape("a<b>&\"c\""), "a&lt;b&gt;&amp;&quot;c&quot;");
    }

    #[test]
    fn test_multistatus_shape() {
        let mut ms = MultiStatus::new();
        ms.response("/bookmarks/", &empty_prop("D:resourcetype"));
        ms.status_response("/bookmarks/gone.xbel", "HTTP/1.1 404 Not Found");
        let body = ms.finish();

        assert!(body.starts_with("<?xml"));
        assert!(body.contains("<D:multistatus"));
        assert!(body.contains("<D:href>/bookmarks/</D:href>"));
        assert!(body.contains("HTTP/1.1 404 Not Found"));
        assert!(body.ends_with("</D:multistatus>\n"));
    }

    #[test]
    fn test_dav_timestamp_format() {
        let ts = dav_timestamp(SystemTime::UNIX_EPOCH);
        assert_eq!(ts, "1970-01-01T00:00:00Z");
    }
}
