/// XBEL 1.0 parsing and generation.
///
/// The wire format is the `folder`/`bookmark`/`title`/`desc` subset with
/// `id` and `href` attributes. Bookmarks that appear directly under the
/// document root are collected into a synthetic "Unsorted" folder so the
/// rest of the pipeline only ever sees folders at the top level.
use std::io::Cursor;

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

use super::{BookmarkEntry, BookmarkFolder, UNSORTED_FOLDER};

#[derive(Debug, thiserror::Error)]
pub enum XbelError {
    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("XML attribute error: {0}")]
    Attr(#[from] quick_xml::events::attributes::AttrError),

    #[error("malformed bookmark document: {0}")]
    Malformed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TextTarget {
    None,
    Title,
    Desc,
}

/// Parse an XBEL document into the top-level folder list.
pub fn parse_xbel(xml: &str) -> Result<Vec<BookmarkFolder>, XbelError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut top_level: Vec<BookmarkFolder> = Vec::new();
    let mut root_bookmarks: Vec<BookmarkEntry> = Vec::new();
    let mut folder_stack: Vec<BookmarkFolder> = Vec::new();
    let mut current_bookmark: Option<BookmarkEntry> = None;
    let mut text_target = TextTarget::None;

    loop {
        match reader.read_event()? {
            Event::Start(e) => match e.name().as_ref() {
                b"folder" => {
                    let mut folder = BookmarkFolder::default();
                    for attr in e.attributes() {
                        let attr = attr?;
                        if attr.key.as_ref() == b"id" {
                            folder.id = attr.unescape_value()?.into_owned();
                        }
                    }
                    folder_stack.push(folder);
                }
                b"bookmark" => {
                    let mut entry = BookmarkEntry {
                        id: String::new(),
                        title: String::new(),
                        href: String::new(),
                        description: None,
                    };
                    for attr in e.attributes() {
                        let attr = attr?;
                        match attr.key.as_ref() {
                            b"href" => entry.href = attr.unescape_value()?.into_owned(),
                            b"id" => entry.id = attr.unescape_value()?.into_owned(),
                            _ => {}
                        }
                    }
                    current_bookmark = Some(entry);
                }
                b"title" => text_target = TextTarget::Title,
                b"desc" => text_target = TextTarget::Desc,
                _ => {}
            },
            Event::Empty(e) => {
                if e.name().as_ref() == b"bookmark" {
                    let mut entry = BookmarkEntry {
                        id: String::new(),
                        title: String::new(),
                        href: String::new(),
                        description: None,
                    };
                    for attr in e.attributes() {
                        let attr = attr?;
                        match attr.key.as_ref() {
                            b"href" => entry.href = attr.unescape_value()?.into_owned(),
                            b"id" => entry.id = attr.unescape_value()?.into_owned(),
                            _ => {}
                        }
                    }
                    push_bookmark(entry, &mut folder_stack, &mut root_bookmarks);
                }
            }
            Event::Text(t) => {
                let text = t.unescape()?.into_owned();
                match text_target {
                    TextTarget::Title => {
                        if let Some(bookmark) = current_bookmark.as_mut() {
                            bookmark.title = text;
                        } else if let Some(folder) = folder_stack.last_mut() {
                            folder.title = text;
                        }
                    }
                    TextTarget::Desc => {
                        if let Some(bookmark) = current_bookmark.as_mut() {
                            bookmark.description = Some(text);
                        }
                    }
                    TextTarget::None => {}
                }
            }
            Event::End(e) => match e.name().as_ref() {
                b"folder" => {
                    let folder = folder_stack
                        .pop()
                        .ok_or_else(|| XbelError::Malformed("unbalanced folder end".into()))?;
                    if let Some(parent) = folder_stack.last_mut() {
                        parent.children.push(folder);
                    } else {
                        top_level.push(folder);
                    }
                }
                b"bookmark" => {
                    if let Some(entry) = current_bookmark.take() {
                        push_bookmark(entry, &mut folder_stack, &mut root_bookmarks);
                    }
                }
                b"title" | b"desc" => text_target = TextTarget::None,
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }

    if !folder_stack.is_empty() {
        return Err(XbelError::Malformed("unclosed folder element".into()));
    }

    if !root_bookmarks.is_empty() {
        let mut unsorted = BookmarkFolder::named(UNSORTED_FOLDER);
        unsorted.bookmarks = root_bookmarks;
        top_level.push(unsorted);
    }

    Ok(top_level)
}

fn push_bookmark(
    entry: BookmarkEntry,
    folder_stack: &mut [BookmarkFolder],
    root_bookmarks: &mut Vec<BookmarkEntry>,
) {
    if let Some(folder) = folder_stack.last_mut() {
        folder.bookmarks.push(entry);
    } else {
        root_bookmarks.push(entry);
    }
}

/// Generate an XBEL document from a folder tree. Inverse of [`parse_xbel`].
pub fn generate_xbel(tree: &[BookmarkFolder]) -> String {
    let mut writer = Writer::new_with_indent(Cursor::new(Vec::new()), b' ', 2);

    // Write errors cannot occur on an in-memory cursor.
    let _ = writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)));

    let mut xbel = BytesStart::new("xbel");
    xbel.push_attribute(("version", "1.0"));
    let _ = writer.write_event(Event::Start(xbel));

    for folder in tree {
        write_folder(&mut writer, folder);
    }

    let _ = writer.write_event(Event::End(BytesEnd::new("xbel")));

    let bytes = writer.into_inner().into_inner();
    let mut out = String::from_utf8(bytes).unwrap_or_default();
    out.push('\n');
    out
}

fn write_folder(writer: &mut Writer<Cursor<Vec<u8>>>, folder: &BookmarkFolder) {
    let mut start = BytesStart::new("folder");
    if !folder.id.is_empty() {
        start.push_attribute(("id", folder.id.as_str()));
    }
    let _ = writer.write_event(Event::Start(start));

    let _ = writer.write_event(Event::Start(BytesStart::new("title")));
    let _ = writer.write_event(Event::Text(BytesText::new(&folder.title)));
    let _ = writer.write_event(Event::End(BytesEnd::new("title")));

    for bookmark in &folder.bookmarks {
        let mut start = BytesStart::new("bookmark");
        start.push_attribute(("href", bookmark.href.as_str()));
        if !bookmark.id.is_empty() {
            start.push_attribute(("id", bookmark.id.as_str()));
        }
        let _ = writer.write_event(Event::Start(start));

        let _ = writer.write_event(Event::Start(BytesStart::new("title")));
        let _ = writer.write_event(Event::Text(BytesText::new(&bookmark.title)));
        let _ = writer.write_event(Event::End(BytesEnd::new("title")));

        if let Some(desc) = &bookmark.description {
            let _ = writer.write_event(Event::Start(BytesStart::new("desc")));
            let _ = writer.write_event(Event::Text(BytesText::new(desc)));
            let _ = writer.write_event(Event::End(BytesEnd::new("desc")));
        }

        let _ = writer.write_event(Event::End(BytesEnd::new("bookmark")));
    }

    for child in &folder.children {
        write_folder(writer, child);
    }

    let _ = writer.write_event(Event::End(BytesEnd::new("folder")));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_tree() -> Vec<BookmarkFolder> {
        vec![
            BookmarkFolder {
                id: "f1".into(),
                title: "Reading".into(),
                bookmarks: vec![BookmarkEntry {
                    id: "b1".into(),
                    title: "Example & More".into(),
                    href: "https://example.com/?a=1&b=2".into(),
                    description: Some("notes <here>".into()),
                }],
                children: vec![BookmarkFolder {
                    id: "f2".into(),
                    title: "Deep".into(),
                    bookmarks: vec![BookmarkEntry {
                        id: "b2".into(),
                        title: "Nested".into(),
                        href: "https://nested.example".into(),
                        description: None,
                    }],
                    children: Vec::new(),
                }],
            },
            BookmarkFolder {
                id: "f3".into(),
                title: "Empty".into(),
                bookmarks: Vec::new(),
                children: Vec::new(),
            },
        ]
    }

    #[test]
    fn test_roundtrip_preserves_structure() {
        let tree = sample_tree();
        let xml = generate_xbel(&tree);
        let reparsed = parse_xbel(&xml).unwrap();
        assert_eq!(reparsed, tree);
    }

    #[test]
    fn test_root_level_bookmarks_become_unsorted() {
        let xml = r#"<?xml version="1.0"?>
<xbel version="1.0">
  <bookmark href="https://loose.example" id="x1"><title>Loose</title></bookmark>
  <folder id="f"><title>Real</title></folder>
</xbel>"#;
        let tree = parse_xbel(xml).unwrap();
        assert_eq!(tree.len(), 2);
        assert_eq!(tree[0].title, "Real");
        assert_eq!(tree[1].title, UNSORTED_FOLDER);
        assert_eq!(tree[1].bookmarks[0].href, "https://loose.example");
    }

    #[test]
    fn test_self_closing_bookmark() {
        let xml = r#"<xbel version="1.0"><folder><title>F</title><bookmark href="https://a.example" id="z"/></folder></xbel>"#;
        let tree = parse_xbel(xml).unwrap();
        assert_eq!(tree[0].bookmarks.len(), 1);
        assert_eq!(tree[0].bookmarks[0].title, "");
    }

    #[test]
    fn test_unbalanced_document_rejected() {
        let xml = r#"<xbel version="1.0"><folder><title>F</title>"#;
        assert!(parse_xbel(xml).is_err());
    }

    #[test]
    fn test_escaping_roundtrip() {
        let tree = vec![BookmarkFolder {
            id: String::new(),
            title: "A < B & \"C\"".into(),
            bookmarks: Vec::new(),
            children: Vec::new(),
        }];
        let xml = generate_xbel(&tree);
        let reparsed = parse_xbel(&xml).unwrap();
        assert_eq!(reparsed[0].title, "A < B & \"C\"");
    }
}
