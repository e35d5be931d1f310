use notitap_core::{
    Container, Dimension, Document, DocumentError, Editor, HeadingLevel, MarkKind, Marks,
    MediaType, Node, Op, PluginRegistry, Point, Selection, StoredDocument, TextNode, Transaction,
    deserialize, load_or_notice, serialize,
};
use serde_json::json;

fn type_text(editor: &mut Editor, text: &str) {
    let focus = editor.selection().focus.clone();
    let after = Point::new(focus.path.clone(), focus.offset + text.len());
    editor
        .apply(
            Transaction::new(vec![Op::InsertText {
                path: focus.path,
                offset: focus.offset,
                text: text.to_string(),
            }])
            .selection_after(Selection::collapsed(after))
            .source("test:type"),
        )
        .unwrap();
}

#[test]
fn documents_built_through_the_editor_round_trip() {
    let mut editor = Editor::with_default_plugins();
    type_text(&mut editor, "Intro");
    editor
        .run_command("block.set_heading", Some(json!({ "level": 1 })))
        .unwrap();
    editor.run_command("block.insert_wrapper", None).unwrap();
    type_text(&mut editor, "first item");
    editor.run_command("list.toggle_bullet", None).unwrap();

    let focus = editor.selection().focus.clone();
    editor.set_selection(Selection {
        anchor: Point::new(focus.path.clone(), 0),
        focus: Point::new(focus.path, 5),
    });
    editor.run_command("marks.toggle_bold", None).unwrap();
    editor
        .run_command(
            "media.insert",
            Some(json!({ "src": "https://cdn.example.com/a.png", "media_type": "img" })),
        )
        .unwrap();

    let json = editor.to_json().unwrap();
    assert_eq!(&deserialize(&json).unwrap(), editor.doc());

    let reloaded = Editor::from_json(&json, PluginRegistry::notitap());
    assert_eq!(reloaded.doc(), editor.doc());
}

#[test]
fn serialized_documents_carry_the_envelope() {
    let doc = Document::from_blocks([Node::paragraph("hi")]);
    let value: serde_json::Value = serde_json::from_str(&serialize(&doc).unwrap()).unwrap();

    assert_eq!(value["schema"], "notitap");
    assert_eq!(value["version"], 1);
    assert_eq!(value["document"]["content"][0]["type"], "dBlock");
    assert_eq!(
        value["document"]["content"][0]["content"][0]["content"][0]["text"],
        "hi"
    );
}

#[test]
fn bare_documents_are_accepted() {
    let bare = json!({
        "type": "doc",
        "content": [
            { "type": "dBlock", "content": [
                { "type": "paragraph", "content": [{ "type": "text", "text": "hi" }] }
            ]}
        ]
    });

    let doc = deserialize(&bare.to_string()).unwrap();
    assert_eq!(doc, Document::from_blocks([Node::paragraph("hi")]));
}

#[test]
fn newer_versions_are_refused() {
    let stored = json!({ "schema": "notitap", "version": 2, "document": { "content": [] } });
    let err = deserialize(&stored.to_string()).unwrap_err();
    assert!(matches!(err, DocumentError::Unsupported { version: 2, .. }));

    let foreign = json!({ "schema": "prosemirror", "document": { "content": [] } });
    assert!(matches!(
        StoredDocument::from_json_str(&foreign.to_string()),
        Err(DocumentError::Unsupported { .. })
    ));
}

#[test]
fn media_dimensions_accept_pixel_strings_and_auto() {
    let stored = json!({
        "schema": "notitap",
        "version": 1,
        "document": { "content": [
            { "type": "dBlock", "content": [
                { "type": "resizableMedia", "attrs": {
                    "src": "https://cdn.example.com/v.mp4",
                    "media-type": "video",
                    "width": "320px",
                    "height": "auto",
                    "dataAlign": "center"
                }}
            ]}
        ]}
    });

    let doc = deserialize(&stored.to_string()).unwrap();
    let Some(Node::Media(media)) = doc.node(&[0, 0]) else {
        panic!("expected media node");
    };
    assert_eq!(media.attrs.media_type, MediaType::Video);
    assert_eq!(media.attrs.width, Dimension::Px(320.0));
    assert_eq!(media.attrs.height, Dimension::Auto);
}

#[test]
fn unreadable_documents_become_a_notice() {
    let notice = Document::from_blocks([Node::notice()]);

    assert_eq!(load_or_notice("{ not json"), notice);
    assert_eq!(load_or_notice("[1, 2, 3]"), notice);
    assert_eq!(load_or_notice(r#"{"content": 7}"#), notice);
    assert_eq!(
        load_or_notice(r#"{"schema": "notitap", "version": 9, "document": {"content": []}}"#),
        notice
    );
}

#[test]
fn a_malformed_block_is_isolated_from_its_siblings() {
    let stored = json!({
        "schema": "notitap",
        "version": 1,
        "document": { "content": [
            { "type": "dBlock", "content": [
                { "type": "heading", "attrs": { "level": 2 }, "content": [{ "type": "text", "text": "Kept" }] }
            ]},
            { "type": "dBlock", "content": [{ "type": "spreadsheet" }] },
            { "type": "dBlock", "content": [
                { "type": "resizableMedia", "attrs": { "src": "a.png", "media-type": "img", "width": -4 } }
            ]},
            { "type": "dBlock", "content": [
                { "type": "paragraph", "content": [{ "type": "text", "text": "also kept" }] }
            ]}
        ]}
    });

    let doc = load_or_notice(&stored.to_string());
    assert_eq!(
        doc,
        Document::from_blocks([
            Node::heading(HeadingLevel::H2, "Kept"),
            Node::notice(),
            Node::notice(),
            Node::paragraph("also kept"),
        ])
    );
}

#[test]
fn editor_loads_partially_broken_documents_with_the_cursor_in_text() {
    let stored = json!({
        "content": [
            { "type": "dBlock", "content": [{ "type": "heading", "attrs": { "level": 7 } }] },
            { "type": "dBlock", "content": [
                { "type": "paragraph", "content": [{ "type": "text", "text": "body" }] }
            ]}
        ]
    });

    let editor = Editor::from_json(&stored.to_string(), PluginRegistry::notitap());
    assert_eq!(
        editor.doc(),
        &Document::from_blocks([Node::notice(), Node::paragraph("body")])
    );
    assert_eq!(editor.selection().focus, Point::new(vec![0, 0, 0], 0));
}

fn marked(text: &str, marks: &[MarkKind]) -> Node {
    Node::Text(TextNode {
        text: text.to_string(),
        marks: marks
            .iter()
            .fold(Marks::default(), |acc, mark| acc.with(*mark, true)),
    })
}

#[test]
fn editor_mark_arrays_and_hard_breaks_load() {
    let stored = json!({
        "type": "doc",
        "content": [
            { "type": "dBlock", "content": [
                { "type": "paragraph", "content": [
                    { "type": "text", "text": "Bold", "marks": [
                        { "type": "bold" },
                        { "type": "italic" },
                        { "type": "link", "attrs": { "href": "https://example.com" } }
                    ]},
                    { "type": "hardBreak" },
                    { "type": "text", "text": "next line" }
                ]}
            ]},
            { "type": "dBlock", "content": [
                { "type": "paragraph", "content": [
                    { "type": "text", "text": "old", "marks": { "underline": true } }
                ]}
            ]}
        ]
    });

    let doc = load_or_notice(&stored.to_string());
    assert_eq!(
        doc,
        Document::from_blocks([
            Node::Paragraph(Container::new(vec![
                marked("Bold", &[MarkKind::Bold, MarkKind::Italic]),
                Node::HardBreak,
                Node::text("next line"),
            ])),
            Node::Paragraph(Container::new(vec![marked("old", &[MarkKind::Underline])])),
        ])
    );
    assert_eq!(doc.text_content(), "Bold\nnext lineold");
}

#[test]
fn marks_are_written_as_arrays_and_omitted_when_empty() {
    let doc = Document::from_blocks([Node::Paragraph(Container::new(vec![
        marked("a", &[MarkKind::Strike]),
        Node::HardBreak,
        Node::text("b"),
    ]))]);
    let value: serde_json::Value = serde_json::from_str(&serialize(&doc).unwrap()).unwrap();
    let inline = &value["document"]["content"][0]["content"][0]["content"];

    assert_eq!(inline[0]["marks"], json!([{ "type": "strike" }]));
    assert_eq!(inline[1], json!({ "type": "hardBreak" }));
    assert!(inline[2].get("marks").is_none());
    assert_eq!(deserialize(&value.to_string()).unwrap(), doc);
}

#[test]
fn roots_without_content_are_not_documents() {
    assert!(matches!(deserialize("{}"), Err(DocumentError::Unrecognized)));
    assert!(matches!(
        deserialize(r#"{"type": "doc"}"#),
        Err(DocumentError::Unrecognized)
    ));

    // The lenient loader still opens them, empty.
    assert_eq!(load_or_notice(r#"{"type": "doc"}"#), Document::default());
}
