use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use notitap_core::{
    Container, Document, Editor, HeadingLevel, Node, Op, PluginRegistry, Point, Selection,
    Transaction, compute_heading_ids,
};

fn editor_with_headings(texts: &[&str]) -> Editor {
    let doc = Document::from_blocks(texts.iter().map(|t| Node::heading(HeadingLevel::H2, *t)));
    let selection = Selection::collapsed(Point::new(vec![0, 0, 0], 0));
    Editor::new(doc, selection, PluginRegistry::notitap())
}

fn ids(editor: &Editor) -> Vec<Option<String>> {
    editor
        .doc()
        .headings()
        .into_iter()
        .map(|(_, h)| h.attrs.id.clone())
        .collect()
}

fn some(ids: &[&str]) -> Vec<Option<String>> {
    ids.iter().map(|id| Some(id.to_string())).collect()
}

#[test]
fn colliding_headings_get_numbered_in_document_order() {
    let editor = editor_with_headings(&["Intro", "Intro", "Intro"]);

    assert_eq!(ids(&editor), some(&["intro", "intro-1", "intro-2"]));
    for (_, heading) in editor.doc().headings() {
        assert_eq!(heading.attrs.base_text.as_deref(), Some("Intro"));
    }
}

#[test]
fn ids_follow_edits_and_deletions() {
    let mut editor = editor_with_headings(&["Intro", "Intro", "Setup Guide"]);
    assert_eq!(ids(&editor), some(&["intro", "intro-1", "setup-guide"]));

    editor
        .apply(Transaction::new(vec![Op::InsertText {
            path: vec![1, 0, 0],
            offset: 5,
            text: " Again".to_string(),
        }]))
        .unwrap();
    assert_eq!(ids(&editor), some(&["intro", "intro-again", "setup-guide"]));

    editor
        .apply(Transaction::new(vec![Op::RemoveNode { path: vec![0] }]))
        .unwrap();
    assert_eq!(ids(&editor), some(&["intro-again", "setup-guide"]));
}

#[test]
fn ids_stay_unique_after_every_transaction() {
    let mut editor = editor_with_headings(&["A", "a", "A 1", "a-1"]);

    for text in ["A", "a", "A-1"] {
        editor
            .apply(Transaction::new(vec![Op::InsertNode {
                path: vec![0],
                node: Node::wrapped(Node::heading(HeadingLevel::H3, text)),
            }]))
            .unwrap();

        let ids: Vec<String> = ids(&editor).into_iter().flatten().collect();
        let unique: HashSet<&String> = ids.iter().collect();
        assert_eq!(unique.len(), ids.len(), "duplicate ids in {ids:?}");
    }
}

#[test]
fn headings_without_slug_text_get_no_id() {
    let editor = editor_with_headings(&["", "   ", "Real"]);
    assert_eq!(ids(&editor), vec![None, None, Some("real".to_string())]);
}

#[test]
fn composition_defers_reidentification_until_it_ends() {
    let mut editor = editor_with_headings(&["Intro"]);
    let attr_updates = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&attr_updates);
    editor.subscribe(move |update| {
        let touched = update
            .transaction
            .ops
            .iter()
            .any(|op| matches!(op, Op::SetNodeAttrs { .. }));
        sink.lock().unwrap().push(touched);
    });

    editor.composition_start();
    assert!(editor.is_composing());
    editor
        .apply(Transaction::new(vec![Op::InsertText {
            path: vec![0, 0, 0],
            offset: 5,
            text: "duction".to_string(),
        }]))
        .unwrap();

    assert_eq!(ids(&editor), some(&["intro"]));
    assert_eq!(*attr_updates.lock().unwrap(), vec![false, false]);

    editor.composition_end();
    assert!(!editor.is_composing());
    assert_eq!(ids(&editor), some(&["introduction"]));
    assert_eq!(*attr_updates.lock().unwrap(), vec![false, false, true]);
}

#[test]
fn undo_restores_previous_ids() {
    let mut editor = editor_with_headings(&["Intro"]);
    editor
        .apply(Transaction::new(vec![Op::InsertText {
            path: vec![0, 0, 0],
            offset: 0,
            text: "New ".to_string(),
        }]))
        .unwrap();
    assert_eq!(ids(&editor), some(&["new-intro"]));

    assert!(editor.undo());
    assert_eq!(ids(&editor), some(&["intro"]));
    let Some(Node::Heading(heading)) = editor.doc().node(&[0, 0]) else {
        panic!("expected heading");
    };
    assert_eq!(heading.attrs.base_text.as_deref(), Some("Intro"));
}

#[test]
fn nested_headings_are_numbered_with_the_rest() {
    let doc = Document::from_blocks([
        Node::heading(HeadingLevel::H1, "Notes"),
        Node::Blockquote(Container::new(vec![Node::heading(HeadingLevel::H2, "Notes")])),
        Node::heading(HeadingLevel::H3, "Notes"),
    ]);

    let computed = compute_heading_ids(&doc);
    let ids: Vec<_> = computed.iter().map(|h| h.id.as_deref()).collect();
    assert_eq!(ids, [Some("notes"), Some("notes-1"), Some("notes-2")]);
    assert_eq!(computed[1].path, vec![1, 0, 0]);
}
