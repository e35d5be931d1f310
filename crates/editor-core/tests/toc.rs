use std::sync::{Arc, Mutex};

use notitap_core::{
    ActiveHeadingTracker, Document, Editor, HeadingAnchor, HeadingLevel, Node, Op, PluginRegistry,
    Point, ScrollRequest, Selection, TocConfig, TocIndexer, TocItem, Transaction, ViewportBand,
    extract_toc,
};
use web_time::{Duration, Instant};

fn article() -> Editor {
    let doc = Document::from_blocks([
        Node::heading(HeadingLevel::H1, "Getting Started"),
        Node::paragraph("Welcome."),
        Node::heading(HeadingLevel::H2, "Install"),
        Node::heading(HeadingLevel::H2, "Install"),
        Node::heading(HeadingLevel::H3, "Café & Crème"),
    ]);
    let selection = Selection::collapsed(Point::new(vec![0, 0, 0], 0));
    Editor::new(doc, selection, PluginRegistry::notitap())
}

fn item(id: &str, level: u8, text: &str) -> TocItem {
    TocItem {
        id: id.to_string(),
        level,
        text: text.to_string(),
    }
}

#[test]
fn extraction_lists_headings_in_document_order() {
    let editor = article();
    assert_eq!(
        extract_toc(editor.doc()),
        vec![
            item("getting-started", 1, "Getting Started"),
            item("install", 2, "Install"),
            item("install-1", 2, "Install"),
            item("café-&-crème", 3, "Café & Crème"),
        ]
    );
}

#[test]
fn headings_without_an_id_have_an_empty_one() {
    let doc = Document::from_blocks([Node::heading(HeadingLevel::H2, "Plain")]);
    assert_eq!(extract_toc(&doc), vec![item("", 2, "Plain")]);
}

#[test]
fn indexer_waits_for_the_editor_to_go_quiet() {
    let mut editor = article();
    let mut toc = TocIndexer::new(editor.doc());
    assert_eq!(toc.items().len(), 4);

    let t0 = Instant::now();
    editor
        .apply(Transaction::new(vec![Op::InsertText {
            path: vec![1, 0, 0],
            offset: 0,
            text: "Quick ".to_string(),
        }]))
        .unwrap();
    editor
        .apply(Transaction::new(vec![Op::RemoveNode { path: vec![3] }]))
        .unwrap();
    toc.on_transaction(t0);
    assert!(!toc.poll(t0 + Duration::from_millis(200), editor.doc()));

    // A second transaction inside the window pushes the deadline back.
    toc.on_transaction(t0 + Duration::from_millis(200));
    assert!(!toc.poll(t0 + Duration::from_millis(400), editor.doc()));
    assert_eq!(toc.items().len(), 4);

    assert!(toc.poll(t0 + Duration::from_millis(500), editor.doc()));
    assert!(!toc.is_pending());
    assert_eq!(
        toc.items(),
        [
            item("getting-started", 1, "Getting Started"),
            item("install", 2, "Install"),
            item("café-&-crème", 3, "Café & Crème"),
        ]
    );
}

#[test]
fn indexer_reports_no_change_for_edits_outside_headings() {
    let mut editor = article();
    let config = TocConfig {
        debounce_ms: 50,
        ..Default::default()
    };
    let mut toc = TocIndexer::with_config(editor.doc(), &config);

    let t0 = Instant::now();
    editor
        .apply(Transaction::new(vec![Op::InsertText {
            path: vec![1, 0, 0],
            offset: 8,
            text: " Enjoy.".to_string(),
        }]))
        .unwrap();
    toc.on_transaction(t0);
    assert_eq!(toc.deadline(), Some(t0 + Duration::from_millis(50)));
    assert!(!toc.poll(t0 + Duration::from_millis(50), editor.doc()));
    assert!(!toc.is_pending());
}

#[test]
fn indexer_driven_by_editor_updates_ignores_selection_moves() {
    let mut editor = article();
    let toc = Arc::new(Mutex::new(TocIndexer::new(editor.doc())));
    let sink = Arc::clone(&toc);
    editor.subscribe(move |update| sink.lock().unwrap().on_update(update, Instant::now()));

    editor.set_selection(Selection::collapsed(Point::new(vec![1, 0, 0], 3)));
    assert!(!toc.lock().unwrap().is_pending());

    editor
        .apply(Transaction::new(vec![Op::RemoveNode { path: vec![0] }]))
        .unwrap();
    let mut indexer = toc.lock().unwrap();
    let deadline = indexer.deadline().unwrap();
    assert!(indexer.poll(deadline, editor.doc()));
    assert_eq!(
        indexer.items(),
        [
            item("install", 2, "Install"),
            item("install-1", 2, "Install"),
            item("café-&-crème", 3, "Café & Crème"),
        ]
    );
}

fn tracker() -> ActiveHeadingTracker {
    ActiveHeadingTracker::new(&extract_toc(article().doc()), TocConfig::default())
}

#[test]
fn first_intersecting_heading_in_document_order_is_active() {
    let mut tracker = tracker();
    assert_eq!(tracker.active(), None);

    assert!(tracker.update([("install-1", true), ("install", true)]));
    assert_eq!(tracker.active(), Some("install"));

    assert!(tracker.update([("install", false)]));
    assert_eq!(tracker.active(), Some("install-1"));

    // Nothing intersecting: the last active heading stays.
    assert!(!tracker.update([("install-1", false)]));
    assert_eq!(tracker.active(), Some("install-1"));
}

#[test]
fn the_band_favours_the_upper_viewport() {
    let band = ViewportBand::default();
    assert!(band.intersects(120.0, 160.0, 1000.0));
    assert!(!band.intersects(20.0, 60.0, 1000.0));
    assert!(!band.intersects(400.0, 440.0, 1000.0));

    let mut tracker = tracker();
    let anchors = [
        HeadingAnchor {
            id: "getting-started".to_string(),
            top: -300.0,
            bottom: -260.0,
        },
        HeadingAnchor {
            id: "install".to_string(),
            top: 150.0,
            bottom: 190.0,
        },
        HeadingAnchor {
            id: "install-1".to_string(),
            top: 250.0,
            bottom: 290.0,
        },
    ];
    assert!(tracker.observe(&anchors, 1000.0));
    assert_eq!(tracker.active(), Some("install"));
}

#[test]
fn clicking_an_entry_activates_it_ahead_of_the_observer() {
    let mut tracker = tracker();
    tracker.update([("getting-started", true)]);

    let request = tracker.click("café-&-crème").unwrap();
    assert_eq!(
        request,
        ScrollRequest {
            id: "café-&-crème".to_string(),
            fragment: "caf%C3%A9-%26-cr%C3%A8me".to_string(),
            smooth: true,
        }
    );
    assert_eq!(tracker.active(), Some("café-&-crème"));
    assert!(tracker.click("").is_none());
}

#[test]
fn a_fragment_on_load_scrolls_after_the_settle_delay() {
    let mut tracker = tracker();
    let t0 = Instant::now();

    tracker.load_with_fragment("#caf%C3%A9-%26-cr%C3%A8me", t0);
    assert_eq!(tracker.poll(t0 + Duration::from_millis(50)), None);
    assert_eq!(tracker.active(), None);

    let request = tracker.poll(t0 + Duration::from_millis(100)).unwrap();
    assert_eq!(request.id, "café-&-crème");
    assert_eq!(tracker.active(), Some("café-&-crème"));
    assert_eq!(tracker.poll(t0 + Duration::from_millis(200)), None);
}

#[test]
fn an_unknown_fragment_is_ignored() {
    let mut tracker = tracker();
    let t0 = Instant::now();

    tracker.load_with_fragment("#missing", t0);
    assert_eq!(tracker.poll(t0 + Duration::from_secs(1)), None);
    assert_eq!(tracker.active(), None);
}
