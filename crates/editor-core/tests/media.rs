use std::time::Duration;

use notitap_core::media::{
    BatchReport, BlockLayout, ClientPoint, DragPayload, DropTarget, InsertTarget, MediaAction,
    MediaConfig, MediaError, MediaFile, MediaUploader, MediaView, Placement, Rect,
    claim_drop_zone, paste_request,
};
use notitap_core::{
    Alignment, Dimension, Document, Editor, MediaAttrs, MediaType, Node, Op, PluginRegistry, Point,
    Selection, Transaction,
};

fn editor_with(blocks: Vec<Node>) -> Editor {
    let doc = Document::new(blocks);
    let selection = Selection::collapsed(Point::new(vec![0, 0, 0], 0));
    Editor::new(doc, selection, PluginRegistry::notitap())
}

fn empty_file(name: &str, mime: &str) -> MediaFile {
    MediaFile::new(name, mime, Vec::<u8>::new())
}

fn png(name: &str) -> MediaFile {
    MediaFile::new(name, "image/png", vec![0u8; 4])
}

/// Resolves after a delay taken from the file name (`"slow"` vs anything
/// else) and fails for names starting with `broken`.
fn fake_uploader() -> MediaUploader {
    MediaUploader::new(
        |file: MediaFile| async move {
            let delay = if file.name.contains("slow") { 300 } else { 100 };
            tokio::time::sleep(Duration::from_millis(delay)).await;
            if file.name.starts_with("broken") {
                anyhow::bail!("storage rejected {}", file.name);
            }
            Ok(format!("https://cdn.example.com/{}", file.name))
        },
        MediaConfig::default(),
    )
}

fn media_srcs(doc: &Document) -> Vec<(usize, String)> {
    doc.content
        .iter()
        .enumerate()
        .filter_map(|(ix, block)| match block.children() {
            Some([Node::Media(media)]) => Some((ix, media.attrs.src.clone())),
            _ => None,
        })
        .collect()
}

#[test]
fn files_without_a_mime_type_are_guessed_from_the_name() {
    assert_eq!(empty_file("clip.mp4", "").media_type(), Some(MediaType::Video));
    assert_eq!(empty_file("photo.JPG", " ").media_type(), Some(MediaType::Img));
    assert_eq!(empty_file("notes.txt", "").media_type(), None);
}

#[tokio::test(start_paused = true)]
async fn uploads_land_in_completion_order_below_the_target() {
    let mut editor = editor_with(vec![
        Node::wrapped(Node::paragraph("a")),
        Node::wrapped(Node::paragraph("b")),
    ]);
    let uploader = fake_uploader();

    let batch = uploader.begin(vec![png("slow.png"), png("fast.png")], InsertTarget::At(1));
    assert_eq!(batch.len(), 2);
    let report = batch.run(&mut editor).await;

    assert_eq!(
        report,
        BatchReport {
            inserted: 2,
            failed: 0,
            discarded: 0
        }
    );
    assert_eq!(
        media_srcs(editor.doc()),
        vec![
            (1, "https://cdn.example.com/fast.png".to_string()),
            (2, "https://cdn.example.com/slow.png".to_string()),
        ]
    );
    let Some(Node::Media(media)) = editor.doc().node(&[1, 0]) else {
        panic!("expected media");
    };
    assert_eq!(media.attrs.width, Dimension::Px(400.0));
    assert_eq!(media.attrs.media_type, MediaType::Img);
}

#[tokio::test(start_paused = true)]
async fn a_failed_upload_does_not_affect_the_others() {
    let mut editor = editor_with(vec![Node::wrapped(Node::paragraph("a"))]);
    let uploader = fake_uploader();
    let before = editor.doc().clone();

    let batch = uploader.begin(
        vec![png("broken.png"), png("slow-ok.png"), empty_file("notes.txt", "text/plain")],
        InsertTarget::End,
    );
    assert_eq!(batch.len(), 2);
    let report = batch.run(&mut editor).await;

    assert_eq!(report.inserted, 1);
    assert_eq!(report.failed, 1);
    // The media block, then the paragraph that keeps the document ending in text.
    assert_eq!(editor.doc().content.len(), before.content.len() + 2);
    assert_eq!(
        media_srcs(editor.doc()),
        vec![(1, "https://cdn.example.com/slow-ok.png".to_string())]
    );
}

#[tokio::test(start_paused = true)]
async fn results_arriving_after_teardown_are_discarded() {
    let mut editor = editor_with(vec![Node::wrapped(Node::paragraph("a"))]);
    let uploader = fake_uploader();

    let mut batch = uploader.begin(vec![png("fast.png"), png("slow.png")], InsertTarget::End);
    let first = batch.next().await.unwrap();
    assert_eq!(batch.place(&mut editor, first), Placement::Inserted(1));

    uploader.teardown();
    assert!(batch.is_stale());
    let second = batch.next().await.unwrap();
    assert_eq!(batch.place(&mut editor, second), Placement::Discarded);
    assert!(batch.next().await.is_none());

    assert_eq!(
        media_srcs(editor.doc()),
        vec![(1, "https://cdn.example.com/fast.png".to_string())]
    );
}

#[tokio::test(start_paused = true)]
async fn a_target_that_no_longer_exists_falls_back_to_the_end() {
    let mut editor = editor_with(vec![
        Node::wrapped(Node::paragraph("a")),
        Node::wrapped(Node::paragraph("b")),
        Node::wrapped(Node::paragraph("c")),
    ]);
    let uploader = fake_uploader();
    let batch = uploader.begin(vec![png("fast.png")], InsertTarget::At(3));

    editor
        .apply(Transaction::new(vec![Op::RemoveNode {
            path: vec![2],
        }]))
        .unwrap();
    editor
        .apply(Transaction::new(vec![Op::RemoveNode {
            path: vec![1],
        }]))
        .unwrap();
    batch.run(&mut editor).await;

    assert_eq!(
        media_srcs(editor.doc()),
        vec![(1, "https://cdn.example.com/fast.png".to_string())]
    );
}

fn layout() -> BlockLayout {
    BlockLayout {
        content: Rect::new(0.0, 0.0, 600.0, 400.0),
        blocks: vec![Rect::new(0.0, 0.0, 600.0, 40.0), Rect::new(0.0, 40.0, 600.0, 40.0)],
    }
}

#[tokio::test(start_paused = true)]
async fn a_drop_outside_the_content_box_appends_at_the_end() {
    let mut editor = editor_with(vec![
        Node::wrapped(Node::paragraph("a")),
        Node::wrapped(Node::paragraph("b")),
    ]);
    let mut target = DropTarget::new(Rect::new(100.0, 100.0, 600.0, 800.0));
    let payload = DragPayload::files(vec![png("fast.png")]);

    assert!(target.drag_enter(&payload));
    let request = target
        .drop(payload, ClientPoint::new(20.0, 20.0), editor.doc(), &layout())
        .unwrap();
    assert_eq!(request.target, InsertTarget::End);
    assert!(!target.is_drag_active());

    fake_uploader()
        .begin(request.files, request.target)
        .run(&mut editor)
        .await;
    assert_eq!(
        media_srcs(editor.doc()),
        vec![(2, "https://cdn.example.com/fast.png".to_string())]
    );
}

#[test]
fn a_drop_inside_resolves_to_the_nearest_block_boundary() {
    let editor = editor_with(vec![
        Node::wrapped(Node::paragraph("a")),
        Node::wrapped(Node::paragraph("b")),
    ]);
    let mut target = DropTarget::new(Rect::new(100.0, 100.0, 600.0, 800.0));

    let upper = target.drop(
        DragPayload::files(vec![png("x.png")]),
        ClientPoint::new(150.0, 110.0),
        editor.doc(),
        &layout(),
    );
    assert_eq!(upper.unwrap().target, InsertTarget::At(0));

    let lower = target.drop(
        DragPayload::files(vec![png("x.png")]),
        ClientPoint::new(150.0, 165.0),
        editor.doc(),
        &layout(),
    );
    assert_eq!(lower.unwrap().target, InsertTarget::At(2));
}

#[test]
fn drags_without_files_are_ignored() {
    let editor = editor_with(vec![Node::wrapped(Node::paragraph("a"))]);
    let mut target = DropTarget::new(Rect::new(0.0, 0.0, 600.0, 800.0));
    let payload = DragPayload {
        types: vec!["text/html".to_string()],
        files: Vec::new(),
    };

    assert!(!target.drag_enter(&payload));
    assert!(!target.drag_over(&payload));
    assert!(!target.is_drag_active());
    assert!(
        target
            .drop(payload, ClientPoint::new(10.0, 10.0), editor.doc(), &layout())
            .is_none()
    );
}

#[test]
fn drag_leave_only_ends_the_drag_outside_the_editor() {
    let mut target = DropTarget::new(Rect::new(0.0, 0.0, 600.0, 800.0));
    target.drag_enter(&DragPayload::files(vec![png("x.png")]));

    target.drag_leave(ClientPoint::new(300.0, 300.0));
    assert!(target.is_drag_active());
    target.drag_leave(ClientPoint::new(700.0, 300.0));
    assert!(!target.is_drag_active());
}

#[test]
fn pasted_files_go_below_the_cursor_block() {
    let editor = editor_with(vec![
        Node::wrapped(Node::paragraph("a")),
        Node::wrapped(Node::paragraph("b")),
    ]);

    let request = paste_request(editor.state(), vec![png("x.png")]).unwrap();
    assert_eq!(request.target, InsertTarget::At(1));
    assert!(paste_request(editor.state(), vec![empty_file("a.pdf", "")]).is_none());
}

#[tokio::test(start_paused = true)]
async fn a_drop_zone_is_replaced_by_its_uploads() {
    let mut editor = editor_with(vec![
        Node::wrapped(Node::paragraph("a")),
        Node::wrapped(Node::DropZone),
        Node::wrapped(Node::paragraph("b")),
    ]);

    assert!(matches!(
        claim_drop_zone(&mut editor, 0, vec![png("x.png")]),
        Err(MediaError::NotADropZone(0))
    ));
    assert!(claim_drop_zone(&mut editor, 1, vec![empty_file("a.txt", "")])
        .unwrap()
        .is_none());
    assert!(matches!(
        editor.doc().content[1].children(),
        Some([Node::DropZone])
    ));

    let request = claim_drop_zone(&mut editor, 1, vec![png("one.png"), png("slow-two.png")])
        .unwrap()
        .unwrap();
    assert_eq!(request.target, InsertTarget::At(1));
    assert_eq!(editor.doc().content.len(), 2);

    fake_uploader()
        .begin(request.files, request.target)
        .run(&mut editor)
        .await;
    assert_eq!(
        media_srcs(editor.doc()),
        vec![
            (1, "https://cdn.example.com/one.png".to_string()),
            (2, "https://cdn.example.com/slow-two.png".to_string()),
        ]
    );
}

fn editor_with_media() -> Editor {
    editor_with(vec![
        Node::wrapped(Node::media(MediaAttrs::new("a.png", MediaType::Img))),
        Node::wrapped(Node::paragraph("after")),
    ])
}

fn media_attrs(editor: &Editor) -> MediaAttrs {
    let Some(Node::Media(media)) = editor.doc().node(&[0, 0]) else {
        panic!("expected media");
    };
    media.attrs.clone()
}

#[test]
fn resizing_keeps_the_loaded_aspect_ratio() {
    let mut editor = editor_with_media();
    let mut view = MediaView::new(vec![0, 0], 800.0);
    view.on_load(800.0, 400.0);
    view.on_load(100.0, 100.0);

    view.mouse_down(10.0, 400.0);
    assert!(view.is_resizing());
    assert!(view.mouse_move(&mut editor, 110.0).unwrap());
    let attrs = media_attrs(&editor);
    assert_eq!((attrs.width, attrs.height), (Dimension::Px(500.0), Dimension::Px(250.0)));

    assert!(view.mouse_move(&mut editor, 60.0).unwrap());
    assert_eq!(media_attrs(&editor).width, Dimension::Px(450.0));

    view.mouse_up();
    assert!(!view.mouse_move(&mut editor, 500.0).unwrap());

    assert!(editor.undo());
    assert_eq!(media_attrs(&editor).width, Dimension::Px(500.0));
}

#[test]
fn resizing_is_clamped_to_the_container() {
    let mut editor = editor_with_media();
    let mut view = MediaView::with_config(
        vec![0, 0],
        600.0,
        &MediaConfig {
            min_width: 150.0,
            ..Default::default()
        },
    );
    view.on_load(300.0, 300.0);

    view.mouse_down(0.0, 400.0);
    view.mouse_move(&mut editor, 900.0).unwrap();
    assert_eq!(media_attrs(&editor).width, Dimension::Px(600.0));
    view.mouse_move(&mut editor, -900.0).unwrap();
    let attrs = media_attrs(&editor);
    assert_eq!((attrs.width, attrs.height), (Dimension::Px(150.0), Dimension::Px(150.0)));
}

#[test]
fn toolbar_actions_align_and_delete() {
    let mut editor = editor_with_media();
    let mut view = MediaView::new(vec![0, 0], 800.0);

    view.perform(&mut editor, MediaAction::Align(Alignment::Center)).unwrap();
    assert_eq!(media_attrs(&editor).align, Alignment::Center);

    view.perform(&mut editor, MediaAction::Delete).unwrap();
    assert_eq!(editor.doc(), &Document::from_blocks([Node::paragraph("after")]));

    assert!(matches!(
        view.perform(&mut editor, MediaAction::Delete),
        Err(MediaError::Command(_))
    ));
}
