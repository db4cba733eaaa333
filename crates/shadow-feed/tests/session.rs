mod common;

use std::sync::Arc;

use chrono::NaiveDate;
use tokio::sync::broadcast::error::TryRecvError;

use common::{ScriptedBackend, at, ids, message, run, test_config};
use shadow_feed::{AnchorMode, FeedSession, FeedStatus};
use shadow_types::{ConversationId, FeedError, FeedEvent, LoadStage, MessageDraft};

fn session(backend: &Arc<ScriptedBackend>, page_size: usize) -> FeedSession {
    FeedSession::new(backend.clone(), ConversationId::Group, test_config(page_size))
}

fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 1, d).unwrap()
}

fn names(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

#[tokio::test]
async fn test_cold_start_pins_to_bottom() {
    let backend = ScriptedBackend::with_group(run(1, 30));
    let session = session(&backend, 10);
    let mut events = session.subscribe_events();

    assert_eq!(session.on_scroll(0.0, 400.0).await.unwrap(), 0);
    assert_eq!(backend.fetch_count(), 0);

    let page = session.load_initial_page().await.unwrap();
    assert_eq!(ids(&page), ids(&run(21, 30)));
    assert_eq!(session.status(), FeedStatus::Ready);
    assert!(session.cursor().has_more_older);

    assert_eq!(
        events.try_recv().unwrap(),
        FeedEvent::FeedChanged {
            conversation: ConversationId::Group,
            len: 10
        }
    );
    assert_eq!(
        events.try_recv().unwrap(),
        FeedEvent::ScrollCorrectionNeeded { delta_px: 600.0 }
    );
    assert_eq!(session.scroll_top(), 600.0);
    assert_eq!(session.anchor_state().mode, AnchorMode::PinnedBottom);

    let rows = session.visible_rows_at(day(5));
    let keys: Vec<_> = rows.iter().map(|r| r.key.as_str()).collect();
    assert_eq!(keys, vec!["m25", "m26", "m27", "m28", "m29", "m30"]);
    assert_eq!(rows[0].offset_px, 400.0);
    assert_eq!(rows[0].height_px, 100.0);
    assert!(rows.iter().all(|r| r.content.date_label.is_none()));
}

#[tokio::test]
async fn test_pages_merge_in_order() {
    let backend = ScriptedBackend::with_group(run(1, 5));
    let session = session(&backend, 2);

    session.load_initial_page().await.unwrap();
    assert_eq!(session.load_older_page().await.unwrap(), 2);
    assert_eq!(session.load_older_page().await.unwrap(), 1);
    assert_eq!(ids(&session.messages()), names(&["m1", "m2", "m3", "m4", "m5"]));

    let cursor = session.cursor();
    assert!(!cursor.has_more_older);
    assert_eq!(cursor.oldest_loaded_at, Some(at(5, 1)));
    assert_eq!(cursor.newest_loaded_at, Some(at(5, 5)));

    // History exhausted: no further network calls.
    assert_eq!(backend.fetch_count(), 3);
    assert_eq!(session.load_older_page().await.unwrap(), 0);
    assert_eq!(session.on_scroll(0.0, 400.0).await.unwrap(), 0);
    assert_eq!(backend.fetch_count(), 3);
}

#[tokio::test]
async fn test_short_initial_page_is_terminal() {
    let backend = ScriptedBackend::with_group(run(1, 3));
    let session = session(&backend, 10);

    session.load_initial_page().await.unwrap();
    assert!(!session.cursor().has_more_older);
    assert_eq!(session.load_older_page().await.unwrap(), 0);
    assert_eq!(backend.fetch_count(), 1);
}

#[tokio::test]
async fn test_one_older_fetch_in_flight() {
    let backend = ScriptedBackend::with_group(run(1, 6));
    let session = session(&backend, 2);
    session.load_initial_page().await.unwrap();

    let gate = backend.hold_fetches();
    let (first, second, _) = tokio::join!(
        session.load_older_page(),
        session.on_scroll(0.0, 400.0),
        async {
            tokio::task::yield_now().await;
            assert!(session.is_loading_older());
            gate.notify_one();
        }
    );

    assert_eq!(first.unwrap(), 2);
    assert_eq!(second.unwrap(), 0);
    assert_eq!(backend.fetch_count(), 2);
    assert!(!session.is_loading_older());
    assert_eq!(ids(&session.messages()), names(&["m3", "m4", "m5", "m6"]));
}

#[tokio::test]
async fn test_live_append_is_idempotent() {
    let backend = ScriptedBackend::with_group(run(1, 3));
    let session = session(&backend, 10);
    session.load_initial_page().await.unwrap();

    assert!(!session.append_live(message("m3", at(5, 3))));
    assert!(session.append_live(message("m4", at(5, 4))));
    assert!(!session.append_live(message("m4", at(5, 4))));
    assert_eq!(ids(&session.messages()), names(&["m1", "m2", "m3", "m4"]));
    assert_eq!(session.cursor().newest_loaded_at, Some(at(5, 4)));
}

#[tokio::test]
async fn test_live_arrival_during_initial_load_is_kept() {
    let backend = ScriptedBackend::with_group(run(1, 3));
    let session = session(&backend, 10);

    let gate = backend.hold_fetches();
    let (loaded, _) = tokio::join!(session.load_initial_page(), async {
        tokio::task::yield_now().await;
        assert_eq!(session.status(), FeedStatus::Loading);
        session.append_live(message("m9", at(5, 9)));
        gate.notify_one();
    });

    assert_eq!(ids(&loaded.unwrap()), names(&["m1", "m2", "m3", "m9"]));
}

#[tokio::test]
async fn test_append_near_bottom_follows() {
    let backend = ScriptedBackend::with_group(run(1, 20));
    let session = session(&backend, 20);
    session.on_scroll(0.0, 400.0).await.unwrap();
    session.load_initial_page().await.unwrap();
    assert_eq!(session.scroll_top(), 1600.0);

    // 100px above the bottom.
    session.on_scroll(1500.0, 400.0).await.unwrap();
    assert_eq!(session.anchor_state().mode, AnchorMode::Free);

    let mut events = session.subscribe_events();
    assert!(session.append_live(message("m21", at(5, 21))));
    assert!(matches!(events.try_recv().unwrap(), FeedEvent::FeedChanged { len: 21, .. }));
    assert_eq!(
        events.try_recv().unwrap(),
        FeedEvent::ScrollCorrectionNeeded { delta_px: 200.0 }
    );
    assert_eq!(session.scroll_top(), 1700.0);
    assert_eq!(session.anchor_state().mode, AnchorMode::PinnedBottom);
}

#[tokio::test]
async fn test_append_far_from_bottom_holds_position() {
    let backend = ScriptedBackend::with_group(run(1, 20));
    let session = session(&backend, 20);
    session.on_scroll(0.0, 400.0).await.unwrap();
    session.load_initial_page().await.unwrap();

    // 600px above the bottom.
    session.on_scroll(1000.0, 400.0).await.unwrap();
    let mut events = session.subscribe_events();
    assert!(session.append_live(message("m21", at(5, 21))));

    assert!(matches!(events.try_recv().unwrap(), FeedEvent::FeedChanged { .. }));
    assert_eq!(events.try_recv(), Err(TryRecvError::Empty));
    assert_eq!(session.scroll_top(), 1000.0);
}

#[tokio::test]
async fn test_prepend_keeps_visible_content_still() {
    let mut history: Vec<_> = (1..=3)
        .map(|i| message(&format!("m{}", i), at(4, i)))
        .collect();
    history.extend(run(4, 23));
    let backend = ScriptedBackend::with_group(history);
    let session = session(&backend, 20);

    session.on_scroll(0.0, 400.0).await.unwrap();
    session.load_initial_page().await.unwrap();
    session.on_row_measured(0, 40.0);
    session.on_row_measured(1, 60.0);
    assert_eq!(session.total_height(), 1900.0);
    assert_eq!(session.scroll_top(), 1500.0);

    session.on_scroll(500.0, 400.0).await.unwrap();
    assert_eq!(session.anchor_state().mode, AnchorMode::Free);

    let mut events = session.subscribe_events();
    assert_eq!(session.load_older_page().await.unwrap(), 3);
    assert!(matches!(events.try_recv().unwrap(), FeedEvent::FeedChanged { len: 23, .. }));
    assert_eq!(
        events.try_recv().unwrap(),
        FeedEvent::ScrollCorrectionNeeded { delta_px: 300.0 }
    );
    assert_eq!(session.scroll_top(), 800.0);
    assert_eq!(session.anchor_state().pending_height_delta, 300.0);
    assert_eq!(session.row_heights(), vec![(3, 40.0), (4, 60.0)]);

    // The UI applied the correction.
    session.on_scroll(800.0, 400.0).await.unwrap();
    assert_eq!(session.anchor_state().pending_height_delta, 0.0);
}

#[tokio::test]
async fn test_prepend_same_day_drops_old_head_divider() {
    let backend = ScriptedBackend::with_group(run(1, 6));
    let session = session(&backend, 3);

    session.on_scroll(0.0, 400.0).await.unwrap();
    session.load_initial_page().await.unwrap();
    session.on_row_measured(0, 40.0);
    assert_eq!(session.row_heights(), vec![(0, 40.0)]);

    // At the top: pulls the next page.
    assert_eq!(session.on_scroll(0.0, 400.0).await.unwrap(), 3);
    assert!(session.row_heights().is_empty());

    // Back to the top; the next page comes back empty.
    assert_eq!(session.on_scroll(0.0, 400.0).await.unwrap(), 0);
    assert!(!session.cursor().has_more_older);

    let rows = session.visible_rows_at(day(6));
    let labels: Vec<_> = rows
        .iter()
        .map(|r| (r.key.as_str(), r.content.date_label.as_deref()))
        .collect();
    assert_eq!(labels[0], ("m1", Some("Yesterday")));
    assert!(labels[1..].iter().all(|(_, label)| label.is_none()));
}

#[tokio::test]
async fn test_heart_increment_is_optimistic() {
    let backend = ScriptedBackend::with_group(run(1, 3));
    let session = session(&backend, 10);
    session.on_scroll(0.0, 400.0).await.unwrap();
    session.load_initial_page().await.unwrap();
    session.on_row_measured(1, 150.0);
    let scroll_top = session.scroll_top();

    assert_eq!(session.apply_heart_increment("m2").await.unwrap(), 1);
    assert_eq!(session.messages()[1].hearts_count, 1);
    // Height is re-measured on next render.
    assert!(session.row_heights().is_empty());
    assert_eq!(session.scroll_top(), scroll_top);

    backend.set_fail_hearts(true);
    assert_eq!(session.apply_heart_increment("m2").await.unwrap(), 2);
    assert_eq!(session.messages()[1].hearts_count, 2);
    assert_eq!(
        *backend.hearts_writes.lock().unwrap(),
        vec![("m2".to_string(), 1), ("m2".to_string(), 2)]
    );

    assert!(matches!(
        session.apply_heart_increment("nope").await,
        Err(FeedError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_heart_above_viewport_keeps_content_still() {
    let backend = ScriptedBackend::with_group(run(1, 20));
    let session = session(&backend, 20);
    session.on_scroll(0.0, 400.0).await.unwrap();
    session.load_initial_page().await.unwrap();
    session.on_row_measured(0, 40.0);
    session.on_scroll(500.0, 400.0).await.unwrap();
    assert_eq!(session.anchor_state().mode, AnchorMode::Free);

    // m1 falls back to the 100px estimate until re-measured.
    let mut events = session.subscribe_events();
    session.apply_heart_increment("m1").await.unwrap();
    assert!(matches!(events.try_recv().unwrap(), FeedEvent::FeedChanged { .. }));
    assert_eq!(
        events.try_recv().unwrap(),
        FeedEvent::ScrollCorrectionNeeded { delta_px: 60.0 }
    );
    assert_eq!(session.scroll_top(), 560.0);

    session.on_scroll(560.0, 400.0).await.unwrap();
    session.on_row_measured(0, 40.0);
    assert_eq!(session.scroll_top(), 500.0);
}

#[tokio::test]
async fn test_initial_failure_then_retry() {
    let backend = ScriptedBackend::with_group(run(1, 3));
    let session = session(&backend, 10);
    let mut events = session.subscribe_events();

    backend.set_fail_fetch(true);
    let err = session.load_initial_page().await.unwrap_err();
    assert!(err.is_retryable());
    assert_eq!(session.status(), FeedStatus::Failed(err));
    assert!(matches!(
        events.try_recv().unwrap(),
        FeedEvent::LoadFailed { stage: LoadStage::Initial, .. }
    ));
    assert!(session.is_empty());

    backend.set_fail_fetch(false);
    session.load_initial_page().await.unwrap();
    assert_eq!(session.status(), FeedStatus::Ready);
    assert_eq!(session.len(), 3);
}

#[tokio::test]
async fn test_older_failure_keeps_cursor() {
    let backend = ScriptedBackend::with_group(run(1, 5));
    let session = session(&backend, 2);
    session.load_initial_page().await.unwrap();
    let cursor = session.cursor();

    backend.set_fail_fetch(true);
    assert!(session.load_older_page().await.is_err());
    assert!(session.older_error().is_some());
    assert!(!session.is_loading_older());
    assert_eq!(session.cursor(), cursor);
    assert_eq!(session.len(), 2);

    backend.set_fail_fetch(false);
    assert_eq!(session.load_older_page().await.unwrap(), 2);
    assert!(session.older_error().is_none());
}

#[tokio::test]
async fn test_switch_discards_in_flight_page() {
    let backend = ScriptedBackend::with_group(run(1, 3));
    let session = session(&backend, 10);
    let dm = ConversationId::Direct("c1".into());

    let gate = backend.hold_fetches();
    let (loaded, _) = tokio::join!(session.load_initial_page(), async {
        tokio::task::yield_now().await;
        session.switch_conversation(dm.clone());
        gate.notify_one();
    });

    assert!(loaded.unwrap().is_empty());
    assert!(session.is_empty());
    assert_eq!(session.status(), FeedStatus::Idle);
    assert_eq!(session.scope(), (dm, 1));
}

#[tokio::test]
async fn test_reload_discards_in_flight_older_page() {
    let backend = ScriptedBackend::with_group(run(1, 6));
    let session = session(&backend, 2);
    session.load_initial_page().await.unwrap();

    let gate = backend.hold_fetches();
    let (older, _) = tokio::join!(session.load_older_page(), async {
        tokio::task::yield_now().await;
        assert!(session.is_loading_older());
        backend.store(&ConversationId::Group, run(7, 8));
        backend.release_fetches();
        session.load_initial_page().await.unwrap();
        gate.notify_one();
    });

    // The m3/m4 page was asked for against the old head.
    assert_eq!(older.unwrap(), 0);
    assert_eq!(ids(&session.messages()), names(&["m7", "m8"]));
    assert!(!session.is_loading_older());

    while session.load_older_page().await.unwrap() > 0 {}
    assert!(!session.cursor().has_more_older);
    assert_eq!(ids(&session.messages()), ids(&run(1, 8)));
}

#[tokio::test]
async fn test_no_older_fetch_while_reloading() {
    let backend = ScriptedBackend::with_group(run(1, 6));
    let session = session(&backend, 2);
    session.load_initial_page().await.unwrap();

    let gate = backend.hold_fetches();
    let (reloaded, _) = tokio::join!(session.load_initial_page(), async {
        tokio::task::yield_now().await;
        assert_eq!(session.status(), FeedStatus::Loading);
        assert_eq!(session.load_older_page().await.unwrap(), 0);
        assert_eq!(backend.fetch_count(), 2);
        gate.notify_one();
    });

    assert_eq!(ids(&reloaded.unwrap()), names(&["m5", "m6"]));
    assert!(session.cursor().has_more_older);
}

#[tokio::test]
async fn test_catch_up_fills_gap() {
    let backend = ScriptedBackend::with_group(run(1, 3));
    let session = session(&backend, 10);
    session.load_initial_page().await.unwrap();

    backend.store(&ConversationId::Group, run(4, 5));
    assert_eq!(session.catch_up().await.unwrap(), 2);
    assert_eq!(ids(&session.messages()), ids(&run(1, 5)));
    assert_eq!(session.catch_up().await.unwrap(), 0);
}

#[tokio::test]
async fn test_send_message_merges_once() {
    let backend = ScriptedBackend::with_group(run(1, 2));
    let session = session(&backend, 10);
    session.load_initial_page().await.unwrap();

    let sent = session
        .send_message(MessageDraft {
            content: "hello".into(),
            author_user_id: "u2".into(),
            author_display_name: "Bo".into(),
            author_avatar_color: "#3355aa".into(),
            author_avatar_url: None,
        })
        .await
        .unwrap();

    assert_eq!(session.messages().last(), Some(&sent));
    assert!(!session.append_live(sent));
    assert_eq!(session.len(), 3);
}
