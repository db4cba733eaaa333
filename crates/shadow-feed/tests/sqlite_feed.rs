use std::sync::Arc;
use std::time::Duration;

use shadow_db::{Database, SqliteBackend};
use shadow_feed::{FeedConfig, FeedSession};
use shadow_types::{ConversationId, MessageBackend, MessageDraft};

fn draft(i: usize) -> MessageDraft {
    MessageDraft {
        content: format!("message {}", i),
        author_user_id: "u1".into(),
        author_display_name: "Ann".into(),
        author_avatar_color: "#aa3355".into(),
        author_avatar_url: None,
    }
}

#[tokio::test]
async fn test_session_pages_through_sqlite_history() {
    let backend = Arc::new(SqliteBackend::new(Arc::new(Database::open_in_memory().unwrap())));
    for i in 1..=25 {
        backend.insert(&ConversationId::Group, draft(i)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    let config = FeedConfig {
        page_size: 10,
        utc_offset_minutes: Some(0),
        ..FeedConfig::default()
    };
    let session = FeedSession::new(backend.clone(), ConversationId::Group, config);

    session.load_initial_page().await.unwrap();
    assert_eq!(session.load_older_page().await.unwrap(), 10);
    assert_eq!(session.load_older_page().await.unwrap(), 5);
    assert!(!session.cursor().has_more_older);

    let contents: Vec<_> = session.messages().into_iter().map(|m| m.content).collect();
    let expected: Vec<_> = (1..=25).map(|i| format!("message {}", i)).collect();
    assert_eq!(contents, expected);

    session.apply_heart_increment(&session.messages()[0].id).await.unwrap();
    let stored = backend.fetch_page(&ConversationId::Group, None, 25).await.unwrap();
    assert_eq!(stored.last().unwrap().hearts_count, 1);
}
