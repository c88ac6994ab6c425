use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Notify, mpsc};

use super::*;
use crate::backend::{Backend, MockBackend};
use crate::models::conversation::is_minted_conversation_id;
use crate::models::{
    DeliveryError, ExchangeReply, NewMessage, NoticeKind, WebhookRequest,
};
use crate::storage::{MessageStore, MockMessageStore, sqlite::Sqlite};

fn setup_session(
    context: SessionContext,
    store: ArcStore,
    backend: ArcBackend,
) -> (Session, mpsc::UnboundedReceiver<Event>) {
    let (tx, rx) = mpsc::unbounded_channel::<Event>();
    (Session::new(context, store, backend, Arc::new(tx)), rx)
}

fn drain(rx: &mut mpsc::UnboundedReceiver<Event>) -> Vec<Event> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

fn author() -> SessionContext {
    SessionContext::new().with_user_id("author-123")
}

/// Replies "reply to <message>" and records every request.
fn echo_backend(seen: Arc<Mutex<Vec<WebhookRequest>>>) -> MockBackend {
    let mut backend = MockBackend::new();
    backend.expect_exchange().returning(move |req| {
        let text = format!("reply to {}", req.message);
        seen.lock().unwrap().push(req);
        Ok(ExchangeReply {
            text,
            conversation_id: None,
        })
    });
    backend
}

/// Holds every exchange until the test releases it.
struct GatedBackend {
    gate: Arc<Notify>,
}

#[async_trait]
impl Backend for GatedBackend {
    fn name(&self) -> &str {
        "gated"
    }

    async fn exchange(&self, request: WebhookRequest) -> Result<ExchangeReply, DeliveryError> {
        self.gate.notified().await;
        Ok(ExchangeReply {
            text: format!("reply to {}", request.message),
            conversation_id: None,
        })
    }
}

/// Answers after a per-message delay.
struct SlowBackend {
    delays: Vec<(&'static str, Duration)>,
}

#[async_trait]
impl Backend for SlowBackend {
    fn name(&self) -> &str {
        "slow"
    }

    async fn exchange(&self, request: WebhookRequest) -> Result<ExchangeReply, DeliveryError> {
        let delay = self
            .delays
            .iter()
            .find(|(text, _)| *text == request.message)
            .map(|(_, delay)| *delay)
            .unwrap_or_default();
        tokio::time::sleep(delay).await;
        Ok(ExchangeReply {
            text: format!("reply to {}", request.message),
            conversation_id: None,
        })
    }
}

#[tokio::test]
async fn test_first_message_starts_conversation() {
    let db = Arc::new(Sqlite::new(None).await.unwrap());
    let seen = Arc::new(Mutex::new(Vec::new()));
    let (mut session, mut rx) = setup_session(
        author(),
        db.clone(),
        Arc::new(echo_backend(Arc::clone(&seen))),
    );

    session.mount().await;
    assert_eq!(session.state(), SessionState::Ready);
    assert!(session.transcript().is_empty());
    assert_eq!(session.conversation_id(), None);

    session
        .send("My book is a thriller called Dark Waters")
        .await
        .unwrap();
    assert!(session.is_sending());
    assert_eq!(session.state(), SessionState::Sending);
    assert_eq!(session.transcript().len(), 1);
    assert!(session.transcript()[0].is_pending());

    assert!(session.settle().await);
    assert!(!session.is_sending());
    assert_eq!(session.state(), SessionState::Ready);

    let conversation_id = session.conversation_id().expect("id minted").to_string();
    assert!(is_minted_conversation_id(&conversation_id), "{conversation_id}");

    let requests = seen.lock().unwrap().clone();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].conversation_id, conversation_id);

    let rows = db
        .list_by_conversation("author-123", &conversation_id, 50)
        .await
        .unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].role(), Role::User);
    assert_eq!(rows[1].role(), Role::Assistant);

    let transcript = session.transcript();
    assert_eq!(transcript.len(), 2);
    assert_eq!(transcript[0].role(), Role::User);
    assert_eq!(transcript[0].content(), "My book is a thriller called Dark Waters");
    assert_eq!(transcript[0].message(), Some(&rows[0]));
    assert_eq!(transcript[1].role(), Role::Assistant);
    assert_eq!(
        transcript[1].content(),
        "reply to My book is a thriller called Dark Waters"
    );
    assert!(transcript[1].is_confirmed());

    let events = drain(&mut rx);
    assert!(events.contains(&Event::SendingChanged(true)));
    assert!(events.contains(&Event::ConversationChanged(Some(conversation_id))));
    assert_eq!(events.last(), Some(&Event::SendingChanged(false)));
}

#[tokio::test]
async fn test_sequential_sends_alternate_turns() {
    let db = Arc::new(Sqlite::new(None).await.unwrap());
    let seen = Arc::new(Mutex::new(Vec::new()));
    let (mut session, _rx) = setup_session(
        author(),
        db.clone(),
        Arc::new(echo_backend(Arc::clone(&seen))),
    );
    session.mount().await;

    for text in ["first", "second", "third"] {
        session.send(text).await.unwrap();
        session.settle().await;
    }

    let contents = session
        .transcript()
        .iter()
        .map(|entry| (entry.role(), entry.content().to_string()))
        .collect::<Vec<_>>();
    assert_eq!(
        contents,
        vec![
            (Role::User, "first".to_string()),
            (Role::Assistant, "reply to first".to_string()),
            (Role::User, "second".to_string()),
            (Role::Assistant, "reply to second".to_string()),
            (Role::User, "third".to_string()),
            (Role::Assistant, "reply to third".to_string()),
        ]
    );

    let conversation_id = session.conversation_id().unwrap().to_string();
    let requests = seen.lock().unwrap().clone();
    assert!(requests.iter().all(|r| r.conversation_id == conversation_id));

    let rows = db
        .list_by_conversation("author-123", &conversation_id, 50)
        .await
        .unwrap();
    let roles = rows.iter().map(|m| m.role()).collect::<Vec<_>>();
    assert_eq!(
        roles,
        vec![
            Role::User,
            Role::Assistant,
            Role::User,
            Role::Assistant,
            Role::User,
            Role::Assistant
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_turns_keep_send_order_with_uneven_latency() {
    let db = Arc::new(Sqlite::new(None).await.unwrap());
    let backend = SlowBackend {
        delays: vec![
            ("first", Duration::from_secs(3)),
            ("second", Duration::from_millis(5)),
            ("third", Duration::from_secs(1)),
        ],
    };
    let (mut session, _rx) = setup_session(author(), db.clone(), Arc::new(backend));
    session.mount().await;

    for text in ["first", "second", "third"] {
        session.send(text).await.unwrap();
        // A quicker follow-up cannot overtake the slow exchange.
        assert_eq!(session.send("overtake").await, Err(SendRejected::Busy));
        assert!(session.settle().await);
    }

    let contents = session
        .transcript()
        .iter()
        .map(|entry| (entry.role(), entry.content().to_string()))
        .collect::<Vec<_>>();
    let expected = vec![
        (Role::User, "first".to_string()),
        (Role::Assistant, "reply to first".to_string()),
        (Role::User, "second".to_string()),
        (Role::Assistant, "reply to second".to_string()),
        (Role::User, "third".to_string()),
        (Role::Assistant, "reply to third".to_string()),
    ];
    assert_eq!(contents, expected);

    let conversation_id = session.conversation_id().unwrap().to_string();
    let rows = db
        .list_by_conversation("author-123", &conversation_id, 50)
        .await
        .unwrap()
        .iter()
        .map(|m| (m.role(), m.content().to_string()))
        .collect::<Vec<_>>();
    assert_eq!(rows, expected);
}

#[tokio::test]
async fn test_delivery_failure_appends_one_error_line() {
    let db = Arc::new(Sqlite::new(None).await.unwrap());
    let mut backend = MockBackend::new();
    backend.expect_exchange().times(1).returning(|_| {
        Err(DeliveryError::Status {
            code: 500,
            body: "workflow crashed".to_string(),
        })
    });
    let (mut session, mut rx) = setup_session(author(), db.clone(), Arc::new(backend));
    session.mount().await;

    session.send("Hello?").await.unwrap();
    session.settle().await;

    let transcript = session.transcript();
    assert_eq!(transcript.len(), 2);
    assert_eq!(transcript[0].content(), "Hello?");
    assert!(transcript[0].is_confirmed());
    assert_eq!(transcript[1].role(), Role::Assistant);
    assert_eq!(transcript[1].content(), DELIVERY_FAILURE_REPLY);
    assert_eq!(transcript[1].delivery(), &crate::models::Delivery::Local);
    assert!(!session.is_sending());
    assert_eq!(session.state(), SessionState::Ready);

    // Only the user turn reached the store.
    let conversation_id = session.conversation_id().unwrap().to_string();
    let rows = db
        .list_by_conversation("author-123", &conversation_id, 50)
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].role(), Role::User);

    let events = drain(&mut rx);
    assert_eq!(events.last(), Some(&Event::SendingChanged(false)));
}

#[tokio::test]
async fn test_explicit_conversation_is_used_everywhere() {
    let mut store = MockMessageStore::new();
    store.expect_latest_conversation_id().never();
    store
        .expect_list_by_conversation()
        .withf(|user_id, conversation_id, limit| {
            user_id == "author-123" && conversation_id == "conv-explicit" && *limit == 20
        })
        .times(1)
        .returning(|_, _, _| {
            Ok(vec![ChatMessage::from_new(
                "row-1",
                chrono::Utc::now(),
                NewMessage::user("author-123", "earlier").with_conversation_id("conv-explicit"),
            )])
        });
    store
        .expect_append()
        .withf(|m| m.conversation_id() == Some("conv-explicit"))
        .times(2)
        .returning(|m| {
            Ok(ChatMessage::from_new(
                uuid::Uuid::new_v4().to_string(),
                chrono::Utc::now(),
                m,
            ))
        });

    let mut backend = MockBackend::new();
    backend
        .expect_exchange()
        .withf(|req| req.conversation_id == "conv-explicit")
        .times(1)
        .returning(|_| {
            Ok(ExchangeReply {
                text: "Welcome back".to_string(),
                conversation_id: None,
            })
        });

    let (session, _rx) = setup_session(
        author().with_conversation_id("conv-explicit"),
        Arc::new(store),
        Arc::new(backend),
    );
    let mut session = session.with_history_limit(20);

    session.mount().await;
    assert_eq!(session.conversation_id(), Some("conv-explicit"));
    assert_eq!(session.transcript().len(), 1);
    assert_eq!(session.transcript()[0].local_id(), "row-1");

    session.send("Picking up where we left off").await.unwrap();
    session.settle().await;

    assert_eq!(session.conversation_id(), Some("conv-explicit"));
    assert_eq!(session.transcript().len(), 3);
}

#[tokio::test]
async fn test_send_before_mount_uses_explicit_conversation() {
    let db = Arc::new(Sqlite::new(None).await.unwrap());
    let seen = Arc::new(Mutex::new(Vec::new()));
    let (mut session, _rx) = setup_session(
        author().with_conversation_id("plan-conv"),
        db.clone(),
        Arc::new(echo_backend(Arc::clone(&seen))),
    );
    assert_eq!(session.state(), SessionState::Loading);

    session.send("hello").await.unwrap();
    session.settle().await;

    let requests = seen.lock().unwrap().clone();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].conversation_id, "plan-conv");
    assert_eq!(session.conversation_id(), Some("plan-conv"));

    let rows = db
        .list_by_conversation("author-123", "plan-conv", 50)
        .await
        .unwrap();
    assert_eq!(rows.len(), 2);
    assert!(rows.iter().all(|m| m.conversation_id() == Some("plan-conv")));
}

#[tokio::test]
async fn test_pinned_conversation_survives_new_and_delete() {
    let db = Arc::new(Sqlite::new(None).await.unwrap());
    let seen = Arc::new(Mutex::new(Vec::new()));
    let (mut session, mut rx) = setup_session(
        author().with_conversation_id("plan-conv"),
        db.clone(),
        Arc::new(echo_backend(Arc::clone(&seen))),
    );
    session.mount().await;

    session.send("first").await.unwrap();
    session.settle().await;

    drain(&mut rx);
    session.start_new_conversation().await.unwrap();
    assert_eq!(session.conversation_id(), Some("plan-conv"));
    assert_eq!(session.transcript().len(), 2);
    let events = drain(&mut rx);
    let kinds = events
        .iter()
        .filter_map(|event| match event {
            Event::Notice(notice) => Some(notice.kind()),
            _ => None,
        })
        .collect::<Vec<_>>();
    assert_eq!(kinds, vec![NoticeKind::Warning]);
    assert!(!events.contains(&Event::TranscriptCleared));

    session.send("second").await.unwrap();
    session.settle().await;

    session.delete_conversation().await.unwrap();
    assert!(session.transcript().is_empty());
    assert_eq!(session.conversation_id(), Some("plan-conv"));

    session.send("third").await.unwrap();
    session.settle().await;

    let requests = seen.lock().unwrap().clone();
    let ids = requests
        .iter()
        .map(|r| r.conversation_id.as_str())
        .collect::<Vec<_>>();
    assert_eq!(ids, vec!["plan-conv", "plan-conv", "plan-conv"]);

    let rows = db
        .list_by_conversation("author-123", "plan-conv", 50)
        .await
        .unwrap();
    let contents = rows.iter().map(|m| m.content()).collect::<Vec<_>>();
    assert_eq!(contents, vec!["third", "reply to third"]);
}

#[tokio::test]
async fn test_resumes_latest_conversation() {
    let db = Arc::new(Sqlite::new(None).await.unwrap());
    db.append(NewMessage::user("author-123", "old").with_conversation_id("conv-old"))
        .await
        .unwrap();
    db.append(NewMessage::user("author-123", "hello").with_conversation_id("conv-1"))
        .await
        .unwrap();
    db.append(NewMessage::assistant("author-123", "hi").with_conversation_id("conv-1"))
        .await
        .unwrap();

    let mut backend = MockBackend::new();
    backend.expect_exchange().never();
    let (mut session, mut rx) = setup_session(author(), db, Arc::new(backend));

    session.mount().await;

    assert_eq!(session.conversation_id(), Some("conv-1"));
    let contents = session
        .transcript()
        .iter()
        .map(|entry| entry.content())
        .collect::<Vec<_>>();
    assert_eq!(contents, vec!["hello", "hi"]);
    assert!(session.transcript().iter().all(|entry| entry.is_confirmed()));

    let events = drain(&mut rx);
    assert_eq!(
        events,
        vec![
            Event::ConversationChanged(Some("conv-1".to_string())),
            Event::HistoryLoaded(session.transcript().to_vec()),
        ]
    );
}

#[tokio::test]
async fn test_busy_while_exchange_in_flight() {
    let db = Arc::new(Sqlite::new(None).await.unwrap());
    let gate = Arc::new(Notify::new());
    let (mut session, _rx) = setup_session(
        author(),
        db,
        Arc::new(GatedBackend {
            gate: Arc::clone(&gate),
        }),
    );
    session.mount().await;

    session.send("first").await.unwrap();
    assert_eq!(session.send("second").await, Err(SendRejected::Busy));
    assert_eq!(
        session.start_new_conversation().await,
        Err(SendRejected::Busy)
    );
    assert_eq!(session.delete_conversation().await, Err(SendRejected::Busy));
    assert_eq!(session.transcript().len(), 1);

    // Giving up on settle leaves the exchange outstanding.
    let timed_out = tokio::time::timeout(Duration::from_millis(20), session.settle()).await;
    assert!(timed_out.is_err());
    assert!(session.is_sending());

    gate.notify_one();
    assert!(session.settle().await);
    assert!(!session.is_sending());
    assert_eq!(session.transcript().len(), 2);
    assert_eq!(session.transcript()[1].content(), "reply to first");

    session.send("second").await.unwrap();
    gate.notify_one();
    session.settle().await;
    assert_eq!(session.transcript().len(), 4);
}

#[tokio::test]
async fn test_empty_message_is_rejected() {
    let mut store = MockMessageStore::new();
    store.expect_append().never();
    let mut backend = MockBackend::new();
    backend.expect_exchange().never();
    let (mut session, _rx) = setup_session(author(), Arc::new(store), Arc::new(backend));

    assert_eq!(session.send("   ").await, Err(SendRejected::EmptyMessage));
    assert!(session.transcript().is_empty());
    assert!(!session.settle().await);
}

#[tokio::test]
async fn test_missing_user_is_configuration_error() {
    // Any store call would panic on the unconfigured mock.
    let store = MockMessageStore::new();
    let mut backend = MockBackend::new();
    backend.expect_exchange().never();
    let (mut session, mut rx) =
        setup_session(SessionContext::new(), Arc::new(store), Arc::new(backend));

    session.mount().await;
    assert_eq!(session.state(), SessionState::Ready);
    assert!(session.transcript().is_empty());

    let err = session.send("Hello").await.unwrap_err();
    assert!(matches!(err, SendRejected::Configuration(_)));
    assert!(session.transcript().is_empty());
    assert!(!session.is_sending());

    let events = drain(&mut rx);
    let notice = events.iter().find_map(|event| match event {
        Event::Notice(notice) => Some(notice.clone()),
        _ => None,
    });
    assert_eq!(notice.map(|n| n.kind()), Some(NoticeKind::Error));
}

#[tokio::test]
async fn test_history_failure_yields_empty_transcript() {
    let mut store = MockMessageStore::new();
    store
        .expect_latest_conversation_id()
        .returning(|_| Ok(Some("conv-1".to_string())));
    store
        .expect_list_by_conversation()
        .returning(|_, _, _| Err(eyre::eyre!("connection reset")));
    let backend = MockBackend::new();
    let (mut session, _rx) = setup_session(author(), Arc::new(store), Arc::new(backend));

    session.mount().await;

    assert_eq!(session.state(), SessionState::Ready);
    assert!(session.transcript().is_empty());
    assert_eq!(session.conversation_id(), Some("conv-1"));
}

#[tokio::test]
async fn test_resolver_failure_starts_fresh() {
    let mut store = MockMessageStore::new();
    store
        .expect_latest_conversation_id()
        .returning(|_| Err(eyre::eyre!("timeout")));
    store.expect_list_by_conversation().never();
    let backend = MockBackend::new();
    let (mut session, _rx) = setup_session(author(), Arc::new(store), Arc::new(backend));

    session.mount().await;

    assert_eq!(session.state(), SessionState::Ready);
    assert_eq!(session.conversation_id(), None);
}

#[tokio::test]
async fn test_start_new_conversation_mints_new_id() {
    let db = Arc::new(Sqlite::new(None).await.unwrap());
    let seen = Arc::new(Mutex::new(Vec::new()));
    let (mut session, mut rx) = setup_session(
        author(),
        db,
        Arc::new(echo_backend(Arc::clone(&seen))),
    );
    session.mount().await;

    session.send("first").await.unwrap();
    session.settle().await;
    let first_id = session.conversation_id().unwrap().to_string();

    drain(&mut rx);
    session.start_new_conversation().await.unwrap();
    assert!(session.transcript().is_empty());
    assert_eq!(session.conversation_id(), None);
    let events = drain(&mut rx);
    assert!(events.contains(&Event::TranscriptCleared));
    assert!(events.contains(&Event::ConversationChanged(None)));

    session.send("second").await.unwrap();
    session.settle().await;
    let second_id = session.conversation_id().unwrap().to_string();
    assert_ne!(first_id, second_id);

    let requests = seen.lock().unwrap().clone();
    assert_eq!(requests[0].conversation_id, first_id);
    assert_eq!(requests[1].conversation_id, second_id);
}

#[tokio::test]
async fn test_delete_conversation() {
    let db = Arc::new(Sqlite::new(None).await.unwrap());
    let seen = Arc::new(Mutex::new(Vec::new()));
    let (mut session, _rx) = setup_session(
        author(),
        db.clone(),
        Arc::new(echo_backend(Arc::clone(&seen))),
    );
    session.mount().await;

    session.send("forget me").await.unwrap();
    session.settle().await;
    let conversation_id = session.conversation_id().unwrap().to_string();

    session.delete_conversation().await.unwrap();

    assert!(session.transcript().is_empty());
    assert_eq!(session.conversation_id(), None);
    assert!(
        db.list_by_conversation("author-123", &conversation_id, 50)
            .await
            .unwrap()
            .is_empty()
    );

    // Nothing left to delete.
    session.delete_conversation().await.unwrap();
}

#[tokio::test]
async fn test_snapshot() {
    let db = Arc::new(Sqlite::new(None).await.unwrap());
    let gate = Arc::new(Notify::new());
    let (mut session, _rx) = setup_session(
        author(),
        db,
        Arc::new(GatedBackend {
            gate: Arc::clone(&gate),
        }),
    );
    session.mount().await;
    session.send("hello").await.unwrap();

    let snapshot = session.snapshot();
    assert!(snapshot.is_sending);
    assert_eq!(snapshot.state, SessionState::Sending);
    assert_eq!(snapshot.conversation_id, None);
    assert_eq!(snapshot.transcript.len(), 1);
    assert!(snapshot.transcript[0].is_pending());

    gate.notify_one();
    session.settle().await;
    let snapshot = session.snapshot();
    assert!(!snapshot.is_sending);
    assert_eq!(snapshot.transcript.len(), 2);
    assert!(snapshot.conversation_id.is_some());
}
