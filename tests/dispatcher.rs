use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::{oneshot, Mutex};

use chatbox::dispatcher::CompletionReceiver;
use chatbox::{
    BusyState, ChatSettings, CompletionClient, CompletionRequest, Dispatcher, Message, Renderer,
    ReplyFormat, SendOutcome, SendPolicy, Sender, TranscriptView,
};

/// Returns a fixed body (or error) and records every request it sees
struct Scripted {
    reply: std::result::Result<Value, String>,
    calls: AtomicUsize,
    requests: std::sync::Mutex<Vec<CompletionRequest>>,
}

impl Scripted {
    fn ok(body: Value) -> Arc<Self> {
        Arc::new(Self {
            reply: Ok(body),
            calls: AtomicUsize::new(0),
            requests: std::sync::Mutex::new(Vec::new()),
        })
    }

    fn err(message: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: Err(message.to_string()),
            calls: AtomicUsize::new(0),
            requests: std::sync::Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CompletionClient for Scripted {
    async fn complete(&self, request: &CompletionRequest) -> Result<Value> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());
        match &self.reply {
            Ok(body) => Ok(body.clone()),
            Err(message) => Err(anyhow!(message.clone())),
        }
    }
}

/// Holds each request until the test releases it by content
#[derive(Default)]
struct Gated {
    gates: Mutex<HashMap<String, oneshot::Receiver<Value>>>,
}

impl Gated {
    async fn gate(&self, content: &str) -> oneshot::Sender<Value> {
        let (tx, rx) = oneshot::channel();
        self.gates.lock().await.insert(content.to_string(), rx);
        tx
    }
}

#[async_trait]
impl CompletionClient for Gated {
    async fn complete(&self, request: &CompletionRequest) -> Result<Value> {
        let content = &request.messages[0].content;
        let rx = self
            .gates
            .lock()
            .await
            .remove(content)
            .ok_or_else(|| anyhow!("no gate for {}", content))?;
        rx.await.map_err(|_| anyhow!("gate dropped"))
    }
}

fn setup(settings: ChatSettings, client: Arc<dyn CompletionClient>) -> (Dispatcher, CompletionReceiver, Renderer<TranscriptView>) {
    let (dispatcher, rx) = Dispatcher::new(settings, client);
    (dispatcher, rx, Renderer::new(TranscriptView::new()))
}

async fn settle(dispatcher: &mut Dispatcher, rx: &mut CompletionReceiver, renderer: &mut Renderer<TranscriptView>) {
    let completion = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("completion timed out")
        .expect("channel closed");
    dispatcher.complete(completion, renderer);
}

fn entries(renderer: &Renderer<TranscriptView>) -> Vec<Message> {
    renderer.view().transcript().iter().cloned().collect()
}

#[tokio::test]
async fn hello_renders_raw_json_reply() {
    let client = Scripted::ok(json!({ "id": "x" }));
    let (mut dispatcher, mut rx, mut renderer) = setup(ChatSettings::default(), client.clone());

    let outcome = dispatcher.try_send("Hello", &mut renderer);
    assert!(outcome.is_sent());
    assert_eq!(entries(&renderer), vec![Message::user("Hello")]);
    assert_eq!(renderer.view().busy(), BusyState::Busy);

    settle(&mut dispatcher, &mut rx, &mut renderer).await;

    assert_eq!(
        entries(&renderer),
        vec![Message::user("Hello"), Message::bot(r#"{"id":"x"}"#)]
    );
    assert_eq!(renderer.view().busy(), BusyState::Idle);
    assert_eq!(dispatcher.in_flight(), 0);
    assert_eq!(client.calls(), 1);
}

#[tokio::test]
async fn whitespace_input_is_ignored() {
    let client = Scripted::ok(json!({}));
    let (mut dispatcher, mut rx, mut renderer) = setup(ChatSettings::default(), client.clone());

    for input in ["", "   ", "\t\n "] {
        assert_eq!(dispatcher.try_send(input, &mut renderer), SendOutcome::Ignored);
    }

    tokio::task::yield_now().await;
    assert!(renderer.view().transcript().is_empty());
    assert!(renderer.view().info_visible());
    assert_eq!(renderer.view().busy(), BusyState::Idle);
    assert_eq!(dispatcher.in_flight(), 0);
    assert_eq!(client.calls(), 0);
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn transport_error_becomes_error_entry() {
    let client = Scripted::err("timeout");
    let (mut dispatcher, mut rx, mut renderer) = setup(ChatSettings::default(), client);

    dispatcher.try_send("Hello", &mut renderer);
    settle(&mut dispatcher, &mut rx, &mut renderer).await;

    assert_eq!(
        entries(&renderer),
        vec![Message::user("Hello"), Message::bot("Error: timeout")]
    );
    assert_eq!(renderer.view().busy(), BusyState::Idle);
}

#[tokio::test]
async fn request_carries_trimmed_text_and_settings() {
    let client = Scripted::ok(json!({}));
    let settings = ChatSettings {
        model: "test-model".to_string(),
        max_tokens: 42,
        ..ChatSettings::default()
    };
    let (mut dispatcher, mut rx, mut renderer) = setup(settings, client.clone());

    dispatcher.try_send("  first  ", &mut renderer);
    settle(&mut dispatcher, &mut rx, &mut renderer).await;
    dispatcher.try_send("second", &mut renderer);
    settle(&mut dispatcher, &mut rx, &mut renderer).await;

    let requests = client.requests.lock().unwrap().clone();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0], CompletionRequest::user("test-model", "first", 42));
    // Each request is stateless: no earlier turns are included
    assert_eq!(requests[1], CompletionRequest::user("test-model", "second", 42));
    assert_eq!(renderer.view().transcript().iter().next(), Some(&Message::user("first")));
}

#[tokio::test]
async fn content_format_shows_reply_text() {
    let client = Scripted::ok(json!({
        "choices": [{ "message": { "role": "assistant", "content": "Hi there" } }]
    }));
    let settings = ChatSettings {
        reply_format: ReplyFormat::Content,
        ..ChatSettings::default()
    };
    let (mut dispatcher, mut rx, mut renderer) = setup(settings, client);

    dispatcher.try_send("Hello", &mut renderer);
    settle(&mut dispatcher, &mut rx, &mut renderer).await;

    assert_eq!(renderer.view().transcript().last(), Some(&Message::bot("Hi there")));
}

#[tokio::test]
async fn overlapping_sends_each_get_one_reply() {
    let client = Arc::new(Gated::default());
    let release_a = client.gate("A").await;
    let release_b = client.gate("B").await;
    let (mut dispatcher, mut rx, mut renderer) = setup(ChatSettings::default(), client);

    assert!(dispatcher.try_send("A", &mut renderer).is_sent());
    assert!(dispatcher.try_send("B", &mut renderer).is_sent());
    assert_eq!(entries(&renderer), vec![Message::user("A"), Message::user("B")]);
    assert_eq!(dispatcher.in_flight(), 2);

    release_b.send(json!("reply B")).unwrap();
    settle(&mut dispatcher, &mut rx, &mut renderer).await;
    // One request still outstanding
    assert_eq!(renderer.view().busy(), BusyState::Busy);

    release_a.send(json!("reply A")).unwrap();
    settle(&mut dispatcher, &mut rx, &mut renderer).await;
    assert_eq!(renderer.view().busy(), BusyState::Idle);

    let all = entries(&renderer);
    assert_eq!(all.len(), 4);
    assert_eq!(&all[..2], &[Message::user("A"), Message::user("B")]);

    let bots: Vec<&Message> = all[2..].iter().collect();
    assert!(bots.iter().all(|m| m.sender() == Sender::Bot));
    assert!(bots.contains(&&Message::bot(r#""reply A""#)));
    assert!(bots.contains(&&Message::bot(r#""reply B""#)));
}

#[tokio::test]
async fn exclusive_policy_rejects_while_pending() {
    let client = Arc::new(Gated::default());
    let release = client.gate("first").await;
    let settings = ChatSettings {
        send_policy: SendPolicy::Exclusive,
        ..ChatSettings::default()
    };
    let (mut dispatcher, mut rx, mut renderer) = setup(settings, client.clone());

    assert!(dispatcher.try_send("first", &mut renderer).is_sent());
    assert_eq!(dispatcher.try_send("second", &mut renderer), SendOutcome::Rejected);
    assert_eq!(entries(&renderer), vec![Message::user("first")]);

    release.send(json!({ "ok": true })).unwrap();
    settle(&mut dispatcher, &mut rx, &mut renderer).await;

    let _release_again = client.gate("second").await;
    assert!(dispatcher.try_send("second", &mut renderer).is_sent());
    assert_eq!(renderer.view().transcript().len(), 3);
}

#[tokio::test]
async fn request_ids_increase() {
    let client = Scripted::ok(json!({}));
    let (mut dispatcher, _rx, mut renderer) = setup(ChatSettings::default(), client);

    let first = dispatcher.try_send("one", &mut renderer);
    let second = dispatcher.try_send("two", &mut renderer);
    match (first, second) {
        (SendOutcome::Sent(a), SendOutcome::Sent(b)) => assert!(b > a),
        other => panic!("unexpected outcomes: {:?}", other),
    }
}

struct Panicking;

#[async_trait]
impl CompletionClient for Panicking {
    async fn complete(&self, _request: &CompletionRequest) -> Result<Value> {
        panic!("client blew up");
    }
}

#[tokio::test]
async fn panicking_client_still_settles_the_request() {
    let (mut dispatcher, mut rx, mut renderer) = setup(ChatSettings::default(), Arc::new(Panicking));

    assert!(dispatcher.try_send("Hello", &mut renderer).is_sent());
    settle(&mut dispatcher, &mut rx, &mut renderer).await;

    let all = entries(&renderer);
    assert_eq!(all.len(), 2);
    assert_eq!(all[1].sender(), Sender::Bot);
    assert!(all[1].text().starts_with("Error: "), "got {:?}", all[1].text());
    assert_eq!(renderer.view().busy(), BusyState::Idle);
    assert_eq!(dispatcher.in_flight(), 0);
}
