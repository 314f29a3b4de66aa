//! Input dispatch and request lifecycle
//!
//! [`Dispatcher::try_send`] validates the pending input, renders the user's
//! message and spawns the completion call. The spawned task reports back over
//! a channel; the UI loop hands each [`Completion`] to
//! [`Dispatcher::complete`], so every transcript mutation happens on the
//! thread that owns the renderer.

use std::fmt;
use std::sync::Arc;

use anyhow::anyhow;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;

use crate::client::{CompletionClient, CompletionRequest};
use crate::message::Sender;
use crate::renderer::{ChatView, Renderer};

/// How a reply body becomes transcript text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplyFormat {
    /// The whole JSON body, compact
    #[default]
    Raw,
    /// `choices[0].message.content`, falling back to `Raw`
    Content,
}

impl ReplyFormat {
    pub fn render(&self, body: &Value) -> String {
        match self {
            ReplyFormat::Raw => body.to_string(),
            ReplyFormat::Content => body
                .pointer("/choices/0/message/content")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| body.to_string()),
        }
    }
}

/// What happens when a send arrives while another request is in flight
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SendPolicy {
    /// Overlapping requests are allowed; busy until all have settled
    #[default]
    Concurrent,
    /// Sends are rejected while one is pending
    Exclusive,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatSettings {
    pub model: String,
    pub max_tokens: u32,
    pub reply_format: ReplyFormat,
    pub send_policy: SendPolicy,
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            model: crate::config::DEFAULT_MODEL.to_string(),
            max_tokens: crate::config::DEFAULT_MAX_TOKENS,
            reply_format: ReplyFormat::default(),
            send_policy: SendPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(pub u64);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// Blank input, nothing happened
    Ignored,
    /// Another request is pending under [`SendPolicy::Exclusive`]
    Rejected,
    Sent(RequestId),
}

impl SendOutcome {
    pub fn is_sent(&self) -> bool {
        matches!(self, SendOutcome::Sent(_))
    }
}

/// Settled result of one spawned request
#[derive(Debug)]
pub struct Completion {
    pub id: RequestId,
    pub result: anyhow::Result<Value>,
}

pub type CompletionReceiver = mpsc::UnboundedReceiver<Completion>;

pub struct Dispatcher {
    settings: ChatSettings,
    client: Arc<dyn CompletionClient>,
    tx: mpsc::UnboundedSender<Completion>,
    next_id: u64,
    in_flight: usize,
}

impl Dispatcher {
    pub fn new(settings: ChatSettings, client: Arc<dyn CompletionClient>) -> (Self, CompletionReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        let dispatcher = Self {
            settings,
            client,
            tx,
            next_id: 0,
            in_flight: 0,
        };
        (dispatcher, rx)
    }

    pub fn settings(&self) -> &ChatSettings {
        &self.settings
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    /// Validate `input` and, if accepted, render it and spawn the request.
    ///
    /// Must be called from within a tokio runtime.
    pub fn try_send<V: ChatView>(&mut self, input: &str, renderer: &mut Renderer<V>) -> SendOutcome {
        let message = input.trim();
        if message.is_empty() {
            tracing::debug!("ignoring blank input");
            return SendOutcome::Ignored;
        }

        if self.settings.send_policy == SendPolicy::Exclusive && self.in_flight > 0 {
            tracing::debug!(in_flight = self.in_flight, "rejecting send while a request is pending");
            return SendOutcome::Rejected;
        }

        renderer.append(Sender::User, message);

        let id = RequestId(self.next_id);
        self.next_id += 1;
        self.in_flight += 1;

        let request = CompletionRequest::user(&self.settings.model, message, self.settings.max_tokens);
        tracing::info!(request = %id, model = %request.model, "dispatching completion request");

        let client = Arc::clone(&self.client);
        let tx = self.tx.clone();
        tokio::spawn(async move {
            // Inner task so a panicking client still settles this request.
            let call = tokio::spawn(async move { client.complete(&request).await });
            let result = match call.await {
                Ok(result) => result,
                Err(e) => Err(anyhow!("request task failed: {}", e)),
            };
            // Receiver gone means the UI has shut down.
            let _ = tx.send(Completion { id, result });
        });

        SendOutcome::Sent(id)
    }

    /// Render a settled request as exactly one bot entry.
    pub fn complete<V: ChatView>(&mut self, completion: Completion, renderer: &mut Renderer<V>) {
        let text = match completion.result {
            Ok(body) => {
                tracing::debug!(request = %completion.id, "completion succeeded");
                self.settings.reply_format.render(&body)
            }
            Err(e) => {
                tracing::warn!(request = %completion.id, error = %e, "completion failed");
                format!("Error: {}", e)
            }
        };

        renderer.append(Sender::Bot, text);

        self.in_flight = self.in_flight.saturating_sub(1);
        if self.in_flight == 0 {
            renderer.set_idle();
        }
    }
}
