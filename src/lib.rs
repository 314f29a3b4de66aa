pub mod app;
pub mod client;
pub mod config;
pub mod dispatcher;
pub mod handler;
pub mod logging;
pub mod message;
pub mod renderer;
pub mod tui;
pub mod ui;

// Re-export main types for convenience
pub use client::{CompletionClient, CompletionRequest, HttpCompletionClient};
pub use config::Config;
pub use dispatcher::{ChatSettings, Completion, Dispatcher, ReplyFormat, RequestId, SendOutcome, SendPolicy};
pub use message::{Message, Sender, Transcript};
pub use renderer::{BusyState, ChatView, Renderer, TranscriptView};
