//! Conversation rendering
//!
//! The renderer knows nothing about terminals: it drives a [`ChatView`],
//! which the TUI implements with [`TranscriptView`] and tests implement with
//! recording fakes.

use crate::message::{Message, Sender, Transcript};

/// Send-affordance indicator state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BusyState {
    #[default]
    Idle,
    Busy,
}

/// Rendering surface the conversation is drawn onto
pub trait ChatView {
    fn append_message(&mut self, message: Message);
    fn set_busy(&mut self, state: BusyState);
    fn hide_info(&mut self);
}

/// In-memory view state drawn by the terminal UI each frame
#[derive(Debug, Clone)]
pub struct TranscriptView {
    transcript: Transcript,
    busy: BusyState,
    info_visible: bool,
}

impl TranscriptView {
    pub fn new() -> Self {
        Self {
            transcript: Transcript::new(),
            busy: BusyState::Idle,
            info_visible: true,
        }
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn busy(&self) -> BusyState {
        self.busy
    }

    pub fn info_visible(&self) -> bool {
        self.info_visible
    }
}

impl Default for TranscriptView {
    fn default() -> Self {
        Self::new()
    }
}

impl ChatView for TranscriptView {
    fn append_message(&mut self, message: Message) {
        self.transcript.push(message);
    }

    fn set_busy(&mut self, state: BusyState) {
        self.busy = state;
    }

    fn hide_info(&mut self) {
        self.info_visible = false;
    }
}

pub struct Renderer<V: ChatView> {
    view: V,
}

impl<V: ChatView> Renderer<V> {
    pub fn new(view: V) -> Self {
        Self { view }
    }

    /// Append one entry to the transcript.
    ///
    /// Hides the placeholder and flips the indicator to busy. Returning to
    /// idle is the caller's job once its request has settled.
    pub fn append(&mut self, sender: Sender, text: impl Into<String>) {
        self.view.hide_info();
        self.view.set_busy(BusyState::Busy);
        self.view.append_message(Message::new(sender, text));
    }

    pub fn set_idle(&mut self) {
        self.view.set_busy(BusyState::Idle);
    }

    pub fn view(&self) -> &V {
        &self.view
    }
}
