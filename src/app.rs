use ratatui::layout::Rect;

use crate::dispatcher::{Completion, Dispatcher, SendOutcome};
use crate::renderer::{BusyState, Renderer, TranscriptView};

/// Convert a character index to a byte index for UTF-8 safe string operations
fn char_to_byte_index(s: &str, char_idx: usize) -> usize {
    s.char_indices()
        .nth(char_idx)
        .map(|(i, _)| i)
        .unwrap_or(s.len())
}

pub struct App {
    pub should_quit: bool,

    // Input line
    pub input: String,
    pub cursor: usize,
    pub clear_input_on_send: bool,

    // Conversation
    pub renderer: Renderer<TranscriptView>,
    pub dispatcher: Dispatcher,
    pub last_outcome: Option<SendOutcome>,

    // Transcript scrolling; `follow` pins the view to the newest entry
    pub scroll: u16,
    pub follow: bool,
    pub chat_height: u16,
    pub chat_width: u16,
    pub chat_area: Option<Rect>,

    pub animation_frame: usize,
}

impl App {
    pub fn new(dispatcher: Dispatcher, clear_input_on_send: bool) -> Self {
        Self {
            should_quit: false,
            input: String::new(),
            cursor: 0,
            clear_input_on_send,
            renderer: Renderer::new(TranscriptView::new()),
            dispatcher,
            last_outcome: None,
            scroll: 0,
            follow: true,
            chat_height: 0,
            chat_width: 0,
            chat_area: None,
            animation_frame: 0,
        }
    }

    pub fn view(&self) -> &TranscriptView {
        self.renderer.view()
    }

    pub fn is_busy(&self) -> bool {
        self.view().busy() == BusyState::Busy
    }

    /// Send whatever is in the input line
    pub fn submit(&mut self) {
        let outcome = self.dispatcher.try_send(&self.input, &mut self.renderer);
        if outcome.is_sent() {
            if self.clear_input_on_send {
                self.input.clear();
                self.cursor = 0;
            }
            self.follow = true;
        }
        self.last_outcome = Some(outcome);
    }

    /// The last Enter was refused because a reply is still pending
    pub fn send_rejected(&self) -> bool {
        self.last_outcome == Some(SendOutcome::Rejected)
    }

    pub fn apply_completion(&mut self, completion: Completion) {
        self.dispatcher.complete(completion, &mut self.renderer);
        if self.send_rejected() {
            self.last_outcome = None;
        }
        self.follow = true;
    }

    pub fn tick_animation(&mut self) {
        if self.is_busy() {
            self.animation_frame = self.animation_frame.wrapping_add(1);
        }
    }

    // Input editing

    pub fn insert_char(&mut self, c: char) {
        let byte_pos = char_to_byte_index(&self.input, self.cursor);
        self.input.insert(byte_pos, c);
        self.cursor += 1;
    }

    /// Pasted text is flattened onto the single input line
    pub fn insert_str(&mut self, text: &str) {
        for c in text.chars() {
            match c {
                '\r' => {}
                '\n' | '\t' => self.insert_char(' '),
                c => self.insert_char(c),
            }
        }
    }

    pub fn backspace(&mut self) {
        if self.cursor > 0 {
            self.cursor -= 1;
            let byte_pos = char_to_byte_index(&self.input, self.cursor);
            self.input.remove(byte_pos);
        }
    }

    pub fn delete(&mut self) {
        if self.cursor < self.input.chars().count() {
            let byte_pos = char_to_byte_index(&self.input, self.cursor);
            self.input.remove(byte_pos);
        }
    }

    pub fn cursor_left(&mut self) {
        self.cursor = self.cursor.saturating_sub(1);
    }

    pub fn cursor_right(&mut self) {
        self.cursor = (self.cursor + 1).min(self.input.chars().count());
    }

    pub fn cursor_home(&mut self) {
        self.cursor = 0;
    }

    pub fn cursor_end(&mut self) {
        self.cursor = self.input.chars().count();
    }

    // Transcript scrolling

    pub fn scroll_up(&mut self, lines: u16) {
        self.follow = false;
        self.scroll = self.scroll.saturating_sub(lines);
    }

    pub fn scroll_down(&mut self, lines: u16) {
        self.scroll = self.scroll.saturating_add(lines);
        if self.scroll >= self.max_scroll() {
            self.scroll = self.max_scroll();
            self.follow = true;
        }
    }

    pub fn page_size(&self) -> u16 {
        self.chat_height.max(1)
    }

    /// Lines the transcript occupies once wrapped to the current pane width
    pub fn transcript_lines(&self) -> u16 {
        let wrap_width = if self.chat_width > 0 {
            self.chat_width as usize
        } else {
            50
        };

        let mut total_lines: u16 = 0;
        for msg in self.view().transcript().iter() {
            total_lines = total_lines.saturating_add(1); // "You:" / "Bot:" label
            for line in msg.text().lines() {
                let char_count = line.chars().count();
                let wrapped = if char_count == 0 { 1 } else { char_count.div_ceil(wrap_width) };
                total_lines = total_lines.saturating_add(wrapped as u16);
            }
            total_lines = total_lines.saturating_add(1); // blank separator
        }

        if self.is_busy() {
            total_lines = total_lines.saturating_add(2);
        }

        total_lines
    }

    pub fn max_scroll(&self) -> u16 {
        self.transcript_lines().saturating_sub(self.page_size())
    }

    /// Called each frame once the pane size is known
    pub fn sync_scroll(&mut self) {
        if self.follow {
            self.scroll = self.max_scroll();
        } else {
            self.scroll = self.scroll.min(self.max_scroll());
        }
    }
}
