use ratatui::crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

use crate::core::session::SessionEvent;
use crate::ui::wrap::wrap_words;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entry {
    User(String),
    Assistant(String),
    Error(String),
}

/// What the event loop should do after a key press.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyOutcome {
    None,
    Send(String),
    Quit,
}

/// State of the chat screen, independent of the terminal.
pub struct ChatView {
    pub model: String,
    pub entries: Vec<Entry>,
    input: String,
    /// Cursor position in chars
    cursor: usize,
    pub streaming: bool,
    pub scroll_offset: u16,
    pub auto_scroll: bool,
    pub viewport_height: u16,
    spinner_tick: usize,
}

const SPINNER_FRAMES: [&str; 8] = ["⣾", "⣽", "⣻", "⢿", "⡿", "⣟", "⣯", "⣷"];

impl ChatView {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            entries: Vec::new(),
            input: String::new(),
            cursor: 0,
            streaming: false,
            scroll_offset: 0,
            auto_scroll: true,
            viewport_height: 0,
            spinner_tick: 0,
        }
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn input_before_cursor(&self) -> &str {
        let byte = self.byte_index(self.cursor);
        &self.input[..byte]
    }

    fn byte_index(&self, char_index: usize) -> usize {
        self.input
            .char_indices()
            .nth(char_index)
            .map(|(i, _)| i)
            .unwrap_or(self.input.len())
    }

    pub fn insert_str(&mut self, text: &str) {
        if self.streaming {
            return;
        }
        let byte = self.byte_index(self.cursor);
        self.input.insert_str(byte, text);
        self.cursor += text.chars().count();
    }

    fn backspace(&mut self) {
        if self.cursor == 0 {
            return;
        }
        self.cursor -= 1;
        let byte = self.byte_index(self.cursor);
        self.input.remove(byte);
    }

    fn delete(&mut self) {
        if self.cursor < self.input.chars().count() {
            let byte = self.byte_index(self.cursor);
            self.input.remove(byte);
        }
    }

    fn set_input(&mut self, text: &str) {
        self.input = text.to_string();
        self.cursor = self.input.chars().count();
    }

    fn take_input(&mut self) -> Option<String> {
        if self.input.trim().is_empty() {
            return None;
        }
        self.cursor = 0;
        Some(std::mem::take(&mut self.input))
    }

    pub fn handle_key(&mut self, key: KeyEvent) -> KeyOutcome {
        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
        let shift = key.modifiers.contains(KeyModifiers::SHIFT);
        let half_page = (self.viewport_height / 2).max(1);

        match key.code {
            KeyCode::Char('c') if ctrl => return KeyOutcome::Quit,
            KeyCode::Char('u') if ctrl => self.scroll_up(half_page),
            KeyCode::Char('d') if ctrl => self.scroll_down(half_page),
            KeyCode::PageUp => self.scroll_up(self.viewport_height.max(1)),
            KeyCode::PageDown => self.scroll_down(self.viewport_height.max(1)),
            KeyCode::Up if shift => self.scroll_up(1),
            KeyCode::Down if shift => self.scroll_down(1),
            // Input is locked until the reply finishes
            _ if self.streaming => {}
            KeyCode::Enter => {
                if let Some(text) = self.take_input() {
                    return KeyOutcome::Send(text);
                }
            }
            KeyCode::Char(ch) if !ctrl => self.insert_str(ch.encode_utf8(&mut [0; 4])),
            KeyCode::Backspace => self.backspace(),
            KeyCode::Delete => self.delete(),
            KeyCode::Left => self.cursor = self.cursor.saturating_sub(1),
            KeyCode::Right => self.cursor = (self.cursor + 1).min(self.input.chars().count()),
            KeyCode::Home => self.cursor = 0,
            KeyCode::End => self.cursor = self.input.chars().count(),
            _ => {}
        }
        KeyOutcome::None
    }

    /// Records the outgoing message and locks input while the request is
    /// made.
    pub fn begin_turn(&mut self, text: &str) {
        self.entries.push(Entry::User(text.to_string()));
        self.streaming = true;
        self.auto_scroll = true;
    }

    /// The request could not be made. The text goes back into the input box
    /// so it can be retried.
    pub fn fail_turn(&mut self, text: &str, error: &str) {
        self.entries.push(Entry::Error(error.to_string()));
        self.streaming = false;
        self.set_input(text);
    }

    pub fn apply_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::PartialToken(fragment) => match self.entries.last_mut() {
                Some(Entry::Assistant(reply)) => reply.push_str(&fragment),
                _ => self.entries.push(Entry::Assistant(fragment)),
            },
            SessionEvent::Done => {
                if !matches!(self.entries.last(), Some(Entry::Assistant(_))) {
                    self.entries.push(Entry::Assistant(String::new()));
                }
                self.streaming = false;
            }
            SessionEvent::Error(err) => {
                self.entries.push(Entry::Error(err.to_string()));
                self.streaming = false;
            }
        }
    }

    pub fn tick(&mut self) {
        self.spinner_tick = self.spinner_tick.wrapping_add(1);
    }

    pub fn spinner(&self) -> &'static str {
        SPINNER_FRAMES[self.spinner_tick % SPINNER_FRAMES.len()]
    }

    fn scroll_up(&mut self, lines: u16) {
        self.auto_scroll = false;
        self.scroll_offset = self.scroll_offset.saturating_sub(lines);
    }

    fn scroll_down(&mut self, lines: u16) {
        self.scroll_offset = self.scroll_offset.saturating_add(lines);
    }

    /// Wrapped transcript lines tagged with the entry they came from.
    pub fn transcript_lines(&self, width: usize) -> Vec<(&Entry, String)> {
        let mut lines = Vec::new();
        for entry in &self.entries {
            let text = match entry {
                Entry::User(text) => format!("> {text}"),
                Entry::Assistant(text) | Entry::Error(text) => text.clone(),
            };
            lines.extend(wrap_words(&text, width).into_iter().map(|line| (entry, line)));
            lines.push((entry, String::new()));
        }
        lines
    }

    /// Clamps the scroll offset to the content and follows the bottom while
    /// auto-scroll is on.
    pub fn clamp_scroll(&mut self, total_lines: usize, viewport_height: u16) {
        self.viewport_height = viewport_height;
        let max_offset = total_lines.saturating_sub(viewport_height as usize);
        let max_offset = u16::try_from(max_offset).unwrap_or(u16::MAX);
        if self.auto_scroll || self.scroll_offset >= max_offset {
            self.scroll_offset = max_offset;
            self.auto_scroll = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::chat_stream::StreamError;

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn type_text(view: &mut ChatView, text: &str) {
        for ch in text.chars() {
            view.handle_key(key(KeyCode::Char(ch)));
        }
    }

    #[test]
    fn enter_sends_input_and_clears_box() {
        let mut view = ChatView::new("gpt-3.5-turbo");
        assert_eq!(view.handle_key(key(KeyCode::Enter)), KeyOutcome::None);

        type_text(&mut view, "Hi");
        assert_eq!(
            view.handle_key(key(KeyCode::Enter)),
            KeyOutcome::Send("Hi".to_string())
        );
        assert_eq!(view.input(), "");
    }

    #[test]
    fn ctrl_c_quits_even_while_streaming() {
        let mut view = ChatView::new("m");
        view.begin_turn("Hi");
        let ctrl_c = KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL);
        assert_eq!(view.handle_key(ctrl_c), KeyOutcome::Quit);
    }

    #[test]
    fn input_is_locked_while_streaming() {
        let mut view = ChatView::new("m");
        view.begin_turn("Hi");
        type_text(&mut view, "more");
        assert_eq!(view.input(), "");
        assert_eq!(view.handle_key(key(KeyCode::Enter)), KeyOutcome::None);
    }

    #[test]
    fn cursor_editing_handles_multibyte_text() {
        let mut view = ChatView::new("m");
        type_text(&mut view, "héllo");
        view.handle_key(key(KeyCode::Left));
        view.handle_key(key(KeyCode::Left));
        view.handle_key(key(KeyCode::Backspace));
        assert_eq!(view.input(), "hélo");
        assert_eq!(view.input_before_cursor(), "hé");
        view.handle_key(key(KeyCode::Home));
        view.handle_key(key(KeyCode::Delete));
        assert_eq!(view.input(), "élo");
    }

    #[test]
    fn tokens_accumulate_into_one_reply() {
        let mut view = ChatView::new("m");
        view.begin_turn("Hi");
        view.apply_event(SessionEvent::PartialToken("Hello W".to_string()));
        view.apply_event(SessionEvent::PartialToken("orld!".to_string()));
        view.apply_event(SessionEvent::Done);

        assert!(!view.streaming);
        assert_eq!(
            view.entries,
            vec![
                Entry::User("Hi".to_string()),
                Entry::Assistant("Hello World!".to_string()),
            ]
        );
    }

    #[test]
    fn stream_error_keeps_partial_text_and_unlocks_input() {
        let mut view = ChatView::new("m");
        view.begin_turn("Hi");
        view.apply_event(SessionEvent::PartialToken("Hello W".to_string()));
        view.apply_event(SessionEvent::Error(StreamError::Transport(
            "reset".to_string(),
        )));

        assert!(!view.streaming);
        assert_eq!(view.entries.len(), 3);
        assert!(matches!(&view.entries[2], Entry::Error(msg) if msg.contains("reset")));

        type_text(&mut view, "again");
        assert_eq!(view.input(), "again");
    }

    #[test]
    fn failed_send_restores_input_for_retry() {
        let mut view = ChatView::new("m");
        type_text(&mut view, "Hi");
        let KeyOutcome::Send(text) = view.handle_key(key(KeyCode::Enter)) else {
            panic!("expected send");
        };
        view.begin_turn(&text);
        view.fail_turn(&text, "Failed to retrieve chat response");

        assert!(!view.streaming);
        assert_eq!(view.input(), "Hi");
        assert_eq!(view.input_before_cursor(), "Hi");
    }

    #[test]
    fn scrolling_up_disables_follow_until_bottom_is_reached() {
        let mut view = ChatView::new("m");
        view.clamp_scroll(50, 10);
        assert_eq!(view.scroll_offset, 40);

        view.handle_key(key(KeyCode::PageUp));
        view.clamp_scroll(50, 10);
        assert_eq!(view.scroll_offset, 30);
        assert!(!view.auto_scroll);

        view.clamp_scroll(60, 10);
        assert_eq!(view.scroll_offset, 30);

        for _ in 0..4 {
            view.handle_key(KeyEvent::new(KeyCode::Char('d'), KeyModifiers::CONTROL));
        }
        view.clamp_scroll(60, 10);
        assert_eq!(view.scroll_offset, 50);
        assert!(view.auto_scroll);
    }

    #[test]
    fn transcript_prefixes_user_turns() {
        let mut view = ChatView::new("m");
        view.begin_turn("Hi");
        view.apply_event(SessionEvent::PartialToken("Hello".to_string()));
        let lines: Vec<String> = view
            .transcript_lines(80)
            .into_iter()
            .map(|(_, line)| line)
            .collect();
        assert_eq!(lines, vec!["> Hi", "", "Hello", ""]);
    }
}
