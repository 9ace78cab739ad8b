//! Width-aware wrapping for the transcript and the input box.
//!
//! Text is broken into explicit lines before rendering so that the scroll
//! offset and the input cursor can be computed from the same layout that
//! ends up on screen.

use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

/// Greedy word wrap. Words longer than `width` are split; blank lines are
/// kept.
pub fn wrap_words(text: &str, width: usize) -> Vec<String> {
    let width = width.max(1);
    let mut lines = Vec::new();

    for source_line in text.split('\n') {
        let mut current = String::new();
        let mut current_width = 0;

        for word in source_line.split(' ') {
            let word_width = word.width();
            let gap = usize::from(!current.is_empty());

            if current_width + gap + word_width <= width {
                if gap == 1 {
                    current.push(' ');
                }
                current.push_str(word);
                current_width += gap + word_width;
                continue;
            }

            if !current.is_empty() {
                lines.push(std::mem::take(&mut current));
                current_width = 0;
            }

            if word_width <= width {
                current.push_str(word);
                current_width = word_width;
                continue;
            }

            let mut chunks = wrap_chars(word, width);
            if let Some(last) = chunks.pop() {
                lines.extend(chunks);
                current_width = last.width();
                current = last;
            }
        }

        lines.push(current);
    }

    lines
}

/// Hard wrap at exactly `width` columns, ignoring word boundaries.
pub fn wrap_chars(text: &str, width: usize) -> Vec<String> {
    let width = width.max(1);
    let mut lines = Vec::new();
    let mut current = String::new();
    let mut current_width = 0;

    for ch in text.chars() {
        let ch_width = ch.width().unwrap_or(0);
        if current_width + ch_width > width && !current.is_empty() {
            lines.push(std::mem::take(&mut current));
            current_width = 0;
        }
        current.push(ch);
        current_width += ch_width;
    }

    lines.push(current);
    lines
}

/// Row and column of a cursor placed after `prefix` in a box that is
/// hard-wrapped at `width`.
pub fn cursor_position(prefix: &str, width: usize) -> (u16, u16) {
    let lines = wrap_chars(prefix, width);
    let row = lines.len().saturating_sub(1);
    let col = lines.last().map(|line| line.width()).unwrap_or(0);
    if col >= width.max(1) {
        (row as u16 + 1, 0)
    } else {
        (row as u16, col as u16)
    }
}
