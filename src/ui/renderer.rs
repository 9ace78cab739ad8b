use ratatui::{
    layout::{Constraint, Direction, Layout, Position},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph},
    Frame,
};

use crate::ui::view::{ChatView, Entry};
use crate::ui::wrap::{cursor_position, wrap_chars};

/// Rows available for text inside the input box
const INPUT_ROWS: u16 = 3;

fn entry_style(entry: &Entry) -> Style {
    match entry {
        Entry::User(_) => Style::default().fg(Color::Cyan),
        Entry::Assistant(_) => Style::default(),
        Entry::Error(_) => Style::default().fg(Color::Red),
    }
}

pub fn ui(f: &mut Frame, view: &mut ChatView) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(0),
            Constraint::Length(INPUT_ROWS + 2), // +2 for borders
            Constraint::Length(1),
        ])
        .split(f.area());

    let transcript_area = chunks[0];
    let lines: Vec<Line> = view
        .transcript_lines(transcript_area.width as usize)
        .into_iter()
        .map(|(entry, text)| Line::from(Span::styled(text, entry_style(entry))))
        .collect();
    view.clamp_scroll(lines.len(), transcript_area.height);

    f.render_widget(
        Paragraph::new(lines).scroll((view.scroll_offset, 0)),
        transcript_area,
    );

    let input_area = chunks[1];
    let inner_width = input_area.width.saturating_sub(2) as usize;
    let (cursor_row, cursor_col) = cursor_position(view.input_before_cursor(), inner_width);
    let input_scroll = cursor_row.saturating_sub(INPUT_ROWS - 1);

    let placeholder = view.input().is_empty() && !view.streaming && view.entries.is_empty();
    let input_lines: Vec<Line> = if placeholder {
        vec![Line::from(Span::styled(
            "How can I help today?",
            Style::default().fg(Color::DarkGray),
        ))]
    } else {
        wrap_chars(view.input(), inner_width)
            .into_iter()
            .map(Line::from)
            .collect()
    };

    let border_style = if view.streaming {
        Style::default().fg(Color::DarkGray)
    } else {
        Style::default().fg(Color::Cyan)
    };
    let input = Paragraph::new(input_lines)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(border_style)
                .title(format!(" {} ", view.model)),
        )
        .scroll((input_scroll, 0));
    f.render_widget(input, input_area);

    if !view.streaming {
        f.set_cursor_position(Position::new(
            input_area.x + 1 + cursor_col,
            input_area.y + 1 + cursor_row - input_scroll,
        ));
    }

    let mut footer = Vec::new();
    if view.streaming {
        footer.push(Span::styled(
            view.spinner(),
            Style::default()
                .fg(Color::Indexed(200))
                .add_modifier(Modifier::BOLD),
        ));
    }
    footer.push(Span::raw(
        " Press ctrl-C to quit. PgUp/PgDn or shift+↑/↓ to scroll.",
    ));
    f.render_widget(Paragraph::new(Line::from(footer)), chunks[2]);
}
