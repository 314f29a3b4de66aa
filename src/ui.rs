use ratatui::{
    Frame,
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style, Stylize},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Paragraph, Wrap},
};
use unicode_width::UnicodeWidthChar;
use crate::app::App;
use crate::message::{Message, Sender};

const SPINNER: [&str; 8] = ["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧"];
const SEND_ICON: &str = "➤";

const PLACEHOLDER: &str = "Type a message and press Enter to start chatting.";
const REJECTED_NOTICE: &str = "reply pending, message not sent";

/// Turn `**bold**` runs into styled spans; everything else stays literal
fn parse_markdown_line(text: &str) -> Line<'static> {
    let mut spans: Vec<Span<'static>> = Vec::new();
    let mut rest = text;

    while let Some(open) = rest.find("**") {
        let after_open = &rest[open + 2..];
        let Some(close) = after_open.find("**") else {
            break;
        };
        if close == 0 {
            // "****" is not emphasis
            spans.push(Span::raw(rest[..open + 4].to_string()));
            rest = &after_open[2..];
            continue;
        }

        if open > 0 {
            spans.push(Span::raw(rest[..open].to_string()));
        }
        spans.push(Span::styled(
            after_open[..close].to_string(),
            Style::default().add_modifier(Modifier::BOLD),
        ));
        rest = &after_open[close + 2..];
    }

    if !rest.is_empty() {
        spans.push(Span::raw(rest.to_string()));
    }

    Line::from(spans)
}

fn sender_style(sender: Sender) -> Style {
    let color = match sender {
        Sender::User => Color::Cyan,
        Sender::Bot => Color::Yellow,
    };
    Style::default().fg(color).add_modifier(Modifier::BOLD)
}

fn message_lines(msg: &Message) -> Vec<Line<'static>> {
    let mut lines = vec![Line::from(Span::styled(
        format!("{}:", msg.sender().label()),
        sender_style(msg.sender()),
    ))];

    match msg.sender() {
        Sender::User => lines.extend(msg.text().lines().map(|l| Line::from(l.to_string()))),
        Sender::Bot => lines.extend(msg.text().lines().map(parse_markdown_line)),
    }
    lines.push(Line::default());
    lines
}

pub fn render(app: &mut App, frame: &mut Frame) {
    let [header_area, chat_area, input_area, footer_area] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Min(0),
        Constraint::Length(3),
        Constraint::Length(1),
    ])
    .areas(frame.area());

    render_header(app, frame, header_area);
    render_transcript(app, frame, chat_area);
    render_input(app, frame, input_area);
    render_footer(app, frame, footer_area);
}

fn render_header(app: &App, frame: &mut Frame, area: Rect) {
    let title = Line::from(vec![
        Span::styled(" chatbox ", Style::default().fg(Color::Cyan).bold()),
        Span::styled(
            format!("{} ", app.dispatcher.settings().model),
            Style::default().fg(Color::White),
        ),
        Span::styled(
            format!("v{}", env!("CARGO_PKG_VERSION")),
            Style::default().fg(Color::DarkGray),
        ),
    ]);

    let header = Paragraph::new(title).style(Style::default().bg(Color::DarkGray));
    frame.render_widget(header, area);
}

fn render_transcript(app: &mut App, frame: &mut Frame, area: Rect) {
    app.chat_area = Some(area);
    app.chat_height = area.height.saturating_sub(2);
    app.chat_width = area.width.saturating_sub(2);
    app.sync_scroll();

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray))
        .title(format!(" Conversation ({}) ", app.view().transcript().len()));

    let text = if app.view().info_visible() {
        Text::from(Span::styled(PLACEHOLDER, Style::default().fg(Color::DarkGray)))
    } else {
        let mut lines: Vec<Line> = app
            .view()
            .transcript()
            .iter()
            .flat_map(message_lines)
            .collect();

        if app.is_busy() {
            lines.push(Line::from(Span::styled("Bot:", sender_style(Sender::Bot))));
            let dots = ".".repeat(app.animation_frame % 3 + 1);
            lines.push(Line::from(Span::styled(
                format!("Thinking{}", dots),
                Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
            )));
        }
        Text::from(lines)
    };

    let chat = Paragraph::new(text)
        .block(block)
        .wrap(Wrap { trim: false })
        .scroll((app.scroll, 0));

    frame.render_widget(chat, area);
}

fn render_input(app: &App, frame: &mut Frame, area: Rect) {
    let (icon, border_color) = if app.is_busy() {
        (SPINNER[app.animation_frame % SPINNER.len()], Color::Magenta)
    } else {
        (SEND_ICON, Color::Yellow)
    };

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color))
        .title(format!(" {} Message ", icon));

    let (visible_text, cursor_x) =
        visible_input(&app.input, app.cursor, area.width.saturating_sub(2) as usize);

    let input = Paragraph::new(visible_text)
        .style(Style::default().fg(Color::Cyan))
        .block(block);

    frame.render_widget(input, area);

    frame.set_cursor_position((area.x + cursor_x + 1, area.y + 1));
}

/// Part of `input` that fits in `width` terminal cells with the cursor kept
/// visible, and the cursor's cell offset within it
fn visible_input(input: &str, cursor: usize, width: usize) -> (String, u16) {
    if width == 0 {
        return (String::new(), 0);
    }

    let chars: Vec<char> = input.chars().collect();
    let cursor = cursor.min(chars.len());
    let cell_width = |c: &char| c.width().unwrap_or(0);

    // One cell stays free for the cursor itself
    let mut start = 0;
    let mut cursor_x: usize = chars[..cursor].iter().map(cell_width).sum();
    while cursor_x >= width && start < cursor {
        cursor_x -= cell_width(&chars[start]);
        start += 1;
    }

    let mut text = String::new();
    let mut used = 0;
    for c in &chars[start..] {
        let w = cell_width(c);
        if used + w > width {
            break;
        }
        text.push(*c);
        used += w;
    }

    (text, cursor_x as u16)
}

fn render_footer(app: &App, frame: &mut Frame, area: Rect) {
    let key_style = Style::default().bg(Color::DarkGray).fg(Color::White);
    let label_style = Style::default().bg(Color::Black).fg(Color::White);

    let mut hints = vec![
        Span::styled(" Enter ", key_style),
        Span::styled(" send ", label_style),
        Span::styled(" PgUp/PgDn ", key_style),
        Span::styled(" scroll ", label_style),
        Span::styled(" Ctrl-U ", key_style),
        Span::styled(" clear ", label_style),
        Span::styled(" Esc ", key_style),
        Span::styled(" quit ", label_style),
    ];

    let pending = app.dispatcher.in_flight();
    if app.send_rejected() {
        hints.push(Span::styled(
            format!(" {} ", REJECTED_NOTICE),
            Style::default().fg(Color::Black).bg(Color::Red),
        ));
    } else if pending > 0 {
        hints.push(Span::styled(
            format!(" {} pending ", pending),
            Style::default().fg(Color::Magenta),
        ));
    }

    frame.render_widget(Paragraph::new(Line::from(hints)), area);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rendered(line: &Line) -> Vec<(String, bool)> {
        line.spans
            .iter()
            .map(|s| (s.content.to_string(), s.style.add_modifier.contains(Modifier::BOLD)))
            .collect()
    }

    #[test]
    fn bold_runs_are_styled() {
        let line = parse_markdown_line("a **b** c");
        assert_eq!(
            rendered(&line),
            vec![
                ("a ".to_string(), false),
                ("b".to_string(), true),
                (" c".to_string(), false),
            ]
        );
    }

    #[test]
    fn unclosed_bold_is_literal() {
        let line = parse_markdown_line("2 ** 3");
        assert_eq!(rendered(&line), vec![("2 ** 3".to_string(), false)]);
    }

    #[test]
    fn raw_json_reply_is_untouched() {
        let line = parse_markdown_line(r#"{"id":"x"}"#);
        assert_eq!(rendered(&line), vec![(r#"{"id":"x"}"#.to_string(), false)]);
    }

    #[test]
    fn message_block_has_label_body_and_separator() {
        let lines = message_lines(&Message::bot("one\ntwo"));
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0].spans[0].content, "Bot:");
        assert!(lines[3].spans.is_empty());
    }

    #[test]
    fn ascii_input_fits_without_scrolling() {
        assert_eq!(visible_input("hello", 5, 10), ("hello".to_string(), 5));
        assert_eq!(visible_input("hello", 0, 10), ("hello".to_string(), 0));
    }

    #[test]
    fn wide_chars_are_measured_in_cells() {
        // Each Hangul syllable takes two cells
        assert_eq!(visible_input("안녕", 2, 10), ("안녕".to_string(), 4));

        let (text, cursor_x) = visible_input("안녕하세요", 5, 6);
        assert_eq!(text, "세요");
        assert_eq!(cursor_x, 4);
    }

    #[test]
    fn visible_input_never_exceeds_width() {
        let (text, cursor_x) = visible_input("안녕하세요", 0, 5);
        assert_eq!(text, "안녕");
        assert_eq!(cursor_x, 0);
    }

    mod footer {
        use super::super::*;
        use std::sync::Arc;
        use anyhow::Result;
        use async_trait::async_trait;
        use ratatui::{backend::TestBackend, Terminal};
        use serde_json::Value;
        use crate::client::{CompletionClient, CompletionRequest};
        use crate::dispatcher::{ChatSettings, Dispatcher, SendPolicy};

        struct NeverReplies;

        #[async_trait]
        impl CompletionClient for NeverReplies {
            async fn complete(&self, _request: &CompletionRequest) -> Result<Value> {
                std::future::pending().await
            }
        }

        fn screen(app: &mut App) -> String {
            let mut terminal = Terminal::new(TestBackend::new(120, 12)).unwrap();
            terminal.draw(|frame| render(app, frame)).unwrap();
            terminal
                .backend()
                .buffer()
                .content
                .iter()
                .map(|cell| cell.symbol())
                .collect()
        }

        #[tokio::test]
        async fn rejected_send_is_announced() {
            let settings = ChatSettings {
                send_policy: SendPolicy::Exclusive,
                ..ChatSettings::default()
            };
            let (dispatcher, _rx) = Dispatcher::new(settings, Arc::new(NeverReplies));
            let mut app = App::new(dispatcher, true);

            app.insert_str("first");
            app.submit();
            assert!(!screen(&mut app).contains(REJECTED_NOTICE));

            app.insert_str("second");
            app.submit();
            assert!(screen(&mut app).contains(REJECTED_NOTICE));
        }
    }
}
