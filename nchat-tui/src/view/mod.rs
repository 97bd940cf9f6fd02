//! `ratatui` rendering (`SPEC_FULL.md` §9): pure functions over a
//! [`ChatSnapshot`] plus whatever dialog overlay `crate::app` currently has
//! on screen. Nothing here touches `Model`'s mutex; `crate::app` captures one
//! snapshot per frame and passes it down, generalizing the REPL's
//! `render_ui`/`render_history`/`render_input`/`render_status_bar` split to a
//! chat-list-plus-history layout.

use ratatui::{
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Wrap},
    Frame,
};

use nchat_core::ProfileId;

use crate::model::{ChatKey, ChatSnapshot, Mode};

/// Minimum height of the scrollable history area (in terminal rows).
pub const MIN_HISTORY_HEIGHT: u16 = 3;
/// Height of the input box area (in terminal rows, including border).
pub const INPUT_HEIGHT: u16 = 3;
/// Height of the status bar at the bottom (in terminal rows).
pub const STATUS_HEIGHT: u16 = 1;
/// Width of the chat list column (in terminal columns, including border).
pub const CHAT_LIST_WIDTH: u16 = 28;

/// One row of a list-shaped dialog (`crate::dialog::ListDialog` and its
/// specializations), reduced to what rendering needs so `crate::view` does
/// not have to be generic over the dialog's item type.
pub struct DialogRow<'a> {
    pub display: &'a str,
    pub shaded: bool,
}

/// What `crate::app` wants drawn as a modal overlay this frame.
pub enum DialogView<'a> {
    List { title: &'a str, rows: Vec<DialogRow<'a>>, selected_index: usize, filter: &'a str },
    Message { message: &'a str },
}

/// Renders the whole frame: chat list, message history, entry box, status
/// bar, and an optional dialog overlay on top of everything else.
pub fn render_ui(frame: &mut Frame, snapshot: &ChatSnapshot, status: &str, dialog: Option<&DialogView>) {
    let area = frame.area();

    let rows = Layout::vertical([
        Constraint::Min(MIN_HISTORY_HEIGHT),
        Constraint::Length(INPUT_HEIGHT),
        Constraint::Length(STATUS_HEIGHT),
    ])
    .split(area);

    let body = Layout::horizontal([Constraint::Length(CHAT_LIST_WIDTH), Constraint::Min(1)]).split(rows[0]);

    render_chat_list(frame, snapshot, body[0]);
    render_history(frame, snapshot, body[1]);
    render_input(frame, snapshot, rows[1]);
    render_status_bar(frame, snapshot, status, rows[2]);

    if let Some(dialog) = dialog {
        render_dialog(frame, dialog, area);
    }
}

fn render_chat_list(frame: &mut Frame, snapshot: &ChatSnapshot, area: Rect) {
    let block = Block::default().borders(Borders::ALL).title(" Chats ");

    let lines: Vec<Line> = snapshot
        .chat_vec
        .iter()
        .map(|key| chat_list_line(snapshot, key))
        .collect();

    frame.render_widget(Paragraph::new(lines).block(block), area);
}

fn chat_list_line<'a>(snapshot: &'a ChatSnapshot, key: &ChatKey) -> Line<'a> {
    let info = snapshot.chat_infos.get(key);
    let name = snapshot.chat_name(key);
    let is_current = snapshot.current_chat.as_ref() == Some(key);

    let mut prefix = String::new();
    if info.map(|i| i.is_pinned).unwrap_or(false) {
        prefix.push('\u{1F4CC}');
    }
    if info.map(|i| i.is_muted).unwrap_or(false) {
        prefix.push('\u{1F507}');
    }

    let mut style = Style::default();
    if info.map(|i| i.is_unread).unwrap_or(false) {
        style = style.add_modifier(Modifier::BOLD);
    }
    if is_current {
        style = style.bg(Color::DarkGray);
    }

    Line::from(Span::styled(format!("{prefix}{name}"), style))
}

/// Renders the scrollable history area for the current chat. Anchored at the
/// newest message: `visible_messages` is already offset by `PageUp`/
/// `PageDown`, so there is no separate pixel scroll state to track here.
fn render_history(frame: &mut Frame, snapshot: &ChatSnapshot, area: Rect) {
    let title = snapshot.current_chat.as_ref().map(|key| snapshot.chat_name(key)).unwrap_or_default();
    let block = Block::default().borders(Borders::ALL).title(format!(" {title} "));
    let inner_width = area.width.saturating_sub(2);
    let inner_height = area.height.saturating_sub(2) as usize;

    let lines = match &snapshot.current_chat {
        Some(key) => build_history_lines(snapshot, key),
        None => Vec::new(),
    };

    let total_lines = Paragraph::new(lines.clone()).block(block.clone()).wrap(Wrap { trim: false }).line_count(inner_width);
    let scroll = total_lines.saturating_sub(inner_height) as u16;

    let history = Paragraph::new(lines).block(block).wrap(Wrap { trim: false }).scroll((scroll, 0));
    frame.render_widget(history, area);
}

fn build_history_lines<'a>(snapshot: &'a ChatSnapshot, key: &ChatKey) -> Vec<Line<'a>> {
    let profile_id = &key.0;
    let Some(messages) = snapshot.visible_messages.get(key) else { return Vec::new() };

    let selectable = matches!(snapshot.mode, Mode::SelectMessage | Mode::EditMessage);

    // `visible_messages` is newest-first; render oldest-to-newest top-to-bottom.
    let mut lines = Vec::new();
    for (rev_index, message) in messages.iter().rev().enumerate() {
        let index = messages.len() - 1 - rev_index;
        let is_selected = selectable && snapshot.selected_index == Some(index);

        let label_color = if message.is_outgoing { Color::Green } else { Color::Cyan };
        let mut label_style = Style::default().fg(label_color).add_modifier(Modifier::BOLD);
        if is_selected {
            label_style = label_style.bg(Color::DarkGray);
        }

        let sender = sender_label(snapshot, profile_id, message);
        lines.push(Line::from(Span::styled(sender, label_style)));

        for content_line in message.text.lines() {
            lines.push(Line::from(format!("  {content_line}")));
        }
        if message.text.is_empty() {
            lines.push(Line::from("  "));
        }

        if !message.reactions.emoji_counts.is_empty() {
            let reactions = message
                .reactions
                .emoji_counts
                .iter()
                .map(|(emoji, count)| format!("{emoji}{count}"))
                .collect::<Vec<_>>()
                .join(" ");
            lines.push(Line::from(Span::styled(format!("  {reactions}"), Style::default().fg(Color::Yellow))));
        }

        lines.push(Line::from(""));
    }
    lines
}

fn sender_label(snapshot: &ChatSnapshot, profile_id: &ProfileId, message: &nchat_core::ChatMessage) -> String {
    let name = snapshot.sender_name(profile_id, &message.sender_id);
    let read_mark = if message.is_outgoing {
        if message.is_read { " \u{2713}\u{2713}" } else { " \u{2713}" }
    } else {
        ""
    };
    format!("[{name}]{read_mark}")
}

fn render_input(frame: &mut Frame, snapshot: &ChatSnapshot, area: Rect) {
    let title = match snapshot.mode {
        Mode::EditMessage => " Edit ",
        _ => " Message ",
    };
    let input = Paragraph::new(snapshot.entry_text.as_str()).block(Block::default().borders(Borders::ALL).title(title));
    frame.render_widget(input, area);

    if matches!(snapshot.mode, Mode::Default | Mode::EditMessage) {
        let cursor_x = area.x + 1 + snapshot.entry_text[..snapshot.entry_cursor].chars().count() as u16;
        let cursor_y = area.y + 1;
        let max_x = area.x + area.width.saturating_sub(2);
        frame.set_cursor_position((cursor_x.min(max_x), cursor_y));
    }
}

fn render_status_bar(frame: &mut Frame, snapshot: &ChatSnapshot, status: &str, area: Rect) {
    let text = if !status.is_empty() {
        status.to_string()
    } else {
        let mode = match snapshot.mode {
            Mode::Default => "",
            Mode::SelectMessage => " | select message: up/down, Enter to edit, Esc to cancel",
            Mode::EditMessage => " | editing message, Enter to save, Esc to discard",
            Mode::ListDialog | Mode::MessageDialog => " | dialog open",
        };
        format!(" nchat{mode}")
    };

    let bar = Paragraph::new(text).style(Style::default().bg(Color::DarkGray).fg(Color::White));
    frame.render_widget(bar, area);
}

/// Renders a dialog as a centered box over the rest of the frame, the way
/// `uidialog.cpp` draws a bordered popup on top of the main views.
fn render_dialog(frame: &mut Frame, dialog: &DialogView, area: Rect) {
    let popup = centered_rect(60, 60, area);
    frame.render_widget(ratatui::widgets::Clear, popup);

    match dialog {
        DialogView::List { title, rows, selected_index, filter } => {
            let block = Block::default().borders(Borders::ALL).title(format!(" {title} "));
            let mut lines: Vec<Line> = rows
                .iter()
                .enumerate()
                .map(|(i, row)| {
                    let mut style = Style::default();
                    if row.shaded {
                        style = style.fg(Color::DarkGray);
                    }
                    if i == *selected_index {
                        style = style.bg(Color::DarkGray);
                    }
                    Line::from(Span::styled(row.display.to_string(), style))
                })
                .collect();
            if !filter.is_empty() {
                lines.insert(0, Line::from(Span::styled(format!("Filter: {filter}"), Style::default().fg(Color::Yellow))));
                lines.insert(1, Line::from(""));
            }
            frame.render_widget(Paragraph::new(lines).block(block).wrap(Wrap { trim: false }), popup);
        }
        DialogView::Message { message } => {
            let block = Block::default().borders(Borders::ALL).title(" nchat ");
            frame.render_widget(Paragraph::new(*message).block(block).wrap(Wrap { trim: false }), popup);
        }
    }
}

fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let vertical = Layout::vertical([
        Constraint::Percentage((100 - percent_y) / 2),
        Constraint::Percentage(percent_y),
        Constraint::Percentage((100 - percent_y) / 2),
    ])
    .split(area);

    Layout::horizontal([
        Constraint::Percentage((100 - percent_x) / 2),
        Constraint::Percentage(percent_x),
        Constraint::Percentage((100 - percent_x) / 2),
    ])
    .split(vertical[1])[1]
}

#[cfg(test)]
mod tests {
    use super::*;
    use nchat_core::{ChatId, ChatInfo, ChatMessage, MsgId, Reactions, UserId};

    fn message(id: &str, is_outgoing: bool, text: &str) -> ChatMessage {
        ChatMessage {
            id: MsgId::new(id),
            sender_id: UserId::new("u1"),
            text: text.to_string(),
            quoted_id: None,
            quoted_text: None,
            quoted_sender: None,
            file_info: None,
            link: None,
            reactions: Reactions::default(),
            time_sent: 0,
            is_outgoing,
            is_read: false,
            has_mention: false,
        }
    }

    fn snapshot_with_one_chat() -> ChatSnapshot {
        let key: ChatKey = (ProfileId::new("p1"), ChatId::new("c1"));
        let mut chat_infos = std::collections::HashMap::new();
        chat_infos.insert(key.clone(), ChatInfo::new(ChatId::new("c1")));
        let mut visible_messages = std::collections::HashMap::new();
        visible_messages.insert(key.clone(), vec![message("m2", true, "second"), message("m1", false, "first")]);

        ChatSnapshot {
            chat_infos,
            chat_vec: vec![key.clone()],
            contact_infos: std::collections::HashMap::new(),
            available_reactions: std::collections::HashMap::new(),
            current_chat: Some(key),
            mode: Mode::Default,
            entry_text: String::new(),
            entry_cursor: 0,
            selected_index: None,
            visible_messages,
        }
    }

    #[test]
    fn history_lines_render_oldest_message_first() {
        let snapshot = snapshot_with_one_chat();
        let key = snapshot.current_chat.clone().unwrap();
        let lines = build_history_lines(&snapshot, &key);
        let rendered: Vec<String> = lines.iter().map(|l| l.to_string()).collect();
        let first_content = rendered.iter().position(|l| l.contains("first")).unwrap();
        let second_content = rendered.iter().position(|l| l.contains("second")).unwrap();
        assert!(first_content < second_content);
    }

    #[test]
    fn unresolved_chat_name_falls_back_to_raw_id() {
        let snapshot = snapshot_with_one_chat();
        let key = snapshot.current_chat.clone().unwrap();
        assert_eq!(snapshot.chat_name(&key), "c1");
    }

    #[test]
    fn outgoing_message_carries_read_mark() {
        let snapshot = snapshot_with_one_chat();
        let key = snapshot.current_chat.clone().unwrap();
        let lines = build_history_lines(&snapshot, &key);
        let rendered: Vec<String> = lines.iter().map(|l| l.to_string()).collect();
        assert!(rendered.iter().any(|l| l.contains('\u{2713}')));
    }
}
