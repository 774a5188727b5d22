use ratatui::{
    Frame,
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style, Stylize},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Clear, List, ListItem, Paragraph, Wrap},
};

use crate::app::{App, Focus, InputMode, LoginField, LoginMode};
use crate::generation;
use crate::store::Role;

pub fn render(app: &mut App, frame: &mut Frame) {
    let area = frame.area();

    let [header_area, body_area, footer_area] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Min(0),
        Constraint::Length(1),
    ])
    .areas(area);

    render_header(app, frame, header_area);

    let [sidebar_area, main_area] =
        Layout::horizontal([Constraint::Length(30), Constraint::Min(0)]).areas(body_area);

    render_sidebar(app, frame, sidebar_area);
    render_main(app, frame, main_area);
    render_footer(app, frame, footer_area);

    // Popups (in order of priority)
    if app.show_login {
        render_login(app, frame, area);
    } else if app.show_feedback {
        render_feedback(app, frame, area);
    } else if app.show_voice_picker {
        render_voice_picker(app, frame, area);
    }
}

fn render_header(app: &App, frame: &mut Frame, area: Rect) {
    let voice = app
        .store
        .selected_voice
        .as_ref()
        .map(|v| format!(" voice: {} ", v.name))
        .unwrap_or_else(|| {
            if app.store.loading_voices {
                " loading voices... ".to_string()
            } else {
                " no voice selected ".to_string()
            }
        });

    let account = match &app.store.user {
        Some(user) => format!(" {} ({} plan) · {} credits ", user.name, user.plan, app.store.credits),
        None => " signed out ".to_string(),
    };

    let title = Line::from(vec![
        Span::styled(" Mosheng ", Style::default().fg(Color::Cyan).bold()),
        Span::styled(
            format!("v{} ", env!("CARGO_PKG_VERSION")),
            Style::default().fg(Color::Gray),
        ),
        Span::styled(voice, Style::default().fg(Color::Magenta)),
        Span::styled(account, Style::default().fg(Color::Gray)),
    ]);

    let header = Paragraph::new(title).style(Style::default().bg(Color::DarkGray));
    frame.render_widget(header, area);
}

fn render_sidebar(app: &mut App, frame: &mut Frame, area: Rect) {
    let focused = app.focus == Focus::Conversations;
    let border_color = if focused { Color::Cyan } else { Color::DarkGray };

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color))
        .title(format!(" Chats ({}) ", app.store.conversations.len()));

    if app.store.conversations.is_empty() {
        let placeholder = Paragraph::new("No chats yet.\nPress 'n' to start one.")
            .style(Style::default().fg(Color::DarkGray))
            .block(block)
            .wrap(Wrap { trim: true });
        frame.render_widget(placeholder, area);
        return;
    }

    let active_id = app.store.current_conversation_id.clone();
    let width = area.width.saturating_sub(4) as usize;

    let items: Vec<ListItem> = app
        .store
        .conversations
        .iter()
        .map(|conversation| {
            let is_active = active_id.as_deref() == Some(conversation.id.as_str());
            let prefix = if is_active { "* " } else { "  " };
            let title: String = conversation.title.chars().take(width).collect();

            let style = if is_active {
                Style::default().fg(Color::Green).add_modifier(Modifier::BOLD)
            } else {
                Style::default()
            };
            ListItem::new(format!("{prefix}{title}")).style(style)
        })
        .collect();

    let list = List::new(items)
        .block(block)
        .highlight_style(
            Style::default()
                .bg(Color::Blue)
                .fg(Color::White)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("> ");

    frame.render_stateful_widget(list, area, &mut app.conversation_state);
}

fn render_main(app: &mut App, frame: &mut Frame, area: Rect) {
    let banner_height = if app.error.is_some() || app.notice.is_some() {
        1
    } else {
        0
    };

    let [chat_area, banner_area, input_area] = Layout::vertical([
        Constraint::Min(0),
        Constraint::Length(banner_height),
        Constraint::Length(3),
    ])
    .areas(area);

    render_chat(app, frame, chat_area);
    if banner_height > 0 {
        render_banner(app, frame, banner_area);
    }
    render_input(app, frame, input_area);
}

fn render_chat(app: &mut App, frame: &mut Frame, area: Rect) {
    // Inner size feeds the scroll-to-bottom math.
    app.chat_height = area.height.saturating_sub(2);
    app.chat_width = area.width.saturating_sub(2);

    let focused = app.focus == Focus::Chat;
    let border_color = if focused { Color::Cyan } else { Color::DarkGray };

    let title = app
        .store
        .current_conversation()
        .map(|c| format!(" {} ", c.title))
        .unwrap_or_else(|| " New chat ".to_string());

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color))
        .title(title);

    let empty = app
        .store
        .current_conversation()
        .map(|c| c.messages.is_empty())
        .unwrap_or(true);

    let chat_text = if empty && !app.is_generating() {
        Text::from(Span::styled(
            "Pick a voice, type some text, and press Enter to hear it spoken.",
            Style::default().fg(Color::DarkGray),
        ))
    } else {
        let mut lines: Vec<Line> = Vec::new();

        if let Some(conversation) = app.store.current_conversation() {
            for message in &conversation.messages {
                match message.role {
                    Role::User => {
                        lines.push(Line::from(Span::styled(
                            "You:",
                            Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
                        )));
                        for line in message.content.lines() {
                            lines.push(Line::from(line));
                        }
                        lines.push(Line::default());
                    }
                    Role::Assistant => {
                        let speaker = message.voice_name.as_deref().unwrap_or("Mosheng");
                        lines.push(Line::from(Span::styled(
                            format!("{speaker}:"),
                            Style::default()
                                .fg(Color::Yellow)
                                .add_modifier(Modifier::BOLD),
                        )));
                        let audio = message.audio_url.as_deref().unwrap_or("(no audio)");
                        lines.push(Line::from(vec![
                            Span::styled("♪ ", Style::default().fg(Color::Magenta)),
                            Span::raw(audio.to_string()),
                            Span::styled("  (o to play)", Style::default().fg(Color::DarkGray)),
                        ]));
                        lines.push(Line::default());
                    }
                }
            }
        }

        if app.is_generating() {
            lines.push(Line::from(Span::styled(
                "Mosheng:",
                Style::default()
                    .fg(Color::Yellow)
                    .add_modifier(Modifier::BOLD),
            )));
            let dots = ".".repeat((app.animation_frame as usize) + 1);
            lines.push(Line::from(Span::styled(
                format!("Generating{dots}"),
                Style::default()
                    .fg(Color::DarkGray)
                    .add_modifier(Modifier::ITALIC),
            )));
        }

        Text::from(lines)
    };

    let chat = Paragraph::new(chat_text)
        .block(block)
        .wrap(Wrap { trim: true })
        .scroll((app.chat_scroll, 0));

    frame.render_widget(chat, area);
}

fn render_banner(app: &App, frame: &mut Frame, area: Rect) {
    let (text, color) = if let Some(error) = &app.error {
        (error.as_str(), Color::Red)
    } else if let Some(notice) = &app.notice {
        (notice.as_str(), Color::Green)
    } else {
        return;
    };

    let banner = Paragraph::new(Line::from(vec![
        Span::styled(format!(" {text} "), Style::default().fg(color).bold()),
        Span::styled("(Esc to dismiss)", Style::default().fg(Color::DarkGray)),
    ]));
    frame.render_widget(banner, area);
}

fn render_input(app: &App, frame: &mut Frame, area: Rect) {
    let focused = app.focus == Focus::Input;
    let border_color = if focused && app.input_mode == InputMode::Editing {
        Color::Yellow
    } else if focused {
        Color::Cyan
    } else {
        Color::DarkGray
    };

    let cost = generation::cost_of(&app.input);
    let counter_color = if cost > app.store.credits {
        Color::Red
    } else {
        Color::DarkGray
    };

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color))
        .title(Line::from(vec![
            Span::raw(" Message "),
            Span::styled(
                format!("{cost}/{} credits ", app.store.credits),
                Style::default().fg(counter_color),
            ),
        ]));

    // Horizontal scroll keeps the cursor visible.
    let inner_width = area.width.saturating_sub(2) as usize;
    let cursor_pos = app.input_cursor;
    let scroll_offset = if inner_width == 0 {
        0
    } else if cursor_pos >= inner_width {
        cursor_pos - inner_width + 1
    } else {
        0
    };

    let visible_text: String = app
        .input
        .chars()
        .skip(scroll_offset)
        .take(inner_width)
        .collect();

    let display = if visible_text.is_empty() && app.store.selected_voice.is_none() {
        Paragraph::new("Select a voice first (press v)...")
            .style(Style::default().fg(Color::DarkGray))
            .block(block)
    } else {
        Paragraph::new(visible_text)
            .style(Style::default().fg(Color::Cyan))
            .block(block)
    };

    frame.render_widget(display, area);

    if app.input_mode == InputMode::Editing && focused {
        let cursor_x = (cursor_pos - scroll_offset) as u16;
        frame.set_cursor_position((area.x + cursor_x + 1, area.y + 1));
    }
}

fn render_footer(app: &App, frame: &mut Frame, area: Rect) {
    let key_style = Style::default().bg(Color::DarkGray).fg(Color::White);
    let label_style = Style::default().bg(Color::Black).fg(Color::White);

    let hints: Vec<Span> = if app.show_login {
        vec![
            Span::styled(" Tab ", key_style),
            Span::styled(" field ", label_style),
            Span::styled(" Ctrl+R ", key_style),
            Span::styled(
                if app.login_mode == LoginMode::SignIn {
                    " sign up instead "
                } else {
                    " sign in instead "
                },
                label_style,
            ),
            Span::styled(" Enter ", key_style),
            Span::styled(" submit ", label_style),
            Span::styled(" Esc ", key_style),
            Span::styled(" close ", label_style),
        ]
    } else if app.show_feedback {
        vec![
            Span::styled(" Enter ", key_style),
            Span::styled(" send ", label_style),
            Span::styled(" Esc ", key_style),
            Span::styled(" close ", label_style),
        ]
    } else if app.show_voice_picker {
        vec![
            Span::styled(" j/k ", key_style),
            Span::styled(" nav ", label_style),
            Span::styled(" Enter ", key_style),
            Span::styled(" select ", label_style),
            Span::styled(" Esc ", key_style),
            Span::styled(" close ", label_style),
        ]
    } else if app.input_mode == InputMode::Editing {
        vec![
            Span::styled(" Enter ", key_style),
            Span::styled(" generate ", label_style),
            Span::styled(" Esc ", key_style),
            Span::styled(" normal mode ", label_style),
            Span::styled(" Tab ", key_style),
            Span::styled(" focus chat ", label_style),
        ]
    } else {
        let mut hints = vec![
            Span::styled(" Tab ", key_style),
            Span::styled(" focus ", label_style),
            Span::styled(" i ", key_style),
            Span::styled(" type ", label_style),
            Span::styled(" n ", key_style),
            Span::styled(" new chat ", label_style),
            Span::styled(" v ", key_style),
            Span::styled(" voice ", label_style),
            Span::styled(" o ", key_style),
            Span::styled(" play ", label_style),
        ];
        if app.focus == Focus::Conversations {
            hints.extend([
                Span::styled(" d ", key_style),
                Span::styled(" delete ", label_style),
            ]);
        }
        if app.store.user.is_some() {
            hints.extend([
                Span::styled(" X ", key_style),
                Span::styled(" sign out ", label_style),
            ]);
        } else {
            hints.extend([
                Span::styled(" L ", key_style),
                Span::styled(" sign in ", label_style),
            ]);
        }
        hints.extend([
            Span::styled(" F ", key_style),
            Span::styled(" feedback ", label_style),
            Span::styled(" q ", key_style),
            Span::styled(" quit ", label_style),
        ]);
        hints
    };

    let footer = Paragraph::new(Line::from(hints));
    frame.render_widget(footer, area);
}

fn centered_popup(area: Rect, width: u16, height: u16) -> Rect {
    let popup_width = width.min(area.width.saturating_sub(4));
    let popup_height = height.min(area.height.saturating_sub(4));
    let x = (area.width.saturating_sub(popup_width)) / 2;
    let y = (area.height.saturating_sub(popup_height)) / 2;
    Rect::new(x, y, popup_width, popup_height)
}

fn render_voice_picker(app: &mut App, frame: &mut Frame, area: Rect) {
    let popup_area = centered_popup(
        area,
        64,
        (app.store.voices.len() as u16 + 2).min(area.height.saturating_sub(4)),
    );
    frame.render_widget(Clear, popup_area);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan))
        .title(" Select Voice (Enter to select, Esc to cancel) ");

    let selected_id = app.store.selected_voice.as_ref().map(|v| v.id.clone());

    let items: Vec<ListItem> = app
        .store
        .voices
        .iter()
        .map(|voice| {
            let is_current = selected_id.as_deref() == Some(voice.id.as_str());
            let prefix = if is_current { "* " } else { "  " };
            let transcript: String = voice.transcript.chars().take(28).collect();

            let style = if is_current {
                Style::default().fg(Color::Green).add_modifier(Modifier::BOLD)
            } else {
                Style::default()
            };
            ListItem::new(format!(
                "{prefix}{}  [{}]  {transcript}",
                voice.name,
                voice.category.label()
            ))
            .style(style)
        })
        .collect();

    let list = List::new(items)
        .block(block)
        .highlight_style(
            Style::default()
                .bg(Color::Blue)
                .fg(Color::White)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("> ");

    frame.render_stateful_widget(list, popup_area, &mut app.voice_picker_state);
}

fn render_login(app: &App, frame: &mut Frame, area: Rect) {
    let popup_area = centered_popup(area, 60, 9);
    frame.render_widget(Clear, popup_area);

    let title = match app.login_mode {
        LoginMode::SignIn => " Sign in ",
        LoginMode::SignUp => " Create account ",
    };

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Yellow))
        .title(title);

    let inner = block.inner(popup_area);
    frame.render_widget(block, popup_area);

    let field_style = |field: LoginField| {
        if app.login_field == field {
            Style::default().fg(Color::Cyan)
        } else {
            Style::default().fg(Color::Gray)
        }
    };

    let email_line = Paragraph::new(Line::from(vec![
        Span::styled("Email:    ", field_style(LoginField::Email)),
        Span::raw(app.login_email.as_str()),
    ]));
    frame.render_widget(email_line, Rect::new(inner.x + 1, inner.y + 1, inner.width.saturating_sub(2), 1));

    let masked = "*".repeat(app.login_password.chars().count());
    let password_line = Paragraph::new(Line::from(vec![
        Span::styled("Password: ", field_style(LoginField::Password)),
        Span::raw(masked),
    ]));
    frame.render_widget(
        password_line,
        Rect::new(inner.x + 1, inner.y + 3, inner.width.saturating_sub(2), 1),
    );

    let hint = match app.login_mode {
        LoginMode::SignIn => "No account yet? Ctrl+R to create one.",
        LoginMode::SignUp => "Already registered? Ctrl+R to sign in.",
    };
    let hint_line = Paragraph::new(hint).style(Style::default().fg(Color::DarkGray));
    frame.render_widget(
        hint_line,
        Rect::new(inner.x + 1, inner.y + 5, inner.width.saturating_sub(2), 1),
    );

    // Cursor at the end of the active field
    let (row, len) = match app.login_field {
        LoginField::Email => (inner.y + 1, app.login_email.chars().count()),
        LoginField::Password => (inner.y + 3, app.login_password.chars().count()),
    };
    let cursor_x = inner.x + 1 + 10 + len.min(inner.width.saturating_sub(13) as usize) as u16;
    frame.set_cursor_position((cursor_x, row));
}

fn render_feedback(app: &App, frame: &mut Frame, area: Rect) {
    let popup_area = centered_popup(area, 60, 7);
    frame.render_widget(Clear, popup_area);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Yellow))
        .title(" Send feedback ");

    let inner = block.inner(popup_area);
    frame.render_widget(block, popup_area);

    let instructions = Paragraph::new("Tell us what broke or what you'd like to see.")
        .style(Style::default().fg(Color::DarkGray));
    frame.render_widget(instructions, Rect::new(inner.x, inner.y, inner.width, 1));

    let visible: String = app
        .feedback_input
        .chars()
        .rev()
        .take(inner.width.saturating_sub(1) as usize)
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    let input = Paragraph::new(visible.clone()).style(Style::default().fg(Color::Cyan));
    let input_area = Rect::new(inner.x, inner.y + 2, inner.width, 1);
    frame.render_widget(input, input_area);

    let cursor_x = (visible.chars().count() as u16).min(input_area.width.saturating_sub(1));
    frame.set_cursor_position((input_area.x + cursor_x, input_area.y));

    let count = Paragraph::new(format!("{} characters", app.feedback_input.chars().count()))
        .style(Style::default().fg(Color::DarkGray));
    frame.render_widget(count, Rect::new(inner.x, inner.y + 4, inner.width, 1));
}
