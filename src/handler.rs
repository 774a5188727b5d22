use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

use crate::app::{App, Focus, InputMode, LoginField, LoginMode};
use crate::tui::AppEvent;

/// Convert a character index to a byte index for UTF-8 safe string edits.
fn char_to_byte_index(s: &str, char_idx: usize) -> usize {
    s.char_indices()
        .nth(char_idx)
        .map(|(i, _)| i)
        .unwrap_or(s.len())
}

pub async fn handle_event(app: &mut App, event: AppEvent) -> Result<()> {
    match event {
        AppEvent::Key(key) => handle_key(app, key).await?,
        AppEvent::Resize(_, _) => {}
        AppEvent::Tick => {
            app.tick();
            app.poll_generation().await;
        }
    }
    Ok(())
}

async fn handle_key(app: &mut App, key: KeyEvent) -> Result<()> {
    // Works everywhere, popups included
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
        app.should_quit = true;
        return Ok(());
    }

    if app.show_login {
        handle_login_keys(app, key).await;
        return Ok(());
    }
    if app.show_feedback {
        handle_feedback_keys(app, key).await;
        return Ok(());
    }
    if app.show_voice_picker {
        handle_voice_picker_keys(app, key);
        return Ok(());
    }

    match app.input_mode {
        InputMode::Normal => handle_normal_mode(app, key),
        InputMode::Editing => handle_editing_mode(app, key),
    }
    Ok(())
}

fn handle_normal_mode(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Char('q') => app.should_quit = true,

        // Dismiss banners
        KeyCode::Esc => {
            app.error = None;
            app.notice = None;
        }

        // Focus cycling: Conversations -> Input -> Chat -> Conversations
        KeyCode::Tab => {
            app.focus = match app.focus {
                Focus::Conversations => {
                    app.input_mode = InputMode::Editing;
                    app.input_cursor = app.input.chars().count();
                    Focus::Input
                }
                Focus::Input => Focus::Chat,
                Focus::Chat => Focus::Conversations,
            };
        }

        KeyCode::Char('i') | KeyCode::Char('/') => {
            app.focus = Focus::Input;
            app.input_mode = InputMode::Editing;
            app.input_cursor = app.input.chars().count();
        }

        KeyCode::Char('n') => app.new_conversation(),
        KeyCode::Char('v') => app.open_voice_picker(),
        KeyCode::Char('o') => app.open_latest_audio(),
        KeyCode::Char('F') => app.show_feedback = true,

        KeyCode::Char('L') => {
            if app.store.user.is_none() {
                app.show_login = true;
                app.login_mode = LoginMode::SignIn;
                app.login_field = LoginField::Email;
            }
        }
        KeyCode::Char('X') => app.logout(),

        KeyCode::Char('d') => {
            if app.focus == Focus::Conversations {
                app.delete_highlighted_conversation();
            }
        }

        KeyCode::Char('j') | KeyCode::Down => match app.focus {
            Focus::Conversations => app.conversations_nav_down(),
            Focus::Chat => app.chat_scroll = app.chat_scroll.saturating_add(1),
            Focus::Input => {}
        },
        KeyCode::Char('k') | KeyCode::Up => match app.focus {
            Focus::Conversations => app.conversations_nav_up(),
            Focus::Chat => app.chat_scroll = app.chat_scroll.saturating_sub(1),
            Focus::Input => {}
        },

        KeyCode::Char('g') => {
            if app.focus == Focus::Chat {
                app.chat_scroll = 0;
            }
        }
        KeyCode::Char('G') => {
            if app.focus == Focus::Chat {
                app.scroll_chat_to_bottom();
            }
        }

        KeyCode::Enter => match app.focus {
            Focus::Conversations => app.activate_highlighted_conversation(),
            Focus::Input => {
                app.input_mode = InputMode::Editing;
                app.input_cursor = app.input.chars().count();
            }
            Focus::Chat => {}
        },

        _ => {}
    }
}

fn handle_editing_mode(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Esc => {
            app.input_mode = InputMode::Normal;
        }
        KeyCode::Enter => app.submit_input(),
        KeyCode::Backspace => {
            if app.input_cursor > 0 {
                app.input_cursor -= 1;
                let byte_pos = char_to_byte_index(&app.input, app.input_cursor);
                app.input.remove(byte_pos);
            }
        }
        KeyCode::Delete => {
            let char_count = app.input.chars().count();
            if app.input_cursor < char_count {
                let byte_pos = char_to_byte_index(&app.input, app.input_cursor);
                app.input.remove(byte_pos);
            }
        }
        KeyCode::Left => {
            app.input_cursor = app.input_cursor.saturating_sub(1);
        }
        KeyCode::Right => {
            let char_count = app.input.chars().count();
            app.input_cursor = (app.input_cursor + 1).min(char_count);
        }
        KeyCode::Home => {
            app.input_cursor = 0;
        }
        KeyCode::End => {
            app.input_cursor = app.input.chars().count();
        }
        KeyCode::Tab => {
            app.input_mode = InputMode::Normal;
            app.focus = Focus::Chat;
        }
        KeyCode::Char(c) => {
            let byte_pos = char_to_byte_index(&app.input, app.input_cursor);
            app.input.insert(byte_pos, c);
            app.input_cursor += 1;
        }
        _ => {}
    }
}

async fn handle_login_keys(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Esc => {
            app.show_login = false;
            app.login_password.clear();
        }
        KeyCode::Tab | KeyCode::Down | KeyCode::Up => {
            app.login_field = match app.login_field {
                LoginField::Email => LoginField::Password,
                LoginField::Password => LoginField::Email,
            };
        }
        // Toggle between sign-in and sign-up
        KeyCode::Char('r') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            app.login_mode = match app.login_mode {
                LoginMode::SignIn => LoginMode::SignUp,
                LoginMode::SignUp => LoginMode::SignIn,
            };
        }
        KeyCode::Enter => app.do_login().await,
        KeyCode::Backspace => {
            match app.login_field {
                LoginField::Email => app.login_email.pop(),
                LoginField::Password => app.login_password.pop(),
            };
        }
        KeyCode::Char(c) => match app.login_field {
            LoginField::Email => app.login_email.push(c),
            LoginField::Password => app.login_password.push(c),
        },
        _ => {}
    }
}

async fn handle_feedback_keys(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Esc => {
            app.show_feedback = false;
        }
        KeyCode::Enter => app.submit_feedback().await,
        KeyCode::Backspace => {
            app.feedback_input.pop();
        }
        KeyCode::Char(c) => app.feedback_input.push(c),
        _ => {}
    }
}

fn handle_voice_picker_keys(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Esc => app.show_voice_picker = false,
        KeyCode::Char('j') | KeyCode::Down => app.voice_picker_nav_down(),
        KeyCode::Char('k') | KeyCode::Up => app.voice_picker_nav_up(),
        KeyCode::Enter => app.choose_voice(),
        _ => {}
    }
}
