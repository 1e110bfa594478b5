use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers, MouseEvent, MouseEventKind};
use ratatui::layout::Rect;
use greenbot_core::AttachmentSource;
use crate::app::{pasted_file, App, InputMode, LineInput, Screen};
use crate::tui::AppEvent;

pub async fn handle_event(app: &mut App, event: AppEvent) -> Result<()> {
    match event {
        AppEvent::Key(key) => handle_key(app, key).await?,
        AppEvent::Mouse(mouse) => handle_mouse(app, mouse),
        AppEvent::Paste(text) => handle_paste(app, text).await,
        AppEvent::Resize(_, _) => {}
        AppEvent::Tick => {
            app.tick_animation();
        }
    }
    Ok(())
}

async fn handle_key(app: &mut App, key: KeyEvent) -> Result<()> {
    // Global keys that work in any mode
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
        app.should_quit = true;
        return Ok(());
    }

    if app.screen == Screen::Setup {
        handle_setup(app, key);
        return Ok(());
    }

    if app.show_attach_prompt {
        handle_attach_prompt(app, key).await;
        return Ok(());
    }

    match app.input_mode {
        InputMode::Normal => handle_normal_mode(app, key).await,
        InputMode::Editing => handle_editing_mode(app, key),
    }

    Ok(())
}

fn handle_setup(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Esc => app.should_quit = true,
        KeyCode::Enter => app.save_api_key(),
        _ => {
            edit_line(&mut app.key_input, key);
        }
    }
}

async fn handle_attach_prompt(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Esc => app.close_attach_prompt(),
        KeyCode::Enter => {
            if !app.attach_input.is_blank() {
                let path = app.attach_input.text().to_string();
                app.show_attach_prompt = false;
                app.stage_attachment(&path, AttachmentSource::Picker).await;
                app.attach_input.clear();
            }
        }
        _ => {
            edit_line(&mut app.attach_input, key);
        }
    }
}

async fn handle_normal_mode(app: &mut App, key: KeyEvent) {
    match key.code {
        // Quit
        KeyCode::Char('q') => app.should_quit = true,

        // Screen switching
        KeyCode::Tab => app.toggle_screen(),

        KeyCode::Char('i') | KeyCode::Enter => {
            app.input_mode = InputMode::Editing;
        }

        // Forget the API key
        KeyCode::Char('R') => app.reset_api_key(),

        _ => match app.screen {
            Screen::Chat => handle_chat_normal(app, key),
            Screen::Generate => handle_generate_normal(app, key).await,
            Screen::Setup => {}
        },
    }
}

fn handle_chat_normal(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Char('o') => app.open_attach_prompt(),
        KeyCode::Char('x') => app.clear_attachment(),

        KeyCode::Char('j') | KeyCode::Down => app.scroll_chat_down(1),
        KeyCode::Char('k') | KeyCode::Up => app.scroll_chat_up(1),
        KeyCode::Char('d') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            let half = (app.chat_height / 2).max(1);
            app.scroll_chat_down(half);
        }
        KeyCode::Char('u') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            let half = (app.chat_height / 2).max(1);
            app.scroll_chat_up(half);
        }
        KeyCode::Char('g') => app.chat_scroll = 0,
        KeyCode::Char('G') => app.scroll_chat_to_bottom(),
        _ => {}
    }
}

async fn handle_generate_normal(app: &mut App, key: KeyEvent) {
    if key.code == KeyCode::Char('s') {
        app.save_generated_image().await;
    }
}

fn handle_editing_mode(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Esc => {
            app.input_mode = InputMode::Normal;
        }
        KeyCode::Tab => app.toggle_screen(),
        KeyCode::Enter => match app.screen {
            Screen::Chat => app.submit_chat(),
            Screen::Generate => app.submit_generation(),
            Screen::Setup => {}
        },
        KeyCode::Char('o') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            if app.screen == Screen::Chat {
                app.open_attach_prompt();
            }
        }
        KeyCode::Char('x') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            if app.screen == Screen::Chat {
                app.clear_attachment();
            }
        }
        _ => {
            let locked = app.input_locked();
            let input = match app.screen {
                Screen::Chat => &mut app.chat_input,
                Screen::Generate => &mut app.prompt_input,
                Screen::Setup => return,
            };
            // Each screen's input is frozen while its own request is in flight
            if !locked {
                edit_line(input, key);
            }
        }
    }
}

/// Shared single-line editing keys. Returns true if the key was consumed.
fn edit_line(input: &mut LineInput, key: KeyEvent) -> bool {
    match key.code {
        KeyCode::Backspace => input.backspace(),
        KeyCode::Delete => input.delete(),
        KeyCode::Left => input.left(),
        KeyCode::Right => input.right(),
        KeyCode::Home => input.home(),
        KeyCode::End => input.end(),
        KeyCode::Char(c) if !key.modifiers.contains(KeyModifiers::CONTROL) => input.insert(c),
        _ => return false,
    }
    true
}

async fn handle_paste(app: &mut App, text: String) {
    if app.screen == Screen::Setup {
        app.key_input.insert_str(text.trim());
        return;
    }

    if app.show_attach_prompt {
        app.attach_input.insert_str(&text);
        return;
    }

    // A file dropped onto the terminal is pasted as its path
    if app.screen == Screen::Chat {
        if let Some(path) = pasted_file(&text) {
            app.stage_attachment(&path.to_string_lossy(), AttachmentSource::Drop).await;
            return;
        }
    }

    if app.input_mode == InputMode::Editing && !app.input_locked() {
        match app.screen {
            Screen::Chat => app.chat_input.insert_str(&text),
            Screen::Generate => app.prompt_input.insert_str(&text),
            Screen::Setup => {}
        }
    }
}

/// Check if a point is within a rectangle
fn point_in_rect(x: u16, y: u16, rect: Rect) -> bool {
    x >= rect.x && x < rect.x + rect.width && y >= rect.y && y < rect.y + rect.height
}

fn handle_mouse(app: &mut App, mouse: MouseEvent) {
    if app.screen != Screen::Chat {
        return;
    }
    let in_chat = app
        .chat_area
        .map(|r| point_in_rect(mouse.column, mouse.row, r))
        .unwrap_or(false);
    if !in_chat {
        return;
    }

    match mouse.kind {
        MouseEventKind::ScrollDown => app.scroll_chat_down(3),
        MouseEventKind::ScrollUp => app.scroll_chat_up(3),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::testing::{app_with, Echo, Stalled};
    use crossterm::event::{KeyEventKind, KeyEventState};
    use std::sync::Arc;

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent {
            code,
            modifiers: KeyModifiers::NONE,
            kind: KeyEventKind::Press,
            state: KeyEventState::NONE,
        }
    }

    #[test]
    fn test_edit_line_keys() {
        let mut input = LineInput::default();
        assert!(edit_line(&mut input, key(KeyCode::Char('a'))));
        assert!(edit_line(&mut input, key(KeyCode::Char('b'))));
        assert!(edit_line(&mut input, key(KeyCode::Left)));
        assert!(edit_line(&mut input, key(KeyCode::Backspace)));
        assert_eq!(input.text(), "b");
        assert!(!edit_line(&mut input, key(KeyCode::Enter)));
    }

    #[test]
    fn test_edit_line_ignores_control_chords() {
        let mut input = LineInput::default();
        let chord = KeyEvent {
            modifiers: KeyModifiers::CONTROL,
            ..key(KeyCode::Char('o'))
        };
        assert!(!edit_line(&mut input, chord));
        assert_eq!(input.text(), "");
    }

    #[test]
    fn test_point_in_rect() {
        let rect = Rect::new(2, 3, 10, 5);
        assert!(point_in_rect(2, 3, rect));
        assert!(point_in_rect(11, 7, rect));
        assert!(!point_in_rect(12, 7, rect));
        assert!(!point_in_rect(5, 8, rect));
    }

    #[tokio::test]
    async fn test_chat_typing_during_generation() {
        let mut app = app_with(Arc::new(Echo), Arc::new(Stalled));
        app.screen = Screen::Generate;
        app.prompt_input.insert_str("a red cube");
        app.submit_generation();
        assert!(app.generation_busy());

        app.toggle_screen();
        assert_eq!(app.screen, Screen::Chat);
        handle_event(&mut app, AppEvent::Key(key(KeyCode::Char('h')))).await.unwrap();
        handle_event(&mut app, AppEvent::Paste("hello".to_string())).await.unwrap();

        assert!(!app.chat_busy());
        assert_eq!(app.chat_input.text(), "hhello");
    }

    #[tokio::test]
    async fn test_prompt_frozen_while_generating() {
        let mut app = app_with(Arc::new(Echo), Arc::new(Stalled));
        app.screen = Screen::Generate;
        app.prompt_input.insert_str("a red cube");
        app.submit_generation();

        handle_event(&mut app, AppEvent::Key(key(KeyCode::Char('x')))).await.unwrap();
        handle_event(&mut app, AppEvent::Paste("!".to_string())).await.unwrap();
        assert_eq!(app.prompt_input.text(), "a red cube");
    }
}
