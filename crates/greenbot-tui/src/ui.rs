use ratatui::{
    Frame,
    layout::{Alignment, Constraint, Layout, Rect},
    style::{Color, Modifier, Style, Stylize},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Clear, Paragraph, Wrap},
};
use greenbot_core::{GenerationStatus, Role};
use crate::app::{describe_image, format_size, role_label, App, InputMode, LineInput, Screen};

/// Parse a line of text and convert **bold** markdown to styled spans
fn parse_markdown_line(text: &str) -> Line<'static> {
    let mut spans: Vec<Span<'static>> = Vec::new();
    let mut chars = text.chars().peekable();
    let mut current_text = String::new();

    while let Some(c) = chars.next() {
        if c == '*' && chars.peek() == Some(&'*') {
            // Consume the second *
            chars.next();

            // Push any accumulated plain text
            if !current_text.is_empty() {
                spans.push(Span::raw(std::mem::take(&mut current_text)));
            }

            // Find closing **
            let mut bold_text = String::new();
            let mut found_close = false;

            while let Some(c) = chars.next() {
                if c == '*' && chars.peek() == Some(&'*') {
                    chars.next();
                    found_close = true;
                    break;
                }
                bold_text.push(c);
            }

            if found_close && !bold_text.is_empty() {
                spans.push(Span::styled(
                    bold_text,
                    Style::default().add_modifier(Modifier::BOLD),
                ));
            } else {
                // No closing **, treat as literal
                current_text.push_str("**");
                current_text.push_str(&bold_text);
            }
        } else {
            current_text.push(c);
        }
    }

    if !current_text.is_empty() {
        spans.push(Span::raw(current_text));
    }

    if spans.is_empty() {
        Line::default()
    } else {
        Line::from(spans)
    }
}

/// Mask a key, showing only the last four characters
fn mask_key(key: &str) -> String {
    let char_count = key.chars().count();
    if char_count <= 4 {
        return "*".repeat(char_count);
    }
    let masked_len = char_count - 4;
    let last_four: String = key.chars().skip(masked_len).collect();
    format!("{}...{}", "*".repeat(masked_len.min(20)), last_four)
}

pub fn render(app: &mut App, frame: &mut Frame) {
    let area = frame.area();

    // Main layout: header, body, footer
    let [header_area, body_area, footer_area] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Min(0),
        Constraint::Length(1),
    ])
    .areas(area);

    render_header(app, frame, header_area);

    match app.screen {
        Screen::Setup => {}
        Screen::Chat => render_chat_screen(app, frame, body_area),
        Screen::Generate => render_generate_screen(app, frame, body_area),
    }

    render_footer(app, frame, footer_area);

    // Popups
    if app.screen == Screen::Setup {
        render_api_key_input(app, frame, area);
    } else if app.show_attach_prompt {
        render_attach_prompt(app, frame, area);
    }
}

fn render_header(app: &App, frame: &mut Frame, area: Rect) {
    let tab_style = |screen: Screen| {
        if app.screen == screen {
            Style::default().fg(Color::Black).bg(Color::Green).bold()
        } else {
            Style::default().fg(Color::White)
        }
    };

    let mut spans = vec![
        Span::styled(" GreenBot ", Style::default().fg(Color::Green).bold()),
        Span::styled("by GreenGamesStudio ", Style::default().fg(Color::Gray)),
    ];
    if app.screen != Screen::Setup {
        spans.extend(vec![
            Span::styled(" Chat ", tab_style(Screen::Chat)),
            Span::raw(" "),
            Span::styled(" Image ", tab_style(Screen::Generate)),
            Span::raw(" "),
        ]);
    }
    if let Some(source) = app.credential_source {
        spans.push(Span::styled(
            format!("[key: {}] ", source.as_str()),
            Style::default().fg(Color::Gray),
        ));
    }
    spans.push(Span::styled(
        format!("v{}", env!("CARGO_PKG_VERSION")),
        Style::default().fg(Color::Gray),
    ));

    let header = Paragraph::new(Line::from(spans)).style(Style::default().bg(Color::DarkGray));
    frame.render_widget(header, area);
}

fn render_footer(app: &App, frame: &mut Frame, area: Rect) {
    let mode_style = match app.input_mode {
        InputMode::Normal => Style::default().bg(Color::Blue).fg(Color::White),
        InputMode::Editing => Style::default().bg(Color::Yellow).fg(Color::Black),
    };

    let mode_text = match app.screen {
        Screen::Setup => " SETUP ",
        Screen::Chat => " CHAT ",
        Screen::Generate => " IMAGE ",
    };

    // Key style: dark background with bright text for visibility on both light/dark terminals
    let key_style = Style::default().bg(Color::DarkGray).fg(Color::White);
    let label_style = Style::default().bg(Color::Black).fg(Color::White);

    let pairs: Vec<(&str, &str)> = if app.screen == Screen::Setup {
        vec![("Enter", "save key"), ("Esc", "quit")]
    } else if app.show_attach_prompt {
        vec![("Enter", "attach"), ("Esc", "cancel")]
    } else {
        match (app.screen, app.input_mode) {
            (Screen::Chat, InputMode::Editing) => vec![
                ("Enter", "send"),
                ("^O", "attach"),
                ("^X", "remove image"),
                ("Tab", "image"),
                ("Esc", "normal"),
            ],
            (Screen::Chat, InputMode::Normal) => vec![
                ("i", "type"),
                ("j/k", "scroll"),
                ("o", "attach"),
                ("x", "remove image"),
                ("Tab", "image"),
                ("R", "reset key"),
                ("q", "quit"),
            ],
            (Screen::Generate, InputMode::Editing) => vec![
                ("Enter", "generate"),
                ("Tab", "chat"),
                ("Esc", "normal"),
            ],
            (Screen::Generate, InputMode::Normal) => vec![
                ("i", "type"),
                ("s", "save image"),
                ("Tab", "chat"),
                ("R", "reset key"),
                ("q", "quit"),
            ],
            (Screen::Setup, _) => Vec::new(),
        }
    };

    let mut spans = vec![Span::styled(mode_text, mode_style), Span::raw(" ")];
    for (key, label) in pairs {
        spans.push(Span::styled(format!(" {} ", key), key_style));
        spans.push(Span::styled(format!(" {} ", label), label_style));
    }

    if let Some(status) = &app.status {
        let color = if status.is_error { Color::Red } else { Color::Green };
        spans.push(Span::raw("  "));
        spans.push(Span::styled(status.text.clone(), Style::default().fg(color)));
    }

    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}

fn render_chat_screen(app: &mut App, frame: &mut Frame, area: Rect) {
    let staged_height = if app
        .assistant
        .as_ref()
        .and_then(|a| a.conversation.staged_image())
        .is_some()
    {
        1
    } else {
        0
    };

    let [chat_area, staged_area, input_area] = Layout::vertical([
        Constraint::Min(0),
        Constraint::Length(staged_height),
        Constraint::Length(3),
    ])
    .areas(area);

    // Store area for mouse hit-testing and dimensions for scroll calculations
    app.chat_area = Some(chat_area);
    app.chat_height = chat_area.height.saturating_sub(2);
    app.chat_width = chat_area.width.saturating_sub(2);

    let Some(assistant) = app.assistant.as_ref() else {
        return;
    };
    let conversation = &assistant.conversation;
    let loading = conversation.is_busy();

    let mut lines: Vec<Line> = Vec::new();
    for msg in conversation.messages() {
        let label_style = match msg.role {
            Role::User => Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
            Role::Model => Style::default().fg(Color::Green).add_modifier(Modifier::BOLD),
            Role::Error => Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
        };
        lines.push(Line::from(Span::styled(role_label(msg.role), label_style)));

        if let Some(image) = &msg.image {
            lines.push(Line::from(Span::styled(
                format!("[image: {}]", describe_image(image)),
                Style::default().fg(Color::Magenta),
            )));
        }

        for line in msg.text.lines() {
            match msg.role {
                Role::Model => lines.push(parse_markdown_line(line)),
                Role::Error => lines.push(Line::from(Span::styled(
                    line.to_string(),
                    Style::default().fg(Color::Red),
                ))),
                Role::User => lines.push(Line::from(line.to_string())),
            }
        }
        lines.push(Line::default());
    }

    if loading {
        lines.push(Line::from(Span::styled(
            role_label(Role::Model),
            Style::default().fg(Color::Green).add_modifier(Modifier::BOLD),
        )));
        // Animated ellipsis: cycles through ".", "..", "..."
        let dots = ".".repeat((app.animation_frame as usize) + 1);
        lines.push(Line::from(Span::styled(
            format!("Thinking{}", dots),
            Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
        )));
    }

    let chat_block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Green))
        .title(" GreenBot ");

    let chat = Paragraph::new(Text::from(lines))
        .block(chat_block)
        .wrap(Wrap { trim: true })
        .scroll((app.chat_scroll, 0));
    frame.render_widget(chat, chat_area);

    if let Some(staged) = conversation.staged_image() {
        let name = staged.file_name().unwrap_or("image");
        let indicator = Line::from(vec![
            Span::styled(" Attached: ", Style::default().fg(Color::Magenta).bold()),
            Span::raw(format!(
                "{} ({}, {}) ",
                name,
                staged.mime_type(),
                format_size(staged.size())
            )),
            Span::styled("x to remove", Style::default().fg(Color::DarkGray)),
        ]);
        frame.render_widget(Paragraph::new(indicator), staged_area);
    }

    let can_send = conversation.can_submit(app.chat_input.text());
    let title = if loading {
        " Waiting for GreenBot... "
    } else if can_send {
        " Message (Enter to send) "
    } else {
        " Message "
    };
    render_line_input(
        frame,
        input_area,
        &app.chat_input,
        title,
        app.input_mode == InputMode::Editing && !app.show_attach_prompt,
        loading,
    );
}

fn render_generate_screen(app: &mut App, frame: &mut Frame, area: Rect) {
    let [input_area, result_area] = Layout::vertical([
        Constraint::Length(3),
        Constraint::Min(0),
    ])
    .areas(area);

    let Some(assistant) = app.assistant.as_ref() else {
        return;
    };
    let session = assistant.generation.session();
    let generating = session.is_generating();

    let title = if generating {
        " Generating... "
    } else {
        " Describe an image (Enter to generate) "
    };
    render_line_input(
        frame,
        input_area,
        &app.prompt_input,
        title,
        app.input_mode == InputMode::Editing,
        generating,
    );

    let result_block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Green))
        .title(" Image Generation ");

    let body: Text = match session.status() {
        GenerationStatus::Idle => Text::from(Span::styled(
            "Your generated image will appear here.",
            Style::default().fg(Color::DarkGray),
        )),
        GenerationStatus::Generating => {
            let dots = ".".repeat((app.animation_frame as usize) + 1);
            Text::from(Span::styled(
                format!("Creating your masterpiece{}", dots),
                Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
            ))
        }
        GenerationStatus::Failed(message) => Text::from(Span::styled(
            message.clone(),
            Style::default().fg(Color::Red),
        )),
        GenerationStatus::Succeeded(image) => Text::from(vec![
            Line::from(Span::styled(
                "Image ready",
                Style::default().fg(Color::Green).bold(),
            )),
            Line::default(),
            Line::from(format!("Prompt: {}", session.prompt())),
            Line::from(format!(
                "{} ({}, {})",
                image.file_name(),
                image.mime_type(),
                format_size(image.bytes().len())
            )),
            Line::default(),
            Line::from(Span::styled(
                format!("Press s to save to {}", app.config.download_dir().display()),
                Style::default().fg(Color::DarkGray),
            )),
        ]),
    };

    let result = Paragraph::new(body)
        .block(result_block)
        .alignment(Alignment::Center)
        .wrap(Wrap { trim: true });
    frame.render_widget(result, result_area);
}

fn render_line_input(
    frame: &mut Frame,
    area: Rect,
    input: &LineInput,
    title: &str,
    editing: bool,
    disabled: bool,
) {
    let border_color = if disabled {
        Color::DarkGray
    } else if editing {
        Color::Yellow
    } else {
        Color::Gray
    };
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color))
        .title(title.to_string());

    // Inner width = total width - 2 (for borders)
    let inner_width = area.width.saturating_sub(2) as usize;
    let (visible_text, cursor_x) = input.window(inner_width);

    let text_color = if disabled { Color::DarkGray } else { Color::Cyan };
    let paragraph = Paragraph::new(visible_text)
        .style(Style::default().fg(text_color))
        .block(block);
    frame.render_widget(paragraph, area);

    if editing && !disabled {
        frame.set_cursor_position((area.x + cursor_x as u16 + 1, area.y + 1));
    }
}

fn render_api_key_input(app: &App, frame: &mut Frame, area: Rect) {
    let popup_area = popup_rect(area, 64, 9);

    // Clear the area behind the popup
    frame.render_widget(Clear, popup_area);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Green))
        .title(" Welcome to GreenBot ");

    let inner = block.inner(popup_area);
    frame.render_widget(block, popup_area);

    let instructions = Paragraph::new(
        "A Gemini API key is required. Paste it below and press Enter to save, Esc to quit.",
    )
    .style(Style::default().fg(Color::Gray))
    .wrap(Wrap { trim: true });
    frame.render_widget(instructions, popup_row(inner, 0, 2));

    // Input field
    let input_area = popup_row(inner, 3, 1);
    let masked = mask_key(app.key_input.text());
    let cursor_x = masked_cursor_column(&masked, input_area.width);
    frame.render_widget(
        Paragraph::new(masked).style(Style::default().fg(Color::Cyan)),
        input_area,
    );
    if input_area.height > 0 {
        frame.set_cursor_position((input_area.x + cursor_x, input_area.y));
    }

    // Status line
    let (status_text, status_color) = match &app.status {
        Some(status) if status.is_error => (status.text.clone(), Color::Red),
        _ => (
            format!("{} characters", app.key_input.text().chars().count()),
            Color::DarkGray,
        ),
    };
    let status = Paragraph::new(status_text).style(Style::default().fg(status_color));
    frame.render_widget(status, popup_row(inner, 5, 1));
}

fn render_attach_prompt(app: &App, frame: &mut Frame, area: Rect) {
    let popup_area = popup_rect(area, 70, 6);
    frame.render_widget(Clear, popup_area);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Magenta))
        .title(" Attach Image ");

    let inner = block.inner(popup_area);
    frame.render_widget(block, popup_area);

    let instructions = Paragraph::new("Path to an image file (you can also drop a file on the terminal)")
        .style(Style::default().fg(Color::Gray));
    frame.render_widget(instructions, popup_row(inner, 0, 1));

    let input_area = popup_row(inner, 2, 1);
    let (visible_text, cursor_x) = app.attach_input.window(input_area.width as usize);
    frame.render_widget(
        Paragraph::new(visible_text).style(Style::default().fg(Color::Cyan)),
        input_area,
    );
    if input_area.height > 0 {
        frame.set_cursor_position((input_area.x + cursor_x as u16, input_area.y));
    }
}

/// Centered popup, clamped to the frame
fn popup_rect(area: Rect, width: u16, height: u16) -> Rect {
    let width = width.min(area.width.saturating_sub(4));
    let height = height.min(area.height.saturating_sub(4));
    Rect::new(
        area.x + (area.width - width) / 2,
        area.y + (area.height - height) / 2,
        width,
        height,
    )
}

/// A band of rows inside a popup; empty when the popup is too short
fn popup_row(inner: Rect, offset: u16, height: u16) -> Rect {
    Rect::new(inner.x, inner.y.saturating_add(offset), inner.width, height).intersection(inner)
}

/// The masked text hides the real length, so the cursor sits after it
fn masked_cursor_column(masked: &str, width: u16) -> u16 {
    let len = masked.chars().count() as u16;
    len.min(width.saturating_sub(1))
}
