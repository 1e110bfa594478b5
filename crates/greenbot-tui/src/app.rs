use std::path::PathBuf;
use ratatui::layout::Rect;
use tokio::sync::watch;
use greenbot_core::attachment::{parse_data_uri, stage_from_path};
use greenbot_core::{
    resolve_credential, Assistant, AttachmentSource, Config, CredentialSource, CredentialStore,
    Message, Role, SubmitOutcome,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Screen {
    /// Blocking API key prompt; nothing else is reachable without a key
    Setup,
    Chat,
    Generate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    Editing,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusLine {
    pub text: String,
    pub is_error: bool,
}

/// Convert a character index to a byte index for UTF-8 safe string operations
fn char_to_byte_index(s: &str, char_idx: usize) -> usize {
    s.char_indices()
        .nth(char_idx)
        .map(|(i, _)| i)
        .unwrap_or(s.len())
}

/// Single-line text field with a character cursor
#[derive(Debug, Clone, Default)]
pub struct LineInput {
    text: String,
    cursor: usize,
}

impl LineInput {
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }

    pub fn clear(&mut self) {
        self.text.clear();
        self.cursor = 0;
    }

    pub fn insert(&mut self, c: char) {
        let byte_pos = char_to_byte_index(&self.text, self.cursor);
        self.text.insert(byte_pos, c);
        self.cursor += 1;
    }

    /// Pasted text; newlines would break a single-line field
    pub fn insert_str(&mut self, s: &str) {
        for c in s.chars().filter(|c| !c.is_control()) {
            self.insert(c);
        }
    }

    pub fn backspace(&mut self) {
        if self.cursor > 0 {
            self.cursor -= 1;
            let byte_pos = char_to_byte_index(&self.text, self.cursor);
            self.text.remove(byte_pos);
        }
    }

    pub fn delete(&mut self) {
        if self.cursor < self.text.chars().count() {
            let byte_pos = char_to_byte_index(&self.text, self.cursor);
            self.text.remove(byte_pos);
        }
    }

    pub fn left(&mut self) {
        self.cursor = self.cursor.saturating_sub(1);
    }

    pub fn right(&mut self) {
        self.cursor = (self.cursor + 1).min(self.text.chars().count());
    }

    pub fn home(&mut self) {
        self.cursor = 0;
    }

    pub fn end(&mut self) {
        self.cursor = self.text.chars().count();
    }

    /// Visible slice for a field `width` chars wide, and the cursor column in it
    pub fn window(&self, width: usize) -> (String, usize) {
        let scroll_offset = if width == 0 || self.cursor < width {
            0
        } else {
            self.cursor - width + 1
        };
        let visible: String = self.text.chars().skip(scroll_offset).take(width).collect();
        (visible, self.cursor - scroll_offset)
    }
}

pub struct App {
    // Core state
    pub should_quit: bool,
    pub screen: Screen,
    pub input_mode: InputMode,

    // Setup
    pub config: Config,
    pub store: Box<dyn CredentialStore>,
    pub credential_source: Option<CredentialSource>,
    pub key_input: LineInput,

    // Orchestrators (present only once a key is available)
    pub assistant: Option<Assistant>,
    pub changes: Option<watch::Receiver<u64>>,

    // Chat screen
    pub chat_input: LineInput,
    pub chat_scroll: u16,
    pub chat_height: u16, // Height of chat area for scroll calculations
    pub chat_width: u16,  // Width of chat area for wrap calculations
    pub chat_area: Option<Rect>,

    // Attach prompt (the terminal's file picker)
    pub show_attach_prompt: bool,
    pub attach_input: LineInput,

    // Generate screen
    pub prompt_input: LineInput,

    pub status: Option<StatusLine>,

    // Animation state
    pub animation_frame: u8, // 0-2 for ellipsis animation
}

impl App {
    pub fn new(config: Config, store: Box<dyn CredentialStore>) -> anyhow::Result<Self> {
        let mut app = Self {
            should_quit: false,
            screen: Screen::Setup,
            input_mode: InputMode::Editing,

            config,
            store,
            credential_source: None,
            key_input: LineInput::default(),

            assistant: None,
            changes: None,

            chat_input: LineInput::default(),
            chat_scroll: 0,
            chat_height: 0,
            chat_width: 0,
            chat_area: None,

            show_attach_prompt: false,
            attach_input: LineInput::default(),

            prompt_input: LineInput::default(),

            status: None,
            animation_frame: 0,
        };

        if let Some((key, source)) = resolve_credential(app.store.as_ref())? {
            app.connect(&key, source);
        }
        Ok(app)
    }

    fn connect(&mut self, key: &str, source: CredentialSource) {
        match Assistant::connect(Some(key), &self.config) {
            Ok(assistant) => {
                self.changes = Some(assistant.subscribe());
                self.assistant = Some(assistant);
                self.credential_source = Some(source);
                self.screen = Screen::Chat;
                self.input_mode = InputMode::Editing;
                self.chat_scroll = 0;
            }
            Err(e) => {
                tracing::warn!(error = %e, "could not connect");
                self.set_error(e.to_string());
            }
        }
    }

    /// Persist the key typed on the setup screen and start chatting
    pub fn save_api_key(&mut self) {
        if self.key_input.is_blank() {
            return;
        }
        let key = self.key_input.text().trim().to_string();
        if let Err(e) = self.store.set(&key) {
            tracing::error!(error = %e, "failed to store API key");
            self.set_error(format!("Could not save API key: {}", e));
            return;
        }
        self.key_input.clear();
        self.status = None;
        self.connect(&key, CredentialSource::Store);
    }

    /// Forget the stored key and go back to the setup prompt
    pub fn reset_api_key(&mut self) {
        if let Err(e) = self.store.clear() {
            tracing::error!(error = %e, "failed to clear API key");
            self.set_error(format!("Could not clear API key: {}", e));
            return;
        }
        tracing::info!("API key reset");
        if self.credential_source == Some(CredentialSource::Env) {
            self.set_error("Key is set in the environment; unset GEMINI_API_KEY to change it");
            return;
        }
        self.assistant = None;
        self.changes = None;
        self.credential_source = None;
        self.show_attach_prompt = false;
        self.attach_input.clear();
        self.chat_input.clear();
        self.prompt_input.clear();
        self.screen = Screen::Setup;
        self.input_mode = InputMode::Editing;
    }

    /// Either request in flight; drives the animation
    pub fn is_busy(&self) -> bool {
        self.chat_busy() || self.generation_busy()
    }

    pub fn chat_busy(&self) -> bool {
        self.assistant
            .as_ref()
            .map(|a| a.conversation.is_busy())
            .unwrap_or(false)
    }

    pub fn generation_busy(&self) -> bool {
        self.assistant
            .as_ref()
            .map(|a| a.generation.is_busy())
            .unwrap_or(false)
    }

    /// Whether the input of the current screen is frozen by its own request
    pub fn input_locked(&self) -> bool {
        match self.screen {
            Screen::Setup => false,
            Screen::Chat => self.chat_busy(),
            Screen::Generate => self.generation_busy(),
        }
    }

    pub fn toggle_screen(&mut self) {
        self.screen = match self.screen {
            Screen::Setup => Screen::Setup,
            Screen::Chat => Screen::Generate,
            Screen::Generate => Screen::Chat,
        };
        self.show_attach_prompt = false;
    }

    pub fn submit_chat(&mut self) {
        let Some(assistant) = self.assistant.as_mut() else {
            return;
        };
        if assistant.conversation.submit_message(self.chat_input.text()) == SubmitOutcome::Accepted {
            self.chat_input.clear();
            self.scroll_chat_to_bottom();
        }
    }

    pub fn submit_generation(&mut self) {
        let Some(assistant) = self.assistant.as_mut() else {
            return;
        };
        if assistant.generation.submit_generation_prompt(self.prompt_input.text()).is_accepted() {
            self.status = None;
        }
    }

    pub fn open_attach_prompt(&mut self) {
        self.show_attach_prompt = true;
        self.attach_input.clear();
    }

    pub fn close_attach_prompt(&mut self) {
        self.show_attach_prompt = false;
        self.attach_input.clear();
    }

    pub async fn stage_attachment(&mut self, raw_path: &str, source: AttachmentSource) {
        let Some(assistant) = self.assistant.as_mut() else {
            return;
        };
        let path = expand_path(raw_path);
        match stage_from_path(&path, source).await {
            Ok(image) => {
                let name = image.file_name().unwrap_or("image").to_string();
                assistant.conversation.stage_image(image);
                self.set_info(format!("Attached {}", name));
            }
            Err(e) => {
                tracing::warn!(error = %e, %source, "attachment rejected");
                self.set_error(e.to_string());
            }
        }
    }

    /// Drop the staged image and reset the picker so the same file can be chosen again
    pub fn clear_attachment(&mut self) {
        if let Some(assistant) = self.assistant.as_mut() {
            assistant.conversation.clear_staged_image();
        }
        self.attach_input.clear();
    }

    pub async fn save_generated_image(&mut self) {
        let Some(image) = self
            .assistant
            .as_ref()
            .and_then(|a| a.generation.session().result())
            .cloned()
        else {
            return;
        };
        match image.save_to(&self.config.download_dir()).await {
            Ok(path) => self.set_info(format!("Saved {}", path.display())),
            Err(e) => {
                tracing::error!(error = %e, "failed to save generated image");
                self.set_error(format!("Could not save image: {}", e));
            }
        }
    }

    /// Fold finished service calls into state
    pub async fn poll_tasks(&mut self) {
        let Some(assistant) = self.assistant.as_mut() else {
            return;
        };
        let chat_changed = assistant.conversation.poll().await;
        assistant.generation.poll().await;
        if chat_changed {
            self.scroll_chat_to_bottom();
        }
    }

    /// Tick animation frame (called by Tick event)
    pub fn tick_animation(&mut self) {
        if self.is_busy() {
            self.animation_frame = (self.animation_frame + 1) % 3;
        }
    }

    pub fn scroll_chat_up(&mut self, lines: u16) {
        self.chat_scroll = self.chat_scroll.saturating_sub(lines);
    }

    pub fn scroll_chat_down(&mut self, lines: u16) {
        let max = self.max_chat_scroll();
        self.chat_scroll = (self.chat_scroll + lines).min(max);
    }

    /// Scroll chat to bottom so the latest reply or "Thinking..." is visible
    pub fn scroll_chat_to_bottom(&mut self) {
        self.chat_scroll = self.max_chat_scroll();
    }

    fn max_chat_scroll(&self) -> u16 {
        let Some(assistant) = self.assistant.as_ref() else {
            return 0;
        };
        // Use actual chat width for wrap calculation, default to 50 if not set
        let wrap_width = if self.chat_width > 0 {
            self.chat_width as usize
        } else {
            50
        };
        let visible_height = if self.chat_height > 0 {
            self.chat_height
        } else {
            20
        };
        let total_lines = chat_line_count(
            assistant.conversation.messages(),
            assistant.conversation.is_busy(),
            wrap_width,
        );
        total_lines.saturating_sub(visible_height)
    }

    pub fn set_info(&mut self, text: impl Into<String>) {
        self.status = Some(StatusLine {
            text: text.into(),
            is_error: false,
        });
    }

    pub fn set_error(&mut self, text: impl Into<String>) {
        self.status = Some(StatusLine {
            text: text.into(),
            is_error: true,
        });
    }
}

/// Rendered height of the chat log; must match `ui::render_chat_screen`
pub fn chat_line_count(messages: &[Message], loading: bool, wrap_width: usize) -> u16 {
    let wrap_width = wrap_width.max(1);
    let mut total_lines: u16 = 0;

    for msg in messages {
        total_lines += 1; // Role line
        if msg.image.is_some() {
            total_lines += 1;
        }
        // Use character count, not byte length, for proper UTF-8 handling
        for line in msg.text.lines() {
            let char_count = line.chars().count();
            if char_count == 0 {
                total_lines += 1; // Empty line still takes one line
            } else {
                total_lines += ((char_count / wrap_width) + 1) as u16;
            }
        }
        total_lines += 1; // Blank line after message
    }

    if loading {
        total_lines += 2; // Role line + "Thinking..."
    }
    total_lines
}

pub fn role_label(role: Role) -> &'static str {
    match role {
        Role::User => "You:",
        Role::Model => "GreenBot:",
        Role::Error => "Error:",
    }
}

/// One-line description of an embedded image, e.g. `image/png, 12.3 KB`
pub fn describe_image(data_uri: &str) -> String {
    match parse_data_uri(data_uri) {
        Some((mime, bytes)) => format!("{}, {}", mime, format_size(bytes.len())),
        None => "image".to_string(),
    }
}

pub fn format_size(bytes: usize) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}

/// Accept `~/` paths and the quoting terminals add around dropped files
pub fn expand_path(raw: &str) -> PathBuf {
    let trimmed = raw.trim().trim_matches(|c| c == '\'' || c == '"');
    let unescaped = trimmed.replace("\\ ", " ");
    if let Some(rest) = unescaped.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(unescaped)
}

/// A paste that names an existing file is treated as a drop
pub fn pasted_file(text: &str) -> Option<PathBuf> {
    if text.contains('\n') {
        return None;
    }
    let path = expand_path(text);
    path.is_file().then_some(path)
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Arc;
    use async_trait::async_trait;
    use greenbot_core::attachment::ImagePayload;
    use greenbot_core::{
        Assistant, CompletionService, Config, GeneratedImage, ImageGenerationService,
        MemoryCredentialStore, ServiceError,
    };
    use super::{App, InputMode, Screen};

    pub(crate) struct Echo;

    #[async_trait]
    impl CompletionService for Echo {
        async fn complete(&self, prompt: &str, _: &str) -> Result<String, ServiceError> {
            Ok(format!("echo: {prompt}"))
        }

        async fn complete_with_image(
            &self,
            prompt: &str,
            _: &ImagePayload,
            _: &str,
        ) -> Result<String, ServiceError> {
            Ok(format!("echo+image: {prompt}"))
        }
    }

    /// Generation that never finishes
    pub(crate) struct Stalled;

    #[async_trait]
    impl ImageGenerationService for Stalled {
        async fn generate(&self, _: &str) -> Result<GeneratedImage, ServiceError> {
            std::future::pending().await
        }
    }

    /// A connected app on the chat screen, in editing mode
    pub(crate) fn app_with(
        completion: Arc<dyn CompletionService>,
        images: Arc<dyn ImageGenerationService>,
    ) -> App {
        let mut app = App::new(Config::new(), Box::new(MemoryCredentialStore::new())).unwrap();
        let assistant = Assistant::with_services(completion, images);
        app.changes = Some(assistant.subscribe());
        app.assistant = Some(assistant);
        app.credential_source = None;
        app.screen = Screen::Chat;
        app.input_mode = InputMode::Editing;
        app
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::testing::{app_with, Echo, Stalled};
    use std::sync::Arc;

    #[test]
    fn test_line_input_utf8_editing() {
        let mut input = LineInput::default();
        for c in "héllo".chars() {
            input.insert(c);
        }
        input.left();
        input.left();
        input.backspace();
        assert_eq!(input.text(), "hélo");
        assert_eq!(input.cursor(), 2);

        input.home();
        input.delete();
        assert_eq!(input.text(), "élo");
        input.end();
        assert_eq!(input.cursor(), 3);
        input.right();
        assert_eq!(input.cursor(), 3);
    }

    #[test]
    fn test_line_input_paste_strips_newlines() {
        let mut input = LineInput::default();
        input.insert_str("a red\ncube\t");
        assert_eq!(input.text(), "a redcube");
    }

    #[test]
    fn test_line_input_window_follows_cursor() {
        let mut input = LineInput::default();
        input.insert_str("abcdefghij");
        let (visible, cursor_x) = input.window(4);
        assert_eq!(visible, "hij");
        assert_eq!(cursor_x, 3);

        input.home();
        let (visible, cursor_x) = input.window(4);
        assert_eq!(visible, "abcd");
        assert_eq!(cursor_x, 0);
    }

    #[test]
    fn test_blank_input() {
        let mut input = LineInput::default();
        input.insert_str("   ");
        assert!(input.is_blank());
    }

    #[test]
    fn test_chat_line_count() {
        let messages = vec![
            Message::model("hello"),
            Message::user("", Some("data:image/png;base64,AAAA".to_string())),
        ];
        // model: role + 1 + blank; user: role + image + blank (no text lines)
        assert_eq!(chat_line_count(&messages, false, 40), 6);
        assert_eq!(chat_line_count(&messages, true, 40), 8);

        let long = vec![Message::model("x".repeat(25))];
        assert_eq!(chat_line_count(&long, false, 10), 5);
    }

    #[test]
    fn test_describe_image() {
        assert_eq!(describe_image("data:image/png;base64,AAAA"), "image/png, 3 B");
        assert_eq!(describe_image("garbage"), "image");
    }

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(2048), "2.0 KB");
        assert_eq!(format_size(3 * 1024 * 1024), "3.0 MB");
    }

    #[test]
    fn test_expand_path_strips_quotes() {
        assert_eq!(expand_path("'/tmp/my cat.png' "), PathBuf::from("/tmp/my cat.png"));
        assert_eq!(expand_path("/tmp/my\\ cat.png"), PathBuf::from("/tmp/my cat.png"));
    }

    #[test]
    fn test_pasted_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("drop.png");
        std::fs::write(&path, b"x").unwrap();
        assert_eq!(pasted_file(path.to_str().unwrap()), Some(path.clone()));
        assert_eq!(pasted_file("just some words"), None);
        assert_eq!(pasted_file(dir.path().to_str().unwrap()), None);
    }

    #[tokio::test]
    async fn test_poll_tasks_applies_reply_and_scrolls() {
        let mut app = app_with(Arc::new(Echo), Arc::new(Stalled));
        app.chat_height = 1;
        app.chat_width = 40;
        app.chat_input.insert_str("ping");
        app.submit_chat();
        assert!(app.chat_busy());
        assert!(app.chat_input.text().is_empty());

        while app.chat_busy() {
            app.poll_tasks().await;
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }

        let messages = app.assistant.as_ref().unwrap().conversation.messages();
        assert_eq!(messages.last(), Some(&Message::model("echo: ping")));
        assert_eq!(app.chat_scroll, chat_line_count(messages, false, 40) - 1);
    }

    #[tokio::test]
    async fn test_busy_flags_are_per_screen() {
        let mut app = app_with(Arc::new(Echo), Arc::new(Stalled));
        app.prompt_input.insert_str("a red cube");
        app.submit_generation();

        assert!(app.is_busy());
        assert!(!app.input_locked());
        app.screen = Screen::Generate;
        assert!(app.input_locked());
    }
}
