use ratatui::widgets::ListState;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::api::ApiClient;
use crate::config::Config;
use crate::generation::{self, GenerationError, GenerationOutcome};
use crate::store::{AppStore, Message, PersistedSession};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Focus {
    Conversations,
    Chat,
    Input,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    Editing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginMode {
    SignIn,
    SignUp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginField {
    Email,
    Password,
}

/// A generation in flight for one conversation. Aborting the handle stops
/// the poll timer.
pub struct PendingGeneration {
    pub conversation_id: String,
    pub handle: JoinHandle<Result<GenerationOutcome, GenerationError>>,
}

pub struct App {
    pub should_quit: bool,
    pub focus: Focus,
    pub input_mode: InputMode,

    pub config: Config,
    pub api: ApiClient,
    pub store: AppStore,

    // Compose box
    pub input: String,
    pub input_cursor: usize,

    // Chat viewport (inner dimensions, updated during render)
    pub chat_scroll: u16,
    pub chat_height: u16,
    pub chat_width: u16,

    // Sidebar
    pub conversation_state: ListState,

    // Dismissible banners
    pub error: Option<String>,
    pub notice: Option<String>,

    // One generation at a time
    pub generation: Option<PendingGeneration>,
    pub animation_frame: u8,

    // Voice picker popup
    pub show_voice_picker: bool,
    pub voice_picker_state: ListState,

    // Login popup
    pub show_login: bool,
    pub login_mode: LoginMode,
    pub login_field: LoginField,
    pub login_email: String,
    pub login_password: String,

    // Feedback popup
    pub show_feedback: bool,
    pub feedback_input: String,
}

impl App {
    pub fn new(config: Config, api: ApiClient) -> Self {
        let mut store = AppStore::new();

        match PersistedSession::default_path() {
            Ok(path) => match PersistedSession::load_from(&path) {
                Ok(session) => store.restore(session),
                Err(err) => warn!(error = %err, "could not read persisted session"),
            },
            Err(err) => warn!(error = %err, "no config directory, starting fresh"),
        }

        let mut app = Self {
            should_quit: false,
            focus: Focus::Input,
            input_mode: InputMode::Editing,

            config,
            api,
            store,

            input: String::new(),
            input_cursor: 0,

            chat_scroll: 0,
            chat_height: 0,
            chat_width: 0,

            conversation_state: ListState::default(),

            error: None,
            notice: None,

            generation: None,
            animation_frame: 0,

            show_voice_picker: false,
            voice_picker_state: ListState::default(),

            show_login: false,
            login_mode: LoginMode::SignIn,
            login_field: LoginField::Email,
            login_email: String::new(),
            login_password: String::new(),

            show_feedback: false,
            feedback_input: String::new(),
        };
        app.sync_conversation_highlight();
        app
    }

    /// Startup fetches: the voice catalog, and a profile/balance refresh when
    /// a token survived the restart. Both degrade gracefully when the backend
    /// is unreachable.
    pub async fn bootstrap(&mut self) {
        self.store.load_voices(&self.api).await;

        if self.api.has_token() || self.store.user.is_some() {
            self.store.refresh_user(&self.api).await;
            if self.store.user.is_none() {
                // Refresh failure is an implicit logout; drop the stale token
                // and user from disk as well.
                self.config.access_token = None;
                if let Err(err) = self.config.save() {
                    warn!(error = %err, "could not update config after failed refresh");
                }
                self.persist_session();
            }
        }

        self.scroll_chat_to_bottom();
    }

    pub fn is_generating(&self) -> bool {
        self.generation.is_some()
    }

    pub fn persist_session(&self) {
        let result = PersistedSession::default_path()
            .and_then(|path| self.store.snapshot().save_to(&path));
        if let Err(err) = result {
            warn!(error = %err, "could not persist session");
        }
    }

    // ── Generation ──

    /// Validate the compose box and kick off the submit-then-poll workflow.
    /// The user message is appended optimistically; the workflow re-checks
    /// credits against a fresh balance before submitting.
    pub fn submit_input(&mut self) {
        if self.is_generating() {
            return;
        }

        let text = self.input.clone();
        if text.trim().is_empty() {
            return;
        }

        let Some(voice) = self.store.selected_voice.clone() else {
            self.error = Some("Pick a voice first (press v)".to_string());
            return;
        };

        if self.store.user.is_none() {
            self.error = Some("Please sign in to generate audio (press L)".to_string());
            self.show_login = true;
            return;
        }

        let required = generation::cost_of(&text);
        if required > self.store.credits {
            self.error = Some(format!(
                "Not enough credits: need {required}, have {}",
                self.store.credits
            ));
            return;
        }

        let conversation_id = match self.store.current_conversation() {
            Some(conversation) => conversation.id.clone(),
            None => self.store.create_conversation(),
        };

        self.store
            .append_message(&conversation_id, Message::user(&text));
        self.input.clear();
        self.input_cursor = 0;
        self.error = None;
        self.sync_conversation_highlight();
        self.persist_session();
        self.scroll_chat_to_bottom();

        self.generation = Some(PendingGeneration {
            conversation_id,
            handle: generation::spawn(self.api.clone(), text, voice),
        });
    }

    /// Called on every tick: collect a finished generation, if any, and fold
    /// its outcome into the store. Errors stay scoped to the one attempt.
    pub async fn poll_generation(&mut self) {
        let finished = self
            .generation
            .as_ref()
            .is_some_and(|pending| pending.handle.is_finished());
        if !finished {
            return;
        }
        let Some(pending) = self.generation.take() else {
            return;
        };

        match pending.handle.await {
            Ok(Ok(outcome)) => {
                self.store.append_message(
                    &pending.conversation_id,
                    Message::assistant(outcome.audio_url, outcome.voice_name),
                );
                if let Some(balance) = outcome.balance {
                    self.store.set_credits(balance);
                }
                self.sync_conversation_highlight();
                self.persist_session();
                self.scroll_chat_to_bottom();
            }
            Ok(Err(err)) => {
                self.error = Some(err.to_string());
            }
            Err(err) => {
                if !err.is_cancelled() {
                    warn!(error = %err, "generation task died");
                    self.error = Some("Generation failed unexpectedly".to_string());
                }
            }
        }
    }

    pub fn tick(&mut self) {
        if self.is_generating() {
            self.animation_frame = (self.animation_frame + 1) % 3;
        }
    }

    // ── Account ──

    pub async fn do_login(&mut self) {
        let email = self.login_email.trim().to_string();
        let password = self.login_password.clone();
        if email.is_empty() || password.is_empty() {
            self.error = Some("Email and password are both required".to_string());
            return;
        }

        if self.login_mode == LoginMode::SignUp {
            if let Err(err) = self.api.register(&email, &password).await {
                self.error = Some(err.to_string());
                return;
            }
            info!(email = %email, "account registered");
        }

        let token = match self.api.login(&email, &password).await {
            Ok(response) => response.access_token,
            Err(err) => {
                self.error = Some(err.to_string());
                return;
            }
        };

        match self.store.login(&self.api, token).await {
            Ok(()) => {
                self.config.access_token = self.api.token();
                if let Err(err) = self.config.save() {
                    warn!(error = %err, "could not persist access token");
                }
                self.show_login = false;
                self.login_password.clear();
                self.error = None;
                self.notice = Some(format!("Signed in as {email}"));
                self.persist_session();
            }
            Err(err) => self.error = Some(err.to_string()),
        }
    }

    pub fn logout(&mut self) {
        if self.store.user.is_none() {
            return;
        }
        self.store.logout(&self.api);
        self.config.access_token = None;
        if let Err(err) = self.config.save() {
            warn!(error = %err, "could not clear access token");
        }
        self.persist_session();
        self.notice = Some("Signed out".to_string());
    }

    /// The HTTP layer saw a 401: the token is already gone from memory, so
    /// drop it from disk, reset account state, and bring the login popup up.
    pub fn handle_auth_signal(&mut self) {
        if let Some(pending) = self.generation.take() {
            pending.handle.abort();
        }
        self.config.access_token = None;
        if let Err(err) = self.config.save() {
            warn!(error = %err, "could not clear access token");
        }
        if self.store.user.is_some() {
            self.store.user = None;
            self.store.credits = 0;
            self.error = Some("Session expired. Please sign in again.".to_string());
            self.show_login = true;
            self.persist_session();
        }
    }

    pub async fn submit_feedback(&mut self) {
        let message = self.feedback_input.trim().to_string();
        if message.is_empty() {
            return;
        }
        let contact = self.store.user.as_ref().map(|user| user.email.clone());
        match self.api.send_feedback(&message, contact.as_deref()).await {
            Ok(()) => {
                self.show_feedback = false;
                self.feedback_input.clear();
                self.notice = Some("Thanks for the feedback!".to_string());
            }
            Err(err) => self.error = Some(err.to_string()),
        }
    }

    // ── Conversations ──

    pub fn new_conversation(&mut self) {
        self.store.create_conversation();
        self.sync_conversation_highlight();
        self.persist_session();
        self.chat_scroll = 0;
        self.focus = Focus::Input;
        self.input_mode = InputMode::Editing;
    }

    pub fn conversations_nav_down(&mut self) {
        let len = self.store.conversations.len();
        if len > 0 {
            let i = self.conversation_state.selected().unwrap_or(0);
            self.conversation_state.select(Some((i + 1).min(len - 1)));
        }
    }

    pub fn conversations_nav_up(&mut self) {
        let i = self.conversation_state.selected().unwrap_or(0);
        self.conversation_state.select(Some(i.saturating_sub(1)));
    }

    /// Make the highlighted conversation active.
    pub fn activate_highlighted_conversation(&mut self) {
        if let Some(id) = self
            .conversation_state
            .selected()
            .and_then(|i| self.store.conversations.get(i))
            .map(|c| c.id.clone())
        {
            self.store.select_conversation(&id);
            self.persist_session();
            self.scroll_chat_to_bottom();
        }
    }

    pub fn delete_highlighted_conversation(&mut self) {
        let Some(id) = self
            .conversation_state
            .selected()
            .and_then(|i| self.store.conversations.get(i))
            .map(|c| c.id.clone())
        else {
            return;
        };

        // A generation for a vanishing conversation has nowhere to land.
        if self
            .generation
            .as_ref()
            .is_some_and(|pending| pending.conversation_id == id)
        {
            if let Some(pending) = self.generation.take() {
                pending.handle.abort();
            }
        }

        self.store.delete_conversation(&id);
        self.sync_conversation_highlight();
        self.persist_session();
    }

    /// Keep the sidebar highlight on the active conversation.
    pub fn sync_conversation_highlight(&mut self) {
        let index = self.store.current_conversation_id.as_deref().and_then(|id| {
            self.store
                .conversations
                .iter()
                .position(|c| c.id == id)
        });
        self.conversation_state.select(index);
    }

    // ── Voice picker ──

    pub fn open_voice_picker(&mut self) {
        if self.store.voices.is_empty() {
            self.error = Some("No voices available yet".to_string());
            return;
        }
        let current = self
            .store
            .selected_voice
            .as_ref()
            .and_then(|voice| self.store.voices.iter().position(|v| v.id == voice.id))
            .unwrap_or(0);
        self.voice_picker_state.select(Some(current));
        self.show_voice_picker = true;
    }

    pub fn voice_picker_nav_down(&mut self) {
        let len = self.store.voices.len();
        if len > 0 {
            let i = self.voice_picker_state.selected().unwrap_or(0);
            self.voice_picker_state.select(Some((i + 1).min(len - 1)));
        }
    }

    pub fn voice_picker_nav_up(&mut self) {
        let i = self.voice_picker_state.selected().unwrap_or(0);
        self.voice_picker_state.select(Some(i.saturating_sub(1)));
    }

    pub fn choose_voice(&mut self) {
        if let Some(voice) = self
            .voice_picker_state
            .selected()
            .and_then(|i| self.store.voices.get(i))
            .cloned()
        {
            self.store.select_voice(Some(voice));
            self.persist_session();
        }
        self.show_voice_picker = false;
    }

    // ── Audio ──

    /// Hand the most recent generated artifact in the active conversation to
    /// the system player. Decoding stays outside this client.
    pub fn open_latest_audio(&mut self) {
        let Some(conversation) = self.store.current_conversation() else {
            return;
        };
        let Some(url) = conversation
            .messages
            .iter()
            .rev()
            .find_map(|m| m.audio_url.clone())
        else {
            self.error = Some("No generated audio in this conversation yet".to_string());
            return;
        };

        let url = self.api.absolute_url(&url);
        if let Err(err) = open::that_detached(&url) {
            warn!(error = %err, url = %url, "could not open audio");
            self.error = Some(format!("Could not open audio player for {url}"));
        }
    }

    // ── Chat viewport ──

    pub fn scroll_chat_to_bottom(&mut self) {
        let wrap_width = if self.chat_width > 0 {
            self.chat_width as usize
        } else {
            60
        };

        let mut total_lines: u16 = 0;
        if let Some(conversation) = self.store.current_conversation() {
            for message in &conversation.messages {
                total_lines += 1; // role line
                match message.role {
                    crate::store::Role::User => {
                        for line in message.content.lines() {
                            let chars = line.chars().count();
                            total_lines += if chars == 0 {
                                1
                            } else {
                                (chars / wrap_width + 1) as u16
                            };
                        }
                    }
                    crate::store::Role::Assistant => total_lines += 1, // audio line
                }
                total_lines += 1; // blank separator
            }
        }

        if self.is_generating() {
            total_lines += 2; // role line + "Generating..."
        }

        let visible = if self.chat_height > 0 {
            self.chat_height
        } else {
            20
        };
        self.chat_scroll = total_lines.saturating_sub(visible);
    }

    /// Abort any in-flight work and write the session out one last time.
    pub fn shutdown(&mut self) {
        if let Some(pending) = self.generation.take() {
            pending.handle.abort();
        }
        self.persist_session();
    }
}
