use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Result, anyhow};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, warn};
use uuid::Uuid;

use crate::api::{ApiClient, ApiError, UserResponse, Voice};

/// Conversation titles are cut to this many characters, plus an ellipsis.
const TITLE_MAX_CHARS: usize = 50;

const PLACEHOLDER_TITLE: &str = "New chat";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One chat entry. User messages carry text; assistant messages carry the
/// generated audio location and the voice that spoke it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub audio_url: Option<String>,
    #[serde(default)]
    pub voice_name: Option<String>,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            audio_url: None,
            voice_name: None,
        }
    }

    pub fn assistant(audio_url: impl Into<String>, voice_name: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: String::new(),
            audio_url: Some(audio_url.into()),
            voice_name: Some(voice_name.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub title: String,
    pub messages: Vec<Message>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    fn new(id: String) -> Self {
        let now = Utc::now();
        Self {
            id,
            title: PLACEHOLDER_TITLE.to_string(),
            messages: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// The signed-in account as the client sees it. The display name is the
/// local part of the email.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionUser {
    pub id: String,
    pub name: String,
    pub email: String,
    pub plan: String,
    #[serde(default)]
    pub avatar: Option<String>,
}

impl From<UserResponse> for SessionUser {
    fn from(profile: UserResponse) -> Self {
        let name = profile
            .email
            .split('@')
            .next()
            .unwrap_or(profile.email.as_str())
            .to_string();
        Self {
            id: profile.id,
            name,
            email: profile.email,
            plan: "Free".to_string(),
            avatar: profile.avatar,
        }
    }
}

/// The subset of store state that survives restarts. Loading flags and the
/// credit balance are deliberately left out; credits are re-fetched from the
/// backend when a persisted user is present.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PersistedSession {
    pub conversations: Vec<Conversation>,
    pub current_conversation_id: Option<String>,
    pub selected_voice: Option<Voice>,
    pub user: Option<SessionUser>,
}

impl PersistedSession {
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow!("Could not determine config directory"))?;

        Ok(config_dir.join("mosheng").join("session.json"))
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)?;
        let session: PersistedSession = serde_json::from_str(&content)?;
        Ok(session)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }
}

/// Single source of truth for session data. All mutations are replace-style
/// updates applied from the single-threaded event loop.
#[derive(Debug, Default)]
pub struct AppStore {
    pub voices: Vec<Voice>,
    pub selected_voice: Option<Voice>,
    pub loading_voices: bool,
    pub credits: i64,
    pub user: Option<SessionUser>,
    pub conversations: Vec<Conversation>,
    pub current_conversation_id: Option<String>,
}

impl AppStore {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Voices ──

    /// Fetch the voice catalog. On success the list is replaced and, when
    /// nothing is selected yet, the first voice becomes the selection. A
    /// failure leaves existing state untouched and is only logged.
    pub async fn load_voices(&mut self, api: &ApiClient) {
        self.loading_voices = true;
        match api.voices().await {
            Ok(voices) => {
                self.voices = voices;
                if self.selected_voice.is_none() {
                    self.selected_voice = self.voices.first().cloned();
                }
            }
            Err(err) => error!(error = %err, "failed to load voice catalog"),
        }
        self.loading_voices = false;
    }

    pub fn select_voice(&mut self, voice: Option<Voice>) {
        self.selected_voice = voice;
    }

    // ── Credits ──

    pub fn set_credits(&mut self, amount: i64) {
        self.credits = amount.max(0);
    }

    /// Local deduction floors at zero; the backend balance is authoritative.
    pub fn deduct_credits(&mut self, amount: i64) {
        self.credits = (self.credits - amount).max(0);
    }

    pub fn add_credits(&mut self, amount: i64) {
        self.credits += amount;
    }

    // ── Account ──

    /// Adopt a freshly issued token, then fetch profile and balance. Any
    /// fetch failure drops the token again and propagates to the caller,
    /// who owns the user-facing messaging.
    pub async fn login(&mut self, api: &ApiClient, token: String) -> Result<(), ApiError> {
        api.set_token(&token);

        let profile = match api.me().await {
            Ok(profile) => profile,
            Err(err) => {
                api.clear_token();
                return Err(err);
            }
        };
        let balance = match api.credits_balance().await {
            Ok(balance) => balance,
            Err(err) => {
                api.clear_token();
                return Err(err);
            }
        };

        self.user = Some(SessionUser::from(profile));
        self.set_credits(balance.balance);
        Ok(())
    }

    /// Clears the account and zeroes credits. Conversation history stays.
    pub fn logout(&mut self, api: &ApiClient) {
        api.clear_token();
        self.user = None;
        self.credits = 0;
    }

    /// Re-fetch profile and balance with the stored token. A refresh failure
    /// is an implicit logout: the token and user are cleared.
    pub async fn refresh_user(&mut self, api: &ApiClient) {
        if !api.has_token() {
            self.user = None;
            self.credits = 0;
            return;
        }

        let refreshed = async {
            let profile = api.me().await?;
            let balance = api.credits_balance().await?;
            Ok::<_, ApiError>((profile, balance))
        }
        .await;

        match refreshed {
            Ok((profile, balance)) => {
                self.user = Some(SessionUser::from(profile));
                self.set_credits(balance.balance);
            }
            Err(err) => {
                warn!(error = %err, "user refresh failed, signing out");
                api.clear_token();
                self.user = None;
                self.credits = 0;
            }
        }
    }

    // ── Conversations ──

    /// Insert a new empty conversation at the front, make it active, and
    /// return its id.
    pub fn create_conversation(&mut self) -> String {
        let id = new_conversation_id();
        self.conversations.insert(0, Conversation::new(id.clone()));
        self.current_conversation_id = Some(id.clone());
        id
    }

    /// No existence validation here; selecting an unknown id is a caller
    /// error.
    pub fn select_conversation(&mut self, id: &str) {
        self.current_conversation_id = Some(id.to_string());
    }

    /// Replace a conversation's message list, recompute its title from the
    /// first user message, bump its timestamp, and keep the collection
    /// ordered most recently updated first.
    pub fn update_conversation_messages(&mut self, id: &str, messages: Vec<Message>) {
        if let Some(conversation) = self.conversations.iter_mut().find(|c| c.id == id) {
            conversation.messages = messages;
            if let Some(first_user) = conversation
                .messages
                .iter()
                .find(|m| m.role == Role::User)
            {
                conversation.title = derive_title(&first_user.content);
            }
            conversation.updated_at = Utc::now();
        }
        self.conversations
            .sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
    }

    pub fn append_message(&mut self, id: &str, message: Message) {
        let Some(conversation) = self.conversations.iter().find(|c| c.id == id) else {
            warn!(conversation = id, "dropping message for unknown conversation");
            return;
        };
        let mut messages = conversation.messages.clone();
        messages.push(message);
        self.update_conversation_messages(id, messages);
    }

    /// Remove a conversation. When the active one goes away, the most
    /// recently updated remaining conversation takes over, or none.
    pub fn delete_conversation(&mut self, id: &str) {
        self.conversations.retain(|c| c.id != id);
        if self.current_conversation_id.as_deref() == Some(id) {
            self.current_conversation_id = self.conversations.first().map(|c| c.id.clone());
        }
    }

    pub fn current_conversation(&self) -> Option<&Conversation> {
        let id = self.current_conversation_id.as_deref()?;
        self.conversations.iter().find(|c| c.id == id)
    }

    // ── Persistence ──

    pub fn snapshot(&self) -> PersistedSession {
        PersistedSession {
            conversations: self.conversations.clone(),
            current_conversation_id: self.current_conversation_id.clone(),
            selected_voice: self.selected_voice.clone(),
            user: self.user.clone(),
        }
    }

    pub fn restore(&mut self, session: PersistedSession) {
        self.conversations = session.conversations;
        self.current_conversation_id = session.current_conversation_id;
        self.selected_voice = session.selected_voice;
        self.user = session.user;
        self.conversations
            .sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
    }
}

/// Millisecond timestamp plus a random suffix keeps ids unique even for
/// conversations created within the same millisecond.
fn new_conversation_id() -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{}-{}", Utc::now().timestamp_millis(), &suffix[..8])
}

fn derive_title(text: &str) -> String {
    if text.chars().count() > TITLE_MAX_CHARS {
        let truncated: String = text.chars().take(TITLE_MAX_CHARS).collect();
        format!("{truncated}...")
    } else {
        text.to_string()
    }
}
