//! Conversation bundle persistence
//!
//! A bundle is one JSON file per conversation holding its metadata, the model
//! it talks to and the raw message records. Loading is permissive (missing
//! sections are filled in); records are handed to the compression engine
//! untouched, which drops whatever it cannot use.

use std::io::Write;
use std::path::Path;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::context::Role;
use crate::{Error, Result};

/// Model used when neither the bundle nor the configuration names one
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Model kind recorded in new bundles
pub const DEFAULT_MODEL_KIND: &str = "openai-compatible";

/// Persona prompt used when a bundle carries no custom prompt
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a knowledgeable, helpful and thoughtful assistant.\n\
You provide clear, well-structured responses with practical advice.\n\
You can help with coding, writing, analysis, brainstorming and general knowledge questions.\n\
Be concise yet thorough, and use markdown formatting when it helps clarity.\n";

/// Conversation metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationInfo {
    pub id: String,
    pub name: String,
    pub updated_at: String,
}

/// Model a conversation talks to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub kind: String,
    pub name: String,
}

/// Raw message records, in conversation order
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MessageLog {
    pub messages: Vec<Value>,
}

/// One stored conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationBundle {
    pub conversation: ConversationInfo,
    pub model: ModelInfo,
    pub messages: MessageLog,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
}

fn now_rfc3339() -> String {
    Utc::now().to_rfc3339()
}

/// String field of an optional object, if it is a string
fn string_field(object: Option<&Map<String, Value>>, key: &str) -> Option<String> {
    object?.get(key)?.as_str().map(String::from)
}

impl ConversationBundle {
    /// Fresh bundle with no messages
    #[must_use]
    pub fn new(id: impl Into<String>, model_kind: impl Into<String>, model_name: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            conversation: ConversationInfo {
                name: id.clone(),
                id,
                updated_at: now_rfc3339(),
            },
            model: ModelInfo {
                kind: model_kind.into(),
                name: model_name.into(),
            },
            messages: MessageLog::default(),
            system_prompt: None,
        }
    }

    /// Build a bundle from arbitrary JSON, filling in whatever is missing
    ///
    /// `fallback_id` is used for the id (and name) when the document has
    /// none. A `system_prompt` is taken from the top level, or else from the
    /// `conversation` section.
    #[must_use]
    pub fn from_value(raw: &Value, fallback_id: &str) -> Self {
        let root = raw.as_object();
        let section = |key: &str| root.and_then(|r| r.get(key)).and_then(Value::as_object);

        let conversation = section("conversation");
        let model = section("model");
        let messages = section("messages")
            .and_then(|m| m.get("messages"))
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        let system_prompt =
            string_field(root, "system_prompt").or_else(|| string_field(conversation, "system_prompt"));

        Self {
            conversation: ConversationInfo {
                id: string_field(conversation, "id").unwrap_or_else(|| fallback_id.to_string()),
                name: string_field(conversation, "name").unwrap_or_else(|| fallback_id.to_string()),
                updated_at: string_field(conversation, "updated_at").unwrap_or_else(now_rfc3339),
            },
            model: ModelInfo {
                kind: string_field(model, "kind").unwrap_or_else(|| DEFAULT_MODEL_KIND.to_string()),
                name: string_field(model, "name").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            },
            messages: MessageLog { messages },
            system_prompt,
        }
    }

    /// Load a bundle; a missing file yields a fresh one named after the file
    ///
    /// # Errors
    ///
    /// Returns error if the file exists but cannot be read or is not JSON
    pub fn load(path: &Path) -> Result<Self> {
        let fallback_id = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default();

        let raw = match std::fs::read_to_string(path) {
            Ok(contents) => serde_json::from_str(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no bundle on disk, starting fresh");
                Value::Null
            }
            Err(e) => return Err(e.into()),
        };

        let bundle = Self::from_value(&raw, &fallback_id);
        tracing::debug!(
            path = %path.display(),
            id = %bundle.conversation.id,
            records = bundle.messages.messages.len(),
            "loaded conversation bundle"
        );
        Ok(bundle)
    }

    /// Create and save a fresh bundle named after the file
    ///
    /// # Errors
    ///
    /// Returns error if the file already exists or cannot be written
    pub fn create(path: &Path, model_kind: &str, model_name: &str) -> Result<Self> {
        if path.exists() {
            return Err(Error::Store(format!(
                "conversation bundle already exists: {}",
                path.display()
            )));
        }

        let id = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .filter(|stem| !stem.is_empty())
            .ok_or_else(|| Error::Store(format!("invalid bundle path: {}", path.display())))?;

        let bundle = Self::new(id, model_kind, model_name);
        bundle.save(path)?;
        tracing::info!(path = %path.display(), id = %bundle.conversation.id, "created conversation bundle");
        Ok(bundle)
    }

    /// Write the bundle as pretty JSON, atomically
    ///
    /// The document is written to a temporary file next to `path` and then
    /// renamed over it. Parent directories are created as needed.
    ///
    /// # Errors
    ///
    /// Returns error if the directory or file cannot be written
    pub fn save(&self, path: &Path) -> Result<()> {
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(dir)?;

        let mut file = tempfile::NamedTempFile::new_in(dir)?;
        serde_json::to_writer_pretty(&mut file, self)?;
        file.write_all(b"\n")?;
        file.as_file().sync_all()?;
        file.persist(path).map_err(|e| Error::Io(e.error))?;

        tracing::debug!(path = %path.display(), records = self.messages.messages.len(), "saved conversation bundle");
        Ok(())
    }

    /// Raw message records
    #[must_use]
    pub fn records(&self) -> &[Value] {
        &self.messages.messages
    }

    /// The custom system prompt when set and not blank, else the default
    #[must_use]
    pub fn system_prompt(&self) -> &str {
        self.system_prompt
            .as_deref()
            .map(str::trim)
            .filter(|prompt| !prompt.is_empty())
            .unwrap_or(DEFAULT_SYSTEM_PROMPT)
    }

    /// Append one turn and bump `updated_at`
    pub fn record_turn(&mut self, role: Role, text: &str) {
        let timestamp = now_rfc3339();
        self.messages.messages.push(json!({
            "role": role.as_str(),
            "text": text,
            "timestamp": timestamp,
        }));
        self.conversation.updated_at = timestamp;
    }
}
