//! Conversation trace model
//!
//! A trace is built from the submitted request body minus the attestation
//! fields, validated once, and then serialized as the persisted JSON shape.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::TraceError;

pub const DEFAULT_TRACE_OBJECT: &str = "chat.trace";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "system" => Some(Self::System),
            "user" => Some(Self::User),
            "assistant" => Some(Self::Assistant),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    /// Validate one entry of the `messages` array.
    pub fn from_value(index: usize, value: &Value) -> Result<Self, TraceError> {
        let Some(entry) = value.as_object() else {
            return Err(TraceError::InvalidRole {
                index,
                role: value.to_string(),
            });
        };

        if let Some(unknown) = entry.keys().find(|k| *k != "role" && *k != "content") {
            return Err(TraceError::Malformed(format!(
                "message {} has unknown field {:?}",
                index, unknown
            )));
        }

        let role = match entry.get("role") {
            Some(Value::String(role)) => Role::parse(role).ok_or_else(|| TraceError::InvalidRole {
                index,
                role: role.clone(),
            })?,
            other => {
                return Err(TraceError::InvalidRole {
                    index,
                    role: other.map(Value::to_string).unwrap_or_default(),
                })
            }
        };

        let content = match entry.get("content") {
            Some(Value::String(content)) => content.clone(),
            _ => return Err(TraceError::MissingContent { index }),
        };

        Ok(Self { role, content })
    }
}

/// Request body as submitted, before validation.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct TraceSubmission {
    messages: Vec<Value>,
    created: i64,
    model: String,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    object: Option<String>,
    #[serde(default)]
    system_fingerprint: Option<String>,
    #[serde(default)]
    choices: Vec<Map<String, Value>>,
    #[serde(default)]
    usage: Map<String, Value>,
}

/// A validated conversation trace. Field order is the persisted JSON order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConversationTrace {
    pub messages: Vec<Message>,
    pub created: i64,
    pub model: String,
    pub id: String,
    pub object: String,
    pub system_fingerprint: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub choices: Vec<Map<String, Value>>,
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub usage: Map<String, Value>,
}

impl ConversationTrace {
    /// Build from a JSON object holding only trace fields.
    ///
    /// `id` defaults to a random UUIDv4, `object` to `"chat.trace"` and
    /// `system_fingerprint` to `model`.
    pub fn from_value(value: Value) -> Result<Self, TraceError> {
        if !value.is_object() {
            return Err(TraceError::Malformed("trace is not a JSON object".to_string()));
        }
        let submission: TraceSubmission = serde_json::from_value(value)?;

        if submission.messages.is_empty() {
            return Err(TraceError::EmptyMessages);
        }
        let messages = submission
            .messages
            .iter()
            .enumerate()
            .map(|(index, value)| Message::from_value(index, value))
            .collect::<Result<Vec<_>, _>>()?;

        if DateTime::<Utc>::from_timestamp(submission.created, 0).is_none() {
            return Err(TraceError::InvalidTimestamp {
                created: submission.created,
            });
        }

        let id = submission
            .id
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let system_fingerprint = submission
            .system_fingerprint
            .filter(|fp| !fp.is_empty())
            .unwrap_or_else(|| submission.model.clone());

        validate_key_segment("id", &id)?;
        validate_key_segment("system_fingerprint", &system_fingerprint)?;

        Ok(Self {
            messages,
            created: submission.created,
            model: submission.model,
            id,
            object: submission
                .object
                .unwrap_or_else(|| DEFAULT_TRACE_OBJECT.to_string()),
            system_fingerprint,
            choices: submission.choices,
            usage: submission.usage,
        })
    }

    pub fn from_json(json: &str) -> Result<Self, TraceError> {
        let value: Value = serde_json::from_str(json)?;
        Self::from_value(value)
    }

    /// Persisted JSON form.
    pub fn to_json(&self) -> Result<String, TraceError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        // Range is checked at construction
        DateTime::<Utc>::from_timestamp(self.created, 0).unwrap_or_default()
    }

    /// UTC day of `created` as `YYYYMMDD`.
    pub fn date_partition(&self) -> String {
        self.created_at().format("%Y%m%d").to_string()
    }

    /// `<prefix>/<system_fingerprint>/<YYYYMMDD>/<id>.<extension>`
    pub fn object_key(&self, prefix: &str, extension: &str) -> String {
        format!(
            "{}/{}/{}/{}.{}",
            prefix,
            self.system_fingerprint,
            self.date_partition(),
            self.id,
            extension
        )
    }

    pub fn log_key(&self, prefix: &str) -> String {
        self.object_key(prefix, "json")
    }

    pub fn share_key(&self, prefix: &str) -> String {
        self.object_key(prefix, "html")
    }
}

/// Key segments are limited to `[A-Za-z0-9._-]` and may not be `.` or `..`.
fn validate_key_segment(field: &'static str, value: &str) -> Result<(), TraceError> {
    let invalid = value.is_empty()
        || value == "."
        || value == ".."
        || !value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));
    if invalid {
        return Err(TraceError::InvalidKeySegment {
            field,
            value: value.to_string(),
        });
    }
    Ok(())
}
