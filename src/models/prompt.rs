use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The AI application a prompt was written for.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum AppTag {
    Deepseek,
    Chatgpt,
    Gemini,
    Grok,
    Claude,
    /// Also absorbs app keys this build does not know about.
    #[serde(other)]
    Other,
}

impl AppTag {
    pub const ALL: [AppTag; 6] = [
        AppTag::Deepseek,
        AppTag::Chatgpt,
        AppTag::Gemini,
        AppTag::Grok,
        AppTag::Claude,
        AppTag::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AppTag::Deepseek => "deepseek",
            AppTag::Chatgpt => "chatgpt",
            AppTag::Gemini => "gemini",
            AppTag::Grok => "grok",
            AppTag::Claude => "claude",
            AppTag::Other => "other",
        }
    }
}

impl fmt::Display for AppTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AppTag {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AppTag::ALL
            .into_iter()
            .find(|tag| tag.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown app '{}'", s))
    }
}

/// A saved prompt.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Prompt {
    pub id: String,
    pub app: AppTag,
    pub content: String,
    #[serde(default)]
    pub is_favorite: bool,
    pub created_at: DateTime<Utc>, // immutable once set
}

impl Prompt {
    /// Builds a new, non-favorite prompt. Content must already be validated.
    pub fn new(id: String, app: AppTag, content: String, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            app,
            content,
            is_favorite: false,
            created_at,
        }
    }

    /// First `max_chars` characters of the content, with an ellipsis when cut.
    pub fn preview(&self, max_chars: usize) -> String {
        let mut chars = self.content.chars();
        let head: String = chars.by_ref().take(max_chars).collect();
        if chars.next().is_some() {
            format!("{}...", head)
        } else {
            head
        }
    }
}

/// One copy action. `prompt_id` is a reference and may dangle after a delete.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub prompt_id: String,
    pub copied_at: DateTime<Utc>,
}
