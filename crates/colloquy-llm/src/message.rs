//! Chat message model shared by the memory, summary and agent layers

use serde::{Deserialize, Serialize};
use std::fmt;

/// Role of a message author
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// End user
    User,
    /// The agent
    Assistant,
    /// System instructions or synthetic context
    System,
}

impl MessageRole {
    /// Human-readable label used when rendering transcripts
    pub fn label(&self) -> &'static str {
        match self {
            MessageRole::User => "User",
            MessageRole::Assistant => "Assistant",
            MessageRole::System => "System",
        }
    }
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageRole::User => write!(f, "user"),
            MessageRole::Assistant => write!(f, "assistant"),
            MessageRole::System => write!(f, "system"),
        }
    }
}

/// One piece of message content
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentSegment {
    /// Plain text span
    Text {
        /// The text
        text: String,
    },

    /// Reference to an uploaded file
    File {
        /// Identifier of the file in the document store
        file_id: String,

        /// Display name, if known
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
    },
}

impl ContentSegment {
    /// Create a text segment
    pub fn text(text: impl Into<String>) -> Self {
        ContentSegment::Text { text: text.into() }
    }

    /// Create a file reference segment
    pub fn file(file_id: impl Into<String>) -> Self {
        ContentSegment::File {
            file_id: file_id.into(),
            name: None,
        }
    }

    /// Create a file reference segment with a display name
    pub fn named_file(file_id: impl Into<String>, name: impl Into<String>) -> Self {
        ContentSegment::File {
            file_id: file_id.into(),
            name: Some(name.into()),
        }
    }
}

/// A single chat message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Message author
    pub role: MessageRole,

    /// Ordered content segments
    pub content: Vec<ContentSegment>,
}

impl ChatMessage {
    /// Create a message with a single text segment
    pub fn new(role: MessageRole, text: impl Into<String>) -> Self {
        Self {
            role,
            content: vec![ContentSegment::text(text)],
        }
    }

    /// Create a user message
    pub fn user(text: impl Into<String>) -> Self {
        Self::new(MessageRole::User, text)
    }

    /// Create an assistant message
    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(MessageRole::Assistant, text)
    }

    /// Create a system message
    pub fn system(text: impl Into<String>) -> Self {
        Self::new(MessageRole::System, text)
    }

    /// Append a segment
    pub fn with_segment(mut self, segment: ContentSegment) -> Self {
        self.content.push(segment);
        self
    }

    /// Flatten the content into plain text.
    ///
    /// File references render as `[file: <name or id>]`.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .map(|segment| match segment {
                ContentSegment::Text { text } => text.clone(),
                ContentSegment::File { file_id, name } => {
                    format!("[file: {}]", name.as_deref().unwrap_or(file_id))
                }
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_flattens_segments() {
        let message = ChatMessage::user("See the attached report")
            .with_segment(ContentSegment::named_file("f-1", "report.pdf"))
            .with_segment(ContentSegment::file("f-2"));

        assert_eq!(
            message.text(),
            "See the attached report\n[file: report.pdf]\n[file: f-2]"
        );
    }

    #[test]
    fn test_message_wire_shape() {
        let message = ChatMessage::assistant("Hi");
        let json = serde_json::to_value(&message).unwrap();

        assert_eq!(
            json,
            serde_json::json!({
                "role": "assistant",
                "content": [{"type": "text", "text": "Hi"}]
            })
        );
    }
}
