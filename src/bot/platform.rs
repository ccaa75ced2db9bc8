//! Outbound chat surface used by the router and the response assembler.

use crate::images::UploadableImage;
use async_trait::async_trait;
use teloxide::types::{ChatAction, ReplyMarkup};
use thiserror::Error;

/// Errors returned by chat platform calls
#[derive(Error, Debug)]
pub enum ChatError {
    #[error("telegram request failed: {0}")]
    Request(#[from] teloxide::RequestError),
    #[error("telegram request failed after retries: {0}")]
    Exhausted(String),
}

/// How the text of an outgoing message is interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextFormat {
    Plain,
    Html,
}

/// A text message ready to send
#[derive(Debug, Clone)]
pub struct OutgoingText {
    pub text: String,
    pub format: TextFormat,
    pub link_preview: bool,
    pub markup: Option<ReplyMarkup>,
}

impl OutgoingText {
    #[must_use]
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            format: TextFormat::Plain,
            link_preview: true,
            markup: None,
        }
    }

    /// HTML message with link previews disabled.
    #[must_use]
    pub fn html(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            format: TextFormat::Html,
            link_preview: false,
            markup: None,
        }
    }

    #[must_use]
    pub fn with_markup(mut self, markup: impl Into<ReplyMarkup>) -> Self {
        self.markup = Some(markup.into());
        self
    }
}

/// One item of an album
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaAttachment {
    Photo {
        media: UploadableImage,
        caption: Option<String>,
    },
}

impl MediaAttachment {
    #[must_use]
    pub fn caption(&self) -> Option<&str> {
        match self {
            Self::Photo { caption, .. } => caption.as_deref(),
        }
    }
}

/// Outbound operations against the chat platform
#[async_trait]
pub trait ChatPlatform: Send + Sync {
    /// Sends a text message and returns its message id
    async fn send_text(&self, chat_id: i64, message: OutgoingText) -> Result<i32, ChatError>;
    /// Sends a single photo with an optional plain caption
    async fn send_photo(
        &self,
        chat_id: i64,
        photo: UploadableImage,
        caption: Option<String>,
    ) -> Result<(), ChatError>;
    /// Sends an ordered album as one request
    async fn send_media_group(
        &self,
        chat_id: i64,
        media: Vec<MediaAttachment>,
    ) -> Result<(), ChatError>;
    async fn delete_message(&self, chat_id: i64, message_id: i32) -> Result<(), ChatError>;
    async fn send_chat_action(&self, chat_id: i64, action: ChatAction) -> Result<(), ChatError>;
    /// Acknowledges a callback query with an empty answer
    async fn answer_callback(&self, callback_id: &str) -> Result<(), ChatError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup};

    #[test]
    fn test_html_disables_preview() {
        let message = OutgoingText::html("<b>x</b>");
        assert_eq!(message.format, TextFormat::Html);
        assert!(!message.link_preview);
        assert!(message.markup.is_none());
    }

    #[test]
    fn test_with_markup() {
        let markup =
            InlineKeyboardMarkup::new(vec![vec![InlineKeyboardButton::callback("a", "b")]]);
        let message = OutgoingText::plain("hi").with_markup(markup);
        assert!(matches!(message.markup, Some(ReplyMarkup::InlineKeyboard(_))));
    }

    #[test]
    fn test_attachment_caption() {
        let photo = MediaAttachment::Photo {
            media: UploadableImage::Path("x.png".into()),
            caption: Some("🎬 Title".to_string()),
        };
        assert_eq!(photo.caption(), Some("🎬 Title"));
    }
}
