use super::platform::{ChatError, ChatPlatform, MediaAttachment, OutgoingText, TextFormat};
use crate::images::UploadableImage;
use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::{
    CallbackQueryId, ChatAction, InputFile, InputMedia, InputMediaPhoto, LinkPreviewOptions,
    MessageId, ParseMode,
};

/// [`ChatPlatform`] backed by the Telegram Bot API.
///
/// Text sends are retried with backoff; other calls are single attempts whose
/// errors are left to the caller to log.
#[derive(Clone)]
pub struct TelegramPlatform {
    bot: Bot,
}

impl TelegramPlatform {
    #[must_use]
    pub const fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

const fn disabled_link_preview() -> LinkPreviewOptions {
    LinkPreviewOptions {
        is_disabled: true,
        url: None,
        prefer_small_media: false,
        prefer_large_media: false,
        show_above_text: false,
    }
}

fn input_file(image: UploadableImage) -> InputFile {
    match image {
        UploadableImage::Memory { file_name, bytes } => {
            InputFile::memory(bytes.to_vec()).file_name(file_name)
        }
        UploadableImage::Path(path) => InputFile::file(path),
    }
}

fn input_media(item: MediaAttachment) -> InputMedia {
    match item {
        MediaAttachment::Photo { media, caption } => {
            let mut photo = InputMediaPhoto::new(input_file(media));
            photo.caption = caption;
            InputMedia::Photo(photo)
        }
    }
}

#[async_trait]
impl ChatPlatform for TelegramPlatform {
    async fn send_text(&self, chat_id: i64, message: OutgoingText) -> Result<i32, ChatError> {
        let chat = ChatId(chat_id);
        let sent = crate::utils::retry_telegram_operation(|| async {
            let mut req = self.bot.send_message(chat, message.text.clone());
            if message.format == TextFormat::Html {
                req = req.parse_mode(ParseMode::Html);
            }
            if !message.link_preview {
                req = req.link_preview_options(disabled_link_preview());
            }
            if let Some(markup) = message.markup.clone() {
                req = req.reply_markup(markup);
            }
            req.await
        })
        .await?;

        Ok(sent.id.0)
    }

    async fn send_photo(
        &self,
        chat_id: i64,
        photo: UploadableImage,
        caption: Option<String>,
    ) -> Result<(), ChatError> {
        let mut req = self.bot.send_photo(ChatId(chat_id), input_file(photo));
        if let Some(caption) = caption {
            req = req.caption(caption);
        }
        req.await?;
        Ok(())
    }

    async fn send_media_group(
        &self,
        chat_id: i64,
        media: Vec<MediaAttachment>,
    ) -> Result<(), ChatError> {
        let media: Vec<InputMedia> = media.into_iter().map(input_media).collect();
        self.bot.send_media_group(ChatId(chat_id), media).await?;
        Ok(())
    }

    async fn delete_message(&self, chat_id: i64, message_id: i32) -> Result<(), ChatError> {
        self.bot
            .delete_message(ChatId(chat_id), MessageId(message_id))
            .await?;
        Ok(())
    }

    async fn send_chat_action(&self, chat_id: i64, action: ChatAction) -> Result<(), ChatError> {
        self.bot.send_chat_action(ChatId(chat_id), action).await?;
        Ok(())
    }

    async fn answer_callback(&self, callback_id: &str) -> Result<(), ChatError> {
        self.bot
            .answer_callback_query(CallbackQueryId(callback_id.to_string()))
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[test]
    fn test_photo_attachment_keeps_caption() {
        let item = MediaAttachment::Photo {
            media: UploadableImage::Memory {
                file_name: "poster.jpg".to_string(),
                bytes: Bytes::from_static(b"\xFF\xD8\xFF"),
            },
            caption: Some("🎬 Матрица (1999)".to_string()),
        };

        match input_media(item) {
            InputMedia::Photo(photo) => {
                assert_eq!(photo.caption.as_deref(), Some("🎬 Матрица (1999)"));
            }
            other => panic!("expected photo, got {other:?}"),
        }
    }

    #[test]
    fn test_link_preview_disabled() {
        assert!(disabled_link_preview().is_disabled);
    }
}
