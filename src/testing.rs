//! In-process fakes for driving the router without Telegram or the catalog.

use crate::bot::platform::{ChatError, ChatPlatform, MediaAttachment, OutgoingText, TextFormat};
use crate::catalog::{CatalogError, CatalogProvider, FilmRecord, PersonRecord};
use crate::images::{PosterSource, UploadableImage};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI32, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use teloxide::types::{ChatAction, InlineKeyboardButtonKind, ReplyMarkup};

/// One outbound call observed by [`RecordingPlatform`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sent {
    Text {
        chat_id: i64,
        text: String,
        html: bool,
        link_preview: bool,
        /// Callback data of inline buttons, row by row
        buttons: Vec<Vec<String>>,
        /// Labels of reply keyboard buttons, row by row
        menu: Vec<Vec<String>>,
    },
    Photo {
        chat_id: i64,
        caption: Option<String>,
    },
    Album(Vec<MediaAttachment>),
    Deleted {
        message_id: i32,
    },
    Action(ChatAction),
    CallbackAnswered(String),
}

/// Chat platform that records every call in order
#[derive(Default)]
pub struct RecordingPlatform {
    sent: Mutex<Vec<Sent>>,
    next_id: AtomicI32,
    fail_media_groups: bool,
}

impl RecordingPlatform {
    /// Makes every `send_media_group` call fail.
    #[must_use]
    pub fn failing_media_groups(mut self) -> Self {
        self.fail_media_groups = true;
        self
    }

    fn record(&self, item: Sent) {
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(item);
        }
    }

    /// Everything sent so far
    #[must_use]
    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }

    /// Texts of the text messages sent so far
    #[must_use]
    pub fn texts(&self) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter_map(|s| match s {
                Sent::Text { text, .. } => Some(text),
                _ => None,
            })
            .collect()
    }

    pub fn clear(&self) {
        if let Ok(mut sent) = self.sent.lock() {
            sent.clear();
        }
    }
}

fn markup_parts(markup: Option<&ReplyMarkup>) -> (Vec<Vec<String>>, Vec<Vec<String>>) {
    match markup {
        Some(ReplyMarkup::InlineKeyboard(keyboard)) => {
            let buttons = keyboard
                .inline_keyboard
                .iter()
                .map(|row| {
                    row.iter()
                        .map(|b| match &b.kind {
                            InlineKeyboardButtonKind::CallbackData(data) => data.clone(),
                            _ => b.text.clone(),
                        })
                        .collect()
                })
                .collect();
            (buttons, Vec::new())
        }
        Some(ReplyMarkup::Keyboard(keyboard)) => {
            let menu = keyboard
                .keyboard
                .iter()
                .map(|row| row.iter().map(|b| b.text.clone()).collect())
                .collect();
            (Vec::new(), menu)
        }
        _ => (Vec::new(), Vec::new()),
    }
}

#[async_trait]
impl ChatPlatform for RecordingPlatform {
    async fn send_text(&self, chat_id: i64, message: OutgoingText) -> Result<i32, ChatError> {
        let (buttons, menu) = markup_parts(message.markup.as_ref());
        self.record(Sent::Text {
            chat_id,
            text: message.text,
            html: message.format == TextFormat::Html,
            link_preview: message.link_preview,
            buttons,
            menu,
        });
        Ok(self.next_id.fetch_add(1, Ordering::SeqCst) + 1)
    }

    async fn send_photo(
        &self,
        chat_id: i64,
        _photo: UploadableImage,
        caption: Option<String>,
    ) -> Result<(), ChatError> {
        self.record(Sent::Photo { chat_id, caption });
        Ok(())
    }

    async fn send_media_group(
        &self,
        _chat_id: i64,
        media: Vec<MediaAttachment>,
    ) -> Result<(), ChatError> {
        if self.fail_media_groups {
            return Err(ChatError::Exhausted("media group rejected".to_string()));
        }
        self.record(Sent::Album(media));
        Ok(())
    }

    async fn delete_message(&self, _chat_id: i64, message_id: i32) -> Result<(), ChatError> {
        self.record(Sent::Deleted { message_id });
        Ok(())
    }

    async fn send_chat_action(&self, _chat_id: i64, action: ChatAction) -> Result<(), ChatError> {
        self.record(Sent::Action(action));
        Ok(())
    }

    async fn answer_callback(&self, callback_id: &str) -> Result<(), ChatError> {
        self.record(Sent::CallbackAnswered(callback_id.to_string()));
        Ok(())
    }
}

/// Film with a poster URL derived from its id
#[must_use]
pub fn film(id: i64, title: &str) -> FilmRecord {
    FilmRecord {
        id,
        title: title.to_string(),
        year: "1999".to_string(),
        rating: "8.0".to_string(),
        description: format!("About {title}"),
        poster_url: format!("https://img/{id}.jpg"),
    }
}

#[must_use]
pub fn person(id: i64, name: &str, en_name: &str) -> PersonRecord {
    PersonRecord {
        id,
        name: name.to_string(),
        en_name: en_name.to_string(),
        sex: "Мужской".to_string(),
        photo_url: format!("https://img/p{id}.jpg"),
        birthday: "30 Jul 1970".to_string(),
    }
}

/// Catalog answering from fixed pages; unknown pages are empty
#[derive(Default)]
pub struct StaticCatalog {
    films: HashMap<(String, u32), Vec<FilmRecord>>,
    people: HashMap<(String, u32), Vec<PersonRecord>>,
    filmographies: HashMap<(i64, u32), Vec<FilmRecord>>,
    calls: AtomicUsize,
}

impl StaticCatalog {
    #[must_use]
    pub fn with_films(mut self, query: &str, page: u32, films: Vec<FilmRecord>) -> Self {
        self.films.insert((query.to_string(), page), films);
        self
    }

    #[must_use]
    pub fn with_people(mut self, query: &str, page: u32, people: Vec<PersonRecord>) -> Self {
        self.people.insert((query.to_string(), page), people);
        self
    }

    #[must_use]
    pub fn with_filmography(mut self, person_id: i64, page: u32, films: Vec<FilmRecord>) -> Self {
        self.filmographies.insert((person_id, page), films);
        self
    }

    /// Number of catalog calls made so far
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CatalogProvider for StaticCatalog {
    async fn search_films(&self, query: &str, page: u32) -> Result<Vec<FilmRecord>, CatalogError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .films
            .get(&(query.to_string(), page))
            .cloned()
            .unwrap_or_default())
    }

    async fn search_people(
        &self,
        query: &str,
        page: u32,
    ) -> Result<Vec<PersonRecord>, CatalogError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .people
            .get(&(query.to_string(), page))
            .cloned()
            .unwrap_or_default())
    }

    async fn films_by_person(
        &self,
        person_id: i64,
        page: u32,
    ) -> Result<Vec<FilmRecord>, CatalogError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .filmographies
            .get(&(person_id, page))
            .cloned()
            .unwrap_or_default())
    }
}

/// Poster source returning a tiny in-memory image named after the URL
#[derive(Default)]
pub struct StaticPosters {
    delays: HashMap<String, Duration>,
}

impl StaticPosters {
    /// Delays the answer for `url`.
    #[must_use]
    pub fn with_delay(mut self, url: &str, delay: Duration) -> Self {
        self.delays.insert(url.to_string(), delay);
        self
    }
}

#[async_trait]
impl PosterSource for StaticPosters {
    async fn get_poster(&self, url: &str) -> UploadableImage {
        if let Some(delay) = self.delays.get(url) {
            tokio::time::sleep(*delay).await;
        }

        let file_name = url
            .rsplit('/')
            .next()
            .filter(|name| !name.is_empty())
            .unwrap_or("not-found.png")
            .to_string();
        UploadableImage::Memory {
            file_name,
            bytes: Bytes::from_static(b"poster"),
        }
    }
}
