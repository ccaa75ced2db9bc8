//! Response assembly for film and person listings
//!
//! Films go out as a poster album, a linked description and a pagination row.
//! People go out as one message with selection buttons. Send failures are
//! logged per call and never abort the rest of the response.

use super::callback::Pager;
use super::platform::{ChatPlatform, MediaAttachment, OutgoingText};
use super::views::{
    film_caption, film_link, films_description, pagination_keyboard, people_description,
    people_keyboard, DefaultSearchView, SearchView,
};
use crate::catalog::{FilmRecord, PersonRecord};
use crate::images::{PosterSource, UploadableImage};
use std::sync::Arc;
use std::time::Instant;
use teloxide::types::ChatAction;
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

/// Sends search results to a chat
#[derive(Clone)]
pub struct ResponseAssembler {
    chat: Arc<dyn ChatPlatform>,
    posters: Arc<dyn PosterSource>,
}

impl ResponseAssembler {
    #[must_use]
    pub fn new(chat: Arc<dyn ChatPlatform>, posters: Arc<dyn PosterSource>) -> Self {
        Self { chat, posters }
    }

    /// Sends a text message, logging instead of failing.
    pub async fn send(&self, chat_id: i64, message: OutgoingText) -> Option<i32> {
        match self.chat.send_text(chat_id, message).await {
            Ok(id) => Some(id),
            Err(e) => {
                error!(chat_id, error = %e, "Failed to send message");
                None
            }
        }
    }

    /// Sends one page of films followed by its pagination row.
    pub async fn render_films(&self, chat_id: i64, films: &[FilmRecord], page: u32, pager: Pager) {
        let started = Instant::now();

        if films.is_empty() {
            self.send(chat_id, OutgoingText::plain(DefaultSearchView::films_not_found()))
                .await;
            return;
        }

        let notice = self
            .send(chat_id, OutgoingText::plain(DefaultSearchView::preparing_posters()))
            .await;

        let load_started = Instant::now();
        let posters = self.load_posters(films).await;
        debug!(
            chat_id,
            films = films.len(),
            elapsed_ms = load_started.elapsed().as_millis(),
            "Posters loaded"
        );

        let album: Vec<MediaAttachment> = films
            .iter()
            .zip(posters.iter())
            .map(|(film, poster)| MediaAttachment::Photo {
                media: poster.clone(),
                caption: Some(film_caption(film)),
            })
            .collect();

        if let Some(message_id) = notice {
            if let Err(e) = self.chat.delete_message(chat_id, message_id).await {
                warn!(chat_id, message_id, error = %e, "Failed to delete poster notice");
            }
        }

        self.chat_action(chat_id, ChatAction::UploadPhoto).await;

        if let Err(e) = self.chat.send_media_group(chat_id, album).await {
            error!(chat_id, error = %e, "Media group failed, sending films one by one");
            self.send_films_individually(chat_id, films, posters).await;
        }

        self.chat_action(chat_id, ChatAction::Typing).await;
        self.send(chat_id, OutgoingText::html(films_description(films)))
            .await;

        self.send(
            chat_id,
            OutgoingText::plain(DefaultSearchView::page_label(page))
                .with_markup(pagination_keyboard(pager, page)),
        )
        .await;

        debug!(
            chat_id,
            films = films.len(),
            page,
            elapsed_ms = started.elapsed().as_millis(),
            "Films rendered"
        );
    }

    /// Sends one page of people as a single message with selection buttons.
    pub async fn render_people(&self, chat_id: i64, people: &[PersonRecord], page: u32) {
        if people.is_empty() {
            self.send(chat_id, OutgoingText::plain(DefaultSearchView::people_not_found()))
                .await;
            return;
        }

        self.send(
            chat_id,
            OutgoingText::plain(people_description(people))
                .with_markup(people_keyboard(people, page)),
        )
        .await;
    }

    /// Fetches all posters concurrently, keeping the order of `films`.
    pub async fn load_posters(&self, films: &[FilmRecord]) -> Vec<UploadableImage> {
        let (tx, mut rx) = mpsc::channel(films.len().max(1));

        for (index, film) in films.iter().enumerate() {
            let tx = tx.clone();
            let posters = Arc::clone(&self.posters);
            let url = film.poster_url.clone();
            tokio::spawn(async move {
                let poster = posters.get_poster(&url).await;
                let _ = tx.send((index, poster)).await;
            });
        }
        // Channel closes once every task has sent and dropped its sender
        drop(tx);

        let mut slots: Vec<Option<UploadableImage>> = vec![None; films.len()];
        while let Some((index, poster)) = rx.recv().await {
            slots[index] = Some(poster);
        }

        let mut ordered = Vec::with_capacity(slots.len());
        for slot in slots {
            match slot {
                Some(poster) => ordered.push(poster),
                None => ordered.push(self.posters.get_poster("").await),
            }
        }
        ordered
    }

    async fn send_films_individually(
        &self,
        chat_id: i64,
        films: &[FilmRecord],
        posters: Vec<UploadableImage>,
    ) {
        for (i, (film, poster)) in films.iter().zip(posters).enumerate() {
            if let Err(e) = self
                .chat
                .send_photo(chat_id, poster, Some(film_caption(film)))
                .await
            {
                error!(chat_id, film = %film.title, error = %e, "Failed to send film poster");
            }

            let text = format!("{}. {}", i + 1, film_link(film));
            self.send(chat_id, OutgoingText::html(text)).await;
        }
    }

    async fn chat_action(&self, chat_id: i64, action: ChatAction) {
        if let Err(e) = self.chat.send_chat_action(chat_id, action).await {
            debug!(chat_id, ?action, error = %e, "Failed to send chat action");
        }
    }
}
