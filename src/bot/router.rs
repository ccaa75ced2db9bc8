//! Conversation state machine
//!
//! Each update is classified into an [`Inbound`] event and handled to
//! completion. Session writes happen only on a kind change or after a
//! non-empty page was fetched, so a failed or empty fetch never moves the
//! page cursor.

use super::callback::{Callback, CallbackError, Pager};
use super::platform::{ChatPlatform, OutgoingText};
use super::render::ResponseAssembler;
use super::views::{
    cancel_keyboard, main_menu_keyboard, DefaultSearchView, SearchView, MENU_SEARCH_FILMS,
    MENU_SEARCH_PEOPLE,
};
use crate::catalog::{CatalogProvider, FilmRecord, PersonRecord};
use crate::images::PosterSource;
use crate::session::{SearchKind, SessionState, SessionStore};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// A classified incoming update
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// `/start`
    Start,
    /// `/help`
    Help,
    /// Any non-command message; empty when the message had no text
    Text(String),
    /// Inline button press
    Callback { id: String, data: String },
}

/// Routes updates to the search handlers
pub struct Router {
    catalog: Arc<dyn CatalogProvider>,
    sessions: Arc<dyn SessionStore>,
    chat: Arc<dyn ChatPlatform>,
    assembler: ResponseAssembler,
}

impl Router {
    #[must_use]
    pub fn new(
        catalog: Arc<dyn CatalogProvider>,
        sessions: Arc<dyn SessionStore>,
        posters: Arc<dyn PosterSource>,
        chat: Arc<dyn ChatPlatform>,
    ) -> Self {
        let assembler = ResponseAssembler::new(Arc::clone(&chat), posters);
        Self {
            catalog,
            sessions,
            chat,
            assembler,
        }
    }

    /// Handles one update for `chat_id` to completion.
    pub async fn handle(&self, chat_id: i64, inbound: Inbound) {
        match inbound {
            Inbound::Start => {
                self.reply_with_menu(chat_id, DefaultSearchView::welcome_message())
                    .await;
            }
            Inbound::Help => {
                self.reply_with_menu(chat_id, DefaultSearchView::help_message())
                    .await;
            }
            Inbound::Text(text) => match text.as_str() {
                MENU_SEARCH_FILMS => self.await_query(chat_id, SearchKind::AwaitingFilmQuery).await,
                MENU_SEARCH_PEOPLE => {
                    self.await_query(chat_id, SearchKind::AwaitingPersonQuery)
                        .await;
                }
                _ => self.process_search_query(chat_id, &text).await,
            },
            Inbound::Callback { id, data } => self.handle_callback(chat_id, &id, &data).await,
        }
    }

    async fn reply(&self, chat_id: i64, text: &str) {
        self.assembler
            .send(chat_id, OutgoingText::plain(text))
            .await;
    }

    async fn reply_with_menu(&self, chat_id: i64, text: &str) {
        self.assembler
            .send(
                chat_id,
                OutgoingText::plain(text).with_markup(main_menu_keyboard()),
            )
            .await;
    }

    async fn save(&self, chat_id: i64, state: &SessionState) {
        if let Err(e) = self.sessions.put(chat_id, state).await {
            error!(chat_id, error = %e, "Failed to save session");
        }
    }

    /// Reads the session; store failures read as "no session".
    async fn load(&self, chat_id: i64) -> Option<SessionState> {
        match self.sessions.get(chat_id).await {
            Ok(state) => state,
            Err(e) => {
                error!(chat_id, error = %e, "Failed to load session");
                None
            }
        }
    }

    async fn films_page(&self, query: &str, page: u32) -> Vec<FilmRecord> {
        self.catalog
            .search_films(query, page)
            .await
            .unwrap_or_else(|e| {
                error!(query, page, error = %e, "Film search failed");
                Vec::new()
            })
    }

    async fn people_page(&self, query: &str, page: u32) -> Vec<PersonRecord> {
        self.catalog
            .search_people(query, page)
            .await
            .unwrap_or_else(|e| {
                error!(query, page, error = %e, "Person search failed");
                Vec::new()
            })
    }

    async fn person_films_page(&self, person_id: i64, page: u32) -> Vec<FilmRecord> {
        self.catalog
            .films_by_person(person_id, page)
            .await
            .unwrap_or_else(|e| {
                error!(person_id, page, error = %e, "Filmography lookup failed");
                Vec::new()
            })
    }

    async fn await_query(&self, chat_id: i64, kind: SearchKind) {
        self.save(chat_id, &SessionState::awaiting(kind)).await;

        let prompt = if kind == SearchKind::AwaitingPersonQuery {
            DefaultSearchView::person_query_prompt()
        } else {
            DefaultSearchView::film_query_prompt()
        };
        self.assembler
            .send(
                chat_id,
                OutgoingText::plain(prompt).with_markup(cancel_keyboard()),
            )
            .await;
    }

    async fn process_search_query(&self, chat_id: i64, text: &str) {
        let state = match self.sessions.get(chat_id).await {
            Ok(Some(state)) => state,
            Ok(None) => {
                self.reply_with_menu(chat_id, DefaultSearchView::choose_search_type())
                    .await;
                return;
            }
            Err(e) => {
                error!(chat_id, error = %e, "Failed to load session");
                self.reply_with_menu(chat_id, DefaultSearchView::session_expired())
                    .await;
                return;
            }
        };

        let query = text.trim();
        if query.is_empty() {
            self.reply_with_menu(chat_id, DefaultSearchView::empty_query())
                .await;
            return;
        }

        let kind = state.kind.query_target();
        self.save(chat_id, &SessionState::searching(kind, query))
            .await;
        info!(chat_id, ?kind, query, "New search");

        if kind == SearchKind::PagingPeople {
            let people = self.people_page(query, 1).await;
            if people.is_empty() {
                self.reply_with_menu(chat_id, DefaultSearchView::people_not_found())
                    .await;
                return;
            }
            self.assembler.render_people(chat_id, &people, 1).await;
        } else {
            let films = self.films_page(query, 1).await;
            if films.is_empty() {
                self.reply_with_menu(chat_id, DefaultSearchView::films_not_found())
                    .await;
                return;
            }
            self.assembler
                .render_films(chat_id, &films, 1, Pager::Movies)
                .await;
        }
    }

    async fn handle_callback(&self, chat_id: i64, callback_id: &str, data: &str) {
        if let Err(e) = self.chat.answer_callback(callback_id).await {
            warn!(chat_id, error = %e, "Failed to answer callback query");
        }

        let callback = match data.parse::<Callback>() {
            Ok(callback) => callback,
            Err(CallbackError::MissingParameter(action)) => {
                debug!(chat_id, action, "Callback without parameter");
                self.reply_with_menu(chat_id, DefaultSearchView::session_expired())
                    .await;
                return;
            }
            Err(e) => {
                warn!(chat_id, data, error = %e, "Dropping invalid callback");
                return;
            }
        };

        debug!(chat_id, %callback, "Callback received");
        match callback {
            Callback::Cancel => self.cancel_search(chat_id).await,
            Callback::MoviePage(page) => self.movie_page(chat_id, page).await,
            Callback::PersonPage(page) => self.person_page(chat_id, page).await,
            Callback::PersonSelect(person_id) => self.person_select(chat_id, person_id).await,
            Callback::PersonMoviesPage(page) => self.person_movies_page(chat_id, page).await,
        }
    }

    async fn cancel_search(&self, chat_id: i64) {
        if let Err(e) = self.sessions.delete(chat_id).await {
            error!(chat_id, error = %e, "Failed to delete session");
        }
        self.reply_with_menu(chat_id, DefaultSearchView::search_cancelled())
            .await;
    }

    async fn movie_page(&self, chat_id: i64, page: u32) {
        let Some(state) = self
            .load(chat_id)
            .await
            .filter(|s| s.kind == SearchKind::PagingFilms && !s.query.is_empty())
        else {
            self.reply_with_menu(chat_id, DefaultSearchView::session_expired())
                .await;
            return;
        };

        let films = self.films_page(&state.query, page).await;
        if films.is_empty() {
            self.reply(chat_id, DefaultSearchView::no_more_films()).await;
            return;
        }

        self.save(chat_id, &state.at_page(page)).await;
        self.assembler
            .render_films(chat_id, &films, page, Pager::Movies)
            .await;
    }

    async fn person_page(&self, chat_id: i64, page: u32) {
        let Some(state) = self
            .load(chat_id)
            .await
            .filter(|s| s.kind == SearchKind::PagingPeople && !s.query.is_empty())
        else {
            self.reply_with_menu(chat_id, DefaultSearchView::session_expired())
                .await;
            return;
        };

        let people = self.people_page(&state.query, page).await;
        if people.is_empty() {
            self.reply(chat_id, DefaultSearchView::no_more_people()).await;
            return;
        }

        self.save(chat_id, &state.at_page(page)).await;
        self.assembler.render_people(chat_id, &people, page).await;
    }

    async fn person_select(&self, chat_id: i64, person_id: i64) {
        self.save(chat_id, &SessionState::person_films(person_id))
            .await;

        let films = self.person_films_page(person_id, 1).await;
        self.assembler
            .render_films(chat_id, &films, 1, Pager::PersonMovies)
            .await;
    }

    async fn person_movies_page(&self, chat_id: i64, page: u32) {
        let Some(state) = self
            .load(chat_id)
            .await
            .filter(|s| s.kind == SearchKind::PagingPersonFilms)
        else {
            warn!(chat_id, "Filmography page requested without a person session");
            self.reply_with_menu(chat_id, DefaultSearchView::session_expired())
                .await;
            return;
        };

        let films = self.person_films_page(state.person_id, page).await;
        if films.is_empty() {
            self.reply(chat_id, DefaultSearchView::no_more_films()).await;
            return;
        }

        self.save(chat_id, &state.at_page(page)).await;
        self.assembler
            .render_films(chat_id, &films, page, Pager::PersonMovies)
            .await;
    }
}
