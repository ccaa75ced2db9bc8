//! Search UI components
//!
//! Contains keyboards, text messages, and formatters for the search dialogue.

use super::callback::{Callback, Pager};
use crate::catalog::{FilmRecord, PersonRecord};
use crate::config::TELEGRAM_CAPTION_LIMIT;
use crate::utils::truncate_utf16;
use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup, KeyboardButton, KeyboardMarkup};

// ─────────────────────────────────────────────────────────────────────────────
// Menu labels
// ─────────────────────────────────────────────────────────────────────────────

/// Main menu button that starts a film search
pub const MENU_SEARCH_FILMS: &str = "🎬 Поиск фильмов";
/// Main menu button that starts a person search
pub const MENU_SEARCH_PEOPLE: &str = "👤 Поиск актеров/режиссеров";

const KINOPOISK_FILM_URL: &str = "https://www.kinopoisk.ru/film";

// ─────────────────────────────────────────────────────────────────────────────
// Trait definition
// ─────────────────────────────────────────────────────────────────────────────

/// Trait for search UI view rendering
///
/// Provides all user-visible texts of the search dialogue.
pub trait SearchView {
    /// Greeting for `/start`
    fn welcome_message() -> &'static str;

    /// Usage text for `/help`
    fn help_message() -> &'static str;

    /// Prompt after the film menu button
    fn film_query_prompt() -> &'static str;

    /// Prompt after the person menu button
    fn person_query_prompt() -> &'static str;

    /// Text received without an active search
    fn choose_search_type() -> &'static str;

    /// Empty query received
    fn empty_query() -> &'static str;

    /// Search cancelled by the user
    fn search_cancelled() -> &'static str;

    /// Session missing or expired for a callback
    fn session_expired() -> &'static str;

    /// First page of a film listing is empty
    fn films_not_found() -> &'static str;

    /// First page of a person listing is empty
    fn people_not_found() -> &'static str;

    /// Further film page is empty
    fn no_more_films() -> &'static str;

    /// Further person page is empty
    fn no_more_people() -> &'static str;

    /// Transient notice while posters load
    fn preparing_posters() -> &'static str;

    /// Header of the person list
    fn people_header() -> &'static str;

    /// Text above the pagination row
    fn page_label(page: u32) -> String;
}

// ─────────────────────────────────────────────────────────────────────────────
// Default implementation
// ─────────────────────────────────────────────────────────────────────────────

/// Default Russian-language implementation of `SearchView`
pub struct DefaultSearchView;

impl SearchView for DefaultSearchView {
    fn welcome_message() -> &'static str {
        "Привет! Я бот для поиска фильмов и актеров/режиссеров в Кинопоиске.\n\nВыберите тип поиска:"
    }

    fn help_message() -> &'static str {
        r"Как использовать бота:

1. Выберите тип поиска
2. Введите запрос для поиска

Доступные команды:
/start - начать работу
/help - показать справку"
    }

    fn film_query_prompt() -> &'static str {
        "Введите название фильма для поиска:"
    }

    fn person_query_prompt() -> &'static str {
        "Введите имя актера или режиссера для поиска:"
    }

    fn choose_search_type() -> &'static str {
        "Пожалуйста, выберите тип поиска с помощью кнопок ниже 👇"
    }

    fn empty_query() -> &'static str {
        "Пожалуйста, укажите запрос для поиска"
    }

    fn search_cancelled() -> &'static str {
        "Поиск отменен"
    }

    fn session_expired() -> &'static str {
        "Сессия поиска истекла. Пожалуйста, начните поиск заново."
    }

    fn films_not_found() -> &'static str {
        "Фильмы не найдены"
    }

    fn people_not_found() -> &'static str {
        "Актеры/режиссеры не найдены"
    }

    fn no_more_films() -> &'static str {
        "Больше фильмов не найдено"
    }

    fn no_more_people() -> &'static str {
        "Больше актеров/режиссеров не найдено"
    }

    fn preparing_posters() -> &'static str {
        "⏳ Подготавливаю постеры.."
    }

    fn people_header() -> &'static str {
        "Результаты поиска актеров/режиссеров:\n\n"
    }

    fn page_label(page: u32) -> String {
        format!("Страница: {page}")
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Formatters
// ─────────────────────────────────────────────────────────────────────────────

/// Photo caption for a film, cut to the Telegram caption limit
#[must_use]
pub fn film_caption(film: &FilmRecord) -> String {
    let caption = format!(
        "🎬 {} ({})\n⭐ {}\n📖 {}",
        film.title, film.year, film.rating, film.description
    );
    truncate_utf16(&caption, TELEGRAM_CAPTION_LIMIT)
}

/// HTML link to the film page; the title is escaped
#[must_use]
pub fn film_link(film: &FilmRecord) -> String {
    format!(
        r#"<a href="{KINOPOISK_FILM_URL}/{}/">{} ({})</a>"#,
        film.id,
        html_escape::encode_text(&film.title),
        film.year
    )
}

/// Numbered list of film links, one per line
#[must_use]
pub fn films_description(films: &[FilmRecord]) -> String {
    films
        .iter()
        .enumerate()
        .map(|(i, film)| format!("{}. {}\n", i + 1, film_link(film)))
        .collect()
}

#[must_use]
pub fn person_line(person: &PersonRecord) -> String {
    format!("{} ({}), {}", person.name, person.en_name, person.birthday)
}

/// Person list with its header
#[must_use]
pub fn people_description(people: &[PersonRecord]) -> String {
    let mut text = DefaultSearchView::people_header().to_string();
    for (i, person) in people.iter().enumerate() {
        text.push_str(&format!("{}. {}\n", i + 1, person_line(person)));
    }
    text
}

// ─────────────────────────────────────────────────────────────────────────────
// Keyboards
// ─────────────────────────────────────────────────────────────────────────────

/// Persistent main menu with both search types
///
/// # Examples
///
/// ```
/// use kino_search_bot::bot::views::main_menu_keyboard;
/// let keyboard = main_menu_keyboard();
/// assert_eq!(keyboard.keyboard[0].len(), 2);
/// ```
#[must_use]
pub fn main_menu_keyboard() -> KeyboardMarkup {
    KeyboardMarkup::new(vec![vec![
        KeyboardButton::new(MENU_SEARCH_FILMS),
        KeyboardButton::new(MENU_SEARCH_PEOPLE),
    ]])
    .resize_keyboard()
}

/// Single "cancel search" inline button
#[must_use]
pub fn cancel_keyboard() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![vec![InlineKeyboardButton::callback(
        "❌ Отменить поиск",
        Callback::Cancel.to_string(),
    )]])
}

/// `⬅` (only past page 1) and `➡` buttons for `pager`
#[must_use]
pub fn pagination_row(pager: Pager, page: u32) -> Vec<InlineKeyboardButton> {
    let mut row = Vec::with_capacity(2);
    if page > 1 {
        row.push(InlineKeyboardButton::callback(
            "⬅",
            pager.callback(page - 1).to_string(),
        ));
    }
    row.push(InlineKeyboardButton::callback(
        "➡",
        pager.callback(page.saturating_add(1)).to_string(),
    ));
    row
}

#[must_use]
pub fn pagination_keyboard(pager: Pager, page: u32) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![pagination_row(pager, page)])
}

/// One row of person buttons followed by the person pagination row
#[must_use]
pub fn people_keyboard(people: &[PersonRecord], page: u32) -> InlineKeyboardMarkup {
    let selectors = people
        .iter()
        .map(|p| {
            InlineKeyboardButton::callback(p.name.clone(), Callback::PersonSelect(p.id).to_string())
        })
        .collect();
    InlineKeyboardMarkup::new(vec![selectors, pagination_row(Pager::People, page)])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::utf16_len;
    use teloxide::types::InlineKeyboardButtonKind;

    fn film(id: i64, title: &str, description: &str) -> FilmRecord {
        FilmRecord {
            id,
            title: title.to_string(),
            year: "1999".to_string(),
            rating: "8.5".to_string(),
            description: description.to_string(),
            poster_url: String::new(),
        }
    }

    fn callback_data(button: &InlineKeyboardButton) -> &str {
        match &button.kind {
            InlineKeyboardButtonKind::CallbackData(data) => data,
            other => panic!("expected callback button, got {other:?}"),
        }
    }

    #[test]
    fn test_caption_format() {
        let caption = film_caption(&film(1, "Матрица", "Хакер Нео"));
        assert_eq!(caption, "🎬 Матрица (1999)\n⭐ 8.5\n📖 Хакер Нео");
    }

    #[test]
    fn test_long_caption_is_cut_to_limit() {
        let caption = film_caption(&film(1, "Матрица", &"я".repeat(2000)));
        assert_eq!(utf16_len(&caption), 1024);
        assert!(caption.ends_with("..."));
    }

    #[test]
    fn test_film_link_escapes_title() {
        let link = film_link(&film(301, "Tom & Jerry <3>", ""));
        assert_eq!(
            link,
            r#"<a href="https://www.kinopoisk.ru/film/301/">Tom &amp; Jerry &lt;3&gt; (1999)</a>"#
        );
    }

    #[test]
    fn test_films_description_numbered() {
        let text = films_description(&[film(1, "A", ""), film(2, "B", "")]);
        assert!(text.starts_with("1. <a href=\"https://www.kinopoisk.ru/film/1/\">A (1999)</a>\n"));
        assert!(text.contains("\n2. <a href=\"https://www.kinopoisk.ru/film/2/\">B (1999)</a>\n"));
    }

    #[test]
    fn test_pagination_first_page_only_forward() {
        let row = pagination_row(Pager::Movies, 1);
        assert_eq!(row.len(), 1);
        assert_eq!(row[0].text, "➡");
        assert_eq!(callback_data(&row[0]), "movie_page:2");
    }

    #[test]
    fn test_pagination_later_page_both_ways() {
        let row = pagination_row(Pager::PersonMovies, 3);
        assert_eq!(row.len(), 2);
        assert_eq!(callback_data(&row[0]), "person_movies_page:2");
        assert_eq!(callback_data(&row[1]), "person_movies_page:4");
    }

    #[test]
    fn test_people_keyboard_layout() {
        let people = vec![
            PersonRecord {
                id: 7,
                name: "Кристофер Нолан".to_string(),
                en_name: "Christopher Nolan".to_string(),
                sex: "Мужской".to_string(),
                photo_url: "https://img/7.jpg".to_string(),
                birthday: "30 Jul 1970".to_string(),
            },
            PersonRecord {
                id: 8,
                name: "Джонатан Нолан".to_string(),
                en_name: "Jonathan Nolan".to_string(),
                sex: "Мужской".to_string(),
                photo_url: "https://img/8.jpg".to_string(),
                birthday: "06 Jun 1976".to_string(),
            },
        ];

        let keyboard = people_keyboard(&people, 1);
        assert_eq!(keyboard.inline_keyboard.len(), 2);
        assert_eq!(keyboard.inline_keyboard[0].len(), 2);
        assert_eq!(callback_data(&keyboard.inline_keyboard[0][0]), "person_select:7");
        assert_eq!(callback_data(&keyboard.inline_keyboard[1][0]), "person_page:2");

        let text = people_description(&people);
        assert!(text.starts_with("Результаты поиска актеров/режиссеров:\n\n"));
        assert!(text.contains("1. Кристофер Нолан (Christopher Nolan), 30 Jul 1970\n"));
    }

    #[test]
    fn test_cancel_keyboard() {
        let keyboard = cancel_keyboard();
        assert_eq!(callback_data(&keyboard.inline_keyboard[0][0]), "cancel_search");
    }
}
