//! Kino Search Bot
//!
//! A Telegram bot for searching films and actors/directors in the Kinopoisk
//! catalog, with poster albums, paginated results and per-chat sessions.

/// Telegram bot implementation
pub mod bot;
/// Film and person catalog client
pub mod catalog;
/// Configuration management
pub mod config;
/// Poster fetching and caching
pub mod images;
/// Per-chat search sessions
pub mod session;
/// In-process fakes for tests
pub mod testing;
pub mod utils;
