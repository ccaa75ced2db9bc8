//! Film and person catalog client
//!
//! Three read-only searches against the Kinopoisk-compatible REST API. Each call
//! returns at most one page of normalized records; no retries and no caching.

mod response;

use crate::config::{CatalogSettings, CATALOG_PAGE_SIZE};
use async_trait::async_trait;
use reqwest::{Client as HttpClient, StatusCode};
use response::{films_from, people_from, DocsResponse, FilmDoc, PersonDoc};
use serde::de::DeserializeOwned;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Errors returned by catalog operations
#[derive(Error, Debug)]
pub enum CatalogError {
    /// The catalog answered with a non-success status
    #[error("catalog unavailable: status {0}")]
    Unavailable(StatusCode),
    /// The request could not be completed
    #[error("catalog transport error: {0}")]
    Transport(#[from] reqwest::Error),
    /// The body did not match the expected shape
    #[error("catalog decode error: {0}")]
    Decode(String),
}

/// A film as shown to the user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilmRecord {
    pub id: i64,
    pub title: String,
    pub year: String,
    /// Rating with one decimal, e.g. `"8.5"`
    pub rating: String,
    pub description: String,
    /// May be empty
    pub poster_url: String,
}

/// An actor or director as shown to the user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersonRecord {
    pub id: i64,
    pub name: String,
    pub en_name: String,
    pub sex: String,
    pub photo_url: String,
    /// Formatted as `DD Mon YYYY`
    pub birthday: String,
}

/// Read-only catalog searches used by the router
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CatalogProvider: Send + Sync {
    /// Films matching a free-text query
    async fn search_films(&self, query: &str, page: u32) -> Result<Vec<FilmRecord>, CatalogError>;
    /// People matching a free-text query
    async fn search_people(&self, query: &str, page: u32)
        -> Result<Vec<PersonRecord>, CatalogError>;
    /// Filmography of a person, most voted first
    async fn films_by_person(
        &self,
        person_id: i64,
        page: u32,
    ) -> Result<Vec<FilmRecord>, CatalogError>;
}

/// HTTP implementation of [`CatalogProvider`]
pub struct KinopoiskClient {
    http: HttpClient,
    base_url: String,
    api_key: String,
}

impl KinopoiskClient {
    /// Creates a client for `settings.base_url` authenticated with `api_key`.
    ///
    /// # Errors
    ///
    /// Returns the builder error if the HTTP client cannot be initialized.
    pub fn new(
        settings: &CatalogSettings,
        api_key: impl Into<String>,
    ) -> Result<Self, reqwest::Error> {
        let http = HttpClient::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()?;

        Ok(Self {
            http,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        })
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, CatalogError> {
        let url = format!("{}{path}", self.base_url);
        let response = self
            .http
            .get(&url)
            .header("accept", "application/json")
            .header("X-API-KEY", &self.api_key)
            .query(query)
            .send()
            .await?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(CatalogError::Unavailable(status));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| CatalogError::Decode(e.to_string()))
    }

    fn page_query(page: u32) -> Vec<(&'static str, String)> {
        vec![
            ("page", page.to_string()),
            ("limit", CATALOG_PAGE_SIZE.to_string()),
        ]
    }
}

#[async_trait]
impl CatalogProvider for KinopoiskClient {
    async fn search_films(&self, query: &str, page: u32) -> Result<Vec<FilmRecord>, CatalogError> {
        let mut params = Self::page_query(page);
        params.push(("query", query.to_string()));

        let data: DocsResponse<FilmDoc> = self.get_json("/v1.4/movie/search", &params).await?;
        let films = films_from(data);
        debug!(query, page, count = films.len(), "Film search finished");
        Ok(films)
    }

    async fn search_people(
        &self,
        query: &str,
        page: u32,
    ) -> Result<Vec<PersonRecord>, CatalogError> {
        let mut params = Self::page_query(page);
        params.push(("query", query.to_string()));

        let data: DocsResponse<PersonDoc> = self.get_json("/v1.4/person/search", &params).await?;
        let people = people_from(data);
        debug!(query, page, count = people.len(), "Person search finished");
        Ok(people)
    }

    async fn films_by_person(
        &self,
        person_id: i64,
        page: u32,
    ) -> Result<Vec<FilmRecord>, CatalogError> {
        let mut params = Self::page_query(page);
        params.push(("sortField", "votes.imdb".to_string()));
        params.push(("sortType", "-1".to_string()));
        params.push(("persons.id", person_id.to_string()));

        let data: DocsResponse<FilmDoc> = self.get_json("/v1.4/movie", &params).await?;
        let films = films_from(data);
        debug!(person_id, page, count = films.len(), "Filmography lookup finished");
        Ok(films)
    }
}
