//! Wire shapes of catalog responses and their normalization into records.

use super::{FilmRecord, PersonRecord};
use chrono::DateTime;
use serde::Deserialize;
use tracing::warn;

/// Envelope shared by every catalog search endpoint
#[derive(Debug, Deserialize)]
pub struct DocsResponse<T> {
    #[serde(default = "Vec::new")]
    pub docs: Vec<T>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct FilmDoc {
    pub id: i64,
    pub name: Option<String>,
    pub year: Option<i32>,
    pub description: Option<String>,
    pub poster: Option<PosterDoc>,
    pub rating: Option<RatingDoc>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct PosterDoc {
    pub url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RatingDoc {
    pub kp: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PersonDoc {
    pub id: i64,
    pub name: Option<String>,
    pub en_name: Option<String>,
    pub sex: Option<String>,
    pub photo: Option<String>,
    pub birthday: Option<String>,
}

impl FilmDoc {
    /// Converts into a record; films without a title are dropped.
    pub fn into_record(self) -> Option<FilmRecord> {
        let title = self.name.filter(|n| !n.is_empty())?;
        let year = match self.year {
            Some(y) if y > 0 => y.to_string(),
            _ => String::new(),
        };
        let rating = self.rating.and_then(|r| r.kp).unwrap_or(0.0);

        Some(FilmRecord {
            id: self.id,
            title,
            year,
            rating: format!("{rating:.1}"),
            description: self.description.unwrap_or_default(),
            poster_url: self.poster.and_then(|p| p.url).unwrap_or_default(),
        })
    }
}

impl PersonDoc {
    /// Converts into a record; people without a photo or a parseable birthday are dropped.
    pub fn into_record(self) -> Option<PersonRecord> {
        let photo_url = self.photo.filter(|p| !p.is_empty())?;
        let raw_birthday = self.birthday.filter(|b| !b.is_empty())?;

        let birthday = match DateTime::parse_from_rfc3339(&raw_birthday) {
            Ok(dt) => dt.format("%d %b %Y").to_string(),
            Err(e) => {
                warn!(person_id = self.id, birthday = %raw_birthday, error = %e, "Dropping person with malformed birthday");
                return None;
            }
        };

        Some(PersonRecord {
            id: self.id,
            name: self.name.unwrap_or_default(),
            en_name: self.en_name.unwrap_or_default(),
            sex: self.sex.unwrap_or_default(),
            photo_url,
            birthday,
        })
    }
}

/// Normalizes a film page, keeping catalog order.
pub fn films_from(response: DocsResponse<FilmDoc>) -> Vec<FilmRecord> {
    response
        .docs
        .into_iter()
        .filter_map(FilmDoc::into_record)
        .collect()
}

/// Normalizes a person page, keeping catalog order.
pub fn people_from(response: DocsResponse<PersonDoc>) -> Vec<PersonRecord> {
    response
        .docs
        .into_iter()
        .filter_map(PersonDoc::into_record)
        .collect()
}
