//! Inline button callback tokens
//!
//! Tokens have the shape `<action>[:<param>]`. They are parsed into
//! [`Callback`] at the boundary so the router never sees raw strings.

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub const CALLBACK_CANCEL: &str = "cancel_search";
pub const CALLBACK_MOVIE_PAGE: &str = "movie_page";
pub const CALLBACK_PERSON_PAGE: &str = "person_page";
pub const CALLBACK_PERSON_SELECT: &str = "person_select";
pub const CALLBACK_PERSON_MOVIES_PAGE: &str = "person_movies_page";

/// Why a callback token was rejected
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CallbackError {
    #[error("empty callback token")]
    Malformed,
    #[error("unknown callback action: {0}")]
    UnknownAction(String),
    #[error("callback {0} requires a parameter")]
    MissingParameter(&'static str),
    #[error("invalid parameter {value:?} for callback {action}")]
    InvalidParameter { action: &'static str, value: String },
}

/// A parsed inline button press
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Callback {
    Cancel,
    MoviePage(u32),
    PersonPage(u32),
    PersonSelect(i64),
    PersonMoviesPage(u32),
}

/// Which listing a pagination row pages through
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pager {
    Movies,
    People,
    PersonMovies,
}

impl Pager {
    /// Callback that opens `page` of this listing.
    #[must_use]
    pub const fn callback(self, page: u32) -> Callback {
        match self {
            Self::Movies => Callback::MoviePage(page),
            Self::People => Callback::PersonPage(page),
            Self::PersonMovies => Callback::PersonMoviesPage(page),
        }
    }
}

fn parse_page(action: &'static str, param: Option<&str>) -> Result<u32, CallbackError> {
    let raw = param.ok_or(CallbackError::MissingParameter(action))?;
    match raw.parse::<u32>() {
        Ok(page) if page >= 1 => Ok(page),
        _ => Err(CallbackError::InvalidParameter {
            action,
            value: raw.to_string(),
        }),
    }
}

fn parse_person_id(action: &'static str, param: Option<&str>) -> Result<i64, CallbackError> {
    let raw = param.ok_or(CallbackError::MissingParameter(action))?;
    match raw.parse::<i64>() {
        Ok(id) if id >= 1 => Ok(id),
        _ => Err(CallbackError::InvalidParameter {
            action,
            value: raw.to_string(),
        }),
    }
}

impl FromStr for Callback {
    type Err = CallbackError;

    fn from_str(token: &str) -> Result<Self, Self::Err> {
        if token.is_empty() {
            return Err(CallbackError::Malformed);
        }

        let (action, param) = match token.split_once(':') {
            Some((action, param)) => (action, Some(param).filter(|p| !p.is_empty())),
            None => (token, None),
        };

        match action {
            CALLBACK_CANCEL => Ok(Self::Cancel),
            CALLBACK_MOVIE_PAGE => parse_page(CALLBACK_MOVIE_PAGE, param).map(Self::MoviePage),
            CALLBACK_PERSON_PAGE => parse_page(CALLBACK_PERSON_PAGE, param).map(Self::PersonPage),
            CALLBACK_PERSON_SELECT => {
                parse_person_id(CALLBACK_PERSON_SELECT, param).map(Self::PersonSelect)
            }
            CALLBACK_PERSON_MOVIES_PAGE => {
                parse_page(CALLBACK_PERSON_MOVIES_PAGE, param).map(Self::PersonMoviesPage)
            }
            other => Err(CallbackError::UnknownAction(other.to_string())),
        }
    }
}

impl fmt::Display for Callback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cancel => f.write_str(CALLBACK_CANCEL),
            Self::MoviePage(page) => write!(f, "{CALLBACK_MOVIE_PAGE}:{page}"),
            Self::PersonPage(page) => write!(f, "{CALLBACK_PERSON_PAGE}:{page}"),
            Self::PersonSelect(id) => write!(f, "{CALLBACK_PERSON_SELECT}:{id}"),
            Self::PersonMoviesPage(page) => write!(f, "{CALLBACK_PERSON_MOVIES_PAGE}:{page}"),
        }
    }
}
