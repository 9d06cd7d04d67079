use chrono::{Datelike, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::error::{AppError, AppResult};

/// Year of the earliest known motion picture; nothing older is accepted.
pub const EARLIEST_RELEASE_YEAR: i32 = 1888;

pub const MAX_TITLE_LEN: usize = 255;

/// A stored movie row
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Movie {
    pub id: i64,
    pub title: String,
    pub genres: Vec<String>,
    pub country: Option<String>,
    pub extra_data: Map<String, Value>,
    pub release_year: Option<i32>,
}

impl Movie {
    /// Director credit used for watch-history snapshots.
    ///
    /// Reads `extra_data.director`, then `extra_data.directors`, and falls back
    /// to an empty list.
    pub fn director(&self) -> Value {
        self.extra_data
            .get("director")
            .or_else(|| self.extra_data.get("directors"))
            .cloned()
            .unwrap_or_else(|| Value::Array(Vec::new()))
    }

    /// Whether this row would collide with `other` on (title, country, release_year)
    pub fn same_identity(&self, other: &NewMovie) -> bool {
        self.title == other.title
            && self.country == other.country
            && self.release_year == other.release_year
    }
}

/// Typed movie record used for creates, full updates and ingestion upserts
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewMovie {
    pub title: String,
    #[serde(default)]
    pub genres: Vec<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub extra_data: Map<String, Value>,
    #[serde(default)]
    pub release_year: Option<i32>,
}

impl NewMovie {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            genres: Vec::new(),
            country: None,
            extra_data: Map::new(),
            release_year: None,
        }
    }

    pub fn with_release_year(mut self, year: i32) -> Self {
        self.release_year = Some(year);
        self
    }

    pub fn with_genres<I, S>(mut self, genres: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.genres = genres.into_iter().map(Into::into).collect();
        self
    }

    /// Checks field constraints before anything is written
    pub fn validate(&self) -> AppResult<()> {
        if self.title.trim().is_empty() {
            return Err(AppError::Validation("title is required".to_string()));
        }
        if self.title.chars().count() > MAX_TITLE_LEN {
            return Err(AppError::Validation(format!(
                "title must be at most {} characters",
                MAX_TITLE_LEN
            )));
        }
        if let Some(year) = self.release_year {
            validate_release_year(year)?;
        }
        Ok(())
    }
}

/// Partial update; absent fields keep their stored value.
///
/// `country` and `release_year` are nullable, so they carry two levels:
/// `None` means absent, `Some(None)` means an explicit `null` that clears it.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MoviePatch {
    pub title: Option<String>,
    pub genres: Option<Vec<String>>,
    #[serde(default, deserialize_with = "present")]
    pub country: Option<Option<String>>,
    pub extra_data: Option<Map<String, Value>>,
    #[serde(default, deserialize_with = "present")]
    pub release_year: Option<Option<i32>>,
}

/// Marks a field that appeared in the body, even as `null`
fn present<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

impl MoviePatch {
    pub fn apply_to(self, movie: &Movie) -> NewMovie {
        NewMovie {
            title: self.title.unwrap_or_else(|| movie.title.clone()),
            genres: self.genres.unwrap_or_else(|| movie.genres.clone()),
            country: self.country.unwrap_or_else(|| movie.country.clone()),
            extra_data: self.extra_data.unwrap_or_else(|| movie.extra_data.clone()),
            release_year: self.release_year.unwrap_or(movie.release_year),
        }
    }
}

pub fn validate_release_year(year: i32) -> AppResult<()> {
    validate_release_year_against(year, Utc::now().year())
}

fn validate_release_year_against(year: i32, current_year: i32) -> AppResult<()> {
    if (EARLIEST_RELEASE_YEAR..=current_year).contains(&year) {
        Ok(())
    } else {
        Err(AppError::Validation(format!(
            "release_year must be between {} and {}, got {}",
            EARLIEST_RELEASE_YEAR, current_year, year
        )))
    }
}
