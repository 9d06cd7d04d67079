use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};

pub const MAX_ISBN_LEN: usize = 13;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Book {
    pub id: i64,
    pub title: String,
    pub author: String,
    pub isbn: String,
    pub publication_year: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewBook {
    pub title: String,
    pub author: String,
    pub isbn: String,
    pub publication_year: i32,
}

impl NewBook {
    pub fn validate(&self) -> AppResult<()> {
        if self.title.trim().is_empty() {
            return Err(AppError::Validation("title is required".to_string()));
        }
        if self.author.trim().is_empty() {
            return Err(AppError::Validation("author is required".to_string()));
        }
        if self.isbn.chars().count() > MAX_ISBN_LEN {
            return Err(AppError::Validation(format!(
                "isbn must be at most {} characters",
                MAX_ISBN_LEN
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BookPatch {
    pub title: Option<String>,
    pub author: Option<String>,
    pub isbn: Option<String>,
    pub publication_year: Option<i32>,
}

impl BookPatch {
    pub fn apply_to(self, book: &Book) -> NewBook {
        NewBook {
            title: self.title.unwrap_or_else(|| book.title.clone()),
            author: self.author.unwrap_or_else(|| book.author.clone()),
            isbn: self.isbn.unwrap_or_else(|| book.isbn.clone()),
            publication_year: self.publication_year.unwrap_or(book.publication_year),
        }
    }
}
