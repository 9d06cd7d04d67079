//! Bulk movie ingestion from uploaded CSV or JSON files
//!
//! Files are parsed into typed [`NewMovie`] records and each record is upserted
//! by title on its own. A bad record is logged and counted; it never stops the
//! rest of the file and never rolls back earlier records.
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{
    db::Repository,
    error::{AppError, AppResult},
    models::NewMovie,
    services::movies::upsert_movie,
};

/// Upload formats the ingester understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Csv,
    Json,
}

impl MediaType {
    /// Resolves a declared content type such as `text/csv; charset=utf-8`
    pub fn from_declared(declared: &str) -> AppResult<Self> {
        let essence = declared
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        match essence.as_str() {
            "text/csv" => Ok(MediaType::Csv),
            "application/json" => Ok(MediaType::Json),
            _ => Err(AppError::UnsupportedType(format!(
                "'{}' is not supported, upload text/csv or application/json",
                declared
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MediaType::Csv => "text/csv",
            MediaType::Json => "application/json",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            MediaType::Csv => "csv",
            MediaType::Json => "json",
        }
    }
}

/// Outcome of one ingestion run
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IngestSummary {
    /// Records iterated, whether or not they were stored
    pub processed: usize,
    pub created: usize,
    pub updated: usize,
    pub failed: usize,
}

/// Parses `path` as `declared_media_type` and upserts every record.
///
/// An unsupported media type is rejected before the file is opened.
pub async fn ingest(
    repo: &dyn Repository,
    path: &Path,
    declared_media_type: &str,
) -> AppResult<IngestSummary> {
    let media_type = MediaType::from_declared(declared_media_type)?;
    ingest_as(repo, path, media_type).await
}

pub async fn ingest_as(
    repo: &dyn Repository,
    path: &Path,
    media_type: MediaType,
) -> AppResult<IngestSummary> {
    let owned: PathBuf = path.to_path_buf();
    let records = tokio::task::spawn_blocking(move || read_records(&owned, media_type))
        .await
        .map_err(|e| AppError::Internal(format!("ingestion parser task failed: {}", e)))??;

    let mut summary = IngestSummary::default();
    for (index, record) in records.into_iter().enumerate() {
        summary.processed += 1;
        let outcome = match record {
            Ok(movie) => upsert_movie(repo, movie).await,
            Err(e) => Err(e),
        };
        match outcome {
            Ok((_, true)) => summary.created += 1,
            Ok((_, false)) => summary.updated += 1,
            Err(e) => {
                summary.failed += 1;
                tracing::warn!(record = index + 1, error = %e, "Skipping movie record");
            }
        }
    }

    tracing::info!(
        path = %path.display(),
        media_type = media_type.as_str(),
        processed = summary.processed,
        created = summary.created,
        updated = summary.updated,
        failed = summary.failed,
        "Ingestion finished"
    );
    Ok(summary)
}

/// Per-record parse results; the outer error means the file as a whole is unusable
type ParsedRecords = Vec<AppResult<NewMovie>>;

fn read_records(path: &Path, media_type: MediaType) -> AppResult<ParsedRecords> {
    let reader = BufReader::new(File::open(path)?);
    match media_type {
        MediaType::Csv => parse_csv(reader),
        MediaType::Json => parse_json(reader),
    }
}

/// Column positions resolved from the CSV header row
struct CsvColumns {
    title: usize,
    genres: Option<usize>,
    country: Option<usize>,
    extra_data: Option<usize>,
    release_year: Option<usize>,
}

impl CsvColumns {
    fn from_headers(headers: &csv::StringRecord) -> AppResult<Self> {
        let header_map: HashMap<String, usize> = headers
            .iter()
            .enumerate()
            .map(|(i, h)| (h.trim().to_ascii_lowercase(), i))
            .collect();
        let column = |names: &[&str]| names.iter().find_map(|n| header_map.get(*n).copied());

        let title = column(&["title"]).ok_or_else(|| {
            AppError::Validation(format!(
                "CSV is missing required column: title. Available columns: {:?}",
                headers.iter().collect::<Vec<_>>()
            ))
        })?;

        Ok(Self {
            title,
            genres: column(&["genres", "genre"]),
            country: column(&["country", "countries"]),
            extra_data: column(&["extra_data"]),
            release_year: column(&["release_year", "year"]),
        })
    }
}

/// CSV with a header row. No field-size ceiling applies; long genre lists or
/// `extra_data` blobs are read whole.
fn parse_csv<R: Read>(input: R) -> AppResult<ParsedRecords> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(input);

    let headers = reader
        .headers()
        .map_err(|e| AppError::Validation(format!("unreadable CSV header: {}", e)))?
        .clone();
    let columns = CsvColumns::from_headers(&headers)?;

    let mut records = Vec::new();
    for (row, result) in reader.records().enumerate() {
        let parsed = result
            .map_err(|e| AppError::Validation(format!("row {}: malformed CSV: {}", row + 1, e)))
            .and_then(|record| csv_record(&record, &columns))
            .map_err(|e| match e {
                AppError::Validation(msg) if !msg.starts_with("row ") => {
                    AppError::Validation(format!("row {}: {}", row + 1, msg))
                }
                other => other,
            });
        records.push(parsed);
    }
    Ok(records)
}

fn csv_record(record: &csv::StringRecord, columns: &CsvColumns) -> AppResult<NewMovie> {
    let field = |index: Option<usize>| {
        index
            .and_then(|i| record.get(i))
            .filter(|value| !value.is_empty())
    };

    let title = field(Some(columns.title))
        .ok_or_else(|| AppError::Validation("title is required".to_string()))?;

    let release_year = field(columns.release_year)
        .map(|raw| {
            raw.parse::<i32>().map_err(|_| {
                AppError::Validation(format!("release_year '{}' is not an integer", raw))
            })
        })
        .transpose()?;

    let extra_data = match field(columns.extra_data) {
        Some(raw) => parse_extra_data(raw)?,
        None => Map::new(),
    };

    Ok(NewMovie {
        title: title.to_string(),
        genres: field(columns.genres).map(split_genres).unwrap_or_default(),
        country: field(columns.country).map(str::to_string),
        extra_data,
        release_year,
    })
}

fn split_genres(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|g| !g.is_empty())
        .map(str::to_string)
        .collect()
}

/// `extra_data` cells hold a JSON object; dumps written with Python dict
/// syntax (single-quoted strings, `True`/`False`/`None`) are accepted too.
fn parse_extra_data(raw: &str) -> AppResult<Map<String, Value>> {
    serde_json::from_str::<Map<String, Value>>(raw)
        .or_else(|_| serde_json::from_str::<Map<String, Value>>(&python_literal_to_json(raw)))
        .map_err(|e| AppError::Validation(format!("extra_data is not a JSON object: {}", e)))
}

/// Rewrites single-quoted strings as JSON strings. Quotes inside either kind
/// of string are left alone, so `"Schindler's List"` survives.
fn python_literal_to_json(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    let mut word = String::new();

    let flush_word = |word: &mut String, out: &mut String| {
        match word.as_str() {
            "True" => out.push_str("true"),
            "False" => out.push_str("false"),
            "None" => out.push_str("null"),
            other => out.push_str(other),
        }
        word.clear();
    };

    while let Some(c) = chars.next() {
        if c.is_ascii_alphanumeric() || c == '_' {
            word.push(c);
            continue;
        }
        flush_word(&mut word, &mut out);

        match c {
            '"' => {
                out.push('"');
                while let Some(c) = chars.next() {
                    out.push(c);
                    match c {
                        '\\' => {
                            if let Some(escaped) = chars.next() {
                                out.push(escaped);
                            }
                        }
                        '"' => break,
                        _ => {}
                    }
                }
            }
            '\'' => {
                out.push('"');
                while let Some(c) = chars.next() {
                    match c {
                        '\\' => match chars.next() {
                            Some('\'') => out.push('\''),
                            Some(escaped) => {
                                out.push('\\');
                                out.push(escaped);
                            }
                            None => out.push('\\'),
                        },
                        '"' => out.push_str("\\\""),
                        '\'' => break,
                        other => out.push(other),
                    }
                }
                out.push('"');
            }
            other => out.push(other),
        }
    }
    flush_word(&mut word, &mut out);
    out
}

/// `genres` in JSON uploads may be a list or a comma-separated string
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum GenresField {
    List(Vec<String>),
    Joined(String),
}

#[derive(Debug, Deserialize)]
struct JsonMovie {
    title: Option<String>,
    genres: Option<GenresField>,
    country: Option<String>,
    extra_data: Option<Map<String, Value>>,
    release_year: Option<i32>,
}

impl JsonMovie {
    fn into_record(self) -> AppResult<NewMovie> {
        let title = self
            .title
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| AppError::Validation("title is required".to_string()))?;
        let genres = match self.genres {
            Some(GenresField::List(list)) => list,
            Some(GenresField::Joined(joined)) => split_genres(&joined),
            None => Vec::new(),
        };
        Ok(NewMovie {
            title,
            genres,
            country: self.country.filter(|c| !c.is_empty()),
            extra_data: self.extra_data.unwrap_or_default(),
            release_year: self.release_year,
        })
    }
}

/// A top-level JSON array of movie objects
fn parse_json<R: Read>(input: R) -> AppResult<ParsedRecords> {
    let items: Vec<Value> = serde_json::from_reader(input).map_err(|e| {
        AppError::Validation(format!("expected a JSON array of movie objects: {}", e))
    })?;

    Ok(items
        .into_iter()
        .enumerate()
        .map(|(index, item)| {
            serde_json::from_value::<JsonMovie>(item)
                .map_err(|e| AppError::Validation(format!("record {}: {}", index + 1, e)))
                .and_then(JsonMovie::into_record)
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use chrono::{Datelike, Utc};
    use serde_json::json;
    use tempfile::NamedTempFile;

    use super::*;
    use crate::db::{MemoryRepository, MockRepository};
    use crate::models::PageRequest;

    fn fixture(contents: &[u8]) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents).unwrap();
        file
    }

    fn all_movies() -> PageRequest {
        PageRequest {
            page: 1,
            page_size: 100,
        }
    }

    #[test]
    fn test_media_type_resolution() {
        assert_eq!(MediaType::from_declared("text/csv").unwrap(), MediaType::Csv);
        assert_eq!(
            MediaType::from_declared("Application/JSON; charset=utf-8").unwrap(),
            MediaType::Json
        );
        assert!(matches!(
            MediaType::from_declared("text/plain"),
            Err(AppError::UnsupportedType(_))
        ));
    }

    #[test]
    fn test_parse_csv_upload_sample() {
        let data = b"title,genres,extra_data\ntest,comedy,{\"directors\": [\"name\"]}\n";
        let records = parse_csv(&data[..]).unwrap();
        assert_eq!(records.len(), 1);
        let movie = records[0].as_ref().unwrap();
        assert_eq!(movie.title, "test");
        assert_eq!(movie.genres, vec!["comedy".to_string()]);
        assert_eq!(movie.extra_data["directors"], json!(["name"]));
    }

    #[test]
    fn test_parse_csv_full_row() {
        let data = "title,genres,country,extra_data,release_year\n\
                    Inception,\"Action, Sci-Fi\",United States,\"{'directors': 'Christopher Nolan'}\",2010\n";
        let records = parse_csv(data.as_bytes()).unwrap();
        let movie = records[0].as_ref().unwrap();
        assert_eq!(movie.genres, vec!["Action".to_string(), "Sci-Fi".to_string()]);
        assert_eq!(movie.country.as_deref(), Some("United States"));
        assert_eq!(movie.extra_data["directors"], json!("Christopher Nolan"));
        assert_eq!(movie.release_year, Some(2010));
    }

    #[test]
    fn test_python_dict_with_apostrophes() {
        let raw = r#"{'director': "Steven Spielberg", 'title': "Schindler's List",
                      'awards': ['Oscar'], 'restored': True, 'sequel': None,
                      'tagline': 'He said "no"'}"#;
        let extra = parse_extra_data(raw).unwrap();
        assert_eq!(extra["title"], json!("Schindler's List"));
        assert_eq!(extra["awards"], json!(["Oscar"]));
        assert_eq!(extra["restored"], json!(true));
        assert_eq!(extra["sequel"], json!(null));
        assert_eq!(extra["tagline"], json!("He said \"no\""));

        let escaped = parse_extra_data(r"{'title': 'Schindler\'s List'}").unwrap();
        assert_eq!(escaped["title"], json!("Schindler's List"));
    }

    #[test]
    fn test_parse_csv_huge_field() {
        let genres: Vec<String> = (0..50_000).map(|i| format!("genre{}", i)).collect();
        let data = format!("title,genres\nEpic,\"{}\"\n", genres.join(","));
        let records = parse_csv(data.as_bytes()).unwrap();
        assert_eq!(records[0].as_ref().unwrap().genres.len(), 50_000);
    }

    #[test]
    fn test_parse_csv_bad_rows_are_isolated() {
        let data = "title,release_year\nGood,1999\n,2000\nBad Year,nineteen\n";
        let records = parse_csv(data.as_bytes()).unwrap();
        assert_eq!(records.len(), 3);
        assert!(records[0].is_ok());
        assert!(matches!(records[1], Err(AppError::Validation(_))));
        assert!(matches!(records[2], Err(AppError::Validation(_))));
    }

    #[test]
    fn test_parse_csv_requires_title_column() {
        let data = "name,genres\nX,Drama\n";
        assert!(matches!(
            parse_csv(data.as_bytes()),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn test_parse_json_upload_sample() {
        let data = br#"[{"title": "test", "genres": ["comedy"], "extra_data": {"directors": ["name"]}},
                        {"title": "joined", "genres": "Drama, Crime", "release_year": 1994},
                        {"genres": ["untitled"]}]"#;
        let records = parse_json(&data[..]).unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].as_ref().unwrap().genres, vec!["comedy".to_string()]);
        assert_eq!(
            records[1].as_ref().unwrap().genres,
            vec!["Drama".to_string(), "Crime".to_string()]
        );
        assert!(records[2].is_err());
    }

    #[test]
    fn test_parse_json_rejects_non_array() {
        assert!(matches!(
            parse_json(&br#"{"title": "x"}"#[..]),
            Err(AppError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_unsupported_type_writes_nothing() {
        let file = fixture(b"This is a test.");
        let repo = MockRepository::new();

        let err = ingest(&repo, file.path(), "text/plain").await.unwrap_err();
        assert!(matches!(err, AppError::UnsupportedType(_)));
    }

    #[tokio::test]
    async fn test_ingest_csv_counts_and_upserts() {
        let next_year = Utc::now().year() + 1;
        let csv = format!(
            "title,genres,release_year\nHeat,Crime,1995\nHeat,\"Crime, Thriller\",1995\nFuture,Sci-Fi,{}\n",
            next_year
        );
        let file = fixture(csv.as_bytes());
        let repo = MemoryRepository::new();

        let summary = ingest(&repo, file.path(), "text/csv").await.unwrap();
        assert_eq!(
            summary,
            IngestSummary {
                processed: 3,
                created: 1,
                updated: 1,
                failed: 1,
            }
        );

        let (movies, count) = repo.list_movies(all_movies()).await.unwrap();
        assert_eq!(count, 1);
        assert_eq!(movies[0].genres, vec!["Crime".to_string(), "Thriller".to_string()]);
    }

    #[tokio::test]
    async fn test_ingest_json() {
        let file = fixture(
            br#"[{"title": "test", "genres": ["comedy"], "extra_data": {"directors": ["name"]}}]"#,
        );
        let repo = MemoryRepository::new();

        let summary = ingest(&repo, file.path(), "application/json").await.unwrap();
        assert_eq!(summary.created, 1);

        let (movies, _) = repo.list_movies(all_movies()).await.unwrap();
        assert_eq!(movies[0].title, "test");
        assert_eq!(movies[0].extra_data["directors"], json!(["name"]));
    }
}
