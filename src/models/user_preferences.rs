use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::Movie;

/// Preference category (e.g. "genre") to the distinct values accumulated for it
pub type PreferenceMap = BTreeMap<String, Vec<Value>>;

/// A proposed preference payload, keyed by category
pub type ProposedPreferences = BTreeMap<String, PreferenceValue>;

/// A single proposed value or a list of them
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum PreferenceValue {
    Many(Vec<Value>),
    One(Value),
}

impl PreferenceValue {
    /// Normalizes to a sequence; a scalar becomes a one-element list
    pub fn values(&self) -> Vec<Value> {
        match self {
            PreferenceValue::Many(values) => values.clone(),
            PreferenceValue::One(value) => vec![value.clone()],
        }
    }
}

/// Copy of a movie's metadata taken when it was watched
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WatchEntry {
    pub title: String,
    pub year: Option<i32>,
    pub director: Value,
    pub genres: Vec<String>,
}

impl From<&Movie> for WatchEntry {
    fn from(movie: &Movie) -> Self {
        Self {
            title: movie.title.clone(),
            year: movie.release_year,
            director: movie.director(),
            genres: movie.genres.clone(),
        }
    }
}

/// Per-user preferences and watch history, stored as one row
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserPreferences {
    pub user_id: i64,
    pub preferences: PreferenceMap,
    pub watch_history: Vec<WatchEntry>,
}

impl UserPreferences {
    /// Creates an empty row for a user
    pub fn new(user_id: i64) -> Self {
        Self {
            user_id,
            preferences: PreferenceMap::new(),
            watch_history: Vec::new(),
        }
    }

    /// Set-union merge of proposed values into the stored map.
    ///
    /// Values already present for a key are skipped, new ones are appended in
    /// the order given. Returns how many values were added.
    pub fn merge(&mut self, proposed: &ProposedPreferences) -> usize {
        let mut added = 0;
        for (key, value) in proposed {
            let current = self.preferences.entry(key.clone()).or_default();
            for candidate in value.values() {
                if !current.contains(&candidate) {
                    current.push(candidate);
                    added += 1;
                }
            }
        }
        added
    }

    /// Appends a snapshot; repeated watches produce repeated entries
    pub fn record_watch(&mut self, entry: WatchEntry) {
        self.watch_history.push(entry);
    }
}

/// A read-modify-write applied to a preferences row while it is locked
#[derive(Debug, Clone, PartialEq)]
pub enum PreferencesEdit {
    Merge(ProposedPreferences),
    AppendWatch(WatchEntry),
}

impl PreferencesEdit {
    pub fn apply(&self, prefs: &mut UserPreferences) {
        match self {
            PreferencesEdit::Merge(proposed) => {
                prefs.merge(proposed);
            }
            PreferencesEdit::AppendWatch(entry) => prefs.record_watch(entry.clone()),
        }
    }
}
