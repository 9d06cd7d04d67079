pub mod book;
pub mod movie;
pub mod pagination;
pub mod user;
pub mod user_preferences;

pub use book::{Book, BookPatch, NewBook};
pub use movie::{validate_release_year, Movie, MoviePatch, NewMovie, EARLIEST_RELEASE_YEAR};
pub use pagination::{Page, PageParams, PageRequest};
pub use user::User;
pub use user_preferences::{
    PreferenceMap, PreferenceValue, PreferencesEdit, ProposedPreferences, UserPreferences,
    WatchEntry,
};
