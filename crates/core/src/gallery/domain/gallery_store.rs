use chrono::{DateTime, Utc};
use thiserror::Error;

pub type PersonId = i64;

#[derive(Error, Debug)]
pub enum GalleryError {
    #[error("gallery database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("failed to create gallery directory: {0}")]
    Io(#[from] std::io::Error),
    #[error("unknown person id {0}")]
    UnknownPerson(PersonId),
}

/// One row of the person listing.
#[derive(Debug, Clone, PartialEq)]
pub struct PersonSummary {
    pub name: String,
    pub record_count: usize,
    pub registered: DateTime<Utc>,
}

/// Durable mapping from identity name to opaque feature records.
///
/// Payload bytes are stored and returned untouched.
pub trait GalleryStore: Send {
    /// Returns the id for `name`, creating the person if needed.
    fn add_person(&mut self, name: &str) -> Result<PersonId, GalleryError>;

    fn add_record(&mut self, person: PersonId, payload: &[u8]) -> Result<(), GalleryError>;

    /// Creates `name` if needed and stores one record for it, atomically:
    /// on failure neither the person nor the record is left behind.
    fn add_sample(&mut self, name: &str, payload: &[u8]) -> Result<PersonId, GalleryError>;

    /// Every record joined with its owner's name, in insertion order.
    fn all_records(&self) -> Result<Vec<(String, Vec<u8>)>, GalleryError>;

    fn records_for_person(&self, name: &str) -> Result<Vec<Vec<u8>>, GalleryError>;

    /// Removes the person and all of its records. `false` if unknown.
    fn delete_person(&mut self, name: &str) -> Result<bool, GalleryError>;

    /// Persons with record counts, most recently registered first.
    fn persons(&self) -> Result<Vec<PersonSummary>, GalleryError>;

    fn clear_all(&mut self) -> Result<(), GalleryError>;

    fn person_count(&self) -> Result<usize, GalleryError>;

    fn person_exists(&self, name: &str) -> Result<bool, GalleryError>;
}
