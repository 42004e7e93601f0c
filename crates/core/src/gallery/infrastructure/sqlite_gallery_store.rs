/// SQLite-backed gallery store.
///
/// Two tables: `persons` (unique name, registration time) and `face_records`
/// (opaque payload blob, capture time, owning person). Deleting a person
/// cascades to its records.
use std::path::Path;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use crate::gallery::domain::gallery_store::{GalleryError, GalleryStore, PersonId, PersonSummary};

const SCHEMA: &str = "
    PRAGMA foreign_keys = ON;
    CREATE TABLE IF NOT EXISTS persons (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL UNIQUE,
        registered_date TEXT NOT NULL
    );
    CREATE TABLE IF NOT EXISTS face_records (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        person_id INTEGER NOT NULL REFERENCES persons(id) ON DELETE CASCADE,
        payload BLOB NOT NULL,
        captured_date TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_face_records_person ON face_records(person_id);
";

pub struct SqliteGalleryStore {
    conn: Connection,
}

impl SqliteGalleryStore {
    /// Opens (creating if needed) the database at `path`.
    pub fn open(path: &Path) -> Result<Self, GalleryError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let store = Self::with_connection(Connection::open(path)?)?;
        log::info!("Opened gallery database {}", path.display());
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self, GalleryError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, GalleryError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    pub fn record_count(&self) -> Result<usize, GalleryError> {
        let n: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM face_records", [], |row| row.get(0))?;
        Ok(n as usize)
    }
}

fn now_string() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_date(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|d| d.with_timezone(&Utc))
        .unwrap_or_default()
}

impl GalleryStore for SqliteGalleryStore {
    fn add_person(&mut self, name: &str) -> Result<PersonId, GalleryError> {
        self.conn.execute(
            "INSERT OR IGNORE INTO persons (name, registered_date) VALUES (?1, ?2)",
            params![name, now_string()],
        )?;
        let id = self.conn.query_row(
            "SELECT id FROM persons WHERE name = ?1",
            params![name],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    fn add_record(&mut self, person: PersonId, payload: &[u8]) -> Result<(), GalleryError> {
        let exists = self
            .conn
            .query_row("SELECT 1 FROM persons WHERE id = ?1", params![person], |_| Ok(()))
            .optional()?
            .is_some();
        if !exists {
            return Err(GalleryError::UnknownPerson(person));
        }
        self.conn.execute(
            "INSERT INTO face_records (person_id, payload, captured_date) VALUES (?1, ?2, ?3)",
            params![person, payload, now_string()],
        )?;
        Ok(())
    }

    fn add_sample(&mut self, name: &str, payload: &[u8]) -> Result<PersonId, GalleryError> {
        let now = now_string();
        let tx = self.conn.transaction()?;
        tx.execute(
            "INSERT OR IGNORE INTO persons (name, registered_date) VALUES (?1, ?2)",
            params![name, now],
        )?;
        let id: PersonId =
            tx.query_row("SELECT id FROM persons WHERE name = ?1", params![name], |row| row.get(0))?;
        tx.execute(
            "INSERT INTO face_records (person_id, payload, captured_date) VALUES (?1, ?2, ?3)",
            params![id, payload, now],
        )?;
        tx.commit()?;
        Ok(id)
    }

    fn all_records(&self) -> Result<Vec<(String, Vec<u8>)>, GalleryError> {
        let mut stmt = self.conn.prepare(
            "SELECT p.name, r.payload FROM face_records r
             JOIN persons p ON p.id = r.person_id
             ORDER BY r.id",
        )?;
        let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn records_for_person(&self, name: &str) -> Result<Vec<Vec<u8>>, GalleryError> {
        let mut stmt = self.conn.prepare(
            "SELECT r.payload FROM face_records r
             JOIN persons p ON p.id = r.person_id
             WHERE p.name = ?1
             ORDER BY r.id",
        )?;
        let rows = stmt.query_map(params![name], |row| row.get(0))?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn delete_person(&mut self, name: &str) -> Result<bool, GalleryError> {
        let tx = self.conn.transaction()?;
        let id: Option<PersonId> = tx
            .query_row("SELECT id FROM persons WHERE name = ?1", params![name], |row| row.get(0))
            .optional()?;
        let Some(id) = id else {
            return Ok(false);
        };
        // Explicit, so records go even on connections opened without foreign keys
        tx.execute("DELETE FROM face_records WHERE person_id = ?1", params![id])?;
        tx.execute("DELETE FROM persons WHERE id = ?1", params![id])?;
        tx.commit()?;
        Ok(true)
    }

    fn persons(&self) -> Result<Vec<PersonSummary>, GalleryError> {
        let mut stmt = self.conn.prepare(
            "SELECT p.name, p.registered_date, COUNT(r.id) FROM persons p
             LEFT JOIN face_records r ON r.person_id = p.id
             GROUP BY p.id
             ORDER BY p.registered_date DESC, p.id DESC",
        )?;
        let rows = stmt.query_map([], |row| {
            let date: String = row.get(1)?;
            let count: i64 = row.get(2)?;
            Ok(PersonSummary {
                name: row.get(0)?,
                record_count: count as usize,
                registered: parse_date(&date),
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn clear_all(&mut self) -> Result<(), GalleryError> {
        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM face_records", [])?;
        tx.execute("DELETE FROM persons", [])?;
        tx.commit()?;
        Ok(())
    }

    fn person_count(&self) -> Result<usize, GalleryError> {
        let n: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM persons", [], |row| row.get(0))?;
        Ok(n as usize)
    }

    fn person_exists(&self, name: &str) -> Result<bool, GalleryError> {
        Ok(self
            .conn
            .query_row("SELECT 1 FROM persons WHERE name = ?1", params![name], |_| Ok(()))
            .optional()?
            .is_some())
    }
}
