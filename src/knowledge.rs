//! The knowledge base: immutable, content-addressed triples in SQLite
//!
//! A triple `(subject, property, value)` is identified by the hash of its
//! canonical serialization, so asserting the same fact twice lands on the
//! same row. The store is append-only: there is no update or retraction,
//! superseding a belief is an application-level concern.

use crate::model::{Cid, Digest, HashAlgorithm, Hasher};
use crate::Result;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use tracing::debug;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS kb (
    cid      BLOB PRIMARY KEY,
    subject  BLOB NOT NULL,
    property TEXT NOT NULL,
    value    TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_subject ON kb(subject);

CREATE INDEX IF NOT EXISTS idx_subject_property ON kb(subject, property);

CREATE INDEX IF NOT EXISTS idx_property_value ON kb(property, value);
";

/// A recorded fact about a digest.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Triple {
    /// Content identity of the triple itself.
    pub id: Digest,
    /// The digest the fact is about. May itself be a triple id,
    /// forming annotation chains.
    pub subject: Digest,
    pub property: String,
    pub value: String,
}

/// SQLite-backed triple store. One owned connection per instance.
pub struct KnowledgeBase {
    conn: Connection,
    algorithm: HashAlgorithm,
}

impl KnowledgeBase {
    /// Open (or create) the knowledge base file at `path`.
    pub fn open(path: impl AsRef<Path>, algorithm: HashAlgorithm) -> Result<Self> {
        let conn = Connection::open(path)?;
        Self::init(conn, algorithm)
    }

    /// Open an in-memory knowledge base (for testing).
    pub fn in_memory(algorithm: HashAlgorithm) -> Result<Self> {
        Self::init(Connection::open_in_memory()?, algorithm)
    }

    fn init(conn: Connection, algorithm: HashAlgorithm) -> Result<Self> {
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.execute_batch(SCHEMA)?;
        Ok(KnowledgeBase { conn, algorithm })
    }

    /// Identity of a triple: the hash of `base58(subject),property,value`.
    fn triple_id(&self, subject: &Digest, property: &str, value: &str) -> Digest {
        let canonical = format!("{},{},{}", Cid::from_digest(subject), property, value);
        let mut hasher = Hasher::new(self.algorithm);
        hasher.update(canonical.as_bytes());
        hasher.finalize()
    }

    /// Record a fact. Returns the triple's identity and whether the row
    /// is new; asserting the same fact twice produces one row and
    /// `is_new = false`.
    pub fn believe(&self, subject: &Digest, property: &str, value: &str) -> Result<(Digest, bool)> {
        let id = self.triple_id(subject, property, value);
        // The primary key makes the duplicate check and the insert one
        // atomic statement.
        let inserted = self.conn.execute(
            "INSERT OR IGNORE INTO kb (cid, subject, property, value) VALUES (?1, ?2, ?3, ?4)",
            params![id.as_bytes(), subject.as_bytes(), property, value],
        )?;
        debug!(property, value, is_new = inserted > 0, "believe");
        Ok((id, inserted > 0))
    }

    /// Fetch a single triple by its identity.
    pub fn get(&self, id: &Digest) -> Result<Option<Triple>> {
        let row = self
            .conn
            .query_row(
                "SELECT cid, subject, property, value FROM kb WHERE cid = ?1",
                params![id.as_bytes()],
                Self::row_to_parts,
            )
            .optional()?;
        row.map(Self::parts_to_triple).transpose()
    }

    /// Query triples by any combination of subject, property, and value.
    /// All filters optional; with none, every triple is returned. The
    /// filter order matches the index layout, so subject-only,
    /// subject+property, and property+value queries ride an index.
    pub fn inquire(
        &self,
        subject: Option<&Digest>,
        property: Option<&str>,
        value: Option<&str>,
    ) -> Result<Vec<Triple>> {
        let subject_bytes = subject.map(|d| d.as_bytes().to_vec());
        let property = property.map(str::to_string);
        let value = value.map(str::to_string);

        let mut clauses: Vec<&str> = Vec::new();
        let mut binds: Vec<&dyn rusqlite::ToSql> = Vec::new();
        if let Some(s) = subject_bytes.as_ref() {
            clauses.push("subject = ?");
            binds.push(s);
        }
        if let Some(p) = property.as_ref() {
            clauses.push("property = ?");
            binds.push(p);
        }
        if let Some(v) = value.as_ref() {
            clauses.push("value = ?");
            binds.push(v);
        }

        let mut sql = String::from("SELECT cid, subject, property, value FROM kb");
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }

        let mut stmt = self.conn.prepare_cached(&sql)?;
        let rows = stmt.query_map(&binds[..], Self::row_to_parts)?;
        let mut result = Vec::new();
        for row in rows {
            result.push(Self::parts_to_triple(row?)?);
        }
        Ok(result)
    }

    /// Number of recorded triples.
    pub fn len(&self) -> Result<usize> {
        let n: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM kb", [], |row| row.get(0))?;
        Ok(n as usize)
    }

    /// True iff no triples have been recorded.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    fn row_to_parts(
        row: &rusqlite::Row<'_>,
    ) -> rusqlite::Result<(Vec<u8>, Vec<u8>, String, String)> {
        Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
    }

    fn parts_to_triple(parts: (Vec<u8>, Vec<u8>, String, String)) -> Result<Triple> {
        let (id, subject, property, value) = parts;
        Ok(Triple {
            id: Digest::from_bytes(id)?,
            subject: Digest::from_bytes(subject)?,
            property,
            value,
        })
    }
}
