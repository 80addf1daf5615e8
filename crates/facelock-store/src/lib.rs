//! facelock-store — SQLite-backed template store and auth audit log.
//!
//! One template row per identity; re-enrolling an identity replaces its
//! template. Encodings are stored as an opaque blob: a little-endian u32
//! length prefix followed by that many little-endian f64 values. The
//! round trip is bit-exact.

use std::path::Path;

use chrono::Utc;
use facelock_core::{Encoding, Template};
use rusqlite::{params, Connection};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Db(#[from] rusqlite::Error),
    #[error("stored encoding for template {id} is corrupt: {reason}")]
    CorruptEncoding { id: String, reason: String },
}

/// Template metadata without the biometric payload; what listing surfaces
/// are allowed to see.
#[derive(Debug, Clone, Serialize)]
pub struct TemplateInfo {
    pub id: String,
    pub identity: String,
    pub label: String,
    pub created_at: String,
}

/// One row of the authentication audit log.
#[derive(Debug, Clone, Serialize)]
pub struct AuthEvent {
    pub id: i64,
    pub identity: String,
    pub method: String,
    pub outcome: String,
    pub detail: String,
    pub at: String,
}

pub struct TemplateStore {
    conn: Connection,
}

impl TemplateStore {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        tracing::info!(path = %path.display(), "template store opened");
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS templates (
                 id         TEXT PRIMARY KEY,
                 identity   TEXT NOT NULL,
                 label      TEXT NOT NULL,
                 encoding   BLOB NOT NULL,
                 created_at TEXT NOT NULL
             );
             CREATE INDEX IF NOT EXISTS idx_templates_identity
                 ON templates(identity);
             CREATE TABLE IF NOT EXISTS auth_log (
                 id       INTEGER PRIMARY KEY AUTOINCREMENT,
                 identity TEXT NOT NULL,
                 method   TEXT NOT NULL,
                 outcome  TEXT NOT NULL,
                 detail   TEXT NOT NULL,
                 at       TEXT NOT NULL
             );",
        )?;
        Ok(Self { conn })
    }

    /// Persist a template for an identity, replacing any existing one.
    pub fn save_template(
        &self,
        identity: &str,
        label: &str,
        encoding: &Encoding,
    ) -> Result<Template, StoreError> {
        let template = Template {
            id: Uuid::new_v4().to_string(),
            identity: identity.to_string(),
            label: label.to_string(),
            encoding: encoding.clone(),
            created_at: Utc::now().to_rfc3339(),
        };

        let tx = self.conn.unchecked_transaction()?;
        tx.execute("DELETE FROM templates WHERE identity = ?1", params![identity])?;
        tx.execute(
            "INSERT INTO templates (id, identity, label, encoding, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                template.id,
                template.identity,
                template.label,
                encode_blob(&template.encoding),
                template.created_at,
            ],
        )?;
        tx.commit()?;

        tracing::info!(identity, id = %template.id, "template saved");
        Ok(template)
    }

    /// Load every template, payload included, for matching.
    pub fn load_all_templates(&self) -> Result<Vec<Template>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, identity, label, encoding, created_at
             FROM templates ORDER BY created_at, id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, Vec<u8>>(3)?,
                row.get::<_, String>(4)?,
            ))
        })?;

        let mut templates = Vec::new();
        for row in rows {
            let (id, identity, label, blob, created_at) = row?;
            let encoding = decode_blob(&blob)
                .map_err(|reason| StoreError::CorruptEncoding { id: id.clone(), reason })?;
            templates.push(Template { id, identity, label, encoding, created_at });
        }
        Ok(templates)
    }

    /// List template metadata without decoding payloads.
    pub fn list(&self) -> Result<Vec<TemplateInfo>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, identity, label, created_at
             FROM templates ORDER BY created_at, id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(TemplateInfo {
                id: row.get(0)?,
                identity: row.get(1)?,
                label: row.get(2)?,
                created_at: row.get(3)?,
            })
        })?;
        Ok(rows.collect::<Result<_, _>>()?)
    }

    /// Remove a template by id. Returns whether a row was deleted.
    pub fn remove(&self, id: &str) -> Result<bool, StoreError> {
        let n = self
            .conn
            .execute("DELETE FROM templates WHERE id = ?1", params![id])?;
        Ok(n > 0)
    }

    /// Append an authentication event to the audit log.
    pub fn record_auth(
        &self,
        identity: &str,
        method: &str,
        outcome: &str,
        detail: &str,
    ) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT INTO auth_log (identity, method, outcome, detail, at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![identity, method, outcome, detail, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    /// Most recent audit entries, newest first.
    pub fn recent_auth_events(&self, limit: usize) -> Result<Vec<AuthEvent>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, identity, method, outcome, detail, at
             FROM auth_log ORDER BY id DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit as i64], |row| {
            Ok(AuthEvent {
                id: row.get(0)?,
                identity: row.get(1)?,
                method: row.get(2)?,
                outcome: row.get(3)?,
                detail: row.get(4)?,
                at: row.get(5)?,
            })
        })?;
        Ok(rows.collect::<Result<_, _>>()?)
    }
}

fn encode_blob(encoding: &Encoding) -> Vec<u8> {
    let values = encoding.as_slice();
    let mut buf = Vec::with_capacity(4 + values.len() * 8);
    buf.extend_from_slice(&(values.len() as u32).to_le_bytes());
    for v in values {
        buf.extend_from_slice(&v.to_le_bytes());
    }
    buf
}

fn decode_blob(bytes: &[u8]) -> Result<Encoding, String> {
    let prefix: [u8; 4] = bytes
        .get(..4)
        .and_then(|b| b.try_into().ok())
        .ok_or("blob shorter than length prefix")?;
    let len = u32::from_le_bytes(prefix) as usize;
    let payload = &bytes[4..];
    if payload.len() != len * 8 {
        return Err(format!(
            "length prefix {len} does not match payload of {} bytes",
            payload.len()
        ));
    }
    let values: Vec<f64> = payload
        .chunks_exact(8)
        .map(|c| f64::from_le_bytes(c.try_into().expect("chunks_exact yields 8 bytes")))
        .collect();
    Encoding::from_vec(values).map_err(|e| e.to_string())
}
