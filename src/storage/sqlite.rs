//! SQLite frontier store
//!
//! Persists the requests a run left unfetched and the set of links it
//! scheduled, so that the next run of the same job picks up where it
//! stopped.

use crate::crawler::{FetchRequest, LinkKind, SeenKey};
use crate::storage::schema::initialize_schema;
use crate::storage::{StorageError, StorageResult};
use rusqlite::{params, Connection};
use std::path::Path;
use url::Url;

/// SQLite storage for the resumable part of the frontier
pub struct FrontierStore {
    conn: Connection,
}

impl FrontierStore {
    /// Opens or creates the store at `path`
    pub fn open(path: &Path) -> StorageResult<Self> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory store (for testing)
    #[cfg(test)]
    pub fn open_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }

    /// Loads the pending requests in scheduling order
    pub fn load_pending(&self) -> StorageResult<Vec<FetchRequest>> {
        let mut stmt = self
            .conn
            .prepare("SELECT url, kind, priority, render FROM pending ORDER BY priority ASC, id ASC")?;

        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, i32>(2)?,
                    row.get::<_, Option<String>>(3)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(url, kind, priority, render)| {
                let url = Url::parse(&url)
                    .map_err(|e| StorageError::Invalid(format!("pending URL '{}': {}", url, e)))?;
                let render = render.map(|r| serde_json::from_str(&r)).transpose()?;
                Ok(FetchRequest {
                    url,
                    kind: parse_kind(&kind)?,
                    priority,
                    render,
                })
            })
            .collect()
    }

    /// Replaces the pending requests
    pub fn save_pending(&mut self, requests: &[FetchRequest]) -> StorageResult<()> {
        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM pending", [])?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO pending (url, kind, priority, render) VALUES (?1, ?2, ?3, ?4)",
            )?;
            for request in requests {
                let render = request
                    .render
                    .as_ref()
                    .map(serde_json::to_string)
                    .transpose()?;
                stmt.execute(params![
                    request.url.as_str(),
                    request.kind.as_str(),
                    request.priority,
                    render
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// Loads every scheduled `(kind, canonical URL)` pair
    pub fn load_seen(&self) -> StorageResult<Vec<SeenKey>> {
        let mut stmt = self.conn.prepare("SELECT kind, url FROM seen")?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(kind, url)| Ok((parse_kind(&kind)?, url)))
            .collect()
    }

    /// Adds pairs to the seen set
    pub fn save_seen<'a>(&mut self, seen: impl IntoIterator<Item = &'a SeenKey>) -> StorageResult<()> {
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare("INSERT OR IGNORE INTO seen (kind, url) VALUES (?1, ?2)")?;
            for (kind, url) in seen {
                stmt.execute(params![kind.as_str(), url])?;
            }
        }
        tx.commit()?;
        Ok(())
    }
}

fn parse_kind(kind: &str) -> StorageResult<LinkKind> {
    match kind {
        "content" => Ok(LinkKind::Content),
        "navigation" => Ok(LinkKind::Navigation),
        other => Err(StorageError::Invalid(format!("unknown link kind '{}'", other))),
    }
}
