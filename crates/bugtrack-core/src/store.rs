//! SQLite store for bugs and developers
//!
//! One `Store` is opened at start-up and handed to whoever needs it. The
//! connection sits behind a mutex; callers must not hold a lock across an
//! `.await`, which the `&self` API makes impossible anyway.

use crate::{Bug, BugChanges, Developer, Error, NewBug, NewDeveloper, Priority, Result, Status};
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

const SCHEMA_VERSION: u32 = 1;
const SCHEMA_SQL: &str = include_str!("schema.sql");

const BUG_SELECT_SQL: &str = "SELECT
    b.id,
    b.title,
    b.description,
    b.status,
    b.priority,
    b.developer_id,
    b.due_date,
    b.created_at,
    d.id,
    d.name,
    d.email
FROM bugs b
LEFT JOIN developers d ON d.id = b.developer_id";

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Prior and committed state of a bug around one update
#[derive(Debug, Clone)]
pub struct BugUpdate {
    pub before: Bug,
    pub after: Bug,
}

/// SQLite-backed bug store
pub struct Store {
    path: Option<PathBuf>,
    conn: Mutex<Connection>,
}

impl Store {
    /// Open (or create) the database file at `path`
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        let store = Self::bootstrap(conn, Some(path.to_path_buf()))?;
        tracing::info!(path = %path.display(), "opened bug store");
        Ok(store)
    }

    /// Open a private in-memory database
    pub fn open_in_memory() -> Result<Self> {
        Self::bootstrap(Connection::open_in_memory()?, None)
    }

    fn bootstrap(mut conn: Connection, path: Option<PathBuf>) -> Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;

        let found: u32 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
        if found > SCHEMA_VERSION {
            return Err(Error::SchemaVersion {
                found,
                latest: SCHEMA_VERSION,
            });
        }
        if found < SCHEMA_VERSION {
            let tx = conn.transaction()?;
            tx.execute_batch(SCHEMA_SQL)?;
            tx.execute_batch(&format!("PRAGMA user_version = {SCHEMA_VERSION};"))?;
            tx.commit()?;
            tracing::debug!(from = found, to = SCHEMA_VERSION, "applied schema");
        }

        Ok(Self {
            path,
            conn: Mutex::new(conn),
        })
    }

    /// Database file, `None` for in-memory stores
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::Other("store connection lock poisoned".into()))
    }

    /// Create a developer
    pub fn create_developer(&self, new: &NewDeveloper) -> Result<Developer> {
        new.validate()?;
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO developers (name, email) VALUES (?1, ?2)",
            params![new.name.trim(), new.email.trim()],
        )?;
        Ok(Developer {
            id: conn.last_insert_rowid(),
            name: new.name.trim().to_string(),
            email: new.email.trim().to_string(),
        })
    }

    /// All developers, ordered by id
    pub fn list_developers(&self) -> Result<Vec<Developer>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT id, name, email FROM developers ORDER BY id")?;
        let developers = stmt
            .query_map([], developer_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(developers)
    }

    /// Get a developer by id
    pub fn get_developer(&self, id: i64) -> Result<Option<Developer>> {
        let conn = self.conn()?;
        select_developer(&conn, id)
    }

    /// Create a bug. Status always starts as OPEN.
    pub fn create_bug(&self, new: &NewBug) -> Result<Bug> {
        new.validate()?;
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        if let Some(developer_id) = new.developer_id {
            ensure_developer(&tx, developer_id)?;
        }

        tx.execute(
            "INSERT INTO bugs (title, description, status, priority, developer_id, due_date, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                new.title.trim(),
                new.description,
                Status::Open.as_str(),
                new.priority.as_str(),
                new.developer_id,
                new.due_date.map(format_date),
                Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            ],
        )?;
        let id = tx.last_insert_rowid();
        let bug = select_bug(&tx, id)?.ok_or(Error::BugNotFound(id))?;
        tx.commit()?;
        Ok(bug)
    }

    /// Get a bug by id, with its developer resolved
    pub fn get_bug(&self, id: i64) -> Result<Option<Bug>> {
        let conn = self.conn()?;
        select_bug(&conn, id)
    }

    /// All bugs in id order, with developers resolved
    pub fn list_bugs(&self) -> Result<Vec<Bug>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!("{BUG_SELECT_SQL} ORDER BY b.id"))?;
        let rows = stmt
            .query_map([], BugRow::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows.into_iter().map(BugRow::into_bug).collect()
    }

    /// Apply `changes` to a bug in one transaction.
    ///
    /// Returns the state read before the write together with the committed
    /// state, so callers can compare the two.
    pub fn update_bug(&self, id: i64, changes: &BugChanges) -> Result<BugUpdate> {
        changes.validate()?;
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let before = select_bug(&tx, id)?.ok_or(Error::BugNotFound(id))?;
        if let Some(developer_id) = changes.developer_id {
            ensure_developer(&tx, developer_id)?;
        }

        let title = changes
            .title
            .as_deref()
            .map_or(before.title.as_str(), str::trim);
        let description = changes
            .description
            .as_deref()
            .unwrap_or(before.description.as_str());
        let status = changes.status.unwrap_or(before.status);
        let priority = changes.priority.unwrap_or(before.priority);

        tx.execute(
            "UPDATE bugs
             SET title = ?1, description = ?2, status = ?3, priority = ?4,
                 developer_id = ?5, due_date = ?6
             WHERE id = ?7",
            params![
                title,
                description,
                status.as_str(),
                priority.as_str(),
                changes.developer_id,
                changes.due_date.map(format_date),
                id,
            ],
        )?;

        let after = select_bug(&tx, id)?.ok_or(Error::BugNotFound(id))?;
        tx.commit()?;
        Ok(BugUpdate { before, after })
    }

    /// Delete a bug. Returns whether a row was removed.
    pub fn delete_bug(&self, id: i64) -> Result<bool> {
        let conn = self.conn()?;
        let removed = conn.execute("DELETE FROM bugs WHERE id = ?1", params![id])?;
        Ok(removed > 0)
    }
}

fn ensure_developer(conn: &Connection, id: i64) -> Result<()> {
    if select_developer(conn, id)?.is_none() {
        return Err(Error::UnknownDeveloper(id));
    }
    Ok(())
}

fn select_developer(conn: &Connection, id: i64) -> Result<Option<Developer>> {
    let developer = conn
        .query_row(
            "SELECT id, name, email FROM developers WHERE id = ?1",
            params![id],
            developer_from_row,
        )
        .optional()?;
    Ok(developer)
}

fn select_bug(conn: &Connection, id: i64) -> Result<Option<Bug>> {
    let row = conn
        .query_row(
            &format!("{BUG_SELECT_SQL} WHERE b.id = ?1"),
            params![id],
            BugRow::from_row,
        )
        .optional()?;
    row.map(BugRow::into_bug).transpose()
}

fn developer_from_row(row: &Row<'_>) -> rusqlite::Result<Developer> {
    Ok(Developer {
        id: row.get(0)?,
        name: row.get(1)?,
        email: row.get(2)?,
    })
}

fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

/// Raw column values of one joined bug row
struct BugRow {
    id: i64,
    title: String,
    description: String,
    status: String,
    priority: String,
    developer_id: Option<i64>,
    due_date: Option<String>,
    created_at: String,
    developer: Option<Developer>,
}

impl BugRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let developer = match row.get::<_, Option<i64>>(8)? {
            Some(id) => Some(Developer {
                id,
                name: row.get(9)?,
                email: row.get(10)?,
            }),
            None => None,
        };
        Ok(Self {
            id: row.get(0)?,
            title: row.get(1)?,
            description: row.get(2)?,
            status: row.get(3)?,
            priority: row.get(4)?,
            developer_id: row.get(5)?,
            due_date: row.get(6)?,
            created_at: row.get(7)?,
            developer,
        })
    }

    fn into_bug(self) -> Result<Bug> {
        let due_date = self
            .due_date
            .as_deref()
            .map(|raw| {
                NaiveDate::parse_from_str(raw, DATE_FORMAT)
                    .map_err(|e| Error::Other(format!("bug {}: bad due_date {raw:?}: {e}", self.id)))
            })
            .transpose()?;
        let created_at = DateTime::parse_from_rfc3339(&self.created_at)
            .map_err(|e| {
                Error::Other(format!(
                    "bug {}: bad created_at {:?}: {e}",
                    self.id, self.created_at
                ))
            })?
            .with_timezone(&Utc);

        Ok(Bug {
            id: self.id,
            title: self.title,
            description: self.description,
            status: self.status.parse::<Status>()?,
            priority: self.priority.parse::<Priority>()?,
            developer_id: self.developer_id,
            due_date,
            created_at,
            developer: self.developer,
        })
    }
}
