//! algobot-storage: SQLite-based persistence for members and submissions.
//!
//! Members are stored with their role labels in a side table; submissions
//! reference their owning member. Every write is a single-record operation.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

use chrono::NaiveDate;
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension};
use tokio::sync::Mutex;

use algobot_types::{Member, NewSubmission, Submission};

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Blocking task join error: {0}")]
    Join(#[from] tokio::task::JoinError),
}

pub type Result<T> = std::result::Result<T, StorageError>;

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS members (
        id INTEGER PRIMARY KEY,
        name TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS member_roles (
        member_id INTEGER NOT NULL,
        role TEXT NOT NULL,
        PRIMARY KEY (member_id, role),
        FOREIGN KEY (member_id) REFERENCES members(id)
    );

    CREATE TABLE IF NOT EXISTS submissions (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        member_id INTEGER NOT NULL,
        title TEXT NOT NULL,
        link TEXT NOT NULL,
        code TEXT NOT NULL,
        date_submitted TEXT NOT NULL,
        FOREIGN KEY (member_id) REFERENCES members(id)
    );

    CREATE INDEX IF NOT EXISTS idx_submissions_date ON submissions(date_submitted);
    CREATE INDEX IF NOT EXISTS idx_submissions_member_date ON submissions(member_id, date_submitted);";

const SUBMISSION_COLUMNS: &str = "id, member_id, title, link, code, date_submitted";

/// SQLite-based storage for the Member/Role Store and the Submission Store.
pub struct AlgoBotStorage {
    conn: Arc<Mutex<Connection>>,
}

impl AlgoBotStorage {
    /// Open (or create) the SQLite database at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;

        // Enable WAL mode for better concurrent read performance
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        conn.execute_batch(SCHEMA)?;

        tracing::info!("Storage opened: {}", path.display());

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    // ─── Members ───────────────────────────────────────────

    /// Insert or fully replace a member record, roles included.
    pub async fn save_member(&self, member: &Member) -> Result<()> {
        let conn = self.conn.clone();
        let member = member.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = conn.blocking_lock();
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO members (id, name) VALUES (?1, ?2)
                 ON CONFLICT(id) DO UPDATE SET name = excluded.name",
                rusqlite::params![member.id as i64, member.name],
            )?;
            tx.execute(
                "DELETE FROM member_roles WHERE member_id = ?1",
                rusqlite::params![member.id as i64],
            )?;
            {
                let mut stmt =
                    tx.prepare("INSERT INTO member_roles (member_id, role) VALUES (?1, ?2)")?;
                for role in &member.roles {
                    stmt.execute(rusqlite::params![member.id as i64, role])?;
                }
            }
            tx.commit()?;
            Ok(())
        })
        .await?
    }

    /// Get a member by id.
    pub async fn find_member(&self, id: u64) -> Result<Option<Member>> {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let conn = conn.blocking_lock();
            let name: Option<String> = conn
                .query_row(
                    "SELECT name FROM members WHERE id = ?1",
                    rusqlite::params![id as i64],
                    |row| row.get(0),
                )
                .optional()?;
            match name {
                Some(name) => Ok(Some(Member {
                    id,
                    name,
                    roles: load_roles(&conn, id)?,
                })),
                None => Ok(None),
            }
        })
        .await?
    }

    /// List every tracked member, ordered by id.
    pub async fn list_members(&self) -> Result<Vec<Member>> {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let conn = conn.blocking_lock();
            query_members(&conn, "SELECT id, name FROM members ORDER BY id", rusqlite::params![])
        })
        .await?
    }

    /// List members holding `label`, compared case-insensitively.
    pub async fn find_members_by_role(&self, label: &str) -> Result<Vec<Member>> {
        let conn = self.conn.clone();
        let label = label.to_string();
        tokio::task::spawn_blocking(move || {
            let conn = conn.blocking_lock();
            query_members(
                &conn,
                "SELECT DISTINCT m.id, m.name FROM members m
                 JOIN member_roles r ON r.member_id = m.id
                 WHERE r.role = ?1 COLLATE NOCASE
                 ORDER BY m.id",
                rusqlite::params![label],
            )
        })
        .await?
    }

    // ─── Submissions ───────────────────────────────────────

    /// Persist a new submission and return it with its generated id.
    pub async fn save_submission(&self, submission: &NewSubmission) -> Result<Submission> {
        let conn = self.conn.clone();
        let submission = submission.clone();
        tokio::task::spawn_blocking(move || {
            let conn = conn.blocking_lock();
            conn.execute(
                "INSERT INTO submissions (member_id, title, link, code, date_submitted)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![
                    submission.member_id as i64,
                    submission.title,
                    submission.link,
                    submission.code,
                    submission.date_submitted.to_string(),
                ],
            )?;
            Ok(Submission {
                id: conn.last_insert_rowid(),
                member_id: submission.member_id,
                title: submission.title,
                link: submission.link,
                code: submission.code,
                date_submitted: submission.date_submitted,
            })
        })
        .await?
    }

    /// All submissions dated `date`.
    pub async fn find_submissions_by_date(&self, date: NaiveDate) -> Result<Vec<Submission>> {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let conn = conn.blocking_lock();
            let mut stmt = conn.prepare(&format!(
                "SELECT {SUBMISSION_COLUMNS} FROM submissions
                 WHERE date_submitted = ?1 ORDER BY id"
            ))?;
            let rows = stmt
                .query_map(rusqlite::params![date.to_string()], submission_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await?
    }

    /// Submissions by `member_id` dated within the half-open range `[start, end)`.
    pub async fn find_submissions_by_member_and_date_range(
        &self,
        member_id: u64,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Submission>> {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let conn = conn.blocking_lock();
            let mut stmt = conn.prepare(&format!(
                "SELECT {SUBMISSION_COLUMNS} FROM submissions
                 WHERE member_id = ?1 AND date_submitted >= ?2 AND date_submitted < ?3
                 ORDER BY date_submitted, id"
            ))?;
            let rows = stmt
                .query_map(
                    rusqlite::params![member_id as i64, start.to_string(), end.to_string()],
                    submission_from_row,
                )?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await?
    }
}

fn load_roles(conn: &Connection, member_id: u64) -> rusqlite::Result<BTreeSet<String>> {
    let mut stmt = conn.prepare("SELECT role FROM member_roles WHERE member_id = ?1")?;
    let roles = stmt
        .query_map(rusqlite::params![member_id as i64], |row| row.get(0))?
        .collect::<rusqlite::Result<BTreeSet<String>>>()?;
    Ok(roles)
}

fn query_members<P: rusqlite::Params>(
    conn: &Connection,
    sql: &str,
    params: P,
) -> Result<Vec<Member>> {
    let mut stmt = conn.prepare(sql)?;
    let heads = stmt
        .query_map(params, |row| {
            Ok((row.get::<_, i64>(0)? as u64, row.get::<_, String>(1)?))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let mut members = Vec::with_capacity(heads.len());
    for (id, name) in heads {
        members.push(Member {
            id,
            name,
            roles: load_roles(conn, id)?,
        });
    }
    Ok(members)
}

fn submission_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Submission> {
    let date: String = row.get(5)?;
    let date_submitted = date
        .parse::<NaiveDate>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(5, Type::Text, Box::new(e)))?;
    Ok(Submission {
        id: row.get(0)?,
        member_id: row.get::<_, i64>(1)? as u64,
        title: row.get(2)?,
        link: row.get(3)?,
        code: row.get(4)?,
        date_submitted,
    })
}
