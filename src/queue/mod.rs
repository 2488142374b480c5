//! Work queue and retry coordinator.
//!
//! Decouples archive ingestion from extraction. Messages carry only
//! `{document_id, year, attempt_count}`; everything else is fetched fresh
//! from the Document row, so stale or duplicate deliveries are harmless.
//!
//! Delivery contract: a received message is invisible to other consumers
//! until its lease expires. Unacknowledged leases become deliverable again
//! (at-least-once; consumers are idempotent via upsert-by-key). A message
//! that reaches the attempt cap without acknowledgement moves to the
//! dead-letter channel for manual triage.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

pub type Result<T> = std::result::Result<T, QueueError>;

/// Minimal, re-derivable message state. No business data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueMessage {
    pub document_id: String,
    pub year: i32,
    pub attempt_count: u32,
}

/// A received message plus the lease token needed to acknowledge it.
#[derive(Debug, Clone)]
pub struct LeasedMessage {
    pub message: QueueMessage,
    pub lease_token: String,
    pub lease_expires_at: DateTime<Utc>,
}

/// A dead-lettered message awaiting manual triage.
#[derive(Debug, Clone)]
pub struct DeadLetter {
    pub message: QueueMessage,
    pub last_error: Option<String>,
    pub enqueued_at: DateTime<Utc>,
    pub dead_lettered_at: DateTime<Utc>,
}

/// Per-status message counts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueStats {
    pub available: u64,
    pub leased: u64,
    pub done: u64,
    pub dead: u64,
}

#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// How long a received message stays invisible.
    pub lease: Duration,
    /// Delivery attempts before dead-lettering.
    pub max_attempts: u32,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            lease: Duration::from_secs(300),
            max_attempts: 5,
        }
    }
}

/// SQLite-backed work queue.
pub struct WorkQueue {
    db_path: PathBuf,
    config: QueueConfig,
}

impl WorkQueue {
    pub fn new(db_path: &Path, config: QueueConfig) -> Result<Self> {
        let queue = Self {
            db_path: db_path.to_path_buf(),
            config,
        };
        queue.init_schema()?;
        Ok(queue)
    }

    fn connect(&self) -> Result<Connection> {
        let conn = Connection::open(&self.db_path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "busy_timeout", 5000)?;
        Ok(conn)
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.connect()?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS queue_messages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                document_id TEXT NOT NULL,
                year INTEGER NOT NULL,
                attempt_count INTEGER NOT NULL DEFAULT 0,
                status TEXT NOT NULL DEFAULT 'available',
                lease_token TEXT,
                lease_expires_at TEXT,
                last_error TEXT,
                enqueued_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                UNIQUE(document_id, year)
            );

            CREATE INDEX IF NOT EXISTS idx_queue_status
                ON queue_messages(status, lease_expires_at);
            "#,
        )?;
        Ok(())
    }

    /// Enqueue work for a document. A message already in flight is left
    /// alone; a finished or dead one is made available again.
    pub fn enqueue(&self, document_id: &str, year: i32) -> Result<()> {
        let conn = self.connect()?;
        let now = Utc::now().to_rfc3339();
        conn.execute(
            r#"
            INSERT INTO queue_messages (document_id, year, status, enqueued_at, updated_at)
            VALUES (?1, ?2, 'available', ?3, ?3)
            ON CONFLICT(document_id, year) DO UPDATE SET
                status = 'available',
                attempt_count = 0,
                lease_token = NULL,
                lease_expires_at = NULL,
                last_error = NULL,
                updated_at = excluded.updated_at
            WHERE queue_messages.status IN ('done', 'dead')
            "#,
            params![document_id, year, now],
        )?;
        Ok(())
    }

    /// Receive the next deliverable message, taking a lease on it.
    ///
    /// Deliverable means available, or leased with an expired lease (the
    /// consumer crashed or overran its budget). Messages at the attempt cap
    /// are moved to the dead-letter channel instead of being delivered.
    pub fn receive(&self) -> Result<Option<LeasedMessage>> {
        let conn = self.connect()?;

        loop {
            conn.execute("BEGIN IMMEDIATE", [])?;

            let result = self.claim_next(&conn);

            match result {
                Ok(claimed) => {
                    conn.execute("COMMIT", [])?;
                    match claimed {
                        Claimed::Message(leased) => return Ok(Some(leased)),
                        Claimed::DeadLettered => continue,
                        Claimed::Empty => return Ok(None),
                    }
                }
                Err(e) => {
                    let _ = conn.execute("ROLLBACK", []);
                    return Err(e);
                }
            }
        }
    }

    fn claim_next(&self, conn: &Connection) -> Result<Claimed> {
        let now = Utc::now();
        let now_str = now.to_rfc3339();

        let candidate: Option<(i64, String, i32, u32)> = conn
            .query_row(
                r#"
                SELECT id, document_id, year, attempt_count FROM queue_messages
                WHERE status = 'available'
                   OR (status = 'leased' AND lease_expires_at <= ?1)
                ORDER BY enqueued_at, id
                LIMIT 1
                "#,
                params![now_str],
                |row| {
                    Ok((
                        row.get(0)?,
                        row.get(1)?,
                        row.get(2)?,
                        row.get::<_, i64>(3)? as u32,
                    ))
                },
            )
            .optional()?;

        let Some((id, document_id, year, attempt_count)) = candidate else {
            return Ok(Claimed::Empty);
        };

        if attempt_count >= self.config.max_attempts {
            conn.execute(
                "UPDATE queue_messages SET status = 'dead', lease_token = NULL,
                 lease_expires_at = NULL, updated_at = ?2 WHERE id = ?1",
                params![id, now_str],
            )?;
            tracing::warn!(document_id, year, "message exhausted retries, dead-lettered");
            return Ok(Claimed::DeadLettered);
        }

        let lease_token = uuid::Uuid::new_v4().to_string();
        let lease_expires_at = now
            + chrono::Duration::from_std(self.config.lease)
                .unwrap_or_else(|_| chrono::Duration::seconds(300));
        conn.execute(
            r#"
            UPDATE queue_messages SET
                status = 'leased',
                attempt_count = attempt_count + 1,
                lease_token = ?2,
                lease_expires_at = ?3,
                updated_at = ?4
            WHERE id = ?1
            "#,
            params![id, lease_token, lease_expires_at.to_rfc3339(), now_str],
        )?;

        Ok(Claimed::Message(LeasedMessage {
            message: QueueMessage {
                document_id,
                year,
                attempt_count: attempt_count + 1,
            },
            lease_token,
            lease_expires_at,
        }))
    }

    /// Acknowledge completion. Returns false when the lease was already
    /// lost (expired and re-delivered elsewhere) - the caller's writes were
    /// idempotent upserts, so nothing needs undoing.
    pub fn ack(&self, leased: &LeasedMessage) -> Result<bool> {
        let conn = self.connect()?;
        let changed = conn.execute(
            r#"
            UPDATE queue_messages SET
                status = 'done', lease_token = NULL, lease_expires_at = NULL,
                updated_at = ?3
            WHERE document_id = ?1 AND year = ?4 AND lease_token = ?2
            "#,
            params![
                leased.message.document_id,
                leased.lease_token,
                Utc::now().to_rfc3339(),
                leased.message.year,
            ],
        )?;
        Ok(changed > 0)
    }

    /// Report a failed attempt. The message becomes deliverable again
    /// immediately, or dead-letters if the attempt cap is reached.
    pub fn fail(&self, leased: &LeasedMessage, error: &str) -> Result<()> {
        let conn = self.connect()?;
        let status = if leased.message.attempt_count >= self.config.max_attempts {
            "dead"
        } else {
            "available"
        };
        conn.execute(
            r#"
            UPDATE queue_messages SET
                status = ?3, lease_token = NULL, lease_expires_at = NULL,
                last_error = ?4, updated_at = ?5
            WHERE document_id = ?1 AND year = ?6 AND lease_token = ?2
            "#,
            params![
                leased.message.document_id,
                leased.lease_token,
                status,
                error,
                Utc::now().to_rfc3339(),
                leased.message.year,
            ],
        )?;
        if status == "dead" {
            tracing::warn!(
                document_id = leased.message.document_id,
                error,
                "message dead-lettered"
            );
        }
        Ok(())
    }

    /// Messages parked in the dead-letter channel.
    pub fn dead_letters(&self) -> Result<Vec<DeadLetter>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT * FROM queue_messages WHERE status = 'dead' ORDER BY updated_at",
        )?;
        let letters = stmt
            .query_map([], row_to_dead_letter)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(letters)
    }

    /// Return dead-lettered messages to the queue with a fresh attempt
    /// budget. Returns how many were requeued.
    pub fn requeue_dead(&self, document_id: Option<&str>) -> Result<usize> {
        let conn = self.connect()?;
        let now = Utc::now().to_rfc3339();
        let changed = match document_id {
            Some(doc_id) => conn.execute(
                "UPDATE queue_messages SET status = 'available', attempt_count = 0,
                 last_error = NULL, updated_at = ?2
                 WHERE status = 'dead' AND document_id = ?1",
                params![doc_id, now],
            )?,
            None => conn.execute(
                "UPDATE queue_messages SET status = 'available', attempt_count = 0,
                 last_error = NULL, updated_at = ?1
                 WHERE status = 'dead'",
                params![now],
            )?,
        };
        Ok(changed)
    }

    /// Delete completed messages. Their Document rows carry the durable
    /// outcome; the queue row is just delivery bookkeeping.
    pub fn purge_done(&self) -> Result<usize> {
        let conn = self.connect()?;
        let deleted = conn.execute("DELETE FROM queue_messages WHERE status = 'done'", [])?;
        Ok(deleted)
    }

    pub fn stats(&self) -> Result<QueueStats> {
        let conn = self.connect()?;
        let mut stmt =
            conn.prepare("SELECT status, COUNT(*) FROM queue_messages GROUP BY status")?;
        let mut stats = QueueStats::default();
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;
        for row in rows {
            let (status, count) = row?;
            match status.as_str() {
                "available" => stats.available = count as u64,
                "leased" => stats.leased = count as u64,
                "done" => stats.done = count as u64,
                "dead" => stats.dead = count as u64,
                _ => {}
            }
        }
        Ok(stats)
    }

    /// Messages still to be delivered (available plus in-flight).
    pub fn depth(&self) -> Result<u64> {
        let stats = self.stats()?;
        Ok(stats.available + stats.leased)
    }
}

enum Claimed {
    Message(LeasedMessage),
    DeadLettered,
    Empty,
}

fn row_to_dead_letter(row: &Row<'_>) -> rusqlite::Result<DeadLetter> {
    let enqueued_at: String = row.get("enqueued_at")?;
    let updated_at: String = row.get("updated_at")?;
    Ok(DeadLetter {
        message: QueueMessage {
            document_id: row.get("document_id")?,
            year: row.get("year")?,
            attempt_count: row.get::<_, i64>("attempt_count")? as u32,
        },
        last_error: row.get("last_error")?,
        enqueued_at: crate::repository::parse_datetime(&enqueued_at),
        dead_lettered_at: crate::repository::parse_datetime(&updated_at),
    })
}
