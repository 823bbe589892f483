//! Single-leader election over a session-scoped advisory lock.

use sqlx::{Connection, PgConnection};
use tracing::info;

/// Holds the scheduler's dedicated database session and tracks leadership.
///
/// `pg_try_advisory_lock` is session-scoped: the lock lives exactly as long
/// as this connection. When the leader process dies, its session terminates
/// and the lock releases, so the next surviving instance to re-attempt
/// acquisition takes over. Re-acquiring on a session that already holds the
/// lock simply stacks; everything unwinds with the session.
pub struct LeaderElector {
    database_url: String,
    lock_key: i64,
    conn: Option<PgConnection>,
    is_leader: bool,
}

impl LeaderElector {
    pub fn new(database_url: impl Into<String>, lock_key: i64) -> Self {
        Self {
            database_url: database_url.into(),
            lock_key,
            conn: None,
            is_leader: false,
        }
    }

    pub fn is_leader(&self) -> bool {
        self.is_leader
    }

    /// Attempt to acquire (or confirm) leadership. Called every tick.
    pub async fn try_acquire(&mut self) -> Result<bool, sqlx::Error> {
        let mut conn = match self.conn.take() {
            Some(conn) => conn,
            None => PgConnection::connect(&self.database_url).await?,
        };

        // An error drops the session here; `reset` only has flag cleanup left.
        let (acquired,): (bool,) = sqlx::query_as("SELECT pg_try_advisory_lock($1)")
            .bind(self.lock_key)
            .fetch_one(&mut conn)
            .await?;
        self.conn = Some(conn);

        if acquired && !self.is_leader {
            info!(lock_key = self.lock_key, "acquired scheduler leadership");
        } else if !acquired && self.is_leader {
            info!(lock_key = self.lock_key, "lost scheduler leadership");
        }
        self.is_leader = acquired;
        Ok(acquired)
    }

    /// Tear down the session after an error. The advisory lock (if held)
    /// dies with it; the next tick reconnects and re-contends.
    pub async fn reset(&mut self) {
        if let Some(conn) = self.conn.take() {
            let _ = conn.close().await;
        }
        if self.is_leader {
            info!(lock_key = self.lock_key, "lost scheduler leadership");
        }
        self.is_leader = false;
    }
}
