//! `PostgreSQL`-backed [`QueueTransport`].
//!
//! All queues share one `relay_messages` table. Leasing is a single
//! `UPDATE ... FOR UPDATE SKIP LOCKED` statement, so concurrent consumers
//! never lease the same message twice and never block on each other.

use chrono::{DateTime, Utc};
use queue_relay_core::transport::TransportFuture;
use queue_relay_core::{QueueMessage, QueueTransport, TransportError};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::Row;
use std::time::Duration;
use tokio::sync::OnceCell;
use uuid::Uuid;

/// Durable queue transport on top of `PostgreSQL`.
///
/// # Example
///
/// ```no_run
/// use queue_relay_core::QueueTransport;
/// use queue_relay_postgres::PostgresQueue;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let queue = PostgresQueue::connect("postgres://localhost/relay", 10).await?;
/// queue.ensure_queue("gettextrequest").await?;
/// queue.enqueue("gettextrequest", br#"{"RequestId":"abc"}"#).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct PostgresQueue {
    pool: PgPool,
    migrated: OnceCell<()>,
}

impl PostgresQueue {
    /// Wrap an existing connection pool.
    #[must_use]
    pub fn from_pool(pool: PgPool) -> Self {
        Self {
            pool,
            migrated: OnceCell::new(),
        }
    }

    /// Connect to `database_url` with a pool of at most `max_connections`.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Unavailable`] if the connection fails.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, TransportError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| TransportError::Unavailable(format!("Failed to connect: {e}")))?;
        Ok(Self::from_pool(pool))
    }

    /// The underlying connection pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create the queue tables if they do not exist yet.
    ///
    /// Runs at most once per instance; [`QueueTransport::ensure_queue`] calls
    /// it automatically.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::QueueCreation`] if the migration fails.
    pub async fn migrate(&self) -> Result<(), TransportError> {
        self.migrated
            .get_or_try_init(|| async move {
                sqlx::migrate!("./migrations")
                    .run(&self.pool)
                    .await
                    .map_err(|e| TransportError::QueueCreation {
                        queue: "*".to_string(),
                        reason: format!("Migration failed: {e}"),
                    })
            })
            .await?;
        Ok(())
    }
}

/// Connection-level failures are reported as [`TransportError::Unavailable`];
/// everything else through `classify`.
fn map_sqlx_error(e: &sqlx::Error, classify: impl FnOnce(String) -> TransportError) -> TransportError {
    match e {
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
            TransportError::Unavailable(e.to_string())
        }
        _ => classify(e.to_string()),
    }
}

impl QueueTransport for PostgresQueue {
    fn ensure_queue<'a>(&'a self, queue: &'a str) -> TransportFuture<'a, ()> {
        Box::pin(async move {
            self.migrate().await?;

            sqlx::query("INSERT INTO relay_queues (name) VALUES ($1) ON CONFLICT (name) DO NOTHING")
                .bind(queue)
                .execute(&self.pool)
                .await
                .map_err(|e| {
                    map_sqlx_error(&e, |reason| TransportError::QueueCreation {
                        queue: queue.to_string(),
                        reason,
                    })
                })?;

            tracing::debug!(queue = queue, "Queue ensured");
            Ok(())
        })
    }

    fn enqueue<'a>(&'a self, queue: &'a str, body: &'a [u8]) -> TransportFuture<'a, ()> {
        Box::pin(async move {
            sqlx::query("INSERT INTO relay_messages (queue_name, body) VALUES ($1, $2)")
                .bind(queue)
                .bind(body)
                .execute(&self.pool)
                .await
                .map_err(|e| {
                    map_sqlx_error(&e, |reason| TransportError::Enqueue {
                        queue: queue.to_string(),
                        reason,
                    })
                })?;
            Ok(())
        })
    }

    fn dequeue<'a>(
        &'a self,
        queue: &'a str,
        lease: Duration,
    ) -> TransportFuture<'a, Option<QueueMessage>> {
        Box::pin(async move {
            let pop_receipt = Uuid::new_v4();
            let row = sqlx::query(
                r"
                UPDATE relay_messages
                SET dequeue_count = dequeue_count + 1,
                    visible_at = now() + make_interval(secs => $2::double precision),
                    pop_receipt = $3
                WHERE id = (
                    SELECT id FROM relay_messages
                    WHERE queue_name = $1 AND visible_at <= now()
                    ORDER BY id
                    LIMIT 1
                    FOR UPDATE SKIP LOCKED
                )
                RETURNING id, body, dequeue_count, inserted_at
                ",
            )
            .bind(queue)
            .bind(lease.as_secs_f64())
            .bind(pop_receipt)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                map_sqlx_error(&e, |reason| TransportError::Dequeue {
                    queue: queue.to_string(),
                    reason,
                })
            })?;

            let Some(row) = row else {
                return Ok(None);
            };

            let decode = |e: sqlx::Error| TransportError::Dequeue {
                queue: queue.to_string(),
                reason: format!("Invalid row: {e}"),
            };
            let id: i64 = row.try_get("id").map_err(decode)?;
            let body: Vec<u8> = row.try_get("body").map_err(decode)?;
            let dequeue_count: i32 = row.try_get("dequeue_count").map_err(decode)?;
            let inserted_at: DateTime<Utc> = row.try_get("inserted_at").map_err(decode)?;

            Ok(Some(QueueMessage {
                id: id.to_string(),
                body,
                pop_receipt: pop_receipt.to_string(),
                dequeue_count: u32::try_from(dequeue_count).unwrap_or_default(),
                inserted_at,
            }))
        })
    }

    fn delete<'a>(
        &'a self,
        queue: &'a str,
        message_id: &'a str,
        pop_receipt: &'a str,
    ) -> TransportFuture<'a, ()> {
        Box::pin(async move {
            let lease_lost = || TransportError::LeaseLost {
                queue: queue.to_string(),
                message_id: message_id.to_string(),
            };
            // Ids and receipts this transport never issued cannot match a row.
            let (Ok(id), Ok(receipt)) = (message_id.parse::<i64>(), Uuid::parse_str(pop_receipt))
            else {
                return Err(lease_lost());
            };

            let result = sqlx::query(
                "DELETE FROM relay_messages WHERE queue_name = $1 AND id = $2 AND pop_receipt = $3",
            )
            .bind(queue)
            .bind(id)
            .bind(receipt)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                map_sqlx_error(&e, |reason| TransportError::Delete {
                    queue: queue.to_string(),
                    message_id: message_id.to_string(),
                    reason,
                })
            })?;

            if result.rows_affected() == 0 {
                return Err(lease_lost());
            }
            Ok(())
        })
    }
}
