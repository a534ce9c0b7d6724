use crate::config::DatabaseConfig;
use crate::domain::{Database, Instance, Row, Rows};
use futures::TryStreamExt;
use futures::stream::BoxStream;
use sqlx::PgPool;
use sqlx::postgres::{PgPoolOptions, PgRow};

/// A PostgreSQL server reached through a lazily connecting pool.
#[derive(Clone)]
pub struct PgInstance {
    pool: PgPool,
}

impl PgInstance {
    pub fn connect(config: &DatabaseConfig) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.acquire_timeout)
            .connect_lazy(&config.url)?;

        Ok(Self::new(pool))
    }

    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl Instance for PgInstance {
    fn db(&self) -> &dyn Database {
        self
    }
}

#[async_trait::async_trait]
impl Database for PgInstance {
    async fn query<'a>(&'a self, sql: &'static str) -> Result<Box<dyn Rows + 'a>, sqlx::Error> {
        let mut stream = sqlx::query(sql).fetch(&self.pool);

        // sqlx executes lazily; pull the first row so that connectivity,
        // permission and planning errors surface here instead of mid-stream.
        let pending = stream.try_next().await?;
        let done = pending.is_none();

        Ok(Box::new(PgRows {
            pending,
            done,
            stream,
        }))
    }

    async fn ping(&self) -> Result<(), sqlx::Error> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

struct PgRows<'a> {
    pending: Option<PgRow>,
    done: bool,
    stream: BoxStream<'a, Result<PgRow, sqlx::Error>>,
}

#[async_trait::async_trait]
impl<'a> Rows for PgRows<'a> {
    async fn next(&mut self) -> Result<Option<Box<dyn Row>>, sqlx::Error> {
        if let Some(row) = self.pending.take() {
            return Ok(Some(Box::new(row)));
        }

        if self.done {
            return Ok(None);
        }

        match self.stream.try_next().await? {
            Some(row) => Ok(Some(Box::new(row))),
            None => {
                self.done = true;
                Ok(None)
            }
        }
    }

    fn close(self: Box<Self>) {
        // dropping the stream hands the connection back to the pool
        tracing::trace!(done = self.done, "Closing cursor");
    }
}

impl Row for PgRow {
    fn try_get_string(&self, index: usize) -> Result<Option<String>, sqlx::Error> {
        sqlx::Row::try_get(self, index)
    }

    fn try_get_i64(&self, index: usize) -> Result<Option<i64>, sqlx::Error> {
        sqlx::Row::try_get(self, index)
    }
}
