use crate::context::{Interrupt, ScrapeContext};
use crate::metrics::MetricSample;
use thiserror::Error;
use tokio::sync::mpsc;

/// Conduit collectors stream their samples into. Sending blocks while the
/// consumer is not keeping up.
pub type Sink = mpsc::Sender<MetricSample>;

/// Errors terminating a single collector update.
///
/// Samples sent before the error are never retracted.
#[derive(Debug, Error)]
pub enum CollectorError {
    /// The query deadline elapsed before the cursor was exhausted.
    #[error("query deadline exceeded")]
    Timeout,

    /// The caller cancelled the scrape.
    #[error("scrape cancelled")]
    Cancelled,

    /// The database refused or failed to execute the query.
    #[error("query failed: {0}")]
    Query(#[source] sqlx::Error),

    /// A row could not be decoded into the expected columns.
    #[error("failed to scan row: {0}")]
    Scan(#[source] sqlx::Error),

    /// The cursor failed while fetching the next row.
    #[error("cursor failed: {0}")]
    Cursor(#[source] sqlx::Error),

    /// Nobody is listening on the sink anymore.
    #[error("metric sink closed")]
    SinkClosed,

    /// The sample does not match the label schema of its descriptor.
    #[error("metric {name} expects {expected} label values, got {actual}")]
    InvalidSample {
        name: String,
        expected: usize,
        actual: usize,
    },

    /// The collector could not be constructed.
    #[error("failed to construct collector: {0}")]
    Construction(String),
}

impl From<Interrupt> for CollectorError {
    fn from(value: Interrupt) -> Self {
        match value {
            Interrupt::DeadlineExceeded => CollectorError::Timeout,
            Interrupt::Cancelled => CollectorError::Cancelled,
        }
    }
}

/// One row of a result set, read positionally.
pub trait Row: Send {
    fn try_get_string(&self, index: usize) -> Result<Option<String>, sqlx::Error>;

    fn try_get_i64(&self, index: usize) -> Result<Option<i64>, sqlx::Error>;
}

/// Open cursor over a result set.
#[async_trait::async_trait]
pub trait Rows: Send {
    /// Fetches the next row, `None` once the result set is exhausted.
    async fn next(&mut self) -> Result<Option<Box<dyn Row>>, sqlx::Error>;

    /// Releases the cursor. Consuming the box makes a second close impossible.
    fn close(self: Box<Self>);
}

#[async_trait::async_trait]
pub trait Database: Send + Sync {
    async fn query<'a>(&'a self, sql: &'static str) -> Result<Box<dyn Rows + 'a>, sqlx::Error>;

    async fn ping(&self) -> Result<(), sqlx::Error>;
}

/// The monitored server, handing out ready-to-use database handles.
pub trait Instance: Send + Sync {
    fn db(&self) -> &dyn Database;
}

/// Everything a collector factory gets to build a collector.
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    pub span: tracing::Span,
}

#[async_trait::async_trait]
pub trait Collector: Send + Sync + 'static {
    async fn update(
        &self,
        ctx: &ScrapeContext,
        instance: &dyn Instance,
        sink: &Sink,
    ) -> Result<(), CollectorError>;
}
