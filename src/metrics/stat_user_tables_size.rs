use crate::context::ScrapeContext;
use crate::domain::{Collector, CollectorConfig, CollectorError, Instance, Row, Rows, Sink};
use crate::metrics::{MetricDescriptor, MetricSample, NAMESPACE, build_fq_name};
use std::sync::LazyLock;
use std::time::Duration;
use tracing::Instrument;

pub const SUBSYSTEM: &str = "stat_user_tables_size";

/// Upper bound for a single update, regardless of the caller's deadline.
pub const QUERY_TIMEOUT: Duration = Duration::from_secs(1);

const TABLE_SUBSYSTEM: &str = "stat_user_tables";
const UNKNOWN_LABEL: &str = "unknown";

pub static TOTAL_SIZE: LazyLock<MetricDescriptor> = LazyLock::new(|| {
    MetricDescriptor::gauge(
        build_fq_name(NAMESPACE, TABLE_SUBSYSTEM, "size_bytes"),
        "Total disk space used by this table, in bytes, including all indexes and TOAST data",
        &["datname", "schemaname", "relname"],
    )
});

// Column order must match `TableSizeRow::scan`.
const QUERY: &str = "SELECT
        current_database() AS datname,
        schemaname,
        relname,
        pg_total_relation_size(relid) AS total_size
    FROM
        pg_stat_user_tables";

/// One row of the size query, with every column kept nullable.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableSizeRow {
    pub datname: Option<String>,
    pub schemaname: Option<String>,
    pub relname: Option<String>,
    pub total_size: Option<i64>,
}

impl TableSizeRow {
    pub fn scan(row: &dyn Row) -> Result<Self, sqlx::Error> {
        Ok(Self {
            datname: row.try_get_string(0)?,
            schemaname: row.try_get_string(1)?,
            relname: row.try_get_string(2)?,
            total_size: row.try_get_i64(3)?,
        })
    }

    /// Label values in descriptor order, `unknown` standing in for NULL.
    pub fn labels(&self) -> Vec<String> {
        [&self.datname, &self.schemaname, &self.relname]
            .into_iter()
            .map(|value| value.clone().unwrap_or_else(|| UNKNOWN_LABEL.to_owned()))
            .collect()
    }

    /// Size in bytes, zero when NULL.
    pub fn value(&self) -> f64 {
        self.total_size.map(|size| size as f64).unwrap_or(0.0)
    }

    pub fn into_sample(self) -> Result<MetricSample, CollectorError> {
        MetricSample::new(&TOTAL_SIZE, self.value(), self.labels())
    }
}

/// Reports the on-disk size of every user table in the connected database.
pub struct StatUserTablesSizeCollector {
    span: tracing::Span,
}

impl StatUserTablesSizeCollector {
    pub fn new(config: CollectorConfig) -> Self {
        Self { span: config.span }
    }

    pub fn create(config: CollectorConfig) -> Result<Box<dyn Collector>, CollectorError> {
        Ok(Box::new(Self::new(config)))
    }

    async fn stream(
        &self,
        ctx: &ScrapeContext,
        rows: &mut (dyn Rows + '_),
        sink: &Sink,
    ) -> Result<usize, CollectorError> {
        let mut sent = 0;

        loop {
            let row = match ctx.run(rows.next()).await? {
                Ok(Some(row)) => row,
                Ok(None) => return Ok(sent),
                Err(e) => return Err(CollectorError::Cursor(e)),
            };

            let sample = TableSizeRow::scan(row.as_ref())
                .map_err(CollectorError::Scan)?
                .into_sample()?;
            drop(row);

            sink.send(sample)
                .await
                .map_err(|_| CollectorError::SinkClosed)?;
            sent += 1;
        }
    }
}

#[async_trait::async_trait]
impl Collector for StatUserTablesSizeCollector {
    async fn update(
        &self,
        ctx: &ScrapeContext,
        instance: &dyn Instance,
        sink: &Sink,
    ) -> Result<(), CollectorError> {
        async move {
            let ctx = ctx.with_timeout(QUERY_TIMEOUT);
            let db = instance.db();

            let mut rows = ctx.run(db.query(QUERY)).await?.map_err(CollectorError::Query)?;

            // The query may have returned right at the deadline.
            if let Err(interrupt) = ctx.check() {
                rows.close();
                return Err(interrupt.into());
            }

            let result = self.stream(&ctx, rows.as_mut(), sink).await;
            rows.close();

            match &result {
                Ok(sent) => tracing::debug!(samples = sent, "Update complete"),
                Err(e) => tracing::debug!(error = %e, "Update failed"),
            }

            result.map(|_| ())
        }
        .instrument(self.span.clone())
        .await
    }
}
