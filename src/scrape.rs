use crate::collector::NamedCollector;
use crate::context::ScrapeContext;
use crate::domain::{CollectorError, Instance};
use crate::metrics::{MetricSample, NAMESPACE, ValueKind, build_fq_name};
use prometheus::{Gauge, GaugeVec, Opts, Registry};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

struct Outcome {
    name: &'static str,
    elapsed: Duration,
    result: Result<(), CollectorError>,
}

/// Everything gathered during one scrape, before it is rendered.
pub struct Scrape {
    pub up: bool,
    pub samples: Vec<MetricSample>,
    outcomes: Vec<Outcome>,
}

impl Scrape {
    pub fn succeeded(&self, collector: &str) -> Option<bool> {
        self.outcomes
            .iter()
            .find(|outcome| outcome.name == collector)
            .map(|outcome| outcome.result.is_ok())
    }
}

/// Runs every enabled collector against one instance and renders the result
/// in the Prometheus text format.
pub struct Exporter {
    instance: Arc<dyn Instance>,
    collectors: Vec<NamedCollector>,
    channel_capacity: usize,
}

impl Exporter {
    pub fn new(
        instance: Arc<dyn Instance>,
        collectors: Vec<NamedCollector>,
        channel_capacity: usize,
    ) -> Self {
        Self {
            instance,
            collectors,
            channel_capacity: channel_capacity.max(1),
        }
    }

    pub async fn scrape(&self, ctx: &ScrapeContext) -> anyhow::Result<String> {
        let scrape = self.gather(ctx).await;
        let registry = render(&scrape)?;

        let encoder = prometheus::TextEncoder::new();
        Ok(encoder.encode_to_string(&registry.gather())?)
    }

    pub async fn gather(&self, ctx: &ScrapeContext) -> Scrape {
        let up = match ctx.run(self.instance.db().ping()).await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                tracing::error!(error = %e, "Database is unreachable");
                false
            }
            Err(interrupt) => {
                tracing::error!(reason = ?interrupt, "Database ping interrupted");
                false
            }
        };

        if !up {
            return Scrape {
                up,
                samples: vec![],
                outcomes: vec![],
            };
        }

        let (sink, mut receiver) = mpsc::channel(self.channel_capacity);

        let updates: Vec<_> = self
            .collectors
            .iter()
            .map(|entry| {
                let sink = sink.clone();
                async move {
                    let start = Instant::now();
                    let result = entry
                        .collector
                        .update(ctx, self.instance.as_ref(), &sink)
                        .await;

                    Outcome {
                        name: entry.name,
                        elapsed: start.elapsed(),
                        result,
                    }
                }
            })
            .collect();
        // the drain ends once every update has dropped its clone
        drop(sink);

        let drain = async move {
            let mut samples = vec![];
            while let Some(sample) = receiver.recv().await {
                samples.push(sample);
            }
            samples
        };

        let (outcomes, samples) = tokio::join!(futures::future::join_all(updates), drain);

        for outcome in &outcomes {
            match &outcome.result {
                Ok(()) => tracing::debug!(
                    collector = outcome.name,
                    elapsed = ?outcome.elapsed,
                    "Collector succeeded"
                ),
                Err(e) => tracing::error!(
                    collector = outcome.name,
                    elapsed = ?outcome.elapsed,
                    error = %e,
                    "Collector failed"
                ),
            }
        }

        Scrape {
            up,
            samples,
            outcomes,
        }
    }
}

/// Builds a throwaway registry holding the samples of a single scrape.
fn render(scrape: &Scrape) -> anyhow::Result<Registry> {
    let registry = Registry::new();

    let mut families: HashMap<&str, GaugeVec> = HashMap::new();
    for sample in &scrape.samples {
        let descriptor = sample.descriptor();
        if !families.contains_key(descriptor.fq_name()) {
            let family = match descriptor.kind() {
                ValueKind::Gauge => GaugeVec::new(
                    Opts::new(descriptor.fq_name(), descriptor.help()),
                    descriptor.label_names(),
                )?,
            };
            registry.register(Box::new(family.clone()))?;
            families.insert(descriptor.fq_name(), family);
        }

        families[descriptor.fq_name()]
            .with_label_values(sample.label_values())
            .set(sample.value());
    }

    let up = Gauge::new(
        build_fq_name(NAMESPACE, "", "up"),
        "Whether the last scrape was able to connect to the server (1 for yes, 0 for no)",
    )?;
    up.set(if scrape.up { 1.0 } else { 0.0 });
    registry.register(Box::new(up))?;

    if scrape.outcomes.is_empty() {
        return Ok(registry);
    }

    let duration = GaugeVec::new(
        Opts::new(
            build_fq_name(NAMESPACE, "scrape", "collector_duration_seconds"),
            "Duration of a collector scrape",
        ),
        &["collector"],
    )?;
    registry.register(Box::new(duration.clone()))?;

    let success = GaugeVec::new(
        Opts::new(
            build_fq_name(NAMESPACE, "scrape", "collector_success"),
            "Whether a collector succeeded",
        ),
        &["collector"],
    )?;
    registry.register(Box::new(success.clone()))?;

    for outcome in &scrape.outcomes {
        duration
            .with_label_values(&[outcome.name])
            .set(outcome.elapsed.as_secs_f64());
        success
            .with_label_values(&[outcome.name])
            .set(if outcome.result.is_ok() { 1.0 } else { 0.0 });
    }

    Ok(registry)
}
