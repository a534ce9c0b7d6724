use crate::config::CollectorsConfig;
use crate::domain::{Collector, CollectorConfig, CollectorError};
use crate::metrics::stat_user_tables_size::{self, StatUserTablesSizeCollector};
use std::collections::BTreeMap;

pub type Factory = fn(CollectorConfig) -> Result<Box<dyn Collector>, CollectorError>;

struct Registration {
    default_enabled: bool,
    factory: Factory,
}

pub struct NamedCollector {
    pub name: &'static str,
    pub collector: Box<dyn Collector>,
}

/// Every collector the exporter knows about, keyed by subsystem name.
#[derive(Default)]
pub struct CollectorRegistry {
    collectors: BTreeMap<&'static str, Registration>,
}

impl CollectorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The registry with all collectors shipped in this crate.
    pub fn builtin() -> anyhow::Result<Self> {
        let mut registry = Self::new();
        registry.register(
            stat_user_tables_size::SUBSYSTEM,
            true,
            StatUserTablesSizeCollector::create,
        )?;
        Ok(registry)
    }

    pub fn register(
        &mut self,
        name: &'static str,
        default_enabled: bool,
        factory: Factory,
    ) -> anyhow::Result<()> {
        if self.collectors.contains_key(name) {
            anyhow::bail!("collector {} is already registered", name);
        }

        self.collectors.insert(
            name,
            Registration {
                default_enabled,
                factory,
            },
        );
        Ok(())
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.collectors.keys().copied()
    }

    pub fn is_enabled(&self, name: &str, config: &CollectorsConfig) -> bool {
        match self.collectors.get(name) {
            Some(registration) => config.enabled(name).unwrap_or(registration.default_enabled),
            None => false,
        }
    }

    /// Instantiates every enabled collector, in name order.
    pub fn build(&self, config: &CollectorsConfig) -> anyhow::Result<Vec<NamedCollector>> {
        for name in config.names() {
            if !self.collectors.contains_key(name) {
                tracing::warn!(collector = name, "Ignoring configuration of unknown collector");
            }
        }

        let mut collectors = vec![];
        for (&name, registration) in &self.collectors {
            if !self.is_enabled(name, config) {
                tracing::info!(collector = name, "Collector disabled");
                continue;
            }

            let span = tracing::info_span!("collector", collector = name);
            let collector = (registration.factory)(CollectorConfig { span })
                .map_err(|e| anyhow::anyhow!("failed to create collector {}: {}", name, e))?;

            tracing::info!(collector = name, "Collector enabled");
            collectors.push(NamedCollector { name, collector });
        }

        Ok(collectors)
    }
}
