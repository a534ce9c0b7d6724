use crate::collector::CollectorRegistry;
use crate::config::Configuration;
use crate::data_source::postgres::PgInstance;
use crate::scrape::Exporter;
use std::sync::Arc;

pub fn init_exporter(configuration: &Configuration) -> anyhow::Result<Exporter> {
    let instance = Arc::new(PgInstance::connect(&configuration.database)?);

    let registry = CollectorRegistry::builtin()?;
    let collectors = registry.build(&configuration.collectors)?;

    Ok(Exporter::new(
        instance,
        collectors,
        configuration.scrape.channel_capacity,
    ))
}
