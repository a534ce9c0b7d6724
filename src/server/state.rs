use crate::config::Configuration;
use crate::scrape::Exporter;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub configuration: Arc<Configuration>,
    pub exporter: Arc<Exporter>,
}
