use pg_exporter::bootstrap::init_exporter;
use pg_exporter::config::Configuration;
use pg_exporter::logging::setup_logging;
use pg_exporter::server::start_server;
use pg_exporter::server::state::AppState;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let configuration = Arc::new(Configuration::load()?);
    let _guard = setup_logging(&configuration.log)?;

    tracing::info!("Starting pg-exporter");

    let exporter = Arc::new(init_exporter(&configuration)?);

    let state = AppState {
        configuration,
        exporter,
    };

    start_server(state).await?;
    tracing::info!("Bye!");

    Ok(())
}
