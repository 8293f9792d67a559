use std::sync::Arc;

use tracing::error;

use edgeflow_service::{init_logging, ApplicationService, ServiceConfig};
use edgeflow_transforms::{FilterByDeviceName, SetResponseData, TransformToJson};

#[tokio::main]
async fn main() {
    let config = match ServiceConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("failed to load configuration: {err}");
            std::process::exit(1);
        }
    };

    init_logging(&config.log_level);

    if let Err(err) = run(config).await {
        error!(error = %format!("{err:#}"), "service failed to start");
        std::process::exit(1);
    }
}

async fn run(config: ServiceConfig) -> anyhow::Result<()> {
    let accepted_devices = std::env::var("EDGEFLOW_FILTER_DEVICE_NAMES")
        .map(|raw| {
            raw.split(',')
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(str::to_string)
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();

    let service = ApplicationService::new(config)?;

    // Default pipeline: optionally filter by device, marshal to JSON and
    // return the result to the trigger.
    let mut functions: Vec<Arc<dyn edgeflow_domain::AppFunction>> = Vec::new();
    if !accepted_devices.is_empty() {
        functions.push(Arc::new(FilterByDeviceName::new(accepted_devices)));
    }
    functions.push(Arc::new(TransformToJson));
    functions.push(Arc::new(SetResponseData::new()));
    service.set_functions(functions)?;

    service.run().await
}
